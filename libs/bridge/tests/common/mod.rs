//! Shared helpers for bridge integration tests

#![allow(dead_code)]

use context_bridge::{ChannelHub, Messenger, MessengerOptions};
use std::sync::Arc;
use std::time::Duration;

/// Route bridge logs through the test harness once per binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("context_bridge=debug")
        .with_test_writer()
        .try_init();
}

/// Messenger attached to `hub` under `name`
pub fn messenger_on(hub: &ChannelHub, name: &str, stale_time_ms: u64) -> Messenger {
    Messenger::new(
        Arc::new(hub.endpoint(name)),
        MessengerOptions::default().with_stale_time(Duration::from_millis(stale_time_ms)),
    )
}
