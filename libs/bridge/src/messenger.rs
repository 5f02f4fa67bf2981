//! Messenger
//!
//! Outbound half of the bridge plus the resolver installation entry point.
//!
//! `send_message` consults the response cache before going to the channel:
//!
//! ```text
//! Message ──► KeyResolver ──► ResponseCache ──fresh──► cached data
//!                                   │
//!                                 stale/miss
//!                                   ▼
//!                            Channel::send ──► error envelope? ──► BridgeError::Remote
//!                                   │
//!                                   ▼
//!                          ResponseCache::set ──► response
//! ```
//!
//! The cache lock is only taken around the synchronous probe and write, never
//! across the channel round trip. Two overlapping requests for the same
//! message therefore both reach the channel.

use crate::cache::{CacheEntry, ResponseCache};
use crate::channel::{Channel, Route, TargetId};
use crate::envelope::ErrorEnvelope;
use crate::error::{BridgeError, Result};
use crate::key::KeyResolver;
use crate::message::{Message, DEFAULT_REPLY_SUFFIX};
use crate::resolver::{InboundDispatcher, ResolverMap, ResolverRegistration};
use crate::stats::{MessengerStats, StatsSnapshot};
use bridge_config::BridgeSettings;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-instance messenger configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessengerOptions {
    /// Default maximum age of a cached response; zero disables cache reads
    pub stale_time: Duration,
    /// Suffix pairing a request discriminant with its reply discriminant
    pub reply_suffix: String,
}

impl Default for MessengerOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,
            reply_suffix: DEFAULT_REPLY_SUFFIX.to_string(),
        }
    }
}

impl MessengerOptions {
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_reply_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.reply_suffix = suffix.into();
        self
    }
}

impl From<&BridgeSettings> for MessengerOptions {
    fn from(settings: &BridgeSettings) -> Self {
        Self {
            stale_time: settings.stale_time(),
            reply_suffix: settings.reply_suffix.clone(),
        }
    }
}

/// Options for a single `send_message` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Overrides the messenger's default stale time
    pub stale_time: Option<Duration>,
    /// Send to one context instead of broadcasting
    pub target: Option<TargetId>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn to_target(mut self, target: impl Into<TargetId>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Options for `send_response`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseOptions {
    pub target: Option<TargetId>,
}

impl ResponseOptions {
    pub fn to_target(target: impl Into<TargetId>) -> Self {
        Self {
            target: Some(target.into()),
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    keys: KeyResolver,
    responses: ResponseCache,
}

/// Typed request/response endpoint for one context
pub struct Messenger {
    channel: Arc<dyn Channel>,
    options: MessengerOptions,
    state: Mutex<CacheState>,
    stats: MessengerStats,
}

impl Messenger {
    pub fn new(channel: Arc<dyn Channel>, options: MessengerOptions) -> Self {
        debug!(stale_time_ms = options.stale_time.as_millis() as u64, "Creating messenger");
        Self {
            channel,
            options,
            state: Mutex::new(CacheState::default()),
            stats: MessengerStats::new(),
        }
    }

    /// Create a messenger from loaded settings
    pub fn from_settings(channel: Arc<dyn Channel>, settings: &BridgeSettings) -> Self {
        Self::new(channel, MessengerOptions::from(settings))
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn options(&self) -> &MessengerOptions {
        &self.options
    }

    /// Build the paired reply message for `request`
    pub fn reply_to(&self, request: &Message) -> Message {
        Message::reply_to(request, &self.options.reply_suffix)
    }

    /// Send a request, answering from the cache while a fresh entry exists
    pub async fn send_message(&self, message: &Message, options: SendOptions) -> Result<Value> {
        let stale_time = options.stale_time.unwrap_or(self.options.stale_time);

        let key = {
            let mut state = self.state.lock();
            let key = state.keys.resolve(message);
            if let Some(entry) = state.responses.get(key) {
                if entry.is_fresh(stale_time, Instant::now()) {
                    self.stats.record_hit();
                    debug!(kind = message.kind(), %key, "Serving response from cache");
                    return Ok(entry.data.clone());
                }
            }
            key
        };
        self.stats.record_miss();

        let route = Route::from(options.target);
        debug!(
            kind = message.kind(),
            %key,
            route = %route.target_string(),
            "Sending message over channel"
        );

        let response = match self.channel.send(message.to_value(), route).await {
            Ok(response) => response,
            Err(err) => {
                self.stats.record_channel_failure();
                warn!(kind = message.kind(), error = %err, "Channel send failed");
                return Err(err.into());
            }
        };
        self.stats.record_round_trip();

        if let Some(envelope) = ErrorEnvelope::from_response(&response) {
            self.stats.record_remote_failure();
            warn!(kind = message.kind(), error = %envelope.message, "Remote resolver failed");
            return Err(BridgeError::remote(envelope));
        }

        self.state
            .lock()
            .responses
            .set(key, CacheEntry::new(response.clone()));
        Ok(response)
    }

    /// Swap freshly built nested fields for interned ones with equal content
    pub(crate) fn share_nested(&self, message: Message) -> Message {
        self.state.lock().keys.share_nested(message)
    }

    /// Push a reply-shaped message to a target or broadcast it.
    ///
    /// The acknowledgement value is discarded; nothing is cached.
    pub async fn send_response(&self, message: &Message, options: ResponseOptions) -> Result<()> {
        let route = Route::from(options.target);
        debug!(kind = message.kind(), route = %route.target_string(), "Sending response");

        if let Err(err) = self.channel.send(message.to_value(), route).await {
            self.stats.record_channel_failure();
            warn!(kind = message.kind(), error = %err, "Response send failed");
            return Err(err.into());
        }

        self.stats.record_response_sent();
        Ok(())
    }

    /// Install one channel listener serving `resolvers`
    pub fn add_message_resolvers(&self, resolvers: ResolverMap) -> ResolverRegistration {
        let kinds = resolvers.kinds();
        let dispatcher = Arc::new(InboundDispatcher::new(resolvers));
        let id = self.channel.add_listener(dispatcher);
        info!(listener = %id, kinds = ?kinds, "Installed message resolvers");
        ResolverRegistration::new(Arc::clone(&self.channel), id, kinds)
    }

    /// Drop every cached response; interned keys are kept
    pub fn clear_cache(&self) {
        self.state.lock().responses.clear();
        debug!("Cleared response cache");
    }

    /// Drop the cached response for `message`, returning whether one existed
    pub fn invalidate_cache(&self, message: &Message) -> bool {
        let mut state = self.state.lock();
        let removed = match state.keys.lookup(message) {
            Some(key) => state.responses.delete(key),
            None => false,
        };
        debug!(kind = message.kind(), removed, "Invalidated cache entry");
        removed
    }

    /// Diagnostic accessor for the cached response of `message`
    pub fn get_message_cache(&self, message: &Message) -> Option<CacheEntry> {
        let state = self.state.lock();
        let key = state.keys.lookup(message)?;
        state.responses.get(key).cloned()
    }

    /// Get messenger statistics
    pub fn stats(&self) -> StatsSnapshot {
        let state = self.state.lock();
        self.stats.snapshot(state.keys.len(), state.responses.len())
    }
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("channel", &self.channel)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use crate::test_utils::ScriptedChannel;
    use serde_json::json;

    fn hello() -> Message {
        Message::new("test").with_field("message", "hello")
    }

    fn messenger(channel: &Arc<ScriptedChannel>, stale_time_ms: u64) -> Messenger {
        Messenger::new(
            channel.clone(),
            MessengerOptions::default().with_stale_time(Duration::from_millis(stale_time_ms)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_within_stale_time() {
        let channel = Arc::new(ScriptedChannel::echo_reply("Response"));
        let messenger = messenger(&channel, 1000);

        let first = messenger.send_message(&hello(), SendOptions::new()).await.unwrap();
        assert_eq!(first, json!({"type": "testResponse", "message": "hello"}));
        assert_eq!(channel.call_count(), 1);

        let second = messenger.send_message(&hello(), SendOptions::new()).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(channel.call_count(), 1);

        let stats = messenger.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.interned_messages, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_refetches() {
        let channel = Arc::new(ScriptedChannel::echo_reply("Response"));
        let messenger = messenger(&channel, 1000);

        messenger.send_message(&hello(), SendOptions::new()).await.unwrap();

        tokio::time::advance(Duration::from_millis(999)).await;
        messenger.send_message(&hello(), SendOptions::new()).await.unwrap();
        assert_eq!(channel.call_count(), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        messenger.send_message(&hello(), SendOptions::new()).await.unwrap();
        assert_eq!(channel.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_stale_time_always_refetches() {
        let channel = Arc::new(ScriptedChannel::echo_reply("Response"));
        let messenger = Messenger::new(channel.clone(), MessengerOptions::default());

        messenger.send_message(&hello(), SendOptions::new()).await.unwrap();
        messenger.send_message(&hello(), SendOptions::new()).await.unwrap();
        assert_eq!(channel.call_count(), 2);

        // Still written even though never read
        assert!(messenger.get_message_cache(&hello()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_stale_time_override() {
        let channel = Arc::new(ScriptedChannel::echo_reply("Response"));
        let uncached = messenger(&channel, 0);

        uncached.send_message(&hello(), SendOptions::new()).await.unwrap();
        let options = SendOptions::new().with_stale_time(Duration::from_secs(5));
        uncached.send_message(&hello(), options).await.unwrap();
        assert_eq!(channel.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_zero_stale_time_bypasses_cache() {
        let channel = Arc::new(ScriptedChannel::echo_reply("Response"));
        let cached = messenger(&channel, 60_000);

        cached.send_message(&hello(), SendOptions::new()).await.unwrap();
        cached
            .send_message(&hello(), SendOptions::new().with_stale_time(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(channel.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_round_trip() {
        let channel = Arc::new(ScriptedChannel::echo_reply("Response"));
        let messenger = messenger(&channel, 60_000);

        messenger.send_message(&hello(), SendOptions::new()).await.unwrap();
        assert!(messenger.invalidate_cache(&hello()));
        assert!(!messenger.invalidate_cache(&hello()));
        assert!(messenger.get_message_cache(&hello()).is_none());

        messenger.send_message(&hello(), SendOptions::new()).await.unwrap();
        assert_eq!(channel.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cache_forces_round_trip() {
        let channel = Arc::new(ScriptedChannel::echo_reply("Response"));
        let messenger = messenger(&channel, 60_000);
        let other = Message::new("other");

        messenger.send_message(&hello(), SendOptions::new()).await.unwrap();
        messenger.send_message(&other, SendOptions::new()).await.unwrap();
        messenger.clear_cache();

        assert_eq!(messenger.stats().cached_entries, 0);
        assert_eq!(messenger.stats().interned_messages, 2);

        messenger.send_message(&hello(), SendOptions::new()).await.unwrap();
        messenger.send_message(&other, SendOptions::new()).await.unwrap();
        assert_eq!(channel.call_count(), 4);
    }

    #[tokio::test]
    async fn test_channel_failure_propagates_unchanged() {
        let channel = Arc::new(ScriptedChannel::echo_reply("Response"));
        let messenger = messenger(&channel, 60_000);
        channel.fail_next_send(ChannelError::Closed);

        let err = messenger
            .send_message(&hello(), SendOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.channel_error(), Some(&ChannelError::Closed));
        assert!(messenger.get_message_cache(&hello()).is_none());
        assert_eq!(messenger.stats().channel_failures, 1);
    }

    #[tokio::test]
    async fn test_error_envelope_is_not_cached() {
        let channel = Arc::new(ScriptedChannel::new(|_message, _route| {
            Ok(json!({"type": "error", "message": "boom", "stack": "Error: boom"}))
        }));
        let messenger = messenger(&channel, 60_000);

        let err = messenger
            .send_message(&hello(), SendOptions::new())
            .await
            .unwrap_err();
        match err {
            BridgeError::Remote { message, stack } => {
                assert_eq!(message, "boom");
                assert_eq!(stack.as_deref(), Some("Error: boom"));
            }
            other => panic!("expected remote failure, got {:?}", other),
        }

        assert!(messenger.get_message_cache(&hello()).is_none());
        messenger
            .send_message(&hello(), SendOptions::new())
            .await
            .unwrap_err();
        assert_eq!(channel.call_count(), 2);
        assert_eq!(messenger.stats().remote_failures, 2);
    }

    #[tokio::test]
    async fn test_target_routing() {
        let channel = Arc::new(ScriptedChannel::echo_reply("Response"));
        let messenger = messenger(&channel, 0);

        messenger
            .send_message(&hello(), SendOptions::new().to_target(42u64))
            .await
            .unwrap();
        messenger.send_message(&hello(), SendOptions::new()).await.unwrap();

        let routes: Vec<_> = channel.sent_messages().into_iter().map(|(_, r)| r).collect();
        assert_eq!(routes, vec![Route::Target(TargetId::from(42u64)), Route::Broadcast]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_requests_are_not_coalesced() {
        let channel = Arc::new(
            ScriptedChannel::echo_reply("Response").with_delay(Duration::from_millis(50)),
        );
        let messenger = messenger(&channel, 60_000);

        let (msg_a, msg_b) = (hello(), hello());
        let (a, b) = tokio::join!(
            messenger.send_message(&msg_a, SendOptions::new()),
            messenger.send_message(&msg_b, SendOptions::new()),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(channel.call_count(), 2);

        // Once populated, later requests hit the cache
        messenger.send_message(&hello(), SendOptions::new()).await.unwrap();
        assert_eq!(channel.call_count(), 2);
    }

    #[tokio::test]
    async fn test_send_response_does_not_cache() {
        let channel = Arc::new(ScriptedChannel::echo_reply("Ack"));
        let messenger = messenger(&channel, 60_000);
        let reply = messenger.reply_to(&hello()).with_field("message", "hi back");
        assert_eq!(reply.kind(), "testResponse");

        messenger
            .send_response(&reply, ResponseOptions::to_target("tab-3"))
            .await
            .unwrap();
        messenger
            .send_response(&reply, ResponseOptions::default())
            .await
            .unwrap();

        assert_eq!(channel.call_count(), 2);
        assert!(messenger.get_message_cache(&reply).is_none());
        assert_eq!(messenger.stats().responses_sent, 2);
        assert_eq!(messenger.stats().interned_messages, 0);
    }

    #[tokio::test]
    async fn test_send_response_ignores_error_shaped_ack() {
        let channel = Arc::new(ScriptedChannel::new(|_message, _route| {
            Ok(json!({"type": "error", "message": "ignored"}))
        }));
        let messenger = messenger(&channel, 0);

        assert!(messenger
            .send_response(&Message::new("pingResponse"), ResponseOptions::default())
            .await
            .is_ok());
    }

    #[test]
    fn test_options_from_settings() {
        let settings = BridgeSettings {
            stale_time_ms: 250,
            reply_suffix: "Reply".to_string(),
        };
        let options = MessengerOptions::from(&settings);
        assert_eq!(options.stale_time, Duration::from_millis(250));
        assert_eq!(options.reply_suffix, "Reply");
    }
}
