//! Context Bridge
//!
//! Request/response messaging between isolated execution contexts that share
//! nothing but an asynchronous message channel, with a short-lived response
//! cache on the requesting side.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐             ┌──────────────────────────┐
//! │   Requesting context     │             │   Responding context     │
//! │                          │             │                          │
//! │  Messenger::send_message │   Channel   │  InboundDispatcher       │
//! │    │                     │             │    │                     │
//! │    ├─ KeyResolver        │── request ─►│    ├─ validate `type`    │
//! │    ├─ ResponseCache      │             │    ├─ ResolverMap lookup │
//! │    │                     │◄─ reply ────│    └─ value | envelope   │
//! │    └─ envelope → Err     │             │                          │
//! └──────────────────────────┘             └──────────────────────────┘
//! ```
//!
//! Every message is a JSON object whose `type` field names the operation.
//! Replies conventionally use the request's type with a `Response` suffix.
//! A failing resolver answers with `{type: "error", message, stack}`, which
//! the requesting side turns back into `BridgeError::Remote`.
//!
//! # Examples
//!
//! ```rust
//! use context_bridge::{ChannelHub, Message, Messenger, MessengerOptions, ResolverMap, SendOptions};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn demo() -> context_bridge::Result<()> {
//! let hub = ChannelHub::new();
//! let background = Messenger::new(Arc::new(hub.endpoint("background")), MessengerOptions::default());
//! let popup = Messenger::new(Arc::new(hub.endpoint("popup")), MessengerOptions::default());
//!
//! let _registration = background.add_message_resolvers(
//!     ResolverMap::new().on_sync("test", |message, _sender| {
//!         json!({"type": "testResponse", "message": message["message"]})
//!     }),
//! );
//!
//! let reply = popup
//!     .send_message(&Message::new("test").with_field("message", "hello"), SendOptions::new())
//!     .await?;
//! assert_eq!(reply["type"], "testResponse");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod channel;
pub mod envelope;
pub mod error;
pub mod key;
pub mod memory;
pub mod message;
pub mod messenger;
pub mod resolver;
pub mod stats;
pub mod test_utils;
pub mod typed;

pub use cache::{CacheEntry, ResponseCache};
pub use channel::{
    BoxFuture, Channel, InboundListener, ListenerId, Route, SenderContext, TargetId,
};
pub use envelope::{is_error_response, ErrorEnvelope, ERROR_TYPE, FALLBACK_ERROR_MESSAGE};
pub use error::{BridgeError, ChannelError, Result};
pub use key::{CanonicalKey, KeyResolver};
pub use memory::{ChannelHub, MemoryEndpoint};
pub use message::{reply_type, FieldValue, Message, DEFAULT_REPLY_SUFFIX, TYPE_FIELD};
pub use messenger::{Messenger, MessengerOptions, ResponseOptions, SendOptions};
pub use resolver::{
    DispatchOutcome, IgnoreReason, InboundDispatcher, IntoResponse, Resolver, ResolverFuture,
    ResolverMap, ResolverRegistration,
};
pub use stats::{MessengerStats, StatsSnapshot};
pub use typed::{decode_request, encode_request, Request};

pub use bridge_config::BridgeSettings;
