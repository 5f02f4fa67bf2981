//! Channel Abstraction
//!
//! The bridge never touches the transport directly. Anything that can send a
//! JSON value to the other context and hand inbound values to registered
//! listeners can carry bridge traffic.
//!
//! ## Listener convention
//!
//! A listener answers by returning the reply: `None` means it does not take
//! part in this message, `Some(future)` is the deferred reply the channel
//! awaits and delivers to the sender. There is no separate reply callback.

use crate::error::ChannelError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// Type alias for boxed futures crossing the channel seam
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identifier of a context reachable through a channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for TargetId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Where an outbound message goes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Route {
    /// Default channel path: every listening context may answer
    #[default]
    Broadcast,
    /// A single named context
    Target(TargetId),
}

impl Route {
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Route::Broadcast)
    }

    pub fn target(&self) -> Option<&TargetId> {
        match self {
            Route::Target(id) => Some(id),
            Route::Broadcast => None,
        }
    }

    /// Route identifier as string for logging
    pub fn target_string(&self) -> String {
        match self {
            Route::Broadcast => "broadcast".to_string(),
            Route::Target(id) => format!("target:{}", id),
        }
    }
}

impl From<Option<TargetId>> for Route {
    fn from(target: Option<TargetId>) -> Self {
        target.map_or(Route::Broadcast, Route::Target)
    }
}

impl From<TargetId> for Route {
    fn from(target: TargetId) -> Self {
        Route::Target(target)
    }
}

/// What the channel knows about the sender of an inbound message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderContext {
    /// Context the message came from, when the channel can tell
    pub origin: Option<TargetId>,
    /// Free-form label supplied by the sending side (URL, frame, ...)
    pub label: Option<String>,
}

impl SenderContext {
    pub fn from_origin(origin: impl Into<TargetId>) -> Self {
        Self {
            origin: Some(origin.into()),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Handle identifying a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId {
    id: Uuid,
}

impl ListenerId {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn uuid(&self) -> Uuid {
        self.id
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.id.simple())
    }
}

/// Receiver side of a channel
pub trait InboundListener: Send + Sync {
    /// Inspect an inbound message; return the deferred reply to answer it
    fn on_message(
        &self,
        message: Value,
        sender: SenderContext,
    ) -> Option<BoxFuture<'static, Value>>;
}

/// Opaque bidirectional transport between two contexts
#[async_trait]
pub trait Channel: Send + Sync + fmt::Debug {
    /// Send a message and wait for the other side's reply
    async fn send(&self, message: Value, route: Route) -> Result<Value, ChannelError>;

    /// Register an inbound listener
    fn add_listener(&self, listener: Arc<dyn InboundListener>) -> ListenerId;

    /// Remove a listener, returning whether it was registered
    fn remove_listener(&self, id: ListenerId) -> bool;
}
