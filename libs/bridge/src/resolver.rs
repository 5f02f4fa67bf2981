//! Resolver Registry & Inbound Dispatcher
//!
//! Resolvers are registered per message discriminant. Whatever shape a handler
//! has (synchronous, async, returning a value, a `Result`, or nothing) it is
//! normalized into one deferred result at registration time, so the dispatcher
//! only ever deals with a `ResolverFuture`.
//!
//! Per inbound message the dispatcher walks
//! `Received -> Validated -> Ignored | Dispatched -> Responded`, and a
//! dispatched message always responds: with the resolver's value, or with an
//! error envelope when the resolver fails or panics.

use crate::channel::{BoxFuture, Channel, InboundListener, ListenerId, SenderContext};
use crate::envelope::ErrorEnvelope;
use crate::message::{Message, TYPE_FIELD};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Deferred result every resolver is normalized into
pub type ResolverFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// Handler bound to one message discriminant
pub trait Resolver: Send + Sync {
    fn resolve(&self, message: Value, sender: SenderContext) -> ResolverFuture;
}

impl<F> Resolver for F
where
    F: Fn(Value, SenderContext) -> ResolverFuture + Send + Sync,
{
    fn resolve(&self, message: Value, sender: SenderContext) -> ResolverFuture {
        self(message, sender)
    }
}

/// Conversion of handler return values into a reply
pub trait IntoResponse {
    fn into_response(self) -> anyhow::Result<Value>;
}

impl IntoResponse for Value {
    fn into_response(self) -> anyhow::Result<Value> {
        Ok(self)
    }
}

/// Handlers that return nothing reply with `null`
impl IntoResponse for () {
    fn into_response(self) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }
}

impl IntoResponse for Message {
    fn into_response(self) -> anyhow::Result<Value> {
        Ok(self.to_value())
    }
}

impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: Into<anyhow::Error>,
{
    fn into_response(self) -> anyhow::Result<Value> {
        self.map_err(Into::into).and_then(IntoResponse::into_response)
    }
}

/// Mapping from discriminant to resolver
#[derive(Clone, Default)]
pub struct ResolverMap {
    resolvers: HashMap<String, Arc<dyn Resolver>>,
}

impl ResolverMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async handler
    pub fn on<F, Fut, R>(mut self, kind: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, SenderContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + 'static,
    {
        let resolver = move |message: Value, sender: SenderContext| -> ResolverFuture {
            let pending = handler(message, sender);
            Box::pin(async move { pending.await.into_response() })
        };
        self.insert(kind, Arc::new(resolver));
        self
    }

    /// Register a handler that completes synchronously
    pub fn on_sync<F, R>(mut self, kind: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, SenderContext) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        let resolver = move |message: Value, sender: SenderContext| -> ResolverFuture {
            let result = handler(message, sender).into_response();
            Box::pin(async move { result })
        };
        self.insert(kind, Arc::new(resolver));
        self
    }

    /// Register a resolver object, replacing any previous one for `kind`
    pub fn insert(
        &mut self,
        kind: impl Into<String>,
        resolver: Arc<dyn Resolver>,
    ) -> Option<Arc<dyn Resolver>> {
        let kind = kind.into();
        let previous = self.resolvers.insert(kind.clone(), resolver);
        if previous.is_some() {
            debug!(kind = %kind, "Replacing resolver");
        }
        previous
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn Resolver>> {
        self.resolvers.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.resolvers.contains_key(kind)
    }

    /// Registered discriminants, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<_> = self.resolvers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl fmt::Debug for ResolverMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverMap")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Why an inbound message was not dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    NotAnObject,
    MissingType,
    NonStringType,
    /// No resolver for this discriminant
    Unrecognized(String),
}

impl IgnoreReason {
    /// Malformed messages fail validation; unrecognized ones are well formed
    pub fn is_malformed(&self) -> bool {
        !matches!(self, IgnoreReason::Unrecognized(_))
    }
}

/// Result of offering one inbound message to the dispatcher
pub enum DispatchOutcome {
    Ignored(IgnoreReason),
    Dispatched {
        kind: String,
        reply: BoxFuture<'static, Value>,
    },
}

impl DispatchOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, DispatchOutcome::Ignored(_))
    }

    /// The deferred reply, if the message was dispatched
    pub fn into_reply(self) -> Option<BoxFuture<'static, Value>> {
        match self {
            DispatchOutcome::Ignored(_) => None,
            DispatchOutcome::Dispatched { reply, .. } => Some(reply),
        }
    }
}

impl fmt::Debug for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Ignored(reason) => f.debug_tuple("Ignored").field(reason).finish(),
            DispatchOutcome::Dispatched { kind, .. } => f
                .debug_struct("Dispatched")
                .field("kind", kind)
                .finish_non_exhaustive(),
        }
    }
}

/// Channel listener that routes inbound messages to resolvers
#[derive(Debug, Clone)]
pub struct InboundDispatcher {
    resolvers: Arc<ResolverMap>,
}

impl InboundDispatcher {
    pub fn new(resolvers: ResolverMap) -> Self {
        Self {
            resolvers: Arc::new(resolvers),
        }
    }

    pub fn resolvers(&self) -> &ResolverMap {
        &self.resolvers
    }

    /// Validate, look up and invoke the resolver for one inbound message
    pub fn dispatch(&self, message: Value, sender: SenderContext) -> DispatchOutcome {
        let kind = match message.as_object().map(|object| object.get(TYPE_FIELD)) {
            None => return DispatchOutcome::Ignored(IgnoreReason::NotAnObject),
            Some(None) => return DispatchOutcome::Ignored(IgnoreReason::MissingType),
            Some(Some(Value::String(kind))) => kind.clone(),
            Some(Some(_)) => return DispatchOutcome::Ignored(IgnoreReason::NonStringType),
        };

        let Some(resolver) = self.resolvers.get(&kind).cloned() else {
            return DispatchOutcome::Ignored(IgnoreReason::Unrecognized(kind));
        };

        debug!(kind = %kind, origin = ?sender.origin, "Dispatching inbound message");

        // A handler may fail before handing back its future
        let invoked = panic::catch_unwind(AssertUnwindSafe(|| resolver.resolve(message, sender)));

        let reply: BoxFuture<'static, Value> = match invoked {
            Err(payload) => {
                let envelope = ErrorEnvelope::from_panic(payload);
                Box::pin(async move { envelope.to_value() })
            }
            Ok(pending) => {
                let kind = kind.clone();
                Box::pin(async move {
                    match AssertUnwindSafe(pending).catch_unwind().await {
                        Ok(Ok(value)) => value,
                        Ok(Err(error)) => {
                            warn!(kind = %kind, error = %error, "Resolver failed");
                            ErrorEnvelope::from_error(&error).to_value()
                        }
                        Err(payload) => ErrorEnvelope::from_panic(payload).to_value(),
                    }
                })
            }
        };

        DispatchOutcome::Dispatched { kind, reply }
    }
}

impl InboundListener for InboundDispatcher {
    fn on_message(
        &self,
        message: Value,
        sender: SenderContext,
    ) -> Option<BoxFuture<'static, Value>> {
        match self.dispatch(message, sender) {
            DispatchOutcome::Ignored(reason) => {
                trace!(reason = ?reason, "Ignoring inbound message");
                None
            }
            DispatchOutcome::Dispatched { reply, .. } => Some(reply),
        }
    }
}

/// Handle to an installed resolver listener.
///
/// Dropping the handle leaves the listener installed; removal is explicit.
#[must_use = "the listener stays installed until `unregister` is called"]
pub struct ResolverRegistration {
    channel: Arc<dyn Channel>,
    id: ListenerId,
    kinds: Vec<String>,
}

impl ResolverRegistration {
    pub(crate) fn new(channel: Arc<dyn Channel>, id: ListenerId, kinds: Vec<String>) -> Self {
        Self { channel, id, kinds }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Discriminants served by this registration
    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    /// Remove the listener from the channel
    pub fn unregister(self) -> bool {
        let removed = self.channel.remove_listener(self.id);
        debug!(listener = %self.id, removed, "Unregistered resolvers");
        removed
    }
}

impl fmt::Debug for ResolverRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistration")
            .field("id", &self.id)
            .field("kinds", &self.kinds)
            .finish()
    }
}
