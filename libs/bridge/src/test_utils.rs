//! Test utilities for exercising messengers without a real transport

use crate::channel::{Channel, InboundListener, ListenerId, Route, SenderContext};
use crate::error::ChannelError;
use crate::message::TYPE_FIELD;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Responder = Arc<dyn Fn(&Value, &Route) -> Result<Value, ChannelError> + Send + Sync>;

/// Channel answering every send from a canned responder
pub struct ScriptedChannel {
    responder: Responder,
    delay: Option<Duration>,
    calls: AtomicU64,
    sent: Mutex<Vec<(Value, Route)>>,
    fail_next: Mutex<Option<ChannelError>>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn InboundListener>)>>,
}

impl ScriptedChannel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Value, &Route) -> Result<Value, ChannelError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            delay: None,
            calls: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Reply with the request's fields under `<type><suffix>`
    pub fn echo_reply(suffix: &str) -> Self {
        let suffix = suffix.to_string();
        Self::new(move |message, _route| {
            let mut reply = message.clone();
            if let Some(object) = reply.as_object_mut() {
                let kind = object
                    .get(TYPE_FIELD)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                object.insert(TYPE_FIELD.to_string(), Value::String(kind + &suffix));
            }
            Ok(reply)
        })
    }

    /// Wait this long (in tokio time) before answering each send
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `send` calls that reached the channel
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Every message sent so far with its route
    pub fn sent_messages(&self) -> Vec<(Value, Route)> {
        self.sent.lock().clone()
    }

    /// Make the next send fail with `err`
    pub fn fail_next_send(&self, err: ChannelError) {
        *self.fail_next.lock() = Some(err);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Offer an inbound message to registered listeners in order.
    ///
    /// Returns the first reply, or `None` when every listener passed.
    pub async fn deliver(&self, message: Value, sender: SenderContext) -> Option<Value> {
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            if let Some(reply) = listener.on_message(message.clone(), sender.clone()) {
                return Some(reply.await);
            }
        }
        None
    }
}

impl fmt::Debug for ScriptedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedChannel")
            .field("calls", &self.call_count())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    async fn send(&self, message: Value, route: Route) -> Result<Value, ChannelError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.sent.lock().push((message.clone(), route.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.fail_next.lock().take() {
            return Err(err);
        }

        (self.responder)(&message, &route)
    }

    fn add_listener(&self, listener: Arc<dyn InboundListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}
