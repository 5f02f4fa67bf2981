//! In-Process Channel Hub
//!
//! Connects any number of named endpoints inside one process. Each endpoint
//! is a `Channel`; a broadcast reaches the listeners of every other endpoint,
//! a targeted send reaches only the named endpoint.
//!
//! Listeners are offered the message in registration order and the first one
//! that answers wins. Later listeners are not consulted. A send nobody
//! answers fails with `ChannelError::NoReceiver`.
//!
//! Several handles may share one name. Each handle owns the listeners it
//! registered; closing it drops only those, and the name disappears from the
//! hub when its last handle closes.

use crate::channel::{Channel, InboundListener, ListenerId, Route, SenderContext, TargetId};
use crate::error::ChannelError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

struct HubListener {
    id: ListenerId,
    owner: Uuid,
    listener: Arc<dyn InboundListener>,
}

#[derive(Default)]
struct EndpointSlot {
    /// Open handles sharing this name
    handles: usize,
    listeners: Vec<HubListener>,
}

impl EndpointSlot {
    fn listeners(&self) -> impl Iterator<Item = Arc<dyn InboundListener>> + '_ {
        self.listeners.iter().map(|entry| Arc::clone(&entry.listener))
    }
}

#[derive(Default)]
struct HubState {
    endpoints: BTreeMap<TargetId, EndpointSlot>,
}

/// Shared switchboard for in-process endpoints
#[derive(Clone, Default)]
pub struct ChannelHub {
    state: Arc<RwLock<HubState>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an endpoint named `id`.
    ///
    /// Opening a name that is already open adds another handle to it; both
    /// handles receive traffic addressed to the name.
    pub fn endpoint(&self, id: impl Into<TargetId>) -> MemoryEndpoint {
        let id = id.into();
        let handles = {
            let mut state = self.state.write();
            let slot = state.endpoints.entry(id.clone()).or_default();
            slot.handles += 1;
            slot.handles
        };
        debug!(endpoint = %id, handles, "Opened hub endpoint");
        MemoryEndpoint {
            id,
            handle: Uuid::new_v4(),
            hub: self.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// Names of the currently open endpoints
    pub fn endpoints(&self) -> Vec<TargetId> {
        self.state.read().endpoints.keys().cloned().collect()
    }

    fn listeners_for(
        &self,
        from: &TargetId,
        route: &Route,
    ) -> Result<Vec<Arc<dyn InboundListener>>, ChannelError> {
        let state = self.state.read();
        let listeners = match route {
            Route::Broadcast => state
                .endpoints
                .iter()
                .filter(|(id, _)| *id != from)
                .flat_map(|(_, slot)| slot.listeners())
                .collect(),
            Route::Target(target) => state
                .endpoints
                .get(target)
                .ok_or_else(|| ChannelError::UnknownTarget(target.clone()))?
                .listeners()
                .collect(),
        };
        Ok(listeners)
    }
}

impl fmt::Debug for ChannelHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHub")
            .field("endpoints", &self.endpoints())
            .finish()
    }
}

/// One handle on a named context attached to a `ChannelHub`
pub struct MemoryEndpoint {
    id: TargetId,
    handle: Uuid,
    hub: ChannelHub,
    closed: AtomicBool,
}

impl MemoryEndpoint {
    pub fn id(&self) -> &TargetId {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Detach from the hub, dropping the listeners this handle registered
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut state = self.hub.state.write();
        let remaining = match state.endpoints.get_mut(&self.id) {
            Some(slot) => {
                slot.listeners.retain(|entry| entry.owner != self.handle);
                slot.handles = slot.handles.saturating_sub(1);
                slot.handles
            }
            None => 0,
        };
        if remaining == 0 {
            state.endpoints.remove(&self.id);
        }
        debug!(endpoint = %self.id, remaining, "Closed hub endpoint");
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for MemoryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEndpoint")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl Channel for MemoryEndpoint {
    async fn send(&self, message: Value, route: Route) -> Result<Value, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let listeners = self.hub.listeners_for(&self.id, &route)?;
        let sender = SenderContext::from_origin(self.id.clone());
        trace!(
            from = %self.id,
            route = %route.target_string(),
            candidates = listeners.len(),
            "Delivering message"
        );

        for listener in listeners {
            if let Some(reply) = listener.on_message(message.clone(), sender.clone()) {
                return Ok(reply.await);
            }
        }

        Err(ChannelError::NoReceiver)
    }

    /// A closed endpoint hands out an id but never registers the listener
    fn add_listener(&self, listener: Arc<dyn InboundListener>) -> ListenerId {
        let id = ListenerId::new();
        let mut state = self.hub.state.write();
        if self.is_closed() {
            warn!(endpoint = %self.id, listener = %id, "Ignoring listener on closed endpoint");
            return id;
        }

        if let Some(slot) = state.endpoints.get_mut(&self.id) {
            slot.listeners.push(HubListener {
                id,
                owner: self.handle,
                listener,
            });
        }
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.hub.state.write();
        match state.endpoints.get_mut(&self.id) {
            Some(slot) => {
                let before = slot.listeners.len();
                slot.listeners.retain(|entry| entry.id != id);
                slot.listeners.len() != before
            }
            None => false,
        }
    }
}
