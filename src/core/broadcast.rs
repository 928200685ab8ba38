//! Broadcast registry: fan-out of events to the live set of sinks
//!
//! The registry is the only shared mutable state in the bridge. Each
//! connected subscriber holds one [`Sink`]; publishing clones the event
//! into every live sink's unbounded queue, so a slow consumer accumulates
//! backlog instead of stalling the publisher or its peers.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::event::Event;

/// Stable identity of a registered sink.
///
/// Identifiers increase monotonically and are never reused, so a stale
/// handle can never unregister a newer sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    sinks: HashMap<u64, mpsc::UnboundedSender<Event>>,
}

/// Registry of live subscriber sinks.
///
/// Cheap to clone; all clones share the same live set. None of the
/// operations ever await, so the inner lock is never held across a
/// suspension point.
#[derive(Clone, Default)]
pub struct BroadcastRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl BroadcastRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new sink and add it to the live set.
    ///
    /// The sink receives every event published after this call returns,
    /// in publication order. Dropping the returned [`Sink`] unregisters it.
    pub fn register(&self) -> Sink {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        let id = SinkId(state.next_id);
        state.next_id += 1;
        state.sinks.insert(id.0, tx);
        Sink {
            id,
            rx,
            registry: self.clone(),
        }
    }

    /// Remove a sink from the live set.
    ///
    /// Removing an already-absent sink is a no-op, which tolerates
    /// double-cleanup on error paths.
    pub fn unregister(&self, id: SinkId) {
        self.state.lock().sinks.remove(&id.0);
    }

    /// Deliver `event` to every sink currently in the live set.
    ///
    /// Never blocks on a consumer. Sinks whose receiving side is gone are
    /// pruned in passing.
    pub fn publish(&self, event: &Event) {
        let mut state = self.state.lock();
        state.sinks.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live sinks
    pub fn len(&self) -> usize {
        self.state.lock().sinks.len()
    }

    /// Whether no sinks are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receiving end of one subscriber's event stream.
///
/// Owned exclusively by its connection handler. The sink unregisters
/// itself when dropped; [`BroadcastRegistry::unregister`] may also be
/// called explicitly and stays idempotent with the drop.
pub struct Sink {
    id: SinkId,
    rx: mpsc::UnboundedReceiver<Event>,
    registry: BroadcastRegistry,
}

impl Sink {
    /// Stable identity of this sink within its registry
    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Receive the next event in publication order.
    ///
    /// Returns `None` once the sink has been unregistered and all queued
    /// events have been drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
