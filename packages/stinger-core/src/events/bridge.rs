//! Bridge implementation that maps events onto a broadcast channel.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{ActionEvent, BroadcastEvent, EndpointEvent};

/// Bridges service events to a `tokio::sync::broadcast` channel.
///
/// Watchers (the orchestrator's failure watch, tests) call [`subscribe`].
/// An optional external emitter receives every event as well.
///
/// [`subscribe`]: BroadcastEventBridge::subscribe
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter that receives a copy of every event.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_endpoint, EndpointEvent, Endpoint);
    impl_emit!(emit_action, ActionEvent, Action);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointRole;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bridge = BroadcastEventBridge::new(8);
        let mut rx = bridge.subscribe();

        bridge.emit_endpoint(EndpointEvent::ConnectionFailed {
            endpoint: "sos".to_string(),
            role: EndpointRole::EventSource,
            attempts: 3,
            timestamp: 0,
        });

        match rx.recv().await.unwrap() {
            BroadcastEvent::Endpoint(EndpointEvent::ConnectionFailed { attempts, .. }) => {
                assert_eq!(attempts, 3)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emitting_without_receivers_does_not_panic() {
        let bridge = BroadcastEventBridge::new(1);
        bridge.emit_action(ActionEvent::Reverted {
            endpoint: "obs-2".to_string(),
            scene: "SCN Goal".to_string(),
            source: "MED Goal Video".to_string(),
            timestamp: 0,
        });
    }
}
