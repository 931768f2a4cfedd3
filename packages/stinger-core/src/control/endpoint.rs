//! A control endpoint: one OBS instance and its current connection.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{ControlConnector, ControlSurface};
use crate::endpoint::{
    ConnectionError, ConnectionState, ConnectionSupervisor, EndpointConfig, EndpointHandle,
};
use crate::events::EventEmitter;

/// Owns the live surface of one control endpoint.
///
/// At most one surface is alive at a time: [`connect`](Self::connect) closes
/// and discards the previous surface before opening a new one, so nothing can
/// keep writing to a dead transport.
pub struct ControlEndpoint {
    handle: EndpointHandle,
    connector: Arc<dyn ControlConnector>,
    surface: RwLock<Option<Arc<dyn ControlSurface>>>,
    /// Serializes reconnects (initial connect vs health monitor).
    reconnect_lock: tokio::sync::Mutex<()>,
}

impl ControlEndpoint {
    /// Creates a disconnected endpoint.
    pub fn new(
        config: EndpointConfig,
        connector: Arc<dyn ControlConnector>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            handle: EndpointHandle::new(config, emitter),
            connector,
            surface: RwLock::new(None),
            reconnect_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn handle(&self) -> &EndpointHandle {
        &self.handle
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    /// Returns the live surface, if the endpoint is connected.
    pub fn surface(&self) -> Option<Arc<dyn ControlSurface>> {
        if !self.handle.is_connected() {
            return None;
        }
        self.surface.read().clone()
    }

    /// Returns the stored surface regardless of state (used for probing a
    /// degraded connection).
    pub(crate) fn current_surface(&self) -> Option<Arc<dyn ControlSurface>> {
        self.surface.read().clone()
    }

    /// (Re)connects through the supervisor.
    ///
    /// Blocks until connected, cancelled, or (with a finite budget) exhausted.
    pub async fn connect(&self, supervisor: &ConnectionSupervisor) -> Result<(), ConnectionError> {
        let _guard = self.reconnect_lock.lock().await;

        let previous = self.surface.write().take();
        if let Some(old) = previous {
            log::debug!("[Control] {} closing previous connection", self.name());
            old.close().await;
        }

        let connector = Arc::clone(&self.connector);
        let config = self.handle.config().clone();
        let surface = supervisor
            .ensure_connected(&self.handle, || {
                let connector = Arc::clone(&connector);
                let config = config.clone();
                async move {
                    connector
                        .connect(&config)
                        .await
                        .map_err(|e| ConnectionError::Transport(e.to_string()))
                }
            })
            .await?;

        *self.surface.write() = Some(surface);
        log::info!(
            "[Control] Connected to {} ({}:{})",
            self.name(),
            config.host,
            config.port
        );
        Ok(())
    }

    /// Closes the connection and marks the endpoint closed.
    pub async fn disconnect(&self) {
        let previous = self.surface.write().take();
        if let Some(surface) = previous {
            surface.close().await;
        }
        self.handle.set_state(ConnectionState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::testing::{FakeConnector, FakeSurface};
    use crate::endpoint::{EndpointRole, RetryPolicy};
    use crate::events::NoopEventEmitter;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn supervisor() -> ConnectionSupervisor {
        ConnectionSupervisor::new(
            RetryPolicy::forever(Duration::from_millis(10)),
            Duration::from_secs(5),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn surface_is_hidden_until_connected() {
        let surface = Arc::new(FakeSurface::new());
        let connector = Arc::new(FakeConnector::new(vec![surface.clone()]));
        let endpoint = ControlEndpoint::new(
            EndpointConfig::new("obs-1", "localhost", 4455, EndpointRole::Control),
            connector,
            Arc::new(NoopEventEmitter),
        );

        assert!(endpoint.surface().is_none());
        endpoint.connect(&supervisor()).await.unwrap();
        assert!(endpoint.surface().is_some());
        assert!(endpoint.is_connected());
    }

    #[tokio::test]
    async fn reconnect_closes_previous_surface_first() {
        let first = Arc::new(FakeSurface::new());
        let second = Arc::new(FakeSurface::new());
        let connector = Arc::new(FakeConnector::new(vec![first.clone(), second.clone()]));
        let endpoint = ControlEndpoint::new(
            EndpointConfig::new("obs-1", "localhost", 4455, EndpointRole::Control),
            connector.clone(),
            Arc::new(NoopEventEmitter),
        );
        let supervisor = supervisor();

        endpoint.connect(&supervisor).await.unwrap();
        assert!(!first.is_closed());

        endpoint.connect(&supervisor).await.unwrap();
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn disconnect_marks_closed() {
        let surface = Arc::new(FakeSurface::new());
        let endpoint = ControlEndpoint::new(
            EndpointConfig::new("obs-2", "localhost", 4456, EndpointRole::Control),
            Arc::new(FakeConnector::new(vec![surface.clone()])),
            Arc::new(NoopEventEmitter),
        );
        endpoint.connect(&supervisor()).await.unwrap();

        endpoint.disconnect().await;

        assert!(surface.is_closed());
        assert_eq!(endpoint.handle().state(), ConnectionState::Closed);
        assert!(endpoint.surface().is_none());
    }
}
