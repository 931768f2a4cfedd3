//! Connection supervision: connect-with-retry and health monitoring.
//!
//! - [`ConnectionSupervisor::ensure_connected`] blocks until an endpoint is
//!   connected, retrying with a fixed delay. Failures are logged, never raised,
//!   unless a finite retry budget runs out or shutdown is requested.
//! - [`ConnectionSupervisor::monitor_health`] periodically probes one control
//!   endpoint and reconnects it when the probe fails. Each endpoint has its
//!   own monitor, so one dead endpoint never delays another.
//!
//! The event-source endpoint has no monitor: its listening loop notices a
//! dead socket and calls `ensure_connected` itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::retry::{with_fixed_backoff, RetryPolicy};
use super::{ConnectionError, ConnectionState, EndpointHandle};
use crate::control::ControlEndpoint;

/// Drives connections for every endpoint.
pub struct ConnectionSupervisor {
    policy: RetryPolicy,
    health_interval: Duration,
    cancel: CancellationToken,
}

impl ConnectionSupervisor {
    /// Creates a supervisor.
    ///
    /// # Arguments
    /// * `policy` - Fixed retry delay and attempt budget (0 = unbounded)
    /// * `health_interval` - Time between liveness probes; also the probe timeout
    /// * `cancel` - Shutdown token observed by every loop
    pub fn new(policy: RetryPolicy, health_interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            policy,
            health_interval,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Connects `endpoint` by repeatedly calling `connect` until it succeeds.
    ///
    /// Moves the endpoint through `Connecting` to `Connected`. On an exhausted
    /// budget the endpoint becomes `Closed` and a `ConnectionFailed` event is
    /// emitted; on cancellation it goes back to `Disconnected`.
    pub async fn ensure_connected<T, F, Fut>(
        &self,
        endpoint: &EndpointHandle,
        connect: F,
    ) -> Result<T, ConnectionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ConnectionError>>,
    {
        endpoint.set_state(ConnectionState::Connecting);

        match with_fixed_backoff(endpoint.name(), self.policy, &self.cancel, connect).await {
            Ok(connection) => {
                endpoint.set_state(ConnectionState::Connected);
                Ok(connection)
            }
            Err(ConnectionError::RetriesExhausted { attempts }) => {
                endpoint.set_state(ConnectionState::Closed);
                endpoint.report_failure(attempts);
                Err(ConnectionError::RetriesExhausted { attempts })
            }
            Err(e) => {
                endpoint.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Probes `endpoint` every health interval and reconnects it on failure.
    ///
    /// Runs until shutdown or until a finite retry budget gives up on the
    /// endpoint. A probe in flight is abandoned when shutdown is requested.
    pub async fn monitor_health(&self, endpoint: Arc<ControlEndpoint>) {
        log::info!("[Supervisor] Health monitor started for {}", endpoint.name());

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.health_interval) => {}
            }

            let Some(surface) = endpoint.current_surface() else {
                continue;
            };

            let probe = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = tokio::time::timeout(self.health_interval, surface.probe()) => result,
            };

            let failure = match probe {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("no probe response within {:?}", self.health_interval),
            };

            log::warn!(
                "[Supervisor] {} connection lost ({}), reconnecting...",
                endpoint.name(),
                failure
            );
            endpoint.handle().set_state(ConnectionState::Degraded);

            match endpoint.connect(self).await {
                Ok(()) => {}
                Err(ConnectionError::Cancelled) => break,
                Err(e) => {
                    log::error!(
                        "[Supervisor] {} will not be reconnected: {}",
                        endpoint.name(),
                        e
                    );
                    break;
                }
            }
        }

        log::info!("[Supervisor] Health monitor stopped for {}", endpoint.name());
    }
}
