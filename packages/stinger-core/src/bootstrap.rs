//! Application bootstrap and dependency wiring.
//!
//! This is the composition root: every service is created and wired here,
//! in dependency order:
//!
//! 1. Shared infrastructure (spawner, event bridge, cancellation token)
//! 2. Event router and connection supervisor
//! 3. Control endpoints (one per OBS instance) and the event-source client
//! 4. Action executor and orchestrator, subscribed to the router
//!
//! [`BootstrappedServices::start_background_tasks`] then launches the long
//! running loops and [`BootstrappedServices::shutdown`] stops them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionExecutor, TokioRevertScheduler};
use crate::api::{self, ApiState, WsConnectionManager};
use crate::control::{ControlConnector, ControlEndpoint, ObsConnector};
use crate::endpoint::{ConnectionState, ConnectionSupervisor, EndpointHandle};
use crate::error::{StingerError, StingerResult};
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::router::{EventRouter, RouterOptions};
use crate::runtime::TokioSpawner;
use crate::services::{MatchStatePersistence, Orchestrator};
use crate::source::EventSourceClient;
use crate::state::{Config, MatchState};

/// How long shutdown waits for background tasks to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Container for all bootstrapped services.
pub struct BootstrappedServices {
    pub config: Config,
    /// Fan-out of endpoint and playback notifications.
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub router: Arc<EventRouter>,
    pub supervisor: Arc<ConnectionSupervisor>,
    pub control_endpoints: Vec<Arc<ControlEndpoint>>,
    pub event_source: Arc<EventSourceClient>,
    pub orchestrator: Arc<Orchestrator>,
    /// Command-socket clients.
    pub ws_manager: Arc<WsConnectionManager>,
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BootstrappedServices {
    /// Launches every long-running loop.
    ///
    /// Each control endpoint gets its own task: initial connect, then its
    /// health monitor. The event-source listener, the endpoint-failure watch
    /// and (when enabled) the command server run alongside.
    ///
    /// Returns the command server address when it is enabled.
    ///
    /// # Errors
    ///
    /// Fails if the command server cannot bind its port.
    pub async fn start_background_tasks(&self) -> StingerResult<Option<SocketAddr>> {
        let mut tasks = Vec::new();

        for endpoint in &self.control_endpoints {
            if !endpoint_is_usable(endpoint.handle()) {
                continue;
            }
            let endpoint = Arc::clone(endpoint);
            let supervisor = Arc::clone(&self.supervisor);
            tasks.push(self.spawner.spawn_joinable(async move {
                match endpoint.connect(&supervisor).await {
                    Ok(()) => supervisor.monitor_health(endpoint).await,
                    Err(e) => log::warn!(
                        "[Bootstrap] {} did not connect: {}",
                        endpoint.name(),
                        e
                    ),
                }
            }));
        }

        if endpoint_is_usable(self.event_source.handle()) {
            let source = Arc::clone(&self.event_source);
            tasks.push(self.spawner.spawn_joinable(async move { source.run().await }));
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let failures = self.event_bridge.subscribe();
        let cancel = self.cancel_token.child_token();
        tasks.push(self.spawner.spawn_joinable(async move {
            orchestrator.watch_endpoint_failures(failures, cancel).await
        }));

        let mut command_addr = None;
        let server = &self.config.command_server;
        if server.enabled {
            let listener = api::bind(&server.bind_host, server.port)
                .await
                .map_err(|e| StingerError::Internal(e.to_string()))?;
            command_addr = listener.local_addr().ok();

            let state = ApiState::new(Arc::clone(&self.orchestrator), Arc::clone(&self.ws_manager));
            let cancel = self.cancel_token.child_token();
            tasks.push(self.spawner.spawn_joinable(async move {
                if let Err(e) = api::serve(listener, state, cancel).await {
                    log::error!("[Bootstrap] {}", e);
                }
            }));
        } else {
            log::info!("[Bootstrap] Command server disabled");
        }

        self.tasks.lock().extend(tasks);
        log::info!(
            "[Bootstrap] Started: {} control endpoint(s), event source {}",
            self.control_endpoints.len(),
            self.event_source.handle().name()
        );
        Ok(command_addr)
    }

    /// Initiates graceful shutdown of all services.
    ///
    /// Pending reverts are left to fire on their own.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.cancel_token.cancel();

        let closed = self.ws_manager.close_all();
        if closed > 0 {
            log::info!("[Bootstrap] Closed {} command connection(s)", closed);
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        let all = futures::future::join_all(tasks);
        if tokio::time::timeout(SHUTDOWN_GRACE, all).await.is_err() {
            log::warn!("[Bootstrap] Background tasks still running after {:?}", SHUTDOWN_GRACE);
        }

        for endpoint in &self.control_endpoints {
            endpoint.disconnect().await;
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Checks one endpoint's address before its loop starts.
///
/// An invalid endpoint is logged and marked `Closed`; the others start as usual.
fn endpoint_is_usable(handle: &EndpointHandle) -> bool {
    match handle.config().validate() {
        Ok(()) => true,
        Err(e) => {
            log::error!("[Bootstrap] Not starting {}: {}", handle.name(), e);
            handle.set_state(ConnectionState::Closed);
            false
        }
    }
}

/// Bootstraps all services against real OBS instances.
///
/// # Errors
///
/// Returns [`StingerError::Configuration`] when a setting shared by every
/// endpoint is invalid. Bad endpoint addresses are reported at start instead.
pub fn bootstrap_services(
    config: Config,
    persistence: Arc<dyn MatchStatePersistence>,
) -> StingerResult<BootstrappedServices> {
    let connector = Arc::new(ObsConnector::default());
    bootstrap_services_with(config, connector, persistence)
}

/// Bootstraps all services with a custom control connector.
pub fn bootstrap_services_with(
    config: Config,
    connector: Arc<dyn ControlConnector>,
    persistence: Arc<dyn MatchStatePersistence>,
) -> StingerResult<BootstrappedServices> {
    config.validate()?;

    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();
    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    let emitter = Arc::clone(&event_bridge) as Arc<dyn EventEmitter>;

    let router = Arc::new(EventRouter::new(RouterOptions {
        debug_events: config.debug_events,
        debug_filters: config.debug_filters.clone(),
    }));

    let supervisor = Arc::new(ConnectionSupervisor::new(
        config.timing.retry_policy(),
        config.timing.health_check_interval(),
        cancel_token.clone(),
    ));

    let control_endpoints: Vec<Arc<ControlEndpoint>> = config
        .control_endpoints
        .iter()
        .map(|endpoint| {
            Arc::new(ControlEndpoint::new(
                endpoint.clone(),
                Arc::clone(&connector),
                Arc::clone(&emitter),
            ))
        })
        .collect();

    let event_source = Arc::new(EventSourceClient::new(
        config.event_source.clone(),
        Arc::clone(&router),
        Arc::clone(&supervisor),
        Arc::clone(&emitter),
    ));

    let executor = ActionExecutor::new(
        spawner.clone(),
        Arc::new(TokioRevertScheduler::new(spawner.clone(), Arc::clone(&emitter))),
        Arc::clone(&emitter),
    );

    let orchestrator = Arc::new(Orchestrator::new(
        control_endpoints.clone(),
        executor,
        config.scenes.clone(),
        config.timing.clone(),
        MatchState::new(config.matches.clone(), config.current_match),
        persistence,
    ));
    orchestrator.subscribe(&router);

    Ok(BootstrappedServices {
        config,
        event_bridge,
        router,
        supervisor,
        control_endpoints,
        event_source,
        orchestrator,
        ws_manager: Arc::new(WsConnectionManager::new()),
        spawner,
        cancel_token,
        tasks: Mutex::new(Vec::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::testing::{FakeConnector, FakeSurface};
    use crate::endpoint::{EndpointConfig, EndpointRole};
    use crate::services::NoopMatchStatePersistence;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.control_endpoints = vec![
            EndpointConfig::new("obs-1", "127.0.0.1", 4455, EndpointRole::Control),
            EndpointConfig::new("obs-2", "127.0.0.1", 4456, EndpointRole::Control),
        ];
        // Nothing listens on port 1; the source keeps retrying until shutdown.
        config.event_source = EndpointConfig::new("sos", "127.0.0.1", 1, EndpointRole::EventSource);
        config.command_server.enabled = false;
        config
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = test_config();
        config.current_match = 99;

        let result = bootstrap_services(config, Arc::new(NoopMatchStatePersistence));

        assert!(matches!(result, Err(StingerError::Configuration(_))));
    }

    #[tokio::test]
    async fn invalid_endpoint_does_not_block_the_others() {
        let surface = Arc::new(FakeSurface::new());
        let connector = Arc::new(FakeConnector::new(vec![surface.clone()]));
        let mut config = test_config();
        config.control_endpoints[1].host.clear();
        let services =
            bootstrap_services_with(config, connector.clone(), Arc::new(NoopMatchStatePersistence))
                .unwrap();

        services.start_background_tasks().await.unwrap();

        let obs1 = Arc::clone(&services.control_endpoints[0]);
        wait_until(move || obs1.is_connected()).await;
        assert_eq!(
            services.control_endpoints[1].handle().state(),
            ConnectionState::Closed
        );
        assert_eq!(services.orchestrator.endpoints().len(), 2);
        assert_eq!(connector.connect_count(), 1);

        services.shutdown().await;
        assert!(surface.is_closed());
    }

    #[tokio::test]
    async fn invalid_event_source_is_closed_but_control_starts() {
        let surface = Arc::new(FakeSurface::new());
        let mut config = test_config();
        config.control_endpoints.truncate(1);
        config.event_source.port = 0;
        let services = bootstrap_services_with(
            config,
            Arc::new(FakeConnector::new(vec![surface])),
            Arc::new(NoopMatchStatePersistence),
        )
        .unwrap();

        services.start_background_tasks().await.unwrap();

        let obs1 = Arc::clone(&services.control_endpoints[0]);
        wait_until(move || obs1.is_connected()).await;
        assert_eq!(services.event_source.handle().state(), ConnectionState::Closed);

        services.shutdown().await;
    }

    #[tokio::test]
    async fn orchestrator_is_subscribed_to_game_events() {
        let services =
            bootstrap_services(test_config(), Arc::new(NoopMatchStatePersistence)).unwrap();

        assert_eq!(services.router.callback_count("game", "match_ended"), 1);
        assert_eq!(services.router.callback_count("game", "goal_scored"), 1);
        assert_eq!(services.orchestrator.endpoints().len(), 2);
    }

    #[tokio::test]
    async fn start_connects_endpoints_and_shutdown_closes_them() {
        let first = Arc::new(FakeSurface::new());
        let second = Arc::new(FakeSurface::new());
        let connector = Arc::new(FakeConnector::new(vec![first.clone(), second.clone()]));
        let services = bootstrap_services_with(
            test_config(),
            connector,
            Arc::new(NoopMatchStatePersistence),
        )
        .unwrap();

        let addr = services.start_background_tasks().await.unwrap();
        assert!(addr.is_none());

        let endpoints = services.control_endpoints.clone();
        wait_until(move || endpoints.iter().all(|e| e.is_connected())).await;

        services.shutdown().await;

        assert!(first.is_closed());
        assert!(second.is_closed());
        assert!(services.control_endpoints.iter().all(|e| !e.is_connected()));
    }
}
