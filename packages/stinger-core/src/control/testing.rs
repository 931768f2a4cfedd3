//! In-memory control surfaces shared by test modules.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use tokio_util::sync::CancellationToken;

use super::{
    ControlConnector, ControlEndpoint, ControlError, ControlResult, ControlSurface, MediaAction,
    SceneItem,
};
use crate::endpoint::{ConnectionSupervisor, EndpointConfig, EndpointRole, RetryPolicy};
use crate::events::NoopEventEmitter;

/// A call recorded by [`FakeSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SurfaceCall {
    SetEnabled {
        scene: String,
        item_id: i64,
        enabled: bool,
    },
    Media {
        input: String,
        action: MediaAction,
    },
}

/// Scene graph held in memory; records every mutating call.
pub(crate) struct FakeSurface {
    scenes: Mutex<HashMap<String, Vec<SceneItem>>>,
    calls: Mutex<Vec<SurfaceCall>>,
    closed: AtomicBool,
    probe_fails: AtomicBool,
    probes: AtomicU32,
}

impl FakeSurface {
    pub(crate) fn new() -> Self {
        Self {
            scenes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            probe_fails: AtomicBool::new(false),
            probes: AtomicU32::new(0),
        }
    }

    pub(crate) fn with_item(self, scene: &str, item_id: i64, source: &str) -> Self {
        self.scenes
            .lock()
            .entry(scene.to_string())
            .or_default()
            .push(SceneItem {
                scene_item_id: item_id,
                source_name: source.to_string(),
            });
        self
    }

    pub(crate) fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_probes(&self) {
        self.probe_fails.store(true, Ordering::SeqCst);
    }

    pub(crate) fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> ControlResult<()> {
        if self.is_closed() {
            Err(ControlError::Transport("socket closed".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ControlSurface for FakeSurface {
    async fn scene_items(&self, scene: &str) -> ControlResult<Vec<SceneItem>> {
        self.ensure_open()?;
        self.scenes
            .lock()
            .get(scene)
            .cloned()
            .ok_or_else(|| ControlError::RequestFailed {
                request: "GetSceneItemList".into(),
                code: 600,
                comment: format!("No source was found by the name of `{}`.", scene),
            })
    }

    async fn set_item_enabled(&self, scene: &str, item_id: i64, enabled: bool) -> ControlResult<()> {
        self.ensure_open()?;
        self.calls.lock().push(SurfaceCall::SetEnabled {
            scene: scene.to_string(),
            item_id,
            enabled,
        });
        Ok(())
    }

    async fn trigger_media_action(&self, input: &str, action: MediaAction) -> ControlResult<()> {
        self.ensure_open()?;
        self.calls.lock().push(SurfaceCall::Media {
            input: input.to_string(),
            action,
        });
        Ok(())
    }

    async fn probe(&self) -> ControlResult<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;
        if self.probe_fails.load(Ordering::SeqCst) {
            return Err(ControlError::Transport("probe failed".into()));
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out pre-built surfaces in order; can fail a number of attempts first.
pub(crate) struct FakeConnector {
    surfaces: Mutex<VecDeque<Arc<FakeSurface>>>,
    failures_left: AtomicU32,
    connects: AtomicU32,
}

impl FakeConnector {
    pub(crate) fn new(surfaces: Vec<Arc<FakeSurface>>) -> Self {
        Self {
            surfaces: Mutex::new(surfaces.into()),
            failures_left: AtomicU32::new(0),
            connects: AtomicU32::new(0),
        }
    }

    pub(crate) fn failing_first(self, failures: u32) -> Self {
        self.failures_left.store(failures, Ordering::SeqCst);
        self
    }

    pub(crate) fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlConnector for FakeConnector {
    async fn connect(&self, _config: &EndpointConfig) -> ControlResult<Arc<dyn ControlSurface>> {
        let failures = self.failures_left.load(Ordering::SeqCst);
        if failures > 0 {
            self.failures_left.store(failures - 1, Ordering::SeqCst);
            return Err(ControlError::Transport("connection refused".into()));
        }
        let surface = self
            .surfaces
            .lock()
            .pop_front()
            .ok_or_else(|| ControlError::Transport("connection refused".into()))?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(surface as Arc<dyn ControlSurface>)
    }
}

/// Builds an endpoint already connected to `surface`.
pub(crate) async fn connected_endpoint(name: &str, surface: Arc<FakeSurface>) -> Arc<ControlEndpoint> {
    let endpoint = Arc::new(ControlEndpoint::new(
        EndpointConfig::new(name, "localhost", 4455, EndpointRole::Control),
        Arc::new(FakeConnector::new(vec![surface])),
        Arc::new(NoopEventEmitter),
    ));
    let supervisor = ConnectionSupervisor::new(
        RetryPolicy::default(),
        std::time::Duration::from_secs(5),
        CancellationToken::new(),
    );
    endpoint
        .connect(&supervisor)
        .await
        .expect("fake connector always connects");
    endpoint
}

/// Builds an endpoint that never connected.
pub(crate) fn offline_endpoint(name: &str) -> Arc<ControlEndpoint> {
    Arc::new(ControlEndpoint::new(
        EndpointConfig::new(name, "localhost", 4455, EndpointRole::Control),
        Arc::new(FakeConnector::new(Vec::new())),
        Arc::new(NoopEventEmitter),
    ))
}
