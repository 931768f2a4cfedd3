//! Task spawning abstraction.
//!
//! Core services spawn background work (listening loops, health monitors,
//! per-endpoint actions, revert timers) through [`TaskSpawner`] so tests and
//! embedding applications can supply their own runtime handle.

use std::future::Future;

use tokio::task::JoinHandle;

/// Abstraction for spawning background tasks.
///
/// The spawned task runs independently of the caller. The trait itself
/// provides no way to cancel or join; use [`TokioSpawner::spawn_joinable`]
/// when the caller wants to observe the result.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a detached background task.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Tokio-based spawner.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Creates a new `TokioSpawner` with the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a new `TokioSpawner` using the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }

    /// Spawns a future and returns its join handle.
    pub fn spawn_joinable<F, T>(&self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.handle.spawn(future)
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}
