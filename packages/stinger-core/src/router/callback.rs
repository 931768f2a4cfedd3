//! Subscriber callbacks.
//!
//! A callback is either synchronous or asynchronous. Both are invoked through
//! [`Callback::invoke`], which completes only when the callback has finished,
//! so dispatch order is the same for both kinds.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;

/// Error returned by a subscriber.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a subscriber.
pub type CallbackResult = Result<(), CallbackError>;

type SyncFn = dyn Fn(&Value) -> CallbackResult + Send + Sync;
type AsyncFn = dyn Fn(Value) -> BoxFuture<'static, CallbackResult> + Send + Sync;

/// Why a callback did not complete normally.
#[derive(Debug, Error)]
pub enum CallbackFailure {
    #[error("callback returned an error: {0}")]
    Error(CallbackError),

    #[error("callback panicked: {0}")]
    Panicked(String),
}

/// A registered subscriber.
#[derive(Clone)]
pub enum Callback {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl Callback {
    /// Wraps a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Value) -> CallbackResult + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wraps an asynchronous closure.
    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        Self::Async(Arc::new(move |data| f(data).boxed()))
    }

    /// Runs the callback to completion, catching errors and panics.
    pub async fn invoke(&self, data: &Value) -> Result<(), CallbackFailure> {
        let outcome = match self {
            Self::Sync(f) => std::panic::catch_unwind(AssertUnwindSafe(|| f(data))),
            Self::Async(f) => AssertUnwindSafe(f(data.clone())).catch_unwind().await,
        };

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CallbackFailure::Error(e)),
            Err(payload) => Err(CallbackFailure::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn sync_callback_receives_payload() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        let callback = Callback::sync(move |data| {
            *seen_clone.lock() = Some(data.clone());
            Ok(())
        });

        callback.invoke(&json!({"winner_team_num": 1})).await.unwrap();
        assert_eq!(*seen.lock(), Some(json!({"winner_team_num": 1})));
    }

    #[tokio::test]
    async fn async_callback_is_awaited() {
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let done_clone = Arc::clone(&done);
        let callback = Callback::asynchronous(move |_| {
            let done = Arc::clone(&done_clone);
            async move {
                tokio::task::yield_now().await;
                done.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        });

        callback.invoke(&Value::Null).await.unwrap();
        assert!(done.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn errors_and_panics_are_caught() {
        let failing = Callback::sync(|_| Err("scene missing".into()));
        let err = failing.invoke(&Value::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "callback returned an error: scene missing");

        let panicking = Callback::asynchronous(|data: Value| async move {
            if data.is_null() {
                panic!("boom");
            }
            Ok(())
        });
        let err = panicking.invoke(&Value::Null).await.unwrap_err();
        assert!(matches!(err, CallbackFailure::Panicked(msg) if msg == "boom"));
    }

    /// Panics are only caught when the build unwinds; an aborting release
    /// profile would take the listening loop down with the callback.
    #[test]
    fn workspace_profiles_unwind_on_panic() {
        let manifest = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../Cargo.toml"));
        let aborts = manifest
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").replace(' ', ""))
            .any(|line| line == "panic=\"abort\"");
        assert!(!aborts, "a workspace profile sets panic = \"abort\"");
    }
}
