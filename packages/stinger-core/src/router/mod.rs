//! Channel/event publish-subscribe router.
//!
//! The router decouples "a remote event occurred" from "what local action
//! runs". Subscribers register callbacks per `(channel, event)`; the event
//! source feeds raw frames into [`EventRouter::dispatch`].
//!
//! Remote registration is session scoped: the first callback for a key since
//! the last (re)connection sends one `wsRelay:register` message, or queues it
//! while disconnected. [`EventRouter::on_connected`] flushes the queue in
//! order and then re-registers every other key that still has callbacks.
//!
//! The `local` and `ws` channels are in-process only and never registered.

mod callback;
mod message;
mod registry;

use std::collections::HashSet;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol_constants::{LIFECYCLE_CHANNEL, LOCAL_CHANNEL};
use registry::SubscriptionRegistry;

pub use callback::{Callback, CallbackError, CallbackFailure, CallbackResult};
pub use message::{encode, registration_message, split_channel_event, InboundEvent, ProtocolError};
pub use registry::SubscriptionKey;

/// Errors returned to callers of [`EventRouter::send`].
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("event source is not connected")]
    NotConnected,

    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Outbound half of the event-source transport.
///
/// The source client owns the socket writer and drains the receiving end.
#[derive(Clone)]
pub struct RouterSink {
    tx: mpsc::UnboundedSender<String>,
}

impl RouterSink {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Creates a sink and the receiver the writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn push(&self, text: String) -> Result<(), RouterError> {
        self.tx.send(text).map_err(|_| RouterError::NotConnected)
    }
}

/// Debug tracing of dispatched events.
#[derive(Debug, Clone, Default)]
pub struct RouterOptions {
    /// Log every dispatched event at info level.
    pub debug_events: bool,
    /// `channel:event` names excluded from debug logging.
    pub debug_filters: HashSet<String>,
}

#[derive(Default)]
struct RouterInner {
    registry: SubscriptionRegistry,
    pending: Vec<SubscriptionKey>,
    registered: HashSet<SubscriptionKey>,
    sink: Option<RouterSink>,
}

impl RouterInner {
    /// Sends a registration, or queues the key if there is no usable sink.
    fn register_or_queue(&mut self, key: SubscriptionKey) {
        if let Some(sink) = &self.sink {
            match registration_message(&key) {
                Ok(text) => {
                    if sink.push(text).is_ok() {
                        log::debug!("[Router] Registered {}", key);
                        self.registered.insert(key);
                        return;
                    }
                    self.sink = None;
                }
                Err(e) => {
                    log::error!("[Router] Failed to encode registration for {}: {}", key, e);
                    return;
                }
            }
        }
        if !self.pending.contains(&key) {
            log::debug!("[Router] Queued registration for {}", key);
            self.pending.push(key);
        }
    }
}

fn is_in_process(channel: &str) -> bool {
    channel == LOCAL_CHANNEL || channel == LIFECYCLE_CHANNEL
}

/// Routes inbound events to subscriber callbacks.
pub struct EventRouter {
    inner: Mutex<RouterInner>,
    options: RouterOptions,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(RouterOptions::default())
    }
}

impl EventRouter {
    pub fn new(options: RouterOptions) -> Self {
        Self {
            inner: Mutex::new(RouterInner::default()),
            options,
        }
    }

    /// Adds `callback` to every `channel × event` pair.
    pub fn subscribe<C, E>(&self, channels: C, events: E, callback: Callback)
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let events: Vec<String> = events.into_iter().map(|e| e.as_ref().to_string()).collect();
        let mut inner = self.inner.lock();

        for channel in channels {
            for event in &events {
                let key = SubscriptionKey::new(channel.as_ref(), event.as_str());
                let first = inner.registry.add(key.clone(), callback.clone());
                if first && !is_in_process(&key.channel) && !inner.registered.contains(&key) {
                    inner.register_or_queue(key);
                }
            }
        }
    }

    /// Adds `callback` to a single key.
    pub fn subscribe_one(&self, channel: &str, event: &str, callback: Callback) {
        self.subscribe([channel], [event], callback);
    }

    /// Removes every callback for one key. The remote side is not told.
    pub fn unsubscribe_all(&self, channel: &str, event: &str) {
        let key = SubscriptionKey::new(channel, event);
        let removed = self.inner.lock().registry.clear(&key);
        log::debug!("[Router] Removed {} callback(s) for {}", removed, key);
    }

    /// Number of callbacks currently subscribed to a key.
    pub fn callback_count(&self, channel: &str, event: &str) -> usize {
        self.inner
            .lock()
            .registry
            .callback_count(&SubscriptionKey::new(channel, event))
    }

    /// Keys waiting for the next connection, in order.
    pub fn pending_registrations(&self) -> Vec<SubscriptionKey> {
        self.inner.lock().pending.clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.lock().sink.is_some()
    }

    /// Decodes one raw frame and invokes its callbacks in order.
    ///
    /// Malformed frames are logged and dropped. Returns the number of
    /// callbacks invoked.
    pub async fn dispatch(&self, raw: &str) -> usize {
        let inbound = match InboundEvent::parse(raw) {
            Ok(inbound) => inbound,
            Err(e) => {
                log::warn!("[Router] Dropping malformed message: {}", e);
                return 0;
            }
        };
        self.deliver(&inbound.channel, &inbound.event, &inbound.data)
            .await
    }

    /// Dispatches an event in-process without touching the transport.
    pub async fn publish_local(&self, channel: &str, event: &str, data: Value) -> usize {
        self.deliver(channel, event, &data).await
    }

    /// Sends an event to the relay, or dispatches it locally for the `local`
    /// channel.
    pub async fn send(&self, channel: &str, event: &str, data: Value) -> Result<(), RouterError> {
        if channel == LOCAL_CHANNEL {
            self.deliver(channel, event, &data).await;
            return Ok(());
        }

        let text = encode(channel, event, &data).map_err(|e| RouterError::Encode(e.to_string()))?;
        let sink = self
            .inner
            .lock()
            .sink
            .clone()
            .ok_or(RouterError::NotConnected)?;
        sink.push(text)
    }

    /// Starts a new session: flushes queued registrations in order, then
    /// registers every other key that still has callbacks.
    ///
    /// Returns the number of registrations sent.
    pub fn on_connected(&self, sink: RouterSink) -> usize {
        let mut inner = self.inner.lock();
        inner.registered.clear();
        inner.sink = Some(sink);

        let mut keys = std::mem::take(&mut inner.pending);
        for key in inner.registry.active_keys() {
            if !is_in_process(&key.channel) && !keys.contains(key) {
                keys.push(key.clone());
            }
        }

        for key in keys {
            inner.register_or_queue(key);
        }
        let sent = inner.registered.len();
        log::info!("[Router] Session started, {} registration(s) sent", sent);
        sent
    }

    /// Ends the current session.
    pub fn on_disconnected(&self) {
        let mut inner = self.inner.lock();
        inner.sink = None;
        inner.registered.clear();
    }

    async fn deliver(&self, channel: &str, event: &str, data: &Value) -> usize {
        let key = SubscriptionKey::new(channel, event);

        if self.options.debug_events && !self.options.debug_filters.contains(&key.to_string()) {
            log::info!("[Router] {} {}", key, data);
        }

        let callbacks = self.inner.lock().registry.callbacks(&key);
        for callback in &callbacks {
            if let Err(e) = callback.invoke(data).await {
                log::error!("[Router] Callback for {} failed: {}", key, e);
            }
        }
        callbacks.len()
    }
}
