//! Tracking of command-socket clients.
//!
//! Every accepted command socket registers here and holds a
//! [`ConnectionGuard`] for its lifetime. Shutdown force-closes every client
//! through a shared parent token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::utils::now_millis;

/// Per-client bookkeeping.
struct CommandClient {
    opened_at: u64,
    commands: AtomicU64,
}

/// Snapshot of one connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSummary {
    pub id: String,
    /// Unix millis when the socket was accepted.
    pub opened_at: u64,
    /// Commands answered on this socket so far.
    pub commands: u64,
}

/// Registry of live command sockets.
pub struct WsConnectionManager {
    clients: DashMap<String, CommandClient>,
    next_id: AtomicU64,
    /// Parent of every client token. Replaced after [`close_all`](Self::close_all)
    /// so later clients are not born cancelled.
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a client; it stays registered until the guard drops.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let id = format!("cmd-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel_token = self.global_cancel.read().child_token();

        self.clients.insert(
            id.clone(),
            CommandClient {
                opened_at: now_millis(),
                commands: AtomicU64::new(0),
            },
        );
        log::info!(
            "[Commands] Client connected: {} (total: {})",
            id,
            self.clients.len()
        );

        ConnectionGuard {
            id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: &str) {
        if let Some((_, client)) = self.clients.remove(id) {
            log::info!(
                "[Commands] Client disconnected: {} after {} command(s) (remaining: {})",
                id,
                client.commands.load(Ordering::Relaxed),
                self.clients.len()
            );
        }
    }

    fn record_command(&self, id: &str) {
        if let Some(client) = self.clients.get(id) {
            client.commands.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    /// Lists connected clients, oldest first.
    pub fn clients(&self) -> Vec<ClientSummary> {
        let mut clients: Vec<ClientSummary> = self
            .clients
            .iter()
            .map(|entry| ClientSummary {
                id: entry.key().clone(),
                opened_at: entry.value().opened_at,
                commands: entry.value().commands.load(Ordering::Relaxed),
            })
            .collect();
        clients.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then_with(|| a.id.cmp(&b.id)));
        clients
    }

    /// Signals every connected client to close.
    ///
    /// Returns the number of clients signalled.
    pub fn close_all(&self) -> usize {
        let count = self.clients.len();
        if count > 0 {
            log::info!("[Commands] Closing {} client(s)", count);
        }
        let mut token = self.global_cancel.write();
        token.cancel();
        *token = CancellationToken::new();
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters its client on drop, including when the handler panics.
pub struct ConnectionGuard {
    id: String,
    manager: Arc<WsConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancelled when the manager force-closes clients.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Counts one answered command against this client.
    pub fn record_command(&self) {
        self.manager.record_command(&self.id);
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}
