//! Client Registry (§4.2): tracks [`ClientSession`] by a connection-unique
//! key assigned at join time. Clients with duplicate `id`s are not
//! rejected — the registry retains every connection and the dispatcher
//! fans records out to each independently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::model::ClientSession;

/// Tracks all active client sessions.
///
/// Thread-safe and designed for concurrent access from many control-channel
/// worker tasks. Uses hierarchical cancellation tokens so the whole registry
/// (and every connection it holds) can be force-closed on server stop
/// without each worker polling a shared flag.
pub struct ClientRegistry {
    sessions: DashMap<u64, ClientSession>,
    next_id: AtomicU64,
    global_cancel: RwLock<CancellationToken>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a newly joined client and returns a guard for RAII
    /// cleanup. The guard's cancellation token fires individually on
    /// `close_all` or when the caller drives it manually.
    pub fn register(self: &Arc<Self>, session: ClientSession) -> ClientGuard {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel_token = self.global_cancel.read().child_token();

        self.sessions.insert(connection_id, session);
        log::info!(
            "[Registry] client joined: connection {} (total: {})",
            connection_id,
            self.sessions.len()
        );

        ClientGuard {
            connection_id,
            registry: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, connection_id: u64) {
        if self.sessions.remove(&connection_id).is_some() {
            log::info!(
                "[Registry] client left: connection {} (remaining: {})",
                connection_id,
                self.sessions.len()
            );
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, connection_id: u64) -> Option<ClientSession> {
        self.sessions.get(&connection_id).map(|r| r.value().clone())
    }

    /// Force-closes every connection. Cancels the current token and
    /// replaces it with a fresh one so subsequent joins are unaffected.
    pub fn close_all(&self) -> usize {
        let count = self.sessions.len();
        if count > 0 {
            log::info!("[Registry] force-closing {} connection(s)", count);
            let mut guard = self.global_cancel.write();
            guard.cancel();
            *guard = CancellationToken::new();
        }
        count
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that unregisters a connection when dropped, even on an early
/// return or panic in the worker task.
pub struct ClientGuard {
    connection_id: u64,
    registry: Arc<ClientRegistry>,
    cancel_token: CancellationToken,
}

impl ClientGuard {
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Cancellation token to select on inside the worker's read loop;
    /// fires on `ClientRegistry::close_all`.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.connection_id);
    }
}
