//! Registry of live sessions.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use super::session::{SessionHandle, SessionId};

/// Process-wide table of sessions whose read loops are running.
///
/// Iteration holds the read lock, so a visitor always sees a consistent
/// table: an entry is either fully present or fully gone.
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session under its id.
    ///
    /// An existing entry with the same id is overwritten and returned; ids
    /// are fresh per connection so this only happens on caller error.
    pub async fn register(&self, session: SessionHandle) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let id = session.id();
        let previous = sessions.insert(id, session);
        debug!("Registered session {} (total: {})", id, sessions.len());
        previous
    }

    /// Remove a session. Removing an absent id is a no-op.
    pub async fn remove(&self, id: &SessionId) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id);
        if removed.is_some() {
            debug!("Removed session {} (total: {})", id, sessions.len());
        }
        removed
    }

    /// Visit every registered session, in unspecified order.
    ///
    /// The visitor runs under the read lock and must not block. The session
    /// it is given may be removed right after the visit returns.
    pub async fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&SessionId, &SessionHandle),
    {
        let sessions = self.sessions.read().await;
        for (id, session) in sessions.iter() {
            visitor(id, session);
        }
    }

    /// Display names of all registered sessions; duplicates are kept.
    pub async fn names_snapshot(&self) -> Vec<String> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Whether a session is registered under `id`.
    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Get the number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
