//! Session identity and the registry-side session handle.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Registry key for a live session.
///
/// Allocated fresh for every accepted connection and never reused, even if
/// the operating system recycles the peer's address and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Allocate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session state representing the current phase of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for the display name line.
    #[default]
    Connecting,
    /// Registered and relaying lines.
    Active,
    /// Deregistered; terminal.
    Closed,
}

impl SessionState {
    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Connecting, SessionState::Active)
                | (SessionState::Connecting, SessionState::Closed)
                | (SessionState::Active, SessionState::Closed)
        )
    }
}

/// Why a line could not be queued for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The session's writer has stopped; the peer is gone or stalled out.
    #[error("session writer has stopped")]
    Closed,
    /// The outbox is full because the peer is not draining it.
    #[error("session outbox is full")]
    Full,
}

/// A registered session as seen by the registry and broadcaster.
///
/// Holds the sending end of the session's outbox; the socket itself is
/// owned by the session's writer task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    name: String,
    peer_addr: SocketAddr,
    joined_at: DateTime<Utc>,
    outbox: mpsc::Sender<String>,
}

impl SessionHandle {
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        peer_addr: SocketAddr,
        outbox: mpsc::Sender<String>,
    ) -> Self {
        let name = name.into();
        debug!("Created session handle {} ({}) for {}", id, name, peer_addr);
        Self {
            id,
            name,
            peer_addr,
            joined_at: Utc::now(),
            outbox,
        }
    }

    /// Get the registry key for this session.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Display name chosen by the client.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the remote address of the connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// When the session registered.
    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    /// Queue a line for this session without waiting.
    pub fn deliver(&self, line: String) -> Result<(), DeliveryError> {
        self.outbox.try_send(line).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}
