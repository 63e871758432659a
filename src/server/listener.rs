//! TCP listener for the chat server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handler::handle_connection;
use super::state::ChatState;
use crate::Result;

/// Chat server that accepts TCP connections.
pub struct ChatServer {
    listener: TcpListener,
    semaphore: Arc<Semaphore>,
    max_connections: usize,
    state: Arc<ChatState>,
}

impl ChatServer {
    /// Create a new ChatServer bound to the address in `state.config`.
    pub async fn bind(state: Arc<ChatState>) -> Result<Self> {
        let listener = TcpListener::bind(state.config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        let max_connections = state.config.max_connections;

        info!("Chat server listening on {}", local_addr);

        Ok(Self {
            listener,
            semaphore: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            state,
        })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get the maximum number of connections allowed.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Get the number of active connections.
    pub fn active_connections(&self) -> usize {
        self.max_connections - self.semaphore.available_permits()
    }

    /// Accept a new connection.
    ///
    /// Waits for a free connection slot first, so at most
    /// `max_connections` sessions run at once.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit)> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| crate::ChatError::Io(std::io::Error::other("semaphore closed")))?;

        let (stream, addr) = self.listener.accept().await?;
        debug!(
            "Accepted connection from {} ({}/{} slots in use)",
            addr,
            self.active_connections(),
            self.max_connections
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// On shutdown the listener stops accepting, every session is cancelled
    /// (each deregisters and announces its departure), and all session
    /// tasks are joined before returning.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let root = CancellationToken::new();
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.accept() => match accepted {
                    Ok((stream, addr, permit)) => {
                        let state = Arc::clone(&self.state);
                        let cancel = root.child_token();
                        sessions.spawn(async move {
                            if let Err(e) = handle_connection(state, stream, addr, cancel).await {
                                warn!(peer = %addr, "Session ended with error: {}", e);
                            }
                            // Permit is dropped here, releasing the connection slot
                            drop(permit);
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        error!("Session task failed: {}", e);
                    }
                }
            }
        }

        info!("Shutting down; closing {} sessions", sessions.len());
        drop(self.listener);
        root.cancel();

        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                error!("Session task failed: {}", e);
            }
        }

        info!("Chat server stopped");
        Ok(())
    }
}

/// A permit that represents an active connection slot.
///
/// When this permit is dropped, the connection slot is released.
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
