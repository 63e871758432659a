//! Fan-out of protocol lines to registered sessions.

use std::sync::Arc;

use tracing::{trace, warn};

use super::registry::ConnectionRegistry;
use super::session::SessionId;
use crate::chat::{normalize_line, ChatMessage};

/// Delivers lines to every registered session except an optional sender.
///
/// Delivery only enqueues into each session's outbox, so a stalled peer
/// cannot hold up the broadcaster or the other recipients.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Broadcast raw text, normalized to end in exactly one newline.
    ///
    /// A session that cannot take the line is logged and skipped; it stays
    /// registered. Returns how many sessions the line was queued for.
    pub async fn broadcast(&self, sender: Option<SessionId>, text: &str) -> usize {
        let line = normalize_line(text);
        let mut delivered = 0;

        self.registry
            .for_each(|id, session| {
                if sender == Some(*id) {
                    return;
                }
                match session.deliver(line.clone()) {
                    Ok(()) => delivered += 1,
                    Err(e) => warn!(
                        session = %id,
                        name = session.name(),
                        peer = %session.peer_addr(),
                        "Dropping message for session: {}",
                        e
                    ),
                }
            })
            .await;

        trace!("Broadcast {:?} to {} sessions", line.trim_end(), delivered);
        delivered
    }

    /// Broadcast a formatted chat message.
    pub async fn send(&self, sender: Option<SessionId>, message: &ChatMessage) -> usize {
        self.broadcast(sender, &message.format()).await
    }
}
