//! Per-connection session handler.
//!
//! Drives one client through `Connecting -> Active -> Closed`: read the
//! display name, register and announce, relay and dispatch lines until the
//! read side ends, then deregister and announce departure.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session::{SessionHandle, SessionId, SessionState};
use super::state::ChatState;
use super::transport::{spawn_writer, LineReader};
use crate::chat::{parse_input, ChatCommand, ChatInput, ChatMessage};
use crate::error::{ChatError, Result};

/// Run a session to completion on an accepted connection.
///
/// Errors are returned for logging only; other sessions are never affected
/// by them.
pub async fn handle_connection(
    state: Arc<ChatState>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    cancel: CancellationToken,
) -> Result<()> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = LineReader::new(read_half, state.config.max_line_length);

    let mut phase = SessionState::Connecting;
    let Some(name) = read_display_name(&state, &mut reader, peer_addr, &cancel).await? else {
        transition(&mut phase, SessionState::Closed, peer_addr);
        return Ok(());
    };

    let id = SessionId::new();
    let (outbox_tx, outbox_rx) = mpsc::channel(state.config.outbox_capacity);
    let writer = spawn_writer(
        write_half,
        outbox_rx,
        state.config.write_timeout(),
        cancel.clone(),
        id,
    );

    state
        .registry
        .register(SessionHandle::new(id, name.as_str(), peer_addr, outbox_tx))
        .await;
    transition(&mut phase, SessionState::Active, peer_addr);
    info!(session = %id, peer = %peer_addr, "{} joined the room", name);
    state
        .broadcaster
        .send(Some(id), &ChatMessage::join(&name))
        .await;

    let result = read_loop(&state, &mut reader, id, &name, &cancel).await;

    if let Some(handle) = state.registry.remove(&id).await {
        state.broadcaster.send(None, &ChatMessage::leave(&name)).await;
        let connected = Utc::now() - handle.joined_at();
        info!(
            session = %id,
            peer = %peer_addr,
            joined_at = %handle.joined_at(),
            "{} left the room after {}s",
            name,
            connected.num_seconds()
        );
    }
    transition(&mut phase, SessionState::Closed, peer_addr);

    // Dropping the read half and the registry's outbox sender lets the
    // writer flush and close the socket.
    drop(reader);
    if let Err(e) = writer.await {
        warn!(session = %id, "Writer task failed: {}", e);
    }

    result
}

fn transition(phase: &mut SessionState, next: SessionState, peer_addr: SocketAddr) {
    debug_assert!(phase.can_transition_to(next), "{phase:?} -> {next:?}");
    debug!("Session {} state changed: {:?} -> {:?}", peer_addr, phase, next);
    *phase = next;
}

/// Wait for the first line, bounded by the name timeout.
///
/// `Ok(None)` means the connection is abandoned without registering.
async fn read_display_name<R: AsyncRead + Unpin>(
    state: &ChatState,
    reader: &mut LineReader<R>,
    peer_addr: SocketAddr,
    cancel: &CancellationToken,
) -> Result<Option<String>> {
    let timeout = state.config.name_timeout();
    tokio::select! {
        _ = cancel.cancelled() => Ok(None),
        read = tokio::time::timeout(timeout, reader.next_line()) => match read {
            Ok(Ok(Some(line))) => Ok(Some(line.trim().to_string())),
            Ok(Ok(None)) => {
                debug!("{} disconnected before sending a display name", peer_addr);
                Ok(None)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                debug!("{} sent no display name within {:?}", peer_addr, timeout);
                Ok(None)
            }
        },
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    state: &ChatState,
    reader: &mut LineReader<R>,
    id: SessionId,
    name: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let idle_timeout = state.config.idle_timeout();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(session = %id, "Session cancelled");
                return Ok(());
            }
            next = read_line(reader, idle_timeout) => next?,
        };

        match next {
            Some(line) => dispatch(state, id, name, line).await,
            None => return Ok(()),
        }
    }
}

async fn read_line<R: AsyncRead + Unpin>(
    reader: &mut LineReader<R>,
    idle_timeout: Option<std::time::Duration>,
) -> Result<Option<String>> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, reader.next_line())
            .await
            .map_err(|_| {
                ChatError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("idle for {limit:?}"),
                ))
            })?,
        None => reader.next_line().await,
    }
}

/// Route one inbound line.
async fn dispatch(state: &ChatState, id: SessionId, name: &str, line: String) {
    debug!(session = %id, "{}", line);

    match parse_input(&line) {
        ChatInput::Message(text) => {
            state.broadcaster.send(Some(id), &ChatMessage::chat(text)).await;
        }
        ChatInput::Command(command) if !command.is_actionable() => {
            debug!(session = %id, "Dropping command {}", command);
        }
        ChatInput::Command(command) => {
            // Recognized commands are still relayed like any other line.
            state.broadcaster.send(Some(id), &ChatMessage::chat(line)).await;
            execute(state, name, command);
        }
    }
}

/// Start a command's action without waiting on it, so the read loop keeps
/// going.
fn execute(state: &ChatState, name: &str, command: ChatCommand) {
    match command {
        ChatCommand::Room => {
            let broadcaster = state.broadcaster.clone();
            tokio::spawn(async move {
                let names = broadcaster.registry().names_snapshot().await;
                broadcaster.send(None, &ChatMessage::roster(&names)).await;
            });
        }
        // Queued in dispatch order; the bridge's worker answers in that order.
        ChatCommand::Chat(prompt) => match &state.assistant {
            Some(bridge) => {
                if let Err(e) = bridge.submit(format!("{name}: {prompt}")) {
                    warn!("Dropping #chat from {}: {}", name, e);
                }
            }
            None => warn!("Ignoring #chat from {}: assistant is not configured", name),
        },
        ChatCommand::MissingPrompt | ChatCommand::Unknown(_) => {}
    }
}
