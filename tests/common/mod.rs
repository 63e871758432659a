//! Common test utilities for groupchat integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use groupchat::config::ServerConfig;
use groupchat::{ChatServer, ChatState, CompletionProvider, Role, Turn};

/// How long a test waits for an expected line before failing.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a test listens to conclude that nothing was sent.
pub const SILENCE: Duration = Duration::from_millis(300);

/// Server config bound to an OS-assigned loopback port.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..ServerConfig::default()
    }
}

/// Replies "re: <last user turn>" after `delay`.
pub struct EchoProvider {
    pub delay: Duration,
}

#[async_trait]
impl CompletionProvider for EchoProvider {
    async fn complete(&self, turns: &[Turn]) -> groupchat::Result<String> {
        tokio::time::sleep(self.delay).await;
        let last = turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.clone())
            .unwrap_or_default();
        Ok(format!("re: {last}"))
    }
}

/// A server running on a background task.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ChatState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<groupchat::Result<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_state(ChatState::new(test_config())).await
    }

    pub async fn start_with_config(config: ServerConfig) -> Self {
        Self::start_with_state(ChatState::new(config)).await
    }

    pub async fn start_with_assistant(provider: Arc<dyn CompletionProvider>) -> Self {
        let state = ChatState::new(test_config()).with_assistant(provider, "test persona");
        Self::start_with_state(state).await
    }

    pub async fn start_with_state(state: ChatState) -> Self {
        let state = Arc::new(state);
        let server = ChatServer::bind(Arc::clone(&state)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        Self {
            addr,
            state,
            shutdown: Some(tx),
            task,
        }
    }

    /// Connect, send `name`, and wait until the session is registered.
    pub async fn connect(&self, name: &str) -> TestClient {
        let before = self.state.registry.len().await;
        let mut client = TestClient::connect(self.addr).await;
        client.send(name).await;
        self.wait_for_sessions(before + 1).await;
        client
    }

    /// Wait until exactly `count` sessions are registered.
    pub async fn wait_for_sessions(&self, count: usize) {
        tokio::time::timeout(READ_TIMEOUT, async {
            while self.state.registry.len().await != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("registry never reached {count} sessions"));
    }

    /// Stop the server and wait for it to finish.
    pub async fn shutdown(mut self) -> groupchat::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(READ_TIMEOUT, self.task)
            .await
            .expect("server did not shut down")
            .expect("server task panicked")
    }
}

/// A raw protocol client.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Send one line; the newline is appended.
    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    /// Send raw bytes as-is.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    /// Half-close the connection; the server sees end of stream.
    pub async fn close_write(&mut self) {
        self.writer.shutdown().await.unwrap();
    }

    /// Read one line including its newline.
    ///
    /// An empty string means the server closed the connection (a reset
    /// counts as closed too).
    pub async fn read_line(&mut self) -> String {
        let mut line = String::new();
        let result = tokio::time::timeout(READ_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line");
        match result {
            Ok(_) => line,
            Err(_) => String::new(),
        }
    }

    /// Assert nothing arrives for a short while.
    pub async fn expect_silence(&mut self) {
        let mut line = String::new();
        if let Ok(result) = tokio::time::timeout(SILENCE, self.reader.read_line(&mut line)).await {
            panic!("expected silence, got {:?} ({:?})", line, result.map(|_| ()));
        }
    }

    /// Read until the server closes the connection, returning what arrived.
    pub async fn read_to_eof(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await;
            if line.is_empty() {
                return lines;
            }
            lines.push(line);
        }
    }
}

/// Parse `Connected Users: [a, b]\n` into a sorted name list.
pub fn roster_names(line: &str) -> Vec<String> {
    let inner = line
        .trim_end()
        .strip_prefix("Connected Users: [")
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or_else(|| panic!("not a roster line: {line:?}"));
    let mut names: Vec<String> = if inner.is_empty() {
        Vec::new()
    } else {
        inner.split(", ").map(str::to_string).collect()
    };
    names.sort();
    names
}
