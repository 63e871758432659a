//! Assistant participant.
//!
//! The bridge owns the shared transcript. Prompts are queued by the
//! dispatcher without waiting and answered by a single worker task, one at a
//! time in queue order. Each answer runs "append prompt, call provider,
//! append reply" under one mutex, so every prompt is directly followed by its
//! own reply and turns land in the order the commands were dispatched.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::provider::CompletionProvider;
use super::transcript::{Transcript, Turn};
use crate::chat::ChatMessage;
use crate::error::{ChatError, Result};
use crate::server::Broadcaster;

/// Connects chat sessions to a completion provider.
pub struct AssistantBridge {
    core: Arc<BridgeCore>,
    queue: mpsc::UnboundedSender<String>,
}

struct BridgeCore {
    transcript: Mutex<Transcript>,
    provider: Arc<dyn CompletionProvider>,
    broadcaster: Broadcaster,
}

impl AssistantBridge {
    /// Create the bridge and start its worker task.
    ///
    /// Must be called from within a tokio runtime. The worker stops once the
    /// bridge is dropped and the queue has drained.
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        system_prompt: impl Into<String>,
        broadcaster: Broadcaster,
    ) -> Self {
        let core = Arc::new(BridgeCore {
            transcript: Mutex::new(Transcript::new(system_prompt)),
            provider,
            broadcaster,
        });
        let (queue, prompts) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(Arc::clone(&core), prompts));

        Self { core, queue }
    }

    /// Queue `prompt` for an answer without waiting.
    ///
    /// Prompts are answered in the order they were submitted; each reply is
    /// broadcast to every session.
    pub fn submit(&self, prompt: impl Into<String>) -> Result<()> {
        self.queue
            .send(prompt.into())
            .map_err(|_| ChatError::Provider("assistant worker has stopped".to_string()))
    }

    /// Copy of the transcript, system seed first.
    pub async fn transcript(&self) -> Vec<Turn> {
        self.core.transcript.lock().await.turns().to_vec()
    }
}

async fn run_worker(core: Arc<BridgeCore>, mut prompts: mpsc::UnboundedReceiver<String>) {
    while let Some(prompt) = prompts.recv().await {
        if let Err(e) = core.respond(&prompt).await {
            warn!("No assistant reply: {}", e);
        }
    }
    debug!("Assistant worker stopped");
}

impl BridgeCore {
    /// Answer `prompt` and broadcast the reply to every session.
    ///
    /// On provider failure the prompt stays in the transcript unanswered
    /// and nothing is broadcast. Returns the reply as broadcast.
    async fn respond(&self, prompt: &str) -> Result<String> {
        let mut transcript = self.transcript.lock().await;
        transcript.push_user(prompt);
        debug!("Assistant prompt queued ({} turns)", transcript.len());

        let raw = match self.provider.complete(transcript.turns()).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Completion request failed: {}", e);
                return Err(e);
            }
        };

        let reply = single_line(&raw);
        if reply.is_empty() {
            warn!("Completion provider returned an empty reply");
            return Err(ChatError::Provider("empty reply".to_string()));
        }

        transcript.push_assistant(reply.as_str());
        info!("Assistant replied ({} turns)", transcript.len());

        // Broadcast under the lock so replies go out in transcript order.
        self.broadcaster
            .send(None, &ChatMessage::assistant(&reply))
            .await;

        Ok(reply)
    }
}

/// Collapse line breaks so a reply always fits in one protocol line.
fn single_line(reply: &str) -> String {
    reply
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::transcript::Role;
    use crate::server::{ConnectionRegistry, SessionHandle, SessionId};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Replies "re: <last user turn>" after a short delay.
    struct EchoProvider {
        delay: Duration,
    }

    #[async_trait]
    impl CompletionProvider for EchoProvider {
        async fn complete(&self, turns: &[Turn]) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            let last = turns.last().map(|t| t.content.clone()).unwrap_or_default();
            Ok(format!("re: {last}"))
        }
    }

    struct FixedProvider(std::result::Result<&'static str, &'static str>);

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        async fn complete(&self, _turns: &[Turn]) -> Result<String> {
            self.0
                .map(str::to_string)
                .map_err(|e| ChatError::Provider(e.to_string()))
        }
    }

    fn empty_broadcaster() -> Broadcaster {
        Broadcaster::new(Arc::new(ConnectionRegistry::new()))
    }

    #[test]
    fn test_single_line() {
        assert_eq!(single_line("fr fr"), "fr fr");
        assert_eq!(single_line("line one\nline two\r\n\nthree"), "line one line two three");
        assert_eq!(single_line("  padded \n"), "padded");
        assert_eq!(single_line("\n\r\n"), "");
    }

    #[tokio::test]
    async fn test_transcript_seeded_once() {
        let bridge = AssistantBridge::new(
            Arc::new(EchoProvider { delay: Duration::ZERO }),
            "sys",
            empty_broadcaster(),
        );

        bridge.core.respond("alice: one").await.unwrap();
        bridge.core.respond("bob: two").await.unwrap();

        let turns = bridge.transcript().await;
        let system_turns = turns.iter().filter(|t| t.role == Role::System).count();
        assert_eq!(system_turns, 1);
        assert_eq!(turns.len(), 5);
        assert_eq!(turns[1], Turn::new(Role::User, "alice: one"));
        assert_eq!(turns[2], Turn::new(Role::Assistant, "re: alice: one"));
    }

    #[tokio::test]
    async fn test_reply_is_broadcast_to_everyone() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        let addr = "127.0.0.1:40000".parse().unwrap();
        registry
            .register(SessionHandle::new(SessionId::new(), "alice", addr, tx))
            .await;

        let bridge = AssistantBridge::new(
            Arc::new(FixedProvider(Ok("slay"))),
            "sys",
            Broadcaster::new(Arc::clone(&registry)),
        );

        let reply = bridge.core.respond("alice: hi").await.unwrap();
        assert_eq!(reply, "slay");
        assert_eq!(rx.recv().await.unwrap(), "AI: slay\n");
    }

    #[tokio::test]
    async fn test_multiline_reply_is_flattened() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        let addr = "127.0.0.1:40000".parse().unwrap();
        registry
            .register(SessionHandle::new(SessionId::new(), "alice", addr, tx))
            .await;

        let bridge = AssistantBridge::new(
            Arc::new(FixedProvider(Ok("no cap\nit's giving"))),
            "sys",
            Broadcaster::new(Arc::clone(&registry)),
        );

        bridge.core.respond("alice: vibe check").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "AI: no cap it's giving\n");
        assert_eq!(
            bridge.transcript().await.last().unwrap().content,
            "no cap it's giving"
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_unanswered_prompt() {
        let bridge = AssistantBridge::new(
            Arc::new(FixedProvider(Err("HTTP 500"))),
            "sys",
            empty_broadcaster(),
        );

        let result = bridge.core.respond("alice: hello?").await;
        assert!(matches!(result, Err(ChatError::Provider(_))));

        let turns = bridge.transcript().await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1], Turn::new(Role::User, "alice: hello?"));
    }

    #[tokio::test]
    async fn test_empty_reply_is_failure() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        let addr = "127.0.0.1:40000".parse().unwrap();
        registry
            .register(SessionHandle::new(SessionId::new(), "alice", addr, tx))
            .await;

        let bridge = AssistantBridge::new(
            Arc::new(FixedProvider(Ok("  \n "))),
            "sys",
            Broadcaster::new(Arc::clone(&registry)),
        );

        assert!(bridge.core.respond("alice: hi").await.is_err());
        assert_eq!(bridge.transcript().await.len(), 2);
        assert!(rx.try_recv().is_err());
    }

    /// Wait until the transcript holds `len` turns.
    async fn wait_for_turns(bridge: &AssistantBridge, len: usize) -> Vec<Turn> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let turns = bridge.transcript().await;
                if turns.len() >= len {
                    return turns;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("transcript never reached the expected length")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_submitted_prompts_answered_in_order() {
        const N: usize = 30;
        let bridge = AssistantBridge::new(
            Arc::new(EchoProvider { delay: Duration::ZERO }),
            "sys",
            empty_broadcaster(),
        );

        for i in 0..N {
            bridge.submit(format!("alice: q{i}")).unwrap();
        }

        let turns = wait_for_turns(&bridge, 1 + 2 * N).await;
        let users: Vec<&str> = turns
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .collect();
        let expected: Vec<String> = (0..N).map(|i| format!("alice: q{i}")).collect();
        assert_eq!(users, expected);
    }

    #[tokio::test]
    async fn test_submit_broadcasts_reply() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        let addr = "127.0.0.1:40000".parse().unwrap();
        registry
            .register(SessionHandle::new(SessionId::new(), "alice", addr, tx))
            .await;

        let bridge = AssistantBridge::new(
            Arc::new(FixedProvider(Ok("bet"))),
            "sys",
            Broadcaster::new(Arc::clone(&registry)),
        );

        bridge.submit("alice: you coming?").unwrap();
        assert_eq!(rx.recv().await.unwrap(), "AI: bet\n");
    }

    #[tokio::test]
    async fn test_concurrent_invocations_are_serialized() {
        const K: usize = 8;
        let bridge = Arc::new(AssistantBridge::new(
            Arc::new(EchoProvider {
                delay: Duration::from_millis(5),
            }),
            "sys",
            empty_broadcaster(),
        ));

        let mut tasks = Vec::new();
        for i in 0..K {
            let bridge = Arc::clone(&bridge);
            tasks.push(tokio::spawn(async move {
                bridge.core.respond(&format!("user{i}: q{i}")).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let turns = bridge.transcript().await;
        assert_eq!(turns.len(), 1 + 2 * K);
        for pair in turns[1..].chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].content, format!("re: {}", pair[0].content));
        }
    }
}
