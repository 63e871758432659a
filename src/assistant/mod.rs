//! AI assistant participant.
//!
//! Answers `#chat "..."` commands by sending the shared conversation
//! transcript to a completion provider and broadcasting the reply.

mod bridge;
mod provider;
mod transcript;

pub use bridge::AssistantBridge;
pub use provider::{CompletionProvider, OpenAiProvider};
pub use transcript::{Role, Transcript, Turn};
