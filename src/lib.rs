//! groupchat - line-based TCP group chat
//!
//! Clients connect, send a display name, and every line they send is
//! relayed to everyone else in the room. `#room` lists who is connected and
//! `#chat "..."` asks an AI assistant that shares the room's conversation.

pub mod assistant;
pub mod chat;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;

pub use assistant::{AssistantBridge, CompletionProvider, OpenAiProvider, Role, Turn};
pub use chat::{parse_input, ChatCommand, ChatInput, ChatMessage};
pub use config::Config;
pub use error::{ChatError, Result};
pub use server::{
    Broadcaster, ChatServer, ChatState, ConnectionRegistry, SessionHandle, SessionId,
};
