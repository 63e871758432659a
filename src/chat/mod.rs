//! Chat protocol for groupchat.
//!
//! This module provides:
//! - Wire formats for relayed chat, presence notices, roster and assistant lines
//! - In-band command parsing (`#room`, `#chat "..."`)

mod command;
mod message;

pub use command::{find_prompt, parse_input, ChatCommand, ChatInput, COMMAND_MARKER};
pub use message::{normalize_line, ChatMessage};
