//! In-band command parsing.
//!
//! A command is the marker `#` immediately followed by a keyword, ending at
//! whitespace or end of line. The marker may appear anywhere in the line,
//! since clients prefix every line with `<name>: `.

/// Character that introduces an in-band command.
pub const COMMAND_MARKER: char = '#';

/// Result of parsing a chat input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    /// Regular chat message.
    Message(String),
    /// Line carrying a command marker.
    Command(ChatCommand),
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// List everyone connected.
    Room,
    /// Ask the assistant; holds the quoted prompt text.
    Chat(String),
    /// `#chat` without a complete quoted prompt.
    MissingPrompt,
    /// Any other keyword, possibly empty.
    Unknown(String),
}

impl ChatCommand {
    /// Whether the command should be executed.
    ///
    /// Malformed and unknown commands are dropped silently.
    pub fn is_actionable(&self) -> bool {
        matches!(self, ChatCommand::Room | ChatCommand::Chat(_))
    }
}

impl std::fmt::Display for ChatCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatCommand::Room => write!(f, "#room"),
            ChatCommand::Chat(prompt) => write!(f, "#chat \"{prompt}\""),
            ChatCommand::MissingPrompt => write!(f, "#chat"),
            ChatCommand::Unknown(keyword) => write!(f, "#{keyword}"),
        }
    }
}

/// Parse a line (terminator already removed) into a message or command.
pub fn parse_input(line: &str) -> ChatInput {
    let Some(marker) = line.find(COMMAND_MARKER) else {
        return ChatInput::Message(line.to_string());
    };

    let after_marker = &line[marker + COMMAND_MARKER.len_utf8()..];
    let keyword_end = after_marker
        .find(char::is_whitespace)
        .unwrap_or(after_marker.len());
    let (keyword, rest) = after_marker.split_at(keyword_end);

    let command = match keyword {
        "room" => ChatCommand::Room,
        "chat" => match find_prompt(rest) {
            Some(prompt) => ChatCommand::Chat(prompt.to_string()),
            None => ChatCommand::MissingPrompt,
        },
        other => ChatCommand::Unknown(other.to_string()),
    };

    ChatInput::Command(command)
}

/// Find the first complete double-quoted span in `text`.
pub fn find_prompt(text: &str) -> Option<&str> {
    let open = text.find('"')?;
    let body = &text[open + 1..];
    let close = body.find('"')?;
    Some(&body[..close])
}
