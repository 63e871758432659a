//! Wire-level chat messages.
//!
//! Every line the server sends is built here so the protocol's text forms
//! live in one place.

/// A message ready to be broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Message body, without the line terminator.
    pub content: String,
}

impl ChatMessage {
    /// A participant's line, relayed verbatim.
    ///
    /// Clients already prefix their lines with `<name>: `.
    pub fn chat(line: impl Into<String>) -> Self {
        Self {
            content: line.into(),
        }
    }

    /// Create a join notification.
    pub fn join(name: &str) -> Self {
        Self {
            content: format!("<{name} joined the room>"),
        }
    }

    /// Create a leave notification.
    pub fn leave(name: &str) -> Self {
        Self {
            content: format!("<{name} left the room>"),
        }
    }

    /// Create a roster listing from the current display names.
    pub fn roster<S: AsRef<str>>(names: &[S]) -> Self {
        let joined = names
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            content: format!("Connected Users: [{joined}]"),
        }
    }

    /// Create an assistant reply.
    pub fn assistant(reply: &str) -> Self {
        Self {
            content: format!("AI: {reply}"),
        }
    }

    /// Format the message as a protocol line.
    pub fn format(&self) -> String {
        normalize_line(&self.content)
    }
}

/// Strip any trailing line terminators and append exactly one `\n`.
pub fn normalize_line(text: &str) -> String {
    let mut line = text.trim_end_matches(['\r', '\n']).to_string();
    line.push('\n');
    line
}
