use serde::{Deserialize, Serialize};
use std::fmt;

/// The role of the participant that authored a [`ChatMessage`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A system-level instruction or prompt.
    System,
    /// A human end-user.
    User,
    /// The AI assistant.
    Assistant,
}

impl Role {
    /// Every accepted role, in the order they are listed to clients.
    pub const ALL: [Role; 3] = [Role::System, Role::User, Role::Assistant];

    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a wire name. Matching is exact: `"User"` is not a role.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message of a chat request, in conversation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: Role,
    /// The textual content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Creates a new message with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a new message with [`Role::System`].
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a new message with [`Role::User`].
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new message with [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}
