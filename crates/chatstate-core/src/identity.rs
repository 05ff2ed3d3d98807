//! # Conversation Identity
//!
//! Newtypes for chat and user identifiers, and the [`ConversationKey`] that
//! selects one persisted state record. Either side of the key may be unknown
//! (an inline query has no chat; some channel posts have no sender). Unknown
//! is represented as `None` and is a legitimate, storable key component.

use serde::{Deserialize, Serialize};

/// Identifier of a chat (private chat, group, supergroup or channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Identifier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl ChatId {
    /// Access the raw identifier.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl UserId {
    /// Access the raw identifier.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The (chat, user) pair one conversation state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ConversationKey {
    /// The chat, if the update carried one.
    pub chat: Option<ChatId>,
    /// The user, if the update carried one.
    pub user: Option<UserId>,
}

impl ConversationKey {
    /// Build a key from raw identifiers.
    pub fn new(chat: Option<i64>, user: Option<i64>) -> Self {
        Self {
            chat: chat.map(ChatId),
            user: user.map(UserId),
        }
    }

    /// The key with neither chat nor user known.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Whether neither side of the key is known.
    pub fn is_unknown(&self) -> bool {
        self.chat.is_none() && self.user.is_none()
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.chat {
            Some(chat) => write!(f, "chat:{chat}")?,
            None => f.write_str("chat:?")?,
        }
        match self.user {
            Some(user) => write!(f, "|user:{user}"),
            None => f.write_str("|user:?"),
        }
    }
}
