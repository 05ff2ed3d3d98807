//! # Inbound Updates
//!
//! A minimal, Telegram-shaped model of the events delivered by the
//! transport. Only the fields the state machine needs are modelled:
//! enough to route commands and text, and to work out which conversation
//! an update belongs to. Unknown fields are ignored on deserialization.
//!
//! ## Conversation Resolution
//!
//! [`Update::conversation_key`] inspects the update shapes in a fixed order
//! and the first one present wins:
//!
//! 1. `message`
//! 2. `channel_post`
//! 3. `edited_message`
//! 4. `edited_channel_post`
//! 5. `callback_query` carrying a message (the presser is preferred over the
//!    sender of the message with the keyboard)
//! 6. `inline_query` (no chat)
//!
//! Missing pieces resolve to an unknown side of the key.

use serde::{Deserialize, Serialize};

use crate::identity::{ChatId, ConversationKey, UserId};

/// A user (or bot) account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier.
    pub id: i64,
    /// Whether the account is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// First name of the user.
    #[serde(default)]
    pub first_name: String,
    /// Username, if set.
    #[serde(default)]
    pub username: Option<String>,
}

/// A chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Unique chat identifier.
    pub id: i64,
    /// Chat type: "private", "group", "supergroup" or "channel".
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// A message, channel post, or an edited version of either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier of the message inside its chat.
    pub message_id: i64,
    /// Unix time the message was sent.
    #[serde(default)]
    pub date: i64,
    /// The chat the message belongs to.
    pub chat: Chat,
    /// Sender; absent for anonymous channel posts.
    #[serde(default)]
    pub from: Option<User>,
    /// Text of a text message.
    #[serde(default)]
    pub text: Option<String>,
}

/// A press of an inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
    /// Unique query identifier.
    pub id: String,
    /// The user who pressed the button.
    #[serde(default)]
    pub from: Option<User>,
    /// The message carrying the keyboard, if still available.
    #[serde(default)]
    pub message: Option<Message>,
    /// Data attached to the button.
    #[serde(default)]
    pub data: Option<String>,
}

/// An inline query typed in any chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineQuery {
    /// Unique query identifier.
    pub id: String,
    /// The querying user.
    #[serde(default)]
    pub from: Option<User>,
    /// Text of the query.
    #[serde(default)]
    pub query: String,
}

/// One inbound event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Monotonic update identifier assigned by the transport.
    pub update_id: i64,
    /// New incoming message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// New version of a known message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_message: Option<Message>,
    /// New channel post.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_post: Option<Message>,
    /// New version of a known channel post.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_channel_post: Option<Message>,
    /// Incoming callback query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackQuery>,
    /// Incoming inline query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_query: Option<InlineQuery>,
}

impl Update {
    /// Create an empty update with the given identifier.
    pub fn new(update_id: i64) -> Self {
        Self {
            update_id,
            ..Self::default()
        }
    }

    /// Create an update carrying a new text message.
    pub fn with_text(update_id: i64, chat_id: i64, user_id: i64, text: impl Into<String>) -> Self {
        Self {
            update_id,
            message: Some(Message {
                message_id: update_id,
                date: 0,
                chat: Chat {
                    id: chat_id,
                    kind: "private".into(),
                },
                from: Some(User {
                    id: user_id,
                    is_bot: false,
                    first_name: String::new(),
                    username: None,
                }),
                text: Some(text.into()),
            }),
            ..Self::default()
        }
    }

    /// The first message-bearing shape, in resolution order.
    pub fn effective_message(&self) -> Option<&Message> {
        self.message
            .as_ref()
            .or(self.channel_post.as_ref())
            .or(self.edited_message.as_ref())
            .or(self.edited_channel_post.as_ref())
    }

    /// Text of the effective message, if any.
    pub fn text(&self) -> Option<&str> {
        self.effective_message().and_then(|m| m.text.as_deref())
    }

    /// Work out which conversation this update belongs to.
    pub fn conversation_key(&self) -> ConversationKey {
        if let Some(message) = self.effective_message() {
            return ConversationKey {
                chat: Some(ChatId(message.chat.id)),
                user: message.from.as_ref().map(|u| UserId(u.id)),
            };
        }
        if let Some(query) = &self.callback_query {
            if let Some(message) = &query.message {
                let user = query
                    .from
                    .as_ref()
                    .or(message.from.as_ref())
                    .map(|u| UserId(u.id));
                return ConversationKey {
                    chat: Some(ChatId(message.chat.id)),
                    user,
                };
            }
        }
        if let Some(query) = &self.inline_query {
            if let Some(from) = &query.from {
                return ConversationKey {
                    chat: None,
                    user: Some(UserId(from.id)),
                };
            }
        }
        tracing::debug!(update_id = self.update_id, "no conversation rule matched update");
        ConversationKey::unknown()
    }
}
