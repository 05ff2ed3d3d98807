//! Key normalization for backends that cannot store a null key component.
//!
//! Real identifiers render as decimal integers, so the sentinel `"null"`
//! can never collide with one.

use chatstate_core::{ChatId, ConversationKey, StorageError, UserId};

/// Stored in place of an unknown chat or user.
pub const NULL_KEY: &str = "null";

/// Normalized (chat, user) columns of a conversation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredKey {
    pub chat: String,
    pub user: String,
}

impl StoredKey {
    pub fn from_key(key: &ConversationKey) -> Self {
        Self {
            chat: encode(key.chat.map(ChatId::get)),
            user: encode(key.user.map(UserId::get)),
        }
    }

    /// Parse normalized columns back into a conversation key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if a column is neither the
    /// sentinel nor an integer.
    pub fn to_key(&self) -> Result<ConversationKey, StorageError> {
        Ok(ConversationKey::new(decode(&self.chat)?, decode(&self.user)?))
    }
}

fn encode(id: Option<i64>) -> String {
    id.map_or_else(|| NULL_KEY.to_string(), |id| id.to_string())
}

fn decode(column: &str) -> Result<Option<i64>, StorageError> {
    if column == NULL_KEY {
        return Ok(None);
    }
    column
        .parse::<i64>()
        .map(Some)
        .map_err(|e| StorageError::Serialization(format!("invalid key column {column:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sides_use_sentinel() {
        let stored = StoredKey::from_key(&ConversationKey::new(None, Some(-5)));
        assert_eq!(stored.chat, "null");
        assert_eq!(stored.user, "-5");
    }

    #[test]
    fn parses_back() {
        let key = ConversationKey::new(Some(-100123), None);
        assert_eq!(StoredKey::from_key(&key).to_key().unwrap(), key);
    }

    #[test]
    fn rejects_garbage_columns() {
        let stored = StoredKey {
            chat: "abc".into(),
            user: NULL_KEY.into(),
        };
        assert!(matches!(stored.to_key(), Err(StorageError::Serialization(_))));
    }
}
