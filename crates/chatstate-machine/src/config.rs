//! Registry configuration.

use serde::{Deserialize, Serialize};

/// Environment variable holding the bot's username.
pub const BOT_USERNAME_ENV: &str = "CHATSTATE_BOT_USERNAME";

/// Settings shared by every state of a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// The bot's username, used to accept `/command@username` and to
    /// ignore commands addressed to other bots. `None` accepts any suffix.
    #[serde(default)]
    pub bot_username: Option<String>,
}

impl MachineConfig {
    /// Configuration with a bot username.
    pub fn with_bot_username(username: impl Into<String>) -> Self {
        Self {
            bot_username: Some(username.into().trim_start_matches('@').to_string()),
        }
    }

    /// Read the configuration from the environment.
    ///
    /// An unset or empty [`BOT_USERNAME_ENV`] leaves the username unset.
    pub fn from_env() -> Self {
        match std::env::var(BOT_USERNAME_ENV) {
            Ok(name) if !name.trim().is_empty() => Self::with_bot_username(name.trim()),
            _ => Self::default(),
        }
    }
}
