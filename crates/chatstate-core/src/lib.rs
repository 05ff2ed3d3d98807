//! # chatstate-core: Foundational Types
//!
//! The leaf crate of the chatstate workspace. It defines the primitives every
//! other crate builds on and depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Validated state names.** `StateName` can only be constructed through
//!    the naming grammar (`^[A-Z][A-Z0-9_]*$`). Registration and transition
//!    never see a bare, unchecked string.
//!
//! 2. **Explicit "unknown" identity.** A conversation is keyed by
//!    `ConversationKey { chat, user }` where either side may be absent.
//!    Absence is a value (`None`), never a crash and never "no record".
//!
//! 3. **Structured errors.** One `thiserror` enum per concern, with the
//!    offending name carried in every variant.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `chatstate-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod name;
pub mod update;

// Re-export primary types for ergonomic imports.
pub use error::{ChatStateError, RegistryError, StorageError, ValidationError};
pub use identity::{ChatId, ConversationKey, UserId};
pub use name::{assert_can_be_name, can_be_name, StateName, RESERVED_NAMES};
pub use update::{CallbackQuery, Chat, InlineQuery, Message, Update, User};

/// Opaque per-state data carried by the active state of a conversation.
///
/// `None` means "no data". Any JSON-like value is accepted; the storage
/// backend decides what it can actually persist.
pub type StateData = Option<serde_json::Value>;
