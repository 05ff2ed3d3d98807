//! # Storage Driver Interface
//!
//! The lifecycle controller persists conversation state through the
//! [`StorageDriver`] trait. Implementations live in `chatstate-store`.
//!
//! The trait is synchronous: the controller processes one update at a time
//! and the driver's `load`/`save` are its only blocking points. Drivers that
//! talk to async clients drive them on their own runtime.
//!
//! [`DataCodec`] converts between the in-memory state data and what the
//! driver stores. It is applied exactly once on each of the load and save
//! paths.

use std::sync::Arc;

use chatstate_core::{ConversationKey, StateData, StateName, StorageError};

/// A persisted conversation record as returned by [`StorageDriver::load`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedState {
    /// The stored state name; `None` when no record exists.
    pub state_name: Option<String>,
    /// The stored data.
    pub state_data: StateData,
}

impl LoadedState {
    /// The record returned for a conversation never saved before.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(state_name: impl Into<String>, state_data: StateData) -> Self {
        Self {
            state_name: Some(state_name.into()),
            state_data,
        }
    }
}

/// Load and save one state record per conversation.
pub trait StorageDriver: Send + Sync {
    /// Load the record for `key`.
    ///
    /// An unseen key is not an error: return [`LoadedState::empty`].
    fn load(&self, key: &ConversationKey) -> Result<LoadedState, StorageError>;

    /// Create or overwrite the record for `key`.
    fn save(&self, key: &ConversationKey, state_name: &StateName, state_data: StateData) -> Result<(), StorageError>;
}

impl<T: StorageDriver + ?Sized> StorageDriver for Arc<T> {
    fn load(&self, key: &ConversationKey) -> Result<LoadedState, StorageError> {
        (**self).load(key)
    }

    fn save(&self, key: &ConversationKey, state_name: &StateName, state_data: StateData) -> Result<(), StorageError> {
        (**self).save(key, state_name, state_data)
    }
}

impl<T: StorageDriver + ?Sized> StorageDriver for Box<T> {
    fn load(&self, key: &ConversationKey) -> Result<LoadedState, StorageError> {
        (**self).load(key)
    }

    fn save(&self, key: &ConversationKey, state_name: &StateName, state_data: StateData) -> Result<(), StorageError> {
        (**self).save(key, state_name, state_data)
    }
}

/// Conversion hooks between state data and stored data. Identity by default.
pub trait DataCodec: Send + Sync {
    /// Turn stored data back into state data for `state_name`.
    fn decode(&self, state_name: &str, stored: StateData) -> StateData {
        let _ = state_name;
        stored
    }

    /// Turn state data of `state_name` into storable data.
    fn encode(&self, state_name: &StateName, data: StateData) -> StateData {
        let _ = state_name;
        data
    }
}

/// The pass-through codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl DataCodec for IdentityCodec {}
