//! In-process storage driver.
//!
//! Keeps one [`StoredState`] per conversation in a map behind a
//! `parking_lot::RwLock`. Unknown key components are stored natively. State
//! is lost when the process exits.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use chatstate_core::{ConversationKey, StateData, StateName, StorageError};
use chatstate_machine::{LoadedState, StorageDriver};

/// One persisted conversation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    pub state_name: String,
    pub state_data: StateData,
    pub updated_at: DateTime<Utc>,
}

/// Thread-safe in-memory driver. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<ConversationKey, StoredState>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record of one conversation.
    pub fn get(&self, key: &ConversationKey) -> Option<StoredState> {
        self.records.read().get(key).cloned()
    }

    /// Number of conversations with a record.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// All records, ordered by conversation key display form.
    pub fn snapshot(&self) -> Vec<(ConversationKey, StoredState)> {
        let mut records: Vec<(ConversationKey, StoredState)> = self
            .records
            .read()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        records.sort_by_key(|(key, _)| key.to_string());
        records
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl StorageDriver for MemoryStore {
    fn load(&self, key: &ConversationKey) -> Result<LoadedState, StorageError> {
        let loaded = match self.records.read().get(key) {
            Some(record) => LoadedState::new(record.state_name.clone(), record.state_data.clone()),
            None => LoadedState::empty(),
        };
        tracing::debug!(key = %key, state = ?loaded.state_name, "loaded from memory");
        Ok(loaded)
    }

    fn save(&self, key: &ConversationKey, state_name: &StateName, state_data: StateData) -> Result<(), StorageError> {
        let record = StoredState {
            state_name: state_name.to_string(),
            state_data,
            updated_at: Utc::now(),
        };
        self.records.write().insert(*key, record);
        tracing::debug!(key = %key, state = %state_name, "saved to memory");
        Ok(())
    }
}
