//! Dispatch surfaces: whatever the registry's handlers get published into.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use crate::state::State;

/// Receives a state's handlers when the state is registered, when the
/// surface is attached, and when handlers are added later.
///
/// `wire` may be called repeatedly for the same state and must replace,
/// not accumulate, what it recorded for that state.
pub trait DispatchSurface: Send + Sync {
    /// Publish the handlers of `state`.
    fn wire(&self, state: &State);
}

/// Collects the `/command` names answered by each state, e.g. to publish
/// a bot command menu.
#[derive(Debug, Default)]
pub struct CommandCatalog {
    commands: RwLock<BTreeMap<String, Vec<String>>>,
}

impl CommandCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands answered by the named state.
    pub fn commands_for(&self, state: &str) -> Vec<String> {
        self.commands.read().get(state).cloned().unwrap_or_default()
    }

    /// Every command answered by some state.
    pub fn all_commands(&self) -> BTreeSet<String> {
        self.commands.read().values().flatten().cloned().collect()
    }

    /// Names of the states wired so far.
    pub fn states(&self) -> Vec<String> {
        self.commands.read().keys().cloned().collect()
    }
}

impl DispatchSurface for CommandCatalog {
    fn wire(&self, state: &State) {
        let name = state.name().to_string();
        let commands = state.commands();
        self.commands.write().insert(name, commands);
    }
}
