//! # Transitions
//!
//! [`StateRegistry::set`] is the single chokepoint for every transition:
//! it resolves the target, rebinds CURRENT and resets the state data.
//!
//! Data never carries over. `set(X, None)` on an already active `X` still
//! clears its data.

use std::sync::Arc;

use chatstate_core::name::{CURRENT, DEFAULT};
use chatstate_core::{RegistryError, StateData, StateName};

use crate::registry::{RegisterOptions, StateRegistry};
use crate::state::State;

/// What a transition points at.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// A state instance; must be the one registered under its name.
    State(&'a Arc<State>),
    /// A registered state name, or `DEFAULT`.
    Name(&'a str),
    /// The DEFAULT state.
    Default,
}

impl<'a> From<&'a Arc<State>> for Target<'a> {
    fn from(state: &'a Arc<State>) -> Self {
        Self::State(state)
    }
}

impl<'a> From<&'a str> for Target<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a String> for Target<'a> {
    fn from(name: &'a String) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a StateName> for Target<'a> {
    fn from(name: &'a StateName) -> Self {
        Self::Name(name.as_str())
    }
}

impl<'a> From<Option<&'a str>> for Target<'a> {
    fn from(name: Option<&'a str>) -> Self {
        name.map_or(Self::Default, Self::Name)
    }
}

impl StateRegistry {
    /// Make `target` the current state with `data` as its data.
    ///
    /// Returns the new CURRENT.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnregisteredState`] for an instance that is not
    ///   the one registered under its name.
    /// - [`RegistryError::UnknownStateName`] for an unregistered name.
    pub fn set<'a>(&self, target: impl Into<Target<'a>>, data: StateData) -> Result<Arc<State>, RegistryError> {
        let state = self.resolve(target.into())?;
        let options = RegisterOptions {
            allow_reserved: true,
            overwrite: false,
        };
        let current = self.register_state_with(CURRENT, Some(state), options)?;
        current.set_data(data);
        tracing::debug!(registry = %self.name(), state = %current.name(), "transitioned");
        Ok(current)
    }

    /// Transition to DEFAULT with no data. Cannot fail.
    pub fn reset(&self) -> Arc<State> {
        let default = self.default_state();
        self.point_current_at(&default);
        default.set_data(None);
        tracing::debug!(registry = %self.name(), "reset to DEFAULT");
        default
    }

    /// Resolve a transition target to the registered instance.
    ///
    /// # Errors
    ///
    /// As [`set`](Self::set).
    pub fn resolve(&self, target: Target<'_>) -> Result<Arc<State>, RegistryError> {
        match target {
            Target::Default => Ok(self.default_state()),
            Target::Name(DEFAULT) => Ok(self.default_state()),
            Target::Name(name) => self.get(name).ok_or_else(|| RegistryError::UnknownStateName {
                name: name.to_string(),
            }),
            Target::State(state) => {
                if self.contains(state) {
                    Ok(Arc::clone(state))
                } else {
                    Err(RegistryError::UnregisteredState {
                        name: state.name().to_string(),
                    })
                }
            }
        }
    }
}
