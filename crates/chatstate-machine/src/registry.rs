//! # State Registry
//!
//! The [`StateRegistry`] maps names to registered [`State`]s and holds the
//! three pseudostate slots:
//!
//! - **DEFAULT**: the fallback state, a named field created at construction.
//! - **ALL**: handlers that run on every update, a named field created at
//!   construction. Never a transition target.
//! - **CURRENT**: a pointer to the active state, always either DEFAULT or a
//!   member of the state map.
//!
//! DEFAULT and ALL are never stored in the map and never rebound.
//!
//! ## Lock order
//!
//! `states` → a state's binding and name → `current` → `surface`. Surface
//! wiring happens after the map lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use chatstate_core::name::{ALL, CURRENT, DEFAULT};
use chatstate_core::{assert_can_be_name, can_be_name, RegistryError, StateName};

use crate::config::MachineConfig;
use crate::state::State;
use crate::surface::DispatchSurface;

/// Options for [`StateRegistry::register_state_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Admit the pseudostate names. Needed to rebind CURRENT.
    pub allow_reserved: bool,
    /// Replace a state already registered under the name.
    pub overwrite: bool,
}

pub(crate) struct RegistryInner {
    name: String,
    config: MachineConfig,
    states: RwLock<HashMap<String, Arc<State>>>,
    current: RwLock<Arc<State>>,
    default: Arc<State>,
    all: Arc<State>,
    surface: RwLock<Option<Arc<dyn DispatchSurface>>>,
}

/// Name → state mapping plus the CURRENT, DEFAULT and ALL pseudostates.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone)]
pub struct StateRegistry {
    inner: Arc<RegistryInner>,
}

impl StateRegistry {
    /// Create a registry with default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, MachineConfig::default())
    }

    /// Create a registry. CURRENT starts out pointing at DEFAULT.
    pub fn with_config(name: impl Into<String>, config: MachineConfig) -> Self {
        let name = name.into();
        let inner = Arc::new_cyclic(|weak: &Weak<RegistryInner>| {
            let default = State::bootstrap(StateName::default_state(), weak.clone());
            let all = State::bootstrap(StateName::all_state(), weak.clone());
            RegistryInner {
                name,
                config,
                states: RwLock::new(HashMap::new()),
                current: RwLock::new(Arc::clone(&default)),
                default,
                all,
                surface: RwLock::new(None),
            }
        });
        tracing::debug!(registry = %inner.name, "state registry created");
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<RegistryInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn owns(&self, binding: &Weak<RegistryInner>) -> bool {
        std::ptr::eq(binding.as_ptr(), Arc::as_ptr(&self.inner))
    }

    pub(crate) fn owns_inner(&self, other: &Arc<RegistryInner>) -> bool {
        Arc::ptr_eq(&self.inner, other)
    }

    /// Diagnostic name of the registry.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Registry configuration.
    pub fn config(&self) -> &MachineConfig {
        &self.inner.config
    }

    /// The active state.
    pub fn current(&self) -> Arc<State> {
        self.inner.current.read().clone()
    }

    /// The DEFAULT pseudostate.
    pub fn default_state(&self) -> Arc<State> {
        Arc::clone(&self.inner.default)
    }

    /// The ALL pseudostate.
    pub fn all_state(&self) -> Arc<State> {
        Arc::clone(&self.inner.all)
    }

    /// Look up a registered state by name.
    ///
    /// Only user-assignable names resolve; the pseudostates have their own
    /// accessors.
    pub fn get(&self, name: &str) -> Option<Arc<State>> {
        if !can_be_name(name, false) {
            return None;
        }
        self.inner.states.read().get(name).cloned()
    }

    /// Whether `state` is DEFAULT or the exact instance registered under its
    /// name.
    pub fn contains(&self, state: &Arc<State>) -> bool {
        if Arc::ptr_eq(state, &self.inner.default) {
            return true;
        }
        let name = state.name();
        self.inner
            .states
            .read()
            .get(name.as_str())
            .is_some_and(|registered| Arc::ptr_eq(registered, state))
    }

    /// Names of the registered states, sorted. Pseudostates are not included.
    pub fn state_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.states.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered states, pseudostates excluded.
    pub fn len(&self) -> usize {
        self.inner.states.read().len()
    }

    /// Whether no states are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register `state` (or a fresh state) under `name`.
    ///
    /// # Errors
    ///
    /// See [`register_state_with`](Self::register_state_with).
    pub fn register_state(&self, name: &str, state: Option<Arc<State>>) -> Result<Arc<State>, RegistryError> {
        self.register_state_with(name, state, RegisterOptions::default())
    }

    /// Register a state under `name`.
    ///
    /// - `CURRENT` (with `allow_reserved`) rebinds the CURRENT pointer to
    ///   `state`, which must already be known to this registry.
    /// - `DEFAULT` and `ALL` are fixed at construction and always rejected.
    /// - Any other name inserts `state`, renaming and binding it, or a fresh
    ///   state if none is given. An existing entry is only replaced with
    ///   `overwrite`; if that entry was CURRENT, CURRENT follows the
    ///   replacement.
    ///
    /// Returns the state now registered under `name`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidName`] if `name` fails validation.
    /// - [`RegistryError::ReservedName`] for `DEFAULT` and `ALL` when reserved
    ///   names are allowed; without `allow_reserved` they fail validation.
    /// - [`RegistryError::UnregisteredState`] when rebinding CURRENT to an
    ///   unknown state.
    /// - [`RegistryError::DuplicateState`] if the name is taken.
    /// - [`RegistryError::AlreadyRegistered`] if `state` belongs to another
    ///   registry or is already registered here under another name.
    pub fn register_state_with(
        &self,
        name: &str,
        state: Option<Arc<State>>,
        options: RegisterOptions,
    ) -> Result<Arc<State>, RegistryError> {
        if options.allow_reserved && (name == DEFAULT || name == ALL) {
            return Err(RegistryError::ReservedName { name: name.to_string() });
        }
        assert_can_be_name(name, options.allow_reserved)?;
        if name == CURRENT {
            return self.rebind_current(state);
        }
        let registered = self.insert(name, state, options.overwrite)?;
        self.rewire(&registered);
        Ok(registered)
    }

    fn rebind_current(&self, state: Option<Arc<State>>) -> Result<Arc<State>, RegistryError> {
        let state = state.ok_or_else(|| RegistryError::UnregisteredState {
            name: CURRENT.to_string(),
        })?;
        if !self.contains(&state) {
            return Err(RegistryError::UnregisteredState {
                name: state.name().to_string(),
            });
        }
        self.point_current_at(&state);
        Ok(state)
    }

    pub(crate) fn point_current_at(&self, state: &Arc<State>) {
        *self.inner.current.write() = Arc::clone(state);
    }

    fn insert(&self, name: &str, state: Option<Arc<State>>, overwrite: bool) -> Result<Arc<State>, RegistryError> {
        let state_name = StateName::new(name)?;
        let mut states = self.inner.states.write();

        let previous = states.get(name).cloned();
        if previous.is_some() && !overwrite {
            return Err(RegistryError::DuplicateState { name: name.to_string() });
        }

        let state = match state {
            Some(state) => {
                let pseudo = Arc::ptr_eq(&state, &self.inner.default) || Arc::ptr_eq(&state, &self.inner.all);
                let aliased = states
                    .iter()
                    .any(|(key, registered)| key != name && Arc::ptr_eq(registered, &state));
                if pseudo || aliased {
                    return Err(RegistryError::AlreadyRegistered {
                        name: state.name().to_string(),
                    });
                }
                state.bind(self, state_name)?;
                state
            }
            None => State::bootstrap(state_name, self.downgrade()),
        };
        states.insert(name.to_string(), Arc::clone(&state));

        if let Some(previous) = previous {
            let mut current = self.inner.current.write();
            if Arc::ptr_eq(&*current, &previous) {
                *current = Arc::clone(&state);
            }
            tracing::debug!(registry = %self.inner.name, state = name, "state overwritten");
        } else {
            tracing::debug!(registry = %self.inner.name, state = name, "state registered");
        }
        Ok(state)
    }

    /// Attach a dispatch surface and wire every state into it: DEFAULT, ALL
    /// and all registered states. States registered later are wired as
    /// they arrive.
    pub fn attach(&self, surface: Arc<dyn DispatchSurface>) {
        *self.inner.surface.write() = Some(Arc::clone(&surface));
        surface.wire(&self.inner.default);
        surface.wire(&self.inner.all);
        let states: Vec<Arc<State>> = self.inner.states.read().values().cloned().collect();
        for state in &states {
            surface.wire(state);
        }
        tracing::debug!(registry = %self.inner.name, states = states.len(), "dispatch surface attached");
    }

    /// Whether a dispatch surface is attached.
    pub fn is_attached(&self) -> bool {
        self.inner.surface.read().is_some()
    }

    /// Re-wire `state` into the attached surface, if any.
    pub(crate) fn rewire(&self, state: &State) {
        let surface = self.inner.surface.read().clone();
        if let Some(surface) = surface {
            tracing::debug!(registry = %self.inner.name, state = %state.name(), "wiring handlers into attached surface");
            surface.wire(state);
        }
    }
}

impl std::fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRegistry")
            .field("name", &self.inner.name)
            .field("states", &self.state_names())
            .field("current", &self.current().name().as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::CommandCatalog;

    fn registry() -> StateRegistry {
        StateRegistry::new("test")
    }

    #[test]
    fn fresh_registry_points_current_at_default() {
        let reg = registry();
        assert!(Arc::ptr_eq(&reg.current(), &reg.default_state()));
        assert_eq!(reg.default_state().name(), DEFAULT);
        assert_eq!(reg.all_state().name(), ALL);
        assert!(reg.is_empty());
    }

    #[test]
    fn pseudostates_are_not_map_entries() {
        let reg = registry();
        assert!(reg.get("DEFAULT").is_none());
        assert!(reg.get("ALL").is_none());
        assert!(reg.get("CURRENT").is_none());
    }

    #[test]
    fn register_and_get() {
        let reg = registry();
        let foo = reg.register_state("FOO", None).unwrap();
        assert!(Arc::ptr_eq(&reg.get("FOO").unwrap(), &foo));
        assert!(foo.is_bound_to(&reg));
        assert!(reg.get("BAR").is_none());
        assert!(reg.get("foo").is_none());
    }

    #[test]
    fn register_rejects_bad_names() {
        let reg = registry();
        assert!(matches!(
            reg.register_state("lower", None),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(matches!(
            reg.register_state("DEFAULT", None),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(matches!(
            reg.register_state("ALL", None),
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[test]
    fn duplicate_requires_overwrite() {
        let reg = registry();
        reg.register_state("FOO", None).unwrap();
        assert_eq!(
            reg.register_state("FOO", None).unwrap_err(),
            RegistryError::DuplicateState { name: "FOO".into() }
        );
    }

    #[test]
    fn overwrite_replaces_and_renames() {
        let reg = registry();
        let old = reg.register_state("FOO", None).unwrap();
        let replacement = State::new("BAR").unwrap();
        let opts = RegisterOptions {
            overwrite: true,
            ..RegisterOptions::default()
        };
        let registered = reg.register_state_with("FOO", Some(Arc::clone(&replacement)), opts).unwrap();
        assert!(Arc::ptr_eq(&registered, &replacement));
        assert_eq!(replacement.name(), "FOO");
        assert!(!reg.contains(&old));
        assert!(reg.contains(&replacement));
    }

    #[test]
    fn overwrite_moves_current_to_replacement() {
        let reg = registry();
        reg.register_state("FOO", None).unwrap();
        reg.set("FOO", None).unwrap();
        let opts = RegisterOptions {
            overwrite: true,
            ..RegisterOptions::default()
        };
        let fresh = reg.register_state_with("FOO", None, opts).unwrap();
        assert!(Arc::ptr_eq(&reg.current(), &fresh));
    }

    #[test]
    fn default_and_all_cannot_be_rebound() {
        let reg = registry();
        let opts = RegisterOptions {
            allow_reserved: true,
            overwrite: true,
        };
        for name in ["DEFAULT", "ALL"] {
            assert_eq!(
                reg.register_state_with(name, None, opts).unwrap_err(),
                RegistryError::ReservedName { name: name.into() }
            );
        }
    }

    #[test]
    fn current_rebind_requires_known_state() {
        let reg = registry();
        let opts = RegisterOptions {
            allow_reserved: true,
            ..RegisterOptions::default()
        };
        let stranger = State::new("FOO").unwrap();
        assert!(matches!(
            reg.register_state_with("CURRENT", Some(stranger), opts),
            Err(RegistryError::UnregisteredState { .. })
        ));
        let foo = reg.register_state("FOO", None).unwrap();
        reg.register_state_with("CURRENT", Some(Arc::clone(&foo)), opts).unwrap();
        assert!(Arc::ptr_eq(&reg.current(), &foo));
        assert!(reg.get("CURRENT").is_none());
    }

    #[test]
    fn state_belongs_to_one_registry() {
        let first = registry();
        let second = StateRegistry::new("other");
        let foo = State::new("FOO").unwrap();
        foo.register_to(&first, None).unwrap();
        assert_eq!(
            foo.register_to(&second, None).unwrap_err(),
            RegistryError::AlreadyRegistered { name: "FOO".into() }
        );
    }

    #[test]
    fn state_cannot_be_aliased_within_a_registry() {
        let reg = registry();
        let foo = reg.register_state("FOO", None).unwrap();
        assert!(matches!(
            foo.register_to(&reg, Some("BAR")),
            Err(RegistryError::AlreadyRegistered { .. })
        ));
        assert_eq!(foo.name(), "FOO");
        assert!(matches!(
            reg.register_state("BAR", Some(reg.default_state())),
            Err(RegistryError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn state_of_dropped_registry_can_move() {
        let foo = State::new("FOO").unwrap();
        {
            let gone = StateRegistry::new("gone");
            foo.register_to(&gone, None).unwrap();
        }
        assert!(foo.registry().is_none());
        let reg = registry();
        foo.register_to(&reg, Some("BAR")).unwrap();
        assert_eq!(foo.name(), "BAR");
        assert!(reg.contains(&foo));
    }

    #[test]
    fn attach_wires_existing_and_later_states() {
        let reg = registry();
        reg.default_state().on_command("start", |_| Ok(()));
        let early = reg.register_state("EARLY", None).unwrap();
        early.on_command("early", |_| Ok(()));

        let catalog = Arc::new(CommandCatalog::new());
        reg.attach(catalog.clone());
        assert!(reg.is_attached());
        assert_eq!(catalog.commands_for("DEFAULT"), vec!["start".to_string()]);
        assert_eq!(catalog.commands_for("EARLY"), vec!["early".to_string()]);

        let late = reg.register_state("LATE", None).unwrap();
        late.on_command("late", |_| Ok(()));
        assert_eq!(catalog.commands_for("LATE"), vec!["late".to_string()]);
    }

    #[test]
    fn debug_lists_states() {
        let reg = StateRegistry::new("ponies");
        reg.register_state("BEST_PONY", None).unwrap();
        let rendered = format!("{reg:?}");
        assert!(rendered.contains("ponies"));
        assert!(rendered.contains("BEST_PONY"));
        assert!(rendered.contains("DEFAULT"));
    }
}
