//! # States
//!
//! A [`State`] is a named bucket of handlers with one slot of state data.
//! States are shared as `Arc<State>` and compared by identity: two distinct
//! instances with the same name are different states, and only the instance
//! stored in a registry is accepted as a transition target.
//!
//! A state is bound to at most one registry. The binding is a `Weak`
//! back-reference, so a state outliving its registry becomes detached
//! instead of keeping the registry alive.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use chatstate_core::{RegistryError, StateData, StateName, Update, ValidationError};

use crate::handler::{Handler, HandlerContext, Route};
use crate::registry::{RegistryInner, StateRegistry};

/// A conversation state: its name, its data slot and its handlers.
pub struct State {
    name: RwLock<StateName>,
    data: Mutex<StateData>,
    handlers: RwLock<Vec<Arc<Handler>>>,
    registry: RwLock<Weak<RegistryInner>>,
}

impl State {
    /// Create an unbound state.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidStateName`] for names outside the
    /// grammar and for the reserved pseudostate names.
    pub fn new(name: &str) -> Result<Arc<Self>, ValidationError> {
        Ok(Arc::new(Self::unbound(StateName::new(name)?)))
    }

    /// Create a state and register it with `registry` in one go.
    pub fn new_in(name: &str, registry: &StateRegistry) -> Result<Arc<Self>, RegistryError> {
        registry.register_state(name, None)
    }

    pub(crate) fn unbound(name: StateName) -> Self {
        Self {
            name: RwLock::new(name),
            data: Mutex::new(None),
            handlers: RwLock::new(Vec::new()),
            registry: RwLock::new(Weak::new()),
        }
    }

    pub(crate) fn bootstrap(name: StateName, registry: Weak<RegistryInner>) -> Arc<Self> {
        let state = Self::unbound(name);
        *state.registry.write() = registry;
        Arc::new(state)
    }

    /// The state's current name.
    pub fn name(&self) -> StateName {
        self.name.read().clone()
    }

    /// A copy of the state data.
    pub fn data(&self) -> StateData {
        self.data.lock().clone()
    }

    /// Replace the state data.
    pub fn set_data(&self, data: StateData) {
        *self.data.lock() = data;
    }

    /// The registry this state is bound to, if it is still alive.
    pub fn registry(&self) -> Option<StateRegistry> {
        self.registry.read().upgrade().map(StateRegistry::from_inner)
    }

    /// Whether this state is bound to `registry`.
    pub fn is_bound_to(&self, registry: &StateRegistry) -> bool {
        registry.owns(&self.registry.read())
    }

    /// Register this instance with `registry`, optionally under a new name.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::AlreadyRegistered`] if the state is bound
    /// to another live registry, and with the usual registration errors
    /// otherwise.
    pub fn register_to(
        self: &Arc<Self>,
        registry: &StateRegistry,
        name: Option<&str>,
    ) -> Result<Arc<Self>, RegistryError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.name().to_string(),
        };
        registry.register_state(&name, Some(Arc::clone(self)))
    }

    /// Bind to `registry` under `name`. Called with the registry's state map
    /// locked, so this must not call back into the registry.
    pub(crate) fn bind(&self, registry: &StateRegistry, name: StateName) -> Result<(), RegistryError> {
        let mut binding = self.registry.write();
        if let Some(other) = binding.upgrade() {
            if !registry.owns_inner(&other) {
                return Err(RegistryError::AlreadyRegistered {
                    name: self.name().to_string(),
                });
            }
        }
        *binding = registry.downgrade();
        *self.name.write() = name;
        Ok(())
    }

    /// Make this state the current one, with fresh `data`.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::Detached`] if the state is not bound to a
    /// live registry, otherwise as [`StateRegistry::set`].
    pub fn activate(self: &Arc<Self>, data: StateData) -> Result<Arc<Self>, RegistryError> {
        let registry = self.registry().ok_or_else(|| RegistryError::Detached {
            name: self.name().to_string(),
        })?;
        registry.set(self, data)
    }

    // ─── Handler registration ───────────────────────────────────────────

    /// Add a handler for `route`.
    pub fn add_handler<F>(&self, route: Route, callback: F)
    where
        F: Fn(&HandlerContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(Handler::new(route, callback)));
        if let Some(registry) = self.registry() {
            registry.rewire(self);
        }
    }

    /// Add a handler for the bot command `/name`.
    pub fn on_command<F>(&self, name: &str, callback: F)
    where
        F: Fn(&HandlerContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let name = name.trim_start_matches('/');
        self.add_handler(Route::Command(name.to_string()), callback);
    }

    /// Add a handler for any message text.
    pub fn on_text<F>(&self, callback: F)
    where
        F: Fn(&HandlerContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_handler(Route::Text, callback);
    }

    /// Add a handler for message text accepted by `predicate`.
    pub fn on_text_where<P, F>(&self, predicate: P, callback: F)
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
        F: Fn(&HandlerContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_handler(Route::TextWhere(Arc::new(predicate)), callback);
    }

    /// Add a handler for callback queries.
    pub fn on_callback<F>(&self, callback: F)
    where
        F: Fn(&HandlerContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_handler(Route::Callback, callback);
    }

    /// Add a handler for every update.
    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn(&HandlerContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_handler(Route::Update, callback);
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Names of the commands this state answers, in registration order.
    pub fn commands(&self) -> Vec<String> {
        let handlers = self.handlers.read();
        let mut commands: Vec<String> = Vec::new();
        for handler in handlers.iter() {
            if let Route::Command(name) = handler.route() {
                if !commands.contains(name) {
                    commands.push(name.clone());
                }
            }
        }
        commands
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    /// Run every matching handler, in registration order.
    ///
    /// The handler list is snapshotted first, so handlers may add handlers
    /// (those take effect from the next update). The first failing handler
    /// stops this state's dispatch and its error is returned.
    ///
    /// Returns the number of handlers that ran.
    pub fn process_update(self: &Arc<Self>, update: &Update, registry: &StateRegistry) -> anyhow::Result<usize> {
        let handlers: Vec<Arc<Handler>> = self.handlers.read().clone();
        let bot_username = registry.config().bot_username.as_deref();
        let mut ran = 0;
        for (index, handler) in handlers.iter().enumerate() {
            let Some(args) = handler.route().matches(update, bot_username) else {
                continue;
            };
            let ctx = HandlerContext {
                update,
                registry,
                state: self,
                args,
            };
            handler.call(&ctx).map_err(|err| {
                err.context(format!(
                    "handler #{index} ({:?}) of state {} failed",
                    handler.route(),
                    self.name()
                ))
            })?;
            ran += 1;
        }
        Ok(ran)
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name.read().as_str())
            .field("handlers", &self.handler_count())
            .field("data", &*self.data.lock())
            .finish()
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<State {}>", self.name.read())
    }
}
