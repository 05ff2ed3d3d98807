//! # Update Lifecycle
//!
//! [`ConversationMachine::process_update`] runs one inbound update through
//! the full lifecycle:
//!
//! ```text
//! conversation key ─▶ load ─▶ decode ─▶ set CURRENT
//!        ─▶ dispatch CURRENT ─▶ dispatch ALL
//!        ─▶ read post-dispatch CURRENT ─▶ encode ─▶ save
//! ```
//!
//! Handler failures in either dispatch phase are logged and counted, never
//! propagated, and one phase failing does not skip the other. A panicking
//! handler counts as its phase failing. Storage failures on load or save
//! propagate unchanged, and so does a persisted state name that is not
//! registered: the update is rejected before dispatch and the stored record
//! is left untouched.
//!
//! The registry's CURRENT pointer is shared, so updates are processed one
//! at a time: concurrent callers queue on an internal lock. A handler must
//! not call `process_update` on its own machine.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use chatstate_core::name::DEFAULT;
use chatstate_core::{ChatStateError, ConversationKey, StateName, Update};

use crate::driver::{DataCodec, IdentityCodec, LoadedState, StorageDriver};
use crate::registry::StateRegistry;
use crate::state::State;

/// Dispatch phase, used as a log field and metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Handlers of the state active for the conversation.
    Current,
    /// Handlers of the ALL pseudostate.
    All,
}

impl Phase {
    /// The label used in logs and the `phase` metrics label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::All => "all",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one processed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// The conversation the update belonged to.
    pub key: ConversationKey,
    /// State established from storage before dispatch.
    pub loaded_state: StateName,
    /// State persisted after dispatch.
    pub saved_state: StateName,
    /// Error of the CURRENT phase, if a handler failed.
    pub current_error: Option<String>,
    /// Error of the ALL phase, if a handler failed.
    pub all_error: Option<String>,
}

impl DispatchReport {
    /// Whether no handler failed.
    pub fn is_clean(&self) -> bool {
        self.current_error.is_none() && self.all_error.is_none()
    }

    /// Whether dispatch moved the conversation to another state.
    pub fn transitioned(&self) -> bool {
        self.loaded_state != self.saved_state
    }
}

/// Runs updates through a [`StateRegistry`] backed by a [`StorageDriver`].
pub struct ConversationMachine<D> {
    registry: StateRegistry,
    driver: D,
    codec: Box<dyn DataCodec>,
    lifecycle: Mutex<()>,
}

impl<D: StorageDriver> ConversationMachine<D> {
    /// Create a machine with the identity data codec.
    pub fn new(registry: StateRegistry, driver: D) -> Self {
        Self {
            registry,
            driver,
            codec: Box::new(IdentityCodec),
            lifecycle: Mutex::new(()),
        }
    }

    /// Replace the data codec.
    pub fn with_codec(mut self, codec: impl DataCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Process one update.
    ///
    /// # Errors
    ///
    /// - [`ChatStateError::Storage`] if loading or saving fails.
    /// - [`ChatStateError::Registry`] if the persisted state name is not
    ///   registered. Nothing is dispatched or saved in that case.
    ///
    /// Handler errors and panics are reported in the [`DispatchReport`]
    /// instead.
    pub fn process_update(&self, update: &Update) -> Result<DispatchReport, ChatStateError> {
        let _serial = self.lifecycle.lock();
        metrics::counter!("chatstate_updates_total").increment(1);

        let key = update.conversation_key();
        let span = tracing::debug_span!("process_update", update_id = update.update_id, key = %key);
        let _entered = span.enter();

        let loaded = self.driver.load(&key)?;
        let current = self.establish(loaded)?;
        let loaded_state = current.name();

        let current_error = self.dispatch(Phase::Current, &current, update);
        let all_error = self.dispatch(Phase::All, &self.registry.all_state(), update);

        let current = self.registry.current();
        let saved_state = current.name();
        let data = self.codec.encode(&saved_state, current.data());
        self.driver.save(&key, &saved_state, data)?;
        tracing::debug!(loaded = %loaded_state, saved = %saved_state, "conversation state saved");

        Ok(DispatchReport {
            key,
            loaded_state,
            saved_state,
            current_error,
            all_error,
        })
    }

    /// Make the loaded record CURRENT. A missing record means DEFAULT with no
    /// data.
    fn establish(&self, loaded: LoadedState) -> Result<Arc<State>, ChatStateError> {
        let (name, stored) = match loaded.state_name {
            Some(name) => (name, loaded.state_data),
            None => (DEFAULT.to_string(), None),
        };
        let data = self.codec.decode(&name, stored);
        let state = self.registry.set(name.as_str(), data).map_err(|err| {
            tracing::error!(state = %name, error = %err, "persisted state is not registered");
            err
        })?;
        tracing::debug!(state = %name, "conversation state loaded");
        Ok(state)
    }

    fn dispatch(&self, phase: Phase, state: &Arc<State>, update: &Update) -> Option<String> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| state.process_update(update, &self.registry)));
        let message = match outcome {
            Ok(Ok(ran)) => {
                tracing::debug!(phase = %phase, state = %state.name(), handlers = ran, "dispatched");
                return None;
            }
            Ok(Err(err)) => format!("{err:#}"),
            Err(payload) => format!("handler of state {} panicked: {}", state.name(), panic_message(&*payload)),
        };
        tracing::error!(phase = %phase, state = %state.name(), error = %message, "handler failed");
        metrics::counter!("chatstate_handler_failures_total", "phase" => phase.as_str()).increment(1);
        Some(message)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

impl<D> std::fmt::Debug for ConversationMachine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMachine")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
