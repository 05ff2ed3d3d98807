//! # Error Hierarchy
//!
//! Structured error types for the chatstate workspace, built with `thiserror`.
//!
//! Registration and transition errors are programming errors: they are
//! returned to the caller (usually at startup) and are fatal to that call.
//! Storage errors are propagated unchanged from the driver. Handler errors
//! raised while dispatching an update never surface here; the lifecycle
//! controller logs and swallows them.

use thiserror::Error;

/// Top-level error type for chatstate.
#[derive(Error, Debug)]
pub enum ChatStateError {
    /// State name validation failure.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Registration or transition rejected by the registry.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The storage driver failed to load or save a conversation.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Validation errors for state names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The name does not match the state naming grammar, or is reserved.
    #[error(
        "invalid state name \"{name}\": must be upper case, start with a letter and contain only \
         letters, digits and underscores{}",
        reserved_hint(.reserved_allowed)
    )]
    InvalidStateName {
        /// The rejected name.
        name: String,
        /// Whether reserved pseudostate names were permitted for this check.
        reserved_allowed: bool,
    },
}

fn reserved_hint(reserved_allowed: &bool) -> &'static str {
    if *reserved_allowed {
        "; ALL is reserved"
    } else {
        "; CURRENT, DEFAULT and ALL are reserved"
    }
}

/// Errors raised by state registration and transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The supplied name failed validation.
    #[error(transparent)]
    InvalidName(#[from] ValidationError),

    /// A state instance was used as transition target but is not the
    /// instance registered under its name.
    #[error("state {name} is not registered with this registry")]
    UnregisteredState {
        /// Name carried by the rejected instance.
        name: String,
    },

    /// A state name was used as transition target but no such state exists.
    #[error("unknown state name {name}")]
    UnknownStateName {
        /// The name that could not be resolved.
        name: String,
    },

    /// A state with this name is already registered and overwrite was not requested.
    #[error("state {name} is already registered")]
    DuplicateState {
        /// The duplicated name.
        name: String,
    },

    /// A pseudostate slot (ALL, DEFAULT) cannot be rebound after construction.
    #[error("pseudostate {name} cannot be registered after initialization")]
    ReservedName {
        /// The reserved name.
        name: String,
    },

    /// The state is already bound to a different registry.
    #[error("state {name} is already registered with another registry")]
    AlreadyRegistered {
        /// Name of the state.
        name: String,
    },

    /// The state is not bound to any live registry.
    #[error("state {name} is not attached to a registry")]
    Detached {
        /// Name of the state.
        name: String,
    },
}

/// Errors reported by storage drivers.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend failed (connection, query, constraint).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// Every write attempt failed; all intermediate errors are kept in order.
    #[error("write failed after {attempts} attempts: [{}]", .errors.join("; "))]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The error of each attempt, in order.
        errors: Vec<String>,
    },
}
