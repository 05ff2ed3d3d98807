//! # State Names
//!
//! The naming grammar for conversation states and the validated
//! [`StateName`] newtype.
//!
//! A state name is non-empty, fully upper case, starts with an ASCII letter
//! and continues with letters, digits or underscores (`^[A-Z][A-Z0-9_]*$`).
//!
//! ## Reserved Names
//!
//! `CURRENT`, `DEFAULT` and `ALL` name the registry's pseudostates.
//! `CURRENT` and `DEFAULT` are rejected unless the caller explicitly allows
//! reserved names, which only the registry's own bootstrap and its CURRENT
//! rebind do. `ALL` is never a valid name: it is not a transition target, and
//! the registry creates it through [`StateName::all_state`].

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Name of the pseudostate pointer to the active state.
pub const CURRENT: &str = "CURRENT";

/// Name of the fallback state used when nothing is persisted.
pub const DEFAULT: &str = "DEFAULT";

/// Name of the pseudostate whose handlers run on every update.
pub const ALL: &str = "ALL";

/// All names reserved for pseudostates.
pub const RESERVED_NAMES: [&str; 3] = [CURRENT, DEFAULT, ALL];

/// Check whether `name` may be used as a state name.
///
/// With `allow_reserved == false`, `CURRENT` and `DEFAULT` are rejected as
/// well. `ALL` is always rejected.
pub fn can_be_name(name: &str, allow_reserved: bool) -> bool {
    if name.is_empty() || name == ALL {
        return false;
    }
    if !allow_reserved && RESERVED_NAMES.contains(&name) {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Like [`can_be_name`], but returns a [`ValidationError`] on rejection.
pub fn assert_can_be_name(name: &str, allow_reserved: bool) -> Result<(), ValidationError> {
    if can_be_name(name, allow_reserved) {
        Ok(())
    } else {
        Err(ValidationError::InvalidStateName {
            name: name.to_string(),
            reserved_allowed: allow_reserved,
        })
    }
}

/// A validated state name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StateName(String);

impl StateName {
    /// Create a user-assignable state name. Reserved names are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidStateName`] if the name violates the
    /// grammar or is one of [`RESERVED_NAMES`].
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        assert_can_be_name(&s, false)?;
        Ok(Self(s))
    }

    /// Create a state name that may also be `CURRENT` or `DEFAULT`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidStateName`] if the name violates the
    /// grammar or is `ALL`.
    pub fn new_allow_reserved(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        assert_can_be_name(&s, true)?;
        Ok(Self(s))
    }

    /// The DEFAULT pseudostate name.
    pub fn default_state() -> Self {
        Self(DEFAULT.to_string())
    }

    /// The ALL pseudostate name.
    pub fn all_state() -> Self {
        Self(ALL.to_string())
    }

    /// Whether this is one of the pseudostate names.
    pub fn is_reserved(&self) -> bool {
        RESERVED_NAMES.contains(&self.0.as_str())
    }

    /// Access the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StateName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for StateName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::str::FromStr for StateName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// Persisted records legitimately carry "DEFAULT", so deserialization admits
// reserved names while still enforcing the grammar.
impl<'de> Deserialize<'de> for StateName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new_allow_reserved(raw).map_err(serde::de::Error::custom)
    }
}
