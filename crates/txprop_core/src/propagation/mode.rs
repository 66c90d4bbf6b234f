//! Propagation modes.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Declared policy controlling how an operation's transaction requirement
/// relates to the ambient context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
    /// Join the ambient transaction, or begin one if there is none.
    Required,
    /// Always begin an independent transaction, suspending the ambient one.
    RequiresNew,
    /// Join the ambient transaction if there is one, otherwise run without.
    Supports,
    /// Always run without a transaction, suspending the ambient one.
    NotSupported,
    /// Join the ambient transaction; fail if there is none.
    Mandatory,
    /// Run without a transaction; fail if one is active.
    Never,
    /// Run in a savepoint-backed child of the ambient transaction, or
    /// behave like [`Propagation::Required`] if there is none.
    Nested,
}

impl Propagation {
    /// All modes, in declaration order.
    pub const ALL: [Propagation; 7] = [
        Propagation::Required,
        Propagation::RequiresNew,
        Propagation::Supports,
        Propagation::NotSupported,
        Propagation::Mandatory,
        Propagation::Never,
        Propagation::Nested,
    ];

    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Propagation::Required => "REQUIRED",
            Propagation::RequiresNew => "REQUIRES_NEW",
            Propagation::Supports => "SUPPORTS",
            Propagation::NotSupported => "NOT_SUPPORTED",
            Propagation::Mandatory => "MANDATORY",
            Propagation::Never => "NEVER",
            Propagation::Nested => "NESTED",
        }
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown propagation name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown propagation mode: {0}")]
pub struct ParsePropagationError(String);

impl FromStr for Propagation {
    type Err = ParsePropagationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Propagation::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| ParsePropagationError(s.to_string()))
    }
}
