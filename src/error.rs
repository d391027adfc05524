use thiserror::Error;

use crate::active::Role;

/// Rejected gesture registration. Always surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("malformed pointer pattern '{pattern}': {reason}")]
    MalformedPattern { pattern: String, reason: String },
    #[error("gesture '{name}' has no target")]
    MissingTarget { name: String },
    #[error("a gesture named '{0}' is already registered")]
    DuplicateName(String),
    #[error("gesture name must not be empty")]
    EmptyName,
    #[error("gesture '{name}': {reason}")]
    InvalidOption { name: String, reason: String },
}

/// A role was queried that has no live bound pointer, typically after a
/// partial lift. Check `pointer_count_bound()` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{role} has no bound pointer")]
pub struct UnboundRoleError {
    pub role: Role,
}
