use std::collections::TryReserveError;

use arbor_io::SourceError;
use thiserror::Error;

use crate::types::VarType;

/// Errors from object and variable operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A data source failed underneath a class hook.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Memory for a duplicated value could not be reserved.
    #[error("allocation failed: {0}")]
    Alloc(#[from] TryReserveError),

    /// No class is registered under the given hierarchy string.
    #[error("unknown class: {0}")]
    UnknownClass(String),

    /// A class with the same hierarchy string is already registered.
    #[error("class already registered: {0}")]
    DuplicateClass(String),

    /// A class name contains a reserved character.
    #[error("invalid class name {0:?}")]
    InvalidClassName(String),

    /// A variable exists but holds a different type than requested.
    #[error("variable {name:?} is {found:?}, expected {expected:?}")]
    TypeMismatch {
        name: String,
        expected: VarType,
        found: VarType,
    },

    /// A class hook rejected the operation.
    #[error("{class}: {reason}")]
    Hook { class: String, reason: String },
}

impl CoreError {
    /// Convenience constructor for hook failures.
    pub fn hook(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Hook {
            class: class.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
