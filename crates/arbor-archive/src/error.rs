use std::path::PathBuf;

use arbor_core::{CoreError, Version};
use arbor_io::SourceError;
use thiserror::Error;

/// Errors from archive encoding, decoding and file handling.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid archive magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: String, actual: String },

    #[error("incompatible archive format {found}, supported {supported}")]
    IncompatibleVersion { found: Version, supported: Version },

    /// The archive describes a different class than the object loading it.
    #[error("archive is of class {found}, object is {expected}")]
    ClassMismatch { expected: String, found: String },

    #[error("dataset of class {class} has version {found}, expected {expected}")]
    DatasetVersion {
        class: String,
        found: Version,
        expected: Version,
    },

    #[error("unsupported variable table version {0}")]
    UnsupportedTableVersion(u32),

    /// A child named in the archive exists in memory with another class.
    #[error("existing object {path} is of class {found}, archive expects {expected}")]
    ExistingDifferentType {
        path: String,
        expected: String,
        found: String,
    },

    #[error("archive restores non-persistent object {0}")]
    NonPersistentChild(String),

    #[error("unknown class {0}")]
    UnknownClass(String),

    #[error("variable {name:?} has unknown type code {code}")]
    UnknownVariableCode { name: String, code: i32 },

    /// A single-node archive listed children.
    #[error("unexpected child table with {0} entries")]
    UnexpectedChildren(u32),

    #[error("{0} carries debug data, which this build cannot handle")]
    DebugUnsupported(String),

    #[error("no archive found for {0}")]
    NotFound(PathBuf),

    #[error("object {0} is not persistent")]
    NotPersistent(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result alias for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;
