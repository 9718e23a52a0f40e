//! Seekable byte-stream sources for Arbor.
//!
//! A [`DataSource`] presents one read/write/seek/tell contract over several
//! backing stores. The archive protocol is written entirely against it, so
//! an object can be persisted to a file, an in-memory blob or a socket
//! without the protocol knowing which.
//!
//! # Backends
//!
//! - [`MemSource`] -- fixed read/write buffer borrowed from the caller
//! - [`ConstSource`] -- read-only buffer borrowed from the caller
//! - [`AutoSource`] -- growable buffer owning its storage
//! - [`FileSource`] -- open file, with position-preserving `read_at`/`write_at`
//! - [`SocketSource`] -- TCP stream, no random access
//!
//! # Transfer Rules
//!
//! 1. Backends report the number of bytes they actually moved.
//! 2. [`DataSource::read`]/[`DataSource::write`] turn a short count into
//!    [`SourceError::ShortRead`]/[`SourceError::ShortWrite`].
//! 3. [`DataSource::read_partial`]/[`DataSource::write_partial`] never fail
//!    on a short count.
//! 4. Operations a backend cannot perform fail with
//!    [`SourceError::NotSupported`], never a generic error.

pub mod backend;
pub mod codec;
pub mod error;
pub mod file;
pub mod memory;
pub mod socket;
pub mod source;

pub use backend::{Backend, Whence};
pub use codec::{type_code, ByteOrder, Scalar};
pub use error::{SourceError, SourceResult};
pub use file::FileSource;
pub use memory::{AutoSource, ConstSource, MemSource};
pub use socket::SocketSource;
pub use source::{Counters, DataSource, ErrorHook, SharedSource, MAX_STRING_LEN};
