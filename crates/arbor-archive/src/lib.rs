//! Binary archive protocol for Arbor object trees.
//!
//! An archive is self-describing: it names the class of the object it was
//! written from, carries the object's persistent variables, lists its
//! persistent children by name and class, and ends with one versioned
//! dataset section per class in the object's lineage. The protocol is
//! written against [`arbor_io::DataSource`], so the same archive can live
//! in a file, a memory buffer or a TCP stream.
//!
//! # Operations
//!
//! | Operation | Scope |
//! |-----------|-------|
//! | [`Archiver::serialize`] / [`Archiver::unserialize`] | whole subtree, one stream |
//! | [`Archiver::serialize_node`] / [`Archiver::unserialize_node`] | one node |
//! | [`Archiver::save`] / [`Archiver::load`] | one file per node under the save path |
//! | [`Archiver::page_in`] / [`Archiver::page_out`] | dataset only |
//! | [`Archiver::store_object`] / [`Archiver::restore_object`] | whole subtree, keyed [`BlobStore`] |
//!
//! # File Layout
//!
//! A node's archive file is `<save_path>/<ancestor names>/<name>.<class>`,
//! where `<class>` is the leaf class name. An explicit
//! [`Object::set_archive_path`](arbor_core::Object::set_archive_path)
//! replaces the whole path.
//!
//! # Failure Policy
//!
//! [`ArchiveConfig::ignore_unknown_classes`] skips archived children whose
//! class is not registered. [`ArchiveConfig::ignore_data_errors`] turns a
//! damaged dataset or variable table into "resident with no data". Both
//! log at `warn` when they apply; everything else fails the operation.

pub mod archiver;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod paging;
pub mod store;

pub use archiver::{backup_path, Archiver};
pub use config::ArchiveConfig;
pub use error::{ArchiveError, ArchiveResult};
pub use format::{Header, BACKUP_SUFFIX, FORMAT_VERSION, MAGIC};
pub use store::{BlobStore, InMemoryBlobStore};
