//! Object tree and variable runtime for Arbor.
//!
//! An [`Object`] is a node in a hierarchical namespace. It carries a class,
//! a name, a set of [`ObjectFlags`], an ordered list of children and a
//! table of named [`Variable`]s. Variables are dynamically typed cells that
//! either hold a value or refer to storage owned by someone else.
//!
//! # Classes
//!
//! Classes are registered at runtime into a [`ClassRegistry`] and looked up
//! by hierarchy string (`Object:Group:Window`). Their [`ClassHooks`] run in
//! a fixed order:
//!
//! - `init`, `load`, `save` -- base class first
//! - `reset`, `destroy` -- leaf class first
//!
//! # Locking
//!
//! 1. Each object has its own reentrant lock ([`Object::with_lock`]).
//! 2. Each tree has one reentrant lock held by its root
//!    ([`Object::with_vfs_lock`]); take it before any node lock.
//! 3. A bound variable may carry an external lock ([`ExtLock`]) that is
//!    taken around every access to its storage.
//!
//! # Invariant Violations
//!
//! Destroying an attached object, attaching an object below itself,
//! mutating a destroyed object and reading a missing variable through
//! [`Object::get`] panic. Everything else returns a [`CoreResult`].

pub mod class;
pub mod error;
pub mod flags;
pub mod naming;
pub mod object;
pub mod types;
pub mod value;
pub mod variable;
mod vars;

pub use class::{short_name, Class, ClassHooks, ClassRegistry, ClassSpec, Version, BASE_CLASS};
pub use error::{CoreError, CoreResult};
pub use flags::ObjectFlags;
pub use naming::{sanitize_name, OBJECT_NAME_MAX};
pub use object::{EventHandler, Object, ObjectEvent, ObjectRef};
pub use types::{TypeInfo, VarType, TYPE_INFO};
pub use value::{ext_lock, shared, AnyPtr, ExtLock, Int, Long, Shared, StrBuf, Uint, Ulong, Value, VarScalar};
pub use variable::{Variable, MAX_VARIABLE_CHAIN, VARIABLE_NAME_MAX};
