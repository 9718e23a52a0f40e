//! Object archives: stream encoding, file placement and tree traversal.
//!
//! One node archive is laid out as:
//!
//! ```text
//! header            see `format`
//! dataset offset    u32, from the start of the archive
//! saved flags       u32
//! legacy deps       u32 count, then that many strings (skipped)
//! variable table    see `codec`
//! child table       u32 count, then (name, hierarchy) pairs; only
//!                   when CHLD_AUTOSAVE is set
//! dataset           per class, base first: u32 major, u32 minor, then
//!                   whatever the class `save` hook wrote
//! ```
//!
//! Whole-tree archives ([`Archiver::serialize`]) follow the dataset with
//! one `u32 length + archive` record per listed child, in child-table
//! order. File archives never embed children; each child has its own file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arbor_core::{short_name, ClassRegistry, Object, ObjectFlags, Version};
use arbor_io::{DataSource, Whence};
use tracing::{debug, trace, warn};

use crate::codec;
use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, ArchiveResult};
use crate::format::{self, BACKUP_SUFFIX};

/// How children are represented in an archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Scope {
    /// Empty child table; a non-empty one is rejected on read.
    Node,
    /// Child table only; children live in their own files.
    Listed,
    /// Child table followed by each child's archive.
    Embedded,
}

/// Result of reading the generic part of an archive.
pub(crate) struct Generic {
    pub(crate) flags: ObjectFlags,
    /// One entry per child-table row; `None` for skipped unknown classes.
    pub(crate) children: Vec<Option<Object>>,
}

/// `<path>.bak`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Run `f` with type tags disabled, restoring the caller's setting after.
fn plain<'a, T>(
    src: &mut DataSource<'a>,
    f: impl FnOnce(&mut DataSource<'a>) -> ArchiveResult<T>,
) -> ArchiveResult<T> {
    let saved = src.set_debug(false);
    let result = f(src);
    src.set_debug(saved);
    result
}

/// Run `f` holding the tree lock of `obj`, then its node lock.
pub(crate) fn locked<R>(obj: &Object, f: impl FnOnce() -> R) -> R {
    obj.with_vfs_lock(|| obj.with_lock(f))
}

fn debug_supported(obj: &Object, flags: ObjectFlags) -> ArchiveResult<()> {
    if flags.contains(ObjectFlags::DEBUG_DATA) && !cfg!(feature = "debug-data") {
        return Err(ArchiveError::DebugUnsupported(obj.path()));
    }
    Ok(())
}

/// Reads and writes object archives under one [`ArchiveConfig`].
#[derive(Clone, Debug)]
pub struct Archiver {
    registry: Arc<ClassRegistry>,
    config: ArchiveConfig,
}

impl Archiver {
    /// Archiver resolving classes through `registry`.
    pub fn new(registry: Arc<ClassRegistry>, config: ArchiveConfig) -> Self {
        Self { registry, config }
    }

    /// Registry used to instantiate archived children.
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    /// Paths and failure policy.
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ArchiveConfig {
        &mut self.config
    }

    // -----------------------------------------------------------------------
    // Stream entry points
    // -----------------------------------------------------------------------

    /// Write `obj` and, recursively, every child its table lists.
    pub fn serialize(&self, obj: &Object, src: &mut DataSource<'_>) -> ArchiveResult<()> {
        obj.with_vfs_lock(|| plain(src, |src| self.write_node(obj, src, Scope::Embedded)))
    }

    /// Restore `obj` and its subtree from a [`serialize`](Self::serialize)d
    /// archive.
    pub fn unserialize(&self, obj: &Object, src: &mut DataSource<'_>) -> ArchiveResult<()> {
        obj.with_vfs_lock(|| plain(src, |src| self.read_tree(obj, src)))
    }

    /// Write `obj` alone, with an empty child table.
    pub fn serialize_node(&self, obj: &Object, src: &mut DataSource<'_>) -> ArchiveResult<()> {
        locked(obj, || plain(src, |src| self.write_node(obj, src, Scope::Node)))
    }

    /// Restore `obj` alone. Archives listing children are rejected.
    pub fn unserialize_node(&self, obj: &Object, src: &mut DataSource<'_>) -> ArchiveResult<()> {
        locked(obj, || {
            plain(src, |src| {
                if let Some(generic) = self.read_generic(obj, src, Scope::Node)? {
                    self.apply_dataset(obj, src, generic.flags)?;
                }
                Ok(())
            })
        })
    }

    /// [`serialize`](Self::serialize) into a fresh growable buffer.
    pub fn to_bytes(&self, obj: &Object) -> ArchiveResult<Vec<u8>> {
        let mut src = DataSource::open_auto();
        self.serialize(obj, &mut src)?;
        // Auto sources always own their bytes.
        Ok(src.into_bytes().unwrap_or_default())
    }

    pub fn from_bytes(&self, obj: &Object, bytes: &[u8]) -> ArchiveResult<()> {
        let mut src = DataSource::open_const(bytes);
        self.unserialize(obj, &mut src)
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    fn listed_children(&self, obj: &Object, flags: ObjectFlags, scope: Scope) -> Vec<Object> {
        if scope == Scope::Node || !flags.contains(ObjectFlags::CHLD_AUTOSAVE) {
            return Vec::new();
        }
        obj.children()
            .into_iter()
            .filter(Object::is_persistent)
            .collect()
    }

    /// Header through child table, with the dataset offset patched in.
    fn encode_generic(
        &self,
        obj: &Object,
        src: &DataSource<'_>,
        flags: ObjectFlags,
        children: &[Object],
    ) -> ArchiveResult<Vec<u8>> {
        let mut head = DataSource::open_auto();
        head.set_byte_order(src.byte_order());

        format::write_header(&mut head, obj.class())?;
        let offset_at = head.tell()?;
        head.write_u32(0)?;
        head.write_u32((flags & ObjectFlags::SAVED).bits())?;
        head.write_u32(0)?;
        codec::write_variables(&mut head, &obj.variables())?;

        if flags.contains(ObjectFlags::CHLD_AUTOSAVE) {
            head.write_u32(children.len() as u32)?;
            for child in children {
                head.write_string(&child.name())?;
                head.write_string(child.class().hierarchy())?;
            }
        }

        let dataset_at = head.tell()?;
        head.write_scalar_at(dataset_at as u32, offset_at)?;
        Ok(head.into_bytes().unwrap_or_default())
    }

    fn write_dataset(&self, obj: &Object, src: &mut DataSource<'_>, flags: ObjectFlags) -> ArchiveResult<()> {
        let debug = flags.contains(ObjectFlags::DEBUG_DATA);
        for class in obj.class().lineage() {
            src.set_debug(false);
            let version = class.version();
            src.write_u32(version.major)?;
            src.write_u32(version.minor)?;
            src.set_debug(debug);
            class.hooks().save(obj, src)?;
        }
        src.set_debug(false);
        Ok(())
    }

    pub(crate) fn write_node(&self, obj: &Object, src: &mut DataSource<'_>, scope: Scope) -> ArchiveResult<()> {
        let flags = obj.flags();
        debug_supported(obj, flags)?;

        let children = self.listed_children(obj, flags, scope);
        let head = self.encode_generic(obj, src, flags, &children)?;
        src.write(&head)?;
        self.write_dataset(obj, src, flags)?;

        if scope == Scope::Embedded {
            for child in &children {
                let mut sub = DataSource::open_auto();
                sub.set_byte_order(src.byte_order());
                self.write_node(child, &mut sub, Scope::Embedded)?;
                let bytes = sub.into_bytes().unwrap_or_default();
                src.write_u32(bytes.len() as u32)?;
                src.write(&bytes)?;
            }
        }
        trace!(path = %obj.path(), ?scope, "object archived");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Decoding
    // -----------------------------------------------------------------------

    /// Find or create the child an archive names, per the reconciliation
    /// policy.
    fn reconcile_child(&self, parent: &Object, name: &str, hierarchy: &str) -> ArchiveResult<Option<Object>> {
        if let Some(existing) = parent.find_child(name) {
            if existing.class().hierarchy() != hierarchy {
                return Err(ArchiveError::ExistingDifferentType {
                    path: existing.path(),
                    expected: hierarchy.to_owned(),
                    found: existing.class().hierarchy().to_owned(),
                });
            }
            if !existing.is_persistent() {
                return Err(ArchiveError::NonPersistentChild(existing.path()));
            }
            return Ok(Some(existing));
        }

        match self.registry.lookup(hierarchy) {
            Some(class) => {
                let child = Object::new(&class, name);
                child.attach(parent);
                Ok(Some(child))
            }
            None if self.config.ignore_unknown_classes => {
                warn!(parent = %parent.path(), child = name, class = hierarchy, "skipping child of unknown class");
                Ok(None)
            }
            None => Err(ArchiveError::UnknownClass(hierarchy.to_owned())),
        }
    }

    /// Read header through child table into `obj`.
    ///
    /// Returns `None` if an unknown variable code was ignored; the node is
    /// then resident with no data and the rest of the archive is unread.
    pub(crate) fn read_generic(
        &self,
        obj: &Object,
        src: &mut DataSource<'_>,
        scope: Scope,
    ) -> ArchiveResult<Option<Generic>> {
        let start = src.tell().ok();
        let header = format::read_header(src)?;
        let hierarchy = header
            .hierarchy
            .unwrap_or_else(|| obj.class().hierarchy().to_owned());
        if hierarchy != obj.class().hierarchy() {
            return Err(ArchiveError::ClassMismatch {
                expected: obj.class().hierarchy().to_owned(),
                found: hierarchy,
            });
        }

        let dataset_offset = src.read_u32()?;
        let disk = ObjectFlags::from_bits_truncate(src.read_u32()?) & ObjectFlags::SAVED;
        obj.set_flags(obj.flags().merge_saved(disk));

        let legacy = src.read_u32()?;
        for _ in 0..legacy {
            src.skip_string()?;
        }
        if legacy > 0 {
            trace!(count = legacy, "skipped legacy dependency entries");
        }

        match codec::read_variables(src) {
            Ok(vars) => {
                for (name, value) in vars {
                    obj.load_value(&name, value);
                }
            }
            Err(e @ ArchiveError::UnknownVariableCode { .. }) if self.config.ignore_data_errors => {
                warn!(path = %obj.path(), error = %e, "ignoring archive data");
                obj.insert_flags(ObjectFlags::RESIDENT);
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let mut children = Vec::new();
        if disk.contains(ObjectFlags::CHLD_AUTOSAVE) {
            let count = src.read_u32()?;
            if scope == Scope::Node && count > 0 {
                return Err(ArchiveError::UnexpectedChildren(count));
            }
            for _ in 0..count {
                let name = src.read_string()?;
                let hierarchy = src.read_string()?;
                children.push(self.reconcile_child(obj, &name, &hierarchy)?);
            }
        }

        if let (Some(start), Ok(pos)) = (start, src.tell()) {
            if pos - start != u64::from(dataset_offset) {
                warn!(
                    path = %obj.path(),
                    recorded = dataset_offset,
                    actual = pos - start,
                    "dataset offset disagrees with generic part"
                );
            }
        }

        Ok(Some(Generic { flags: disk, children }))
    }

    fn read_dataset(&self, obj: &Object, src: &mut DataSource<'_>, disk: ObjectFlags) -> ArchiveResult<()> {
        debug_supported(obj, disk)?;
        let debug = disk.contains(ObjectFlags::DEBUG_DATA);
        for class in obj.class().lineage() {
            src.set_debug(false);
            let found = Version::new(src.read_u32()?, src.read_u32()?);
            let expected = class.version();
            if found.major != expected.major {
                return Err(ArchiveError::DatasetVersion {
                    class: class.hierarchy().to_owned(),
                    found,
                    expected,
                });
            }
            if found.minor > expected.minor {
                debug!(class = class.hierarchy(), %found, %expected, "dataset newer than class");
            }
            src.set_debug(debug);
            class.hooks().load(obj, src, found)?;
        }
        src.set_debug(false);
        Ok(())
    }

    /// Read the dataset and mark `obj` resident.
    ///
    /// Returns `false` if a failure was ignored under `ignore_data_errors`.
    pub(crate) fn apply_dataset(&self, obj: &Object, src: &mut DataSource<'_>, disk: ObjectFlags) -> ArchiveResult<bool> {
        let complete = match self.read_dataset(obj, src, disk) {
            Ok(()) => true,
            Err(e) if self.config.ignore_data_errors => {
                warn!(path = %obj.path(), error = %e, "ignoring dataset error");
                false
            }
            Err(e) => return Err(e),
        };
        obj.insert_flags(ObjectFlags::RESIDENT);
        Ok(complete)
    }

    fn read_tree(&self, obj: &Object, src: &mut DataSource<'_>) -> ArchiveResult<()> {
        let Some(generic) = self.read_generic(obj, src, Scope::Embedded)? else {
            return Ok(());
        };
        if !self.apply_dataset(obj, src, generic.flags)? {
            warn!(path = %obj.path(), "embedded children unreachable after dataset error");
            return Ok(());
        }

        for child in generic.children {
            let len = src.read_u32()? as usize;
            let mut bytes = vec![0u8; len];
            src.read(&mut bytes)?;
            match child {
                Some(child) => {
                    let mut sub = DataSource::open_const(&bytes);
                    sub.set_byte_order(src.byte_order());
                    self.read_tree(&child, &mut sub)?;
                }
                None => trace!(len, "skipped embedded archive"),
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    /// Archive path relative to a search or save directory:
    /// `<ancestor names>/<name>.<class>`.
    pub fn relative_path(&self, obj: &Object) -> PathBuf {
        let mut ancestors = Vec::new();
        let mut up = obj.parent();
        while let Some(node) = up {
            ancestors.push(node.name());
            up = node.parent();
        }

        let mut path = PathBuf::new();
        for segment in ancestors.iter().rev().filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path.push(format!("{}.{}", obj.name(), short_name(obj.class().hierarchy())));
        path
    }

    /// Where [`save`](Self::save) writes `obj`.
    pub fn archive_path(&self, obj: &Object) -> PathBuf {
        obj.archive_path()
            .unwrap_or_else(|| self.config.save_path.join(self.relative_path(obj)))
    }

    /// First existing archive for `obj` along the search paths.
    pub fn find_archive(&self, obj: &Object) -> Option<PathBuf> {
        if let Some(path) = obj.archive_path() {
            return path.is_file().then_some(path);
        }
        let relative = self.relative_path(obj);
        self.config
            .search_paths
            .iter()
            .map(|dir| dir.join(&relative))
            .find(|path| path.is_file())
    }

    fn open_archive(&self, obj: &Object) -> ArchiveResult<(PathBuf, DataSource<'static>)> {
        let path = self
            .find_archive(obj)
            .ok_or_else(|| ArchiveError::NotFound(self.relative_path(obj)))?;
        let src = DataSource::open_file(&path, "rb")?;
        Ok((path, src))
    }

    fn rotate(&self, path: &Path) -> io::Result<()> {
        if !path.exists() {
            return Ok(());
        }
        if self.config.backup {
            let backup = backup_path(path);
            fs::rename(path, &backup)?;
            debug!(path = %path.display(), backup = %backup.display(), "previous archive kept");
        } else {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Write the archive file of `obj` (no children) and mark it resident.
    pub fn save(&self, obj: &Object) -> ArchiveResult<PathBuf> {
        if !obj.is_persistent() {
            return Err(ArchiveError::NotPersistent(obj.path()));
        }

        let path = self.archive_path(obj);
        if obj.archive_path().is_none() {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
        }
        self.rotate(&path)?;

        let mut src = DataSource::open_file(&path, "wb")?;
        locked(obj, || self.write_node(obj, &mut src, Scope::Listed))?;
        src.close()?;

        obj.insert_flags(ObjectFlags::RESIDENT);
        debug!(path = %path.display(), object = %obj.path(), "archive saved");
        Ok(path)
    }

    /// Load the generic part of `obj` and its subtree, then the dataset of
    /// `obj` itself. Children stay non-resident until paged in.
    pub fn load(&self, obj: &Object) -> ArchiveResult<()> {
        obj.with_vfs_lock(|| {
            self.load_generic(obj)?;
            self.load_data(obj)
        })
    }

    /// Load variables and child tables from files, recursively.
    pub fn load_generic(&self, obj: &Object) -> ArchiveResult<()> {
        obj.with_vfs_lock(|| {
            let (path, mut src) = self.open_archive(obj)?;
            let generic = self.read_generic(obj, &mut src, Scope::Listed)?;
            src.close()?;
            debug!(path = %path.display(), object = %obj.path(), "archive generic part loaded");

            let Some(generic) = generic else {
                return Ok(());
            };
            for child in generic.children.into_iter().flatten() {
                self.load_generic(&child)?;
            }
            Ok(())
        })
    }

    /// Load only the dataset of `obj`, jumping straight to it.
    pub fn load_data(&self, obj: &Object) -> ArchiveResult<()> {
        let (path, mut src) = self.open_archive(obj)?;
        let header = format::read_header(&mut src)?;
        if let Some(hierarchy) = header.hierarchy {
            if hierarchy != obj.class().hierarchy() {
                return Err(ArchiveError::ClassMismatch {
                    expected: obj.class().hierarchy().to_owned(),
                    found: hierarchy,
                });
            }
        }
        let offset = src.read_u32()?;
        let disk = ObjectFlags::from_bits_truncate(src.read_u32()?) & ObjectFlags::SAVED;
        src.seek(i64::from(offset), Whence::Set)?;

        locked(obj, || self.apply_dataset(obj, &mut src, disk))?;
        src.close()?;
        debug!(path = %path.display(), object = %obj.path(), "archive dataset loaded");
        Ok(())
    }

    /// Save `obj` and every persistent descendant.
    ///
    /// Paged-out nodes whose archive exists are skipped. Stops at the first
    /// failure; files already written stay written. Returns the number of
    /// archives written.
    pub fn save_all(&self, obj: &Object) -> ArchiveResult<usize> {
        obj.with_vfs_lock(|| self.save_subtree(obj))
    }

    fn save_subtree(&self, obj: &Object) -> ArchiveResult<usize> {
        if !obj.is_persistent() {
            return Ok(0);
        }
        let mut written = 0;
        if obj.is_resident() || self.find_archive(obj).is_none() {
            self.save(obj)?;
            written += 1;
        } else {
            trace!(object = %obj.path(), "paged out, archive is current");
        }
        for child in obj.children() {
            written += self.save_subtree(&child)?;
        }
        Ok(written)
    }
}
