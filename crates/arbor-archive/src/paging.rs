//! Paging datasets in and out, change detection and archive cleanup.

use std::fs;
use std::io;

use arbor_core::{Object, ObjectFlags};
use arbor_io::DataSource;
use tracing::{debug, trace};

use crate::archiver::{locked, Archiver, Scope};
use crate::error::ArchiveResult;

impl Archiver {
    /// Make sure the dataset of `obj` is loaded.
    pub fn page_in(&self, obj: &Object) -> ArchiveResult<()> {
        if obj.is_resident() {
            return Ok(());
        }
        self.load_data(obj)
    }

    /// Save and drop the dataset of `obj`.
    ///
    /// Nodes flagged `REMAIN_DATA`, nodes another variable refers to and
    /// nodes already paged out are left alone. The checks and the save run
    /// under the tree lock, so no reference can appear in between. Returns
    /// whether the node was paged out.
    pub fn page_out(&self, obj: &Object) -> ArchiveResult<bool> {
        locked(obj, || {
            let flags = obj.flags();
            if flags.contains(ObjectFlags::REMAIN_DATA) || !flags.contains(ObjectFlags::RESIDENT) {
                return Ok(false);
            }
            if obj.in_use() {
                trace!(object = %obj.path(), "referenced, kept resident");
                return Ok(false);
            }

            self.save(obj)?;
            obj.reset();
            obj.remove_flags(ObjectFlags::RESIDENT);
            debug!(object = %obj.path(), "paged out");
            Ok(true)
        })
    }

    /// True if saving `obj` now would produce a different archive.
    ///
    /// A node without an archive has always changed; a paged-out node
    /// with one has not.
    pub fn changed(&self, obj: &Object) -> ArchiveResult<bool> {
        let Some(path) = self.find_archive(obj) else {
            return Ok(true);
        };
        if !obj.is_resident() {
            return Ok(false);
        }

        let tmp = tempfile::NamedTempFile::new()?;
        let mut src = DataSource::from_file(tmp.reopen()?);
        locked(obj, || self.write_node(obj, &mut src, Scope::Listed))?;
        src.close()?;

        let current = fs::read(tmp.path())?;
        let stored = fs::read(&path)?;
        Ok(current != stored)
    }

    /// True if `obj` or any persistent descendant has changed.
    pub fn changed_all(&self, obj: &Object) -> ArchiveResult<bool> {
        obj.with_vfs_lock(|| {
            if obj.is_persistent() && self.changed(obj)? {
                return Ok(true);
            }
            for child in obj.children() {
                if self.changed_all(&child)? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    /// Delete the archives of `obj` and its subtree from the save path,
    /// including the directory holding the children's archives.
    pub fn unlink_datafiles(&self, obj: &Object) -> ArchiveResult<()> {
        obj.with_vfs_lock(|| {
            for child in obj.children() {
                self.unlink_datafiles(&child)?;
            }

            let path = self.archive_path(obj);
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "archive removed"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }

            let mut dir = self.config().save_path.join(self.relative_path(obj));
            dir.set_file_name(obj.name());
            if dir.is_dir() && !obj.name().is_empty() {
                fs::remove_dir_all(&dir)?;
                debug!(dir = %dir.display(), "archive directory removed");
            }
            Ok(())
        })
    }
}
