//! Object names, paths and tree lookups.

use tracing::trace;

use crate::class::Class;
use crate::object::Object;
use crate::variable::clamp_name;

/// Longest object name, in bytes. Longer names are truncated.
pub const OBJECT_NAME_MAX: usize = 64;

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '/';

/// Replace path separators with `_` and truncate to [`OBJECT_NAME_MAX`].
pub fn sanitize_name(name: &str) -> String {
    let clean = name.replace(PATH_SEPARATOR, "_");
    clamp_name(&clean, OBJECT_NAME_MAX).to_owned()
}

fn stem(class: &Class) -> String {
    let stem: String = class
        .name()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if stem.is_empty() {
        "object".to_owned()
    } else {
        stem
    }
}

impl Object {
    pub fn set_name(&self, name: &str) {
        let name = sanitize_name(name);
        trace!(old = %self.name(), new = %name, "object renamed");
        self.write(|s| s.name = name);
    }

    /// Absolute path: `/root` for a root, `/root/a/b` below it.
    ///
    /// A root with an empty name contributes no segment, so its own path is
    /// `/` and its children are `/a`.
    pub fn path(&self) -> String {
        self.with_vfs_lock(|| {
            let mut segments = Vec::new();
            let mut node = Some(self.clone());
            while let Some(n) = node {
                let (name, parent) = n.read(|s| (s.name.clone(), s.parent.clone()));
                match parent.and_then(|p| p.upgrade()) {
                    Some(p) => {
                        segments.push(name);
                        node = Some(p);
                    }
                    None => {
                        if !name.is_empty() {
                            segments.push(name);
                        }
                        node = None;
                    }
                }
            }
            let mut path = String::new();
            for segment in segments.iter().rev() {
                path.push(PATH_SEPARATOR);
                path.push_str(segment);
            }
            if path.is_empty() {
                path.push(PATH_SEPARATOR);
            }
            path
        })
    }

    pub fn find_child(&self, name: &str) -> Option<Object> {
        self.read(|s| s.children.iter().find(|c| c.name() == name).cloned())
    }

    /// Resolve a path.
    ///
    /// An absolute path starts at the root and names it first (unless the
    /// root's name is empty); a relative path starts at `self`.
    pub fn find(&self, path: &str) -> Option<Object> {
        self.with_vfs_lock(|| {
            let mut segments = path.split(PATH_SEPARATOR).filter(|s| !s.is_empty());
            let mut node = if path.starts_with(PATH_SEPARATOR) {
                let root = self.root();
                let root_name = root.name();
                if !root_name.is_empty() && segments.next()? != root_name {
                    return None;
                }
                root
            } else {
                self.clone()
            };
            for segment in segments {
                node = node.find_child(segment)?;
            }
            Some(node)
        })
    }

    /// Nearest ancestor matching an optional name and an optional class
    /// pattern (see [`Class::is_a`]).
    pub fn find_parent(&self, name: Option<&str>, class: Option<&str>) -> Option<Object> {
        self.with_vfs_lock(|| {
            let mut node = self.parent();
            while let Some(n) = node {
                let name_ok = name.map_or(true, |want| n.name() == want);
                let class_ok = class.map_or(true, |pattern| n.class().is_a(pattern));
                if name_ok && class_ok {
                    return Some(n);
                }
                node = n.parent();
            }
            None
        })
    }

    /// Unused child name derived from a class name, e.g. `button0`.
    pub fn gen_name(&self, class: &Class) -> String {
        self.gen_name_prefix(&stem(class))
    }

    /// `prefix` followed by the smallest integer no child uses yet.
    pub fn gen_name_prefix(&self, prefix: &str) -> String {
        let taken: Vec<u64> = self.read(|s| {
            s.children
                .iter()
                .filter_map(|c| c.name().strip_prefix(prefix)?.parse().ok())
                .collect()
        });
        let n = (0u64..).find(|n| !taken.contains(n)).unwrap_or_default();
        sanitize_name(&format!("{prefix}{n}"))
    }
}
