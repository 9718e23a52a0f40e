//! Classes, lifecycle hooks and the class registry.
//!
//! A class is data: a name, the colon-joined hierarchy string that
//! identifies it in archives, a dataset version and a set of hooks. The
//! ancestry is flattened once at registration so lifecycle phases can walk
//! it forward or backward without recursion.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arbor_io::DataSource;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::object::Object;

/// Separator between class names in a hierarchy string.
pub const HIERARCHY_SEPARATOR: char = ':';

/// Name of the implicit base class every class derives from.
pub const BASE_CLASS: &str = "Object";

/// Dataset version of one class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Per-class behavior.
///
/// `init`, `load` and `save` run base class first; `reset` and `destroy`
/// run leaf class first. `load` must consume exactly what `save` wrote,
/// since datasets carry no length prefix.
pub trait ClassHooks: Send + Sync {
    fn init(&self, _obj: &Object) {}

    fn reset(&self, _obj: &Object) {}

    fn destroy(&self, _obj: &Object) {}

    fn load(&self, _obj: &Object, _src: &mut DataSource<'_>, _version: Version) -> CoreResult<()> {
        Ok(())
    }

    fn save(&self, _obj: &Object, _src: &mut DataSource<'_>) -> CoreResult<()> {
        Ok(())
    }
}

struct NoHooks;

impl ClassHooks for NoHooks {}

/// Builder for a class registration.
pub struct ClassSpec {
    name: String,
    parent: Option<String>,
    version: Version,
    libs: String,
    hooks: Arc<dyn ClassHooks>,
}

impl ClassSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            version: Version::new(1, 0),
            libs: String::new(),
            hooks: Arc::new(NoHooks),
        }
    }

    /// Hierarchy string of the parent class. Defaults to the base class.
    pub fn parent(mut self, hierarchy: impl Into<String>) -> Self {
        self.parent = Some(hierarchy.into());
        self
    }

    pub fn version(mut self, major: u32, minor: u32) -> Self {
        self.version = Version::new(major, minor);
        self
    }

    /// Library reference string recorded in archive headers.
    pub fn libs(mut self, libs: impl Into<String>) -> Self {
        self.libs = libs.into();
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ClassHooks>) -> Self {
        self.hooks = hooks;
        self
    }
}

/// A registered class.
pub struct Class {
    name: String,
    hierarchy: String,
    version: Version,
    libs: String,
    hooks: Arc<dyn ClassHooks>,
    /// Base class first, direct parent last.
    ancestors: Vec<Arc<Class>>,
}

impl Class {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Colon-joined ancestry, e.g. `Object:Group:Window`.
    pub fn hierarchy(&self) -> &str {
        &self.hierarchy
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn libs(&self) -> &str {
        &self.libs
    }

    pub fn hooks(&self) -> &dyn ClassHooks {
        self.hooks.as_ref()
    }

    pub fn parent(&self) -> Option<&Arc<Class>> {
        self.ancestors.last()
    }

    /// Every class from the base down to `self`.
    pub fn lineage(&self) -> impl DoubleEndedIterator<Item = &Class> + '_ {
        self.ancestors
            .iter()
            .map(|c| c.as_ref())
            .chain(std::iter::once(self))
    }

    /// Match against a hierarchy string.
    ///
    /// A trailing `:*` matches the named class and every subclass; a bare
    /// class name matches the leaf name only.
    pub fn is_a(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix(":*") {
            return self.hierarchy == prefix
                || self
                    .hierarchy
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with(HIERARCHY_SEPARATOR));
        }
        if pattern.contains(HIERARCHY_SEPARATOR) {
            self.hierarchy == pattern
        } else {
            self.name == pattern
        }
    }
}

/// Text after the last separator of a hierarchy string.
pub fn short_name(hierarchy: &str) -> &str {
    hierarchy
        .rsplit_once(HIERARCHY_SEPARATOR)
        .map_or(hierarchy, |(_, leaf)| leaf)
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("hierarchy", &self.hierarchy)
            .field("version", &self.version)
            .finish()
    }
}

/// Registry of classes keyed by hierarchy string.
///
/// Shared by `Arc` between every component that creates objects by class;
/// there is no process-wide instance.
pub struct ClassRegistry {
    classes: RwLock<HashMap<String, Arc<Class>>>,
    base: Arc<Class>,
}

impl ClassRegistry {
    /// A registry holding only the base class.
    pub fn new() -> Self {
        let base = Arc::new(Class {
            name: BASE_CLASS.to_owned(),
            hierarchy: BASE_CLASS.to_owned(),
            version: Version::new(1, 0),
            libs: String::new(),
            hooks: Arc::new(NoHooks),
            ancestors: Vec::new(),
        });
        let mut classes = HashMap::new();
        classes.insert(base.hierarchy.clone(), Arc::clone(&base));
        Self {
            classes: RwLock::new(classes),
            base,
        }
    }

    pub fn base(&self) -> Arc<Class> {
        Arc::clone(&self.base)
    }

    pub fn register(&self, spec: ClassSpec) -> CoreResult<Arc<Class>> {
        if spec.name.is_empty() || spec.name.contains(HIERARCHY_SEPARATOR) {
            return Err(CoreError::InvalidClassName(spec.name));
        }

        let parent = match &spec.parent {
            Some(hier) => self
                .lookup(hier)
                .ok_or_else(|| CoreError::UnknownClass(hier.clone()))?,
            None => self.base(),
        };

        let hierarchy = format!("{}{}{}", parent.hierarchy, HIERARCHY_SEPARATOR, spec.name);
        let mut ancestors = parent.ancestors.clone();
        ancestors.push(Arc::clone(&parent));

        let class = Arc::new(Class {
            name: spec.name,
            hierarchy,
            version: spec.version,
            libs: spec.libs,
            hooks: spec.hooks,
            ancestors,
        });

        let mut classes = self.classes.write();
        if classes.contains_key(&class.hierarchy) {
            return Err(CoreError::DuplicateClass(class.hierarchy.clone()));
        }
        classes.insert(class.hierarchy.clone(), Arc::clone(&class));

        debug!(class = %class.hierarchy, version = %class.version, "class registered");
        Ok(class)
    }

    /// Class registered under the full `hierarchy` name.
    pub fn lookup(&self, hierarchy: &str) -> Option<Arc<Class>> {
        self.classes.read().get(hierarchy).cloned()
    }

    /// First class whose leaf name is `name`.
    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<Class>> {
        self.classes
            .read()
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.len())
            .finish()
    }
}
