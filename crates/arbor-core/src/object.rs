//! Object tree nodes.
//!
//! An [`Object`] is a cheap, cloneable handle. Parents own their children
//! strongly; child-to-parent and root links are weak. Each node guards its
//! state with its own reentrant lock, and the root's `vfs` lock guards the
//! shape of the whole tree.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;
use tracing::debug;

use crate::class::Class;
use crate::flags::ObjectFlags;
use crate::naming::sanitize_name;
use crate::variable::Variable;

/// Notification delivered to handlers registered on an object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectEvent {
    Attached,
    Detached,
    /// A `bind_*` accessor created or retargeted the named variable.
    Bound(String),
}

/// Callback invoked for every [`ObjectEvent`] on one object.
pub type EventHandler = Arc<dyn Fn(&Object, &ObjectEvent) + Send + Sync>;

pub(crate) struct State {
    pub(crate) name: String,
    pub(crate) flags: ObjectFlags,
    pub(crate) parent: Option<ObjectRef>,
    /// `None` while this node is its own root.
    pub(crate) root: Option<ObjectRef>,
    pub(crate) children: Vec<Object>,
    pub(crate) vars: Vec<Variable>,
    pub(crate) archive_path: Option<PathBuf>,
    handlers: Vec<EventHandler>,
    ext: HashMap<TypeId, Box<dyn Any + Send>>,
    destroyed: bool,
}

pub(crate) struct Inner {
    class: Arc<Class>,
    vfs: ReentrantMutex<()>,
    state: ReentrantMutex<RefCell<State>>,
}

/// Handle to a node in an object tree.
#[derive(Clone)]
pub struct Object {
    inner: Arc<Inner>,
}

/// Weak counterpart of [`Object`], held by parent links and by object and
/// variable references.
#[derive(Clone)]
pub struct ObjectRef(Weak<Inner>);

impl ObjectRef {
    /// Live handle, if the object still exists.
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(|inner| Object { inner })
    }

    /// True if both refer to the same object.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }

    /// True if this refers to `obj`.
    pub fn points_to(&self, obj: &Object) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&obj.inner))
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(obj) => write!(f, "ObjectRef({})", obj.path()),
            None => f.write_str("ObjectRef(<dropped>)"),
        }
    }
}

impl Object {
    /// Create a detached object and run the class `init` hooks, base class
    /// first.
    pub fn new(class: &Arc<Class>, name: &str) -> Object {
        Self::with_flags(class, name, ObjectFlags::empty())
    }

    /// Create an object whose handle survives [`destroy`](Self::destroy).
    pub fn new_static(class: &Arc<Class>, name: &str) -> Object {
        Self::with_flags(class, name, ObjectFlags::STATIC)
    }

    /// Like [`new`](Self::new) with initial flags.
    pub fn with_flags(class: &Arc<Class>, name: &str, flags: ObjectFlags) -> Object {
        let state = State {
            name: sanitize_name(name),
            flags,
            parent: None,
            root: None,
            children: Vec::new(),
            vars: Vec::new(),
            archive_path: None,
            handlers: Vec::new(),
            ext: HashMap::new(),
            destroyed: false,
        };
        let obj = Object {
            inner: Arc::new(Inner {
                class: Arc::clone(class),
                vfs: ReentrantMutex::new(()),
                state: ReentrantMutex::new(RefCell::new(state)),
            }),
        };
        for class in obj.inner.class.lineage() {
            class.hooks().init(&obj);
        }
        obj
    }

    // -----------------------------------------------------------------------
    // State access
    // -----------------------------------------------------------------------

    pub(crate) fn read<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        f(&state)
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        assert!(!state.destroyed, "use of destroyed object {:?}", state.name);
        f(&mut state)
    }

    /// Run `f` holding this node's lock.
    ///
    /// The lock is reentrant: `f` may call any method on this object.
    /// Take the tree lock first when both are needed; [`path`](Self::path)
    /// and [`in_use`](Self::in_use) take it.
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.state.lock();
        f()
    }

    /// Run `f` holding the tree lock of the tree this node belongs to.
    ///
    /// The root is re-checked after the lock is acquired, so a concurrent
    /// attach or detach cannot leave the caller holding a stale tree's
    /// lock.
    pub fn with_vfs_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        loop {
            let root = self.root();
            let _guard = root.inner.vfs.lock();
            if self.root().ptr_eq(&root) {
                return f();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Identity and accessors
    // -----------------------------------------------------------------------

    pub fn class(&self) -> &Arc<Class> {
        &self.inner.class
    }

    /// Sanitized node name; empty for an unnamed root.
    pub fn name(&self) -> String {
        self.read(|s| s.name.clone())
    }

    /// True if both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Weak reference to this node.
    pub fn downgrade(&self) -> ObjectRef {
        ObjectRef(Arc::downgrade(&self.inner))
    }

    /// Parent node, or `None` for a root.
    pub fn parent(&self) -> Option<Object> {
        self.read(|s| s.parent.as_ref().and_then(ObjectRef::upgrade))
    }

    /// Root of the tree, which may be this node.
    pub fn root(&self) -> Object {
        self.read(|s| s.root.as_ref().and_then(ObjectRef::upgrade))
            .unwrap_or_else(|| self.clone())
    }

    pub fn is_root(&self) -> bool {
        self.read(|s| s.parent.is_none())
    }

    /// Snapshot of the children in order.
    pub fn children(&self) -> Vec<Object> {
        self.read(|s| s.children.clone())
    }

    pub fn child_count(&self) -> usize {
        self.read(|s| s.children.len())
    }

    /// Current flag set.
    pub fn flags(&self) -> ObjectFlags {
        self.read(|s| s.flags)
    }

    pub fn set_flags(&self, flags: ObjectFlags) {
        self.write(|s| s.flags = flags);
    }

    pub fn insert_flags(&self, flags: ObjectFlags) {
        self.write(|s| s.flags.insert(flags));
    }

    pub fn remove_flags(&self, flags: ObjectFlags) {
        self.write(|s| s.flags.remove(flags));
    }

    /// True unless flagged `NON_PERSISTENT`.
    pub fn is_persistent(&self) -> bool {
        !self.flags().contains(ObjectFlags::NON_PERSISTENT)
    }

    /// True while the dataset is loaded.
    pub fn is_resident(&self) -> bool {
        self.flags().contains(ObjectFlags::RESIDENT)
    }

    pub fn is_destroyed(&self) -> bool {
        self.read(|s| s.destroyed)
    }

    /// Explicit archive file path, used verbatim instead of the derived one.
    pub fn set_archive_path(&self, path: Option<PathBuf>) {
        self.write(|s| s.archive_path = path);
    }

    /// Explicit archive file path, if set.
    pub fn archive_path(&self) -> Option<PathBuf> {
        self.read(|s| s.archive_path.clone())
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Register `handler` for every later event on this node.
    pub fn add_event_handler(&self, handler: impl Fn(&Object, &ObjectEvent) + Send + Sync + 'static) {
        self.write(|s| s.handlers.push(Arc::new(handler)));
    }

    pub(crate) fn fire(&self, event: ObjectEvent) {
        let handlers = self.read(|s| s.handlers.clone());
        for handler in handlers {
            handler(self, &event);
        }
    }

    // -----------------------------------------------------------------------
    // Tree structure
    // -----------------------------------------------------------------------

    /// Attach this detached node as the last child of `parent`.
    ///
    /// # Panics
    ///
    /// If `parent` is `self` or a descendant of `self`, or if `self` is
    /// already attached.
    pub fn attach(&self, parent: &Object) {
        assert!(!self.ptr_eq(parent), "cannot attach {:?} to itself", self.name());

        parent.with_vfs_lock(|| {
            self.with_vfs_lock(|| {
                assert!(
                    self.is_root(),
                    "{:?} is already attached to {:?}",
                    self.name(),
                    self.parent().map(|p| p.path())
                );
                let mut up = Some(parent.clone());
                while let Some(node) = up {
                    assert!(
                        !node.ptr_eq(self),
                        "attaching {:?} below itself would create a cycle",
                        self.name()
                    );
                    up = node.parent();
                }

                if self.flags().contains(ObjectFlags::NAME_ON_ATTACH) {
                    let name = parent.gen_name(self.class());
                    self.write(|s| s.name = name);
                }

                let parent_ref = parent.downgrade();
                self.write(|s| s.parent = Some(parent_ref));
                parent.write(|s| s.children.push(self.clone()));
                self.propagate_root(&parent.root());
            })
        });

        debug!(path = %self.path(), "object attached");
        self.fire(ObjectEvent::Attached);
    }

    /// Detach this node from its parent. No-op on a root.
    pub fn detach(&self) {
        let detached = self.with_vfs_lock(|| {
            let parent = self.parent()?;
            let path = self.path();
            parent.write(|s| s.children.retain(|c| !c.ptr_eq(self)));
            self.write(|s| s.parent = None);
            self.propagate_root(self);
            Some(path)
        });
        let Some(path) = detached else {
            return;
        };

        debug!(%path, "object detached");
        self.fire(ObjectEvent::Detached);
    }

    fn propagate_root(&self, root: &Object) {
        let link = (!root.ptr_eq(self)).then(|| root.downgrade());
        let children = self.write(|s| {
            s.root = link;
            s.children.clone()
        });
        for child in children {
            child.propagate_root(root);
        }
    }

    fn reorder(&self, f: impl FnOnce(&mut Vec<Object>, usize) -> bool) -> bool {
        self.with_vfs_lock(|| {
            let Some(parent) = self.parent() else {
                return false;
            };
            parent.write(|s| {
                match s.children.iter().position(|c| c.ptr_eq(self)) {
                    Some(i) => f(&mut s.children, i),
                    None => false,
                }
            })
        })
    }

    /// Swap with the previous sibling.
    pub fn move_up(&self) -> bool {
        self.reorder(|list, i| {
            if i == 0 {
                return false;
            }
            list.swap(i, i - 1);
            true
        })
    }

    /// Swap with the next sibling.
    pub fn move_down(&self) -> bool {
        self.reorder(|list, i| {
            if i + 1 >= list.len() {
                return false;
            }
            list.swap(i, i + 1);
            true
        })
    }

    /// Make this the first child of its parent.
    pub fn move_to_head(&self) -> bool {
        self.reorder(|list, i| {
            let node = list.remove(i);
            list.insert(0, node);
            i != 0
        })
    }

    /// Make this the last child of its parent.
    pub fn move_to_tail(&self) -> bool {
        self.reorder(|list, i| {
            let node = list.remove(i);
            list.push(node);
            i + 1 != list.len()
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Run the class `reset` hooks, leaf class first.
    pub fn reset(&self) {
        for class in self.inner.class.lineage().rev() {
            class.hooks().reset(self);
        }
    }

    /// Destroy this detached node and its subtree.
    ///
    /// Children are detached and destroyed first, then the node is
    /// [`reset`](Self::reset) and the `destroy` hooks run leaf class
    /// first. A static node is emptied and stays usable; any other node
    /// rejects further mutation.
    ///
    /// # Panics
    ///
    /// If the node is still attached to a parent.
    pub fn destroy(&self) {
        assert!(
            self.is_root(),
            "cannot destroy {:?} while it is attached",
            self.path()
        );

        for child in self.children() {
            child.detach();
            child.destroy();
        }
        self.reset();
        for class in self.inner.class.lineage().rev() {
            class.hooks().destroy(self);
        }

        let name = self.name();
        let removed = self.write(|s| {
            let removed = (
                std::mem::take(&mut s.vars),
                std::mem::take(&mut s.handlers),
                std::mem::take(&mut s.ext),
            );
            s.archive_path = None;
            if !s.flags.contains(ObjectFlags::STATIC) {
                s.destroyed = true;
            }
            removed
        });
        drop(removed);
        debug!(%name, "object destroyed");
    }

    /// True if any variable in this tree refers to `self` by object or
    /// variable reference.
    pub fn in_use(&self) -> bool {
        self.with_vfs_lock(|| {
            let mut stack = vec![self.root()];
            while let Some(node) = stack.pop() {
                let found = node.read(|s| {
                    stack.extend(s.children.iter().cloned());
                    s.vars.iter().any(|v| v.refers_to(self))
                });
                if found {
                    return true;
                }
            }
            false
        })
    }

    // -----------------------------------------------------------------------
    // Per-class extension data
    // -----------------------------------------------------------------------

    /// Store a typed dataset, returning any previous value of the same type.
    pub fn set_ext<T: Any + Send>(&self, value: T) -> Option<T> {
        let old = self.write(|s| s.ext.insert(TypeId::of::<T>(), Box::new(value)));
        old.and_then(|b| b.downcast::<T>().ok()).map(|b| *b)
    }

    /// Run `f` on the stored dataset of type `T`.
    ///
    /// The value is taken out of the node for the duration of `f`, so `f`
    /// may freely call back into this object.
    pub fn with_ext<T: Any + Send, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let key = TypeId::of::<T>();
        let mut boxed = self.write(|s| s.ext.remove(&key))?;
        let result = boxed.downcast_mut::<T>().map(f);
        self.write(|s| {
            s.ext.entry(key).or_insert(boxed);
        });
        result
    }

    /// Remove and return the ext data of type `T`.
    pub fn take_ext<T: Any + Send>(&self) -> Option<T> {
        let boxed = self.write(|s| s.ext.remove(&TypeId::of::<T>()))?;
        boxed.downcast::<T>().ok().map(|b| *b)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("path", &self.path())
            .field("class", &self.inner.class.hierarchy())
            .field("flags", &self.flags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassHooks, ClassRegistry, ClassSpec};
    use parking_lot::Mutex;
    use proptest::prelude::*;

    fn group() -> Arc<Class> {
        ClassRegistry::new().register(ClassSpec::new("Group")).unwrap()
    }

    // -----------------------------------------------------------------------
    // Attach / detach
    // -----------------------------------------------------------------------

    #[test]
    fn attach_and_detach_update_root() {
        let class = group();
        let root = Object::new(&class, "root");
        let a = Object::new(&class, "child1");

        a.attach(&root);
        assert!(a.root().ptr_eq(&root));
        assert_eq!(root.children(), vec![a.clone()]);
        assert_eq!(a.parent(), Some(root.clone()));

        a.detach();
        assert!(a.root().ptr_eq(&a));
        assert!(root.children().is_empty());
        assert!(a.parent().is_none());
    }

    #[test]
    fn root_propagates_through_subtree() {
        let class = group();
        let root = Object::new(&class, "root");
        let a = Object::new(&class, "a");
        let b = Object::new(&class, "b");
        b.attach(&a);
        assert!(b.root().ptr_eq(&a));

        a.attach(&root);
        assert!(b.root().ptr_eq(&root));

        a.detach();
        assert!(b.root().ptr_eq(&a));
    }

    #[test]
    fn detach_root_is_noop() {
        let root = Object::new(&group(), "root");
        root.detach();
        assert!(root.is_root());
    }

    #[test]
    #[should_panic(expected = "to itself")]
    fn attach_to_self_panics() {
        let a = Object::new(&group(), "a");
        a.attach(&a);
    }

    #[test]
    #[should_panic(expected = "cycle")]
    fn attach_below_descendant_panics() {
        let class = group();
        let a = Object::new(&class, "a");
        let b = Object::new(&class, "b");
        b.attach(&a);
        a.attach(&b);
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn attach_twice_panics() {
        let class = group();
        let p = Object::new(&class, "p");
        let q = Object::new(&class, "q");
        let a = Object::new(&class, "a");
        a.attach(&p);
        a.attach(&q);
    }

    #[test]
    fn name_on_attach_generates_unique_names() {
        let class = group();
        let root = Object::new(&class, "root");
        let a = Object::with_flags(&class, "", ObjectFlags::NAME_ON_ATTACH);
        let b = Object::with_flags(&class, "", ObjectFlags::NAME_ON_ATTACH);
        a.attach(&root);
        b.attach(&root);
        assert_eq!(a.name(), "group0");
        assert_eq!(b.name(), "group1");
    }

    #[test]
    fn attach_and_detach_fire_events() {
        let class = group();
        let root = Object::new(&class, "root");
        let a = Object::new(&class, "a");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        a.add_event_handler(move |obj, ev| sink.lock().push((obj.name(), ev.clone())));

        a.attach(&root);
        a.detach();
        assert_eq!(
            *seen.lock(),
            vec![
                ("a".to_owned(), ObjectEvent::Attached),
                ("a".to_owned(), ObjectEvent::Detached),
            ]
        );
    }

    #[test]
    fn racing_detach_fires_once() {
        let class = group();
        for _ in 0..50 {
            let root = Object::new(&class, "root");
            let a = Object::new(&class, "a");
            a.attach(&root);
            let detached = Arc::new(Mutex::new(0usize));
            let sink = Arc::clone(&detached);
            a.add_event_handler(move |_, ev| {
                if *ev == ObjectEvent::Detached {
                    *sink.lock() += 1;
                }
            });

            std::thread::scope(|scope| {
                for _ in 0..4 {
                    let a = a.clone();
                    scope.spawn(move || a.detach());
                }
            });

            assert_eq!(*detached.lock(), 1);
            assert!(a.is_root());
            assert_eq!(root.child_count(), 0);
        }
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    #[test]
    fn reorder_children() {
        let class = group();
        let root = Object::new(&class, "root");
        let kids: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|n| {
                let o = Object::new(&class, n);
                o.attach(&root);
                o
            })
            .collect();
        let order = || root.children().iter().map(Object::name).collect::<Vec<_>>();

        assert!(!kids[0].move_up());
        assert!(kids[2].move_up());
        assert_eq!(order(), ["a", "c", "b"]);
        assert!(kids[0].move_to_tail());
        assert_eq!(order(), ["c", "b", "a"]);
        assert!(kids[0].move_to_head());
        assert_eq!(order(), ["a", "c", "b"]);
        assert!(!kids[1].move_down());
        assert!(kids[0].move_down());
        assert_eq!(order(), ["c", "a", "b"]);
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ClassHooks for Recorder {
        fn init(&self, _obj: &Object) {
            self.log.lock().push(format!("init {}", self.tag));
        }
        fn reset(&self, _obj: &Object) {
            self.log.lock().push(format!("reset {}", self.tag));
        }
        fn destroy(&self, _obj: &Object) {
            self.log.lock().push(format!("destroy {}", self.tag));
        }
    }

    fn recorded_class(log: &Arc<Mutex<Vec<String>>>) -> Arc<Class> {
        let reg = ClassRegistry::new();
        let hooks = |tag| Arc::new(Recorder { tag, log: Arc::clone(log) });
        reg.register(ClassSpec::new("Base").hooks(hooks("base"))).unwrap();
        reg.register(ClassSpec::new("Leaf").parent("Object:Base").hooks(hooks("leaf")))
            .unwrap()
    }

    #[test]
    fn hooks_run_in_lineage_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let obj = Object::new(&recorded_class(&log), "x");
        obj.reset();
        assert_eq!(*log.lock(), ["init base", "init leaf", "reset leaf", "reset base"]);
    }

    #[test]
    fn destroy_resets_before_destroy_hooks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let obj = Object::new(&recorded_class(&log), "x");
        log.lock().clear();

        obj.destroy();
        assert_eq!(
            *log.lock(),
            ["reset leaf", "reset base", "destroy leaf", "destroy base"]
        );
    }

    #[test]
    fn destroy_resets_children_too() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let class = recorded_class(&log);
        let parent = Object::new(&class, "p");
        Object::new(&class, "c").attach(&parent);
        log.lock().clear();

        parent.destroy();
        let log = log.lock();
        assert_eq!(log.iter().filter(|e| e.starts_with("reset")).count(), 4);
        assert_eq!(log.iter().filter(|e| e.starts_with("destroy")).count(), 4);
    }

    #[test]
    #[should_panic(expected = "while it is attached")]
    fn destroy_attached_panics() {
        let class = group();
        let root = Object::new(&class, "root");
        let a = Object::new(&class, "a");
        a.attach(&root);
        a.destroy();
    }

    #[test]
    #[should_panic(expected = "use of destroyed object")]
    fn destroyed_handle_rejects_mutation() {
        let a = Object::new(&group(), "a");
        let alias = a.clone();
        a.destroy();
        assert!(alias.is_destroyed());
        alias.insert_flags(ObjectFlags::READONLY);
    }

    #[test]
    fn static_object_survives_destroy() {
        let class = group();
        let a = Object::new_static(&class, "a");
        let child = Object::new(&class, "c");
        child.attach(&a);
        a.set_ext(5u32);

        a.destroy();
        assert!(!a.is_destroyed());
        assert!(a.children().is_empty());
        assert!(child.is_destroyed());
        assert_eq!(a.take_ext::<u32>(), None);
        a.insert_flags(ObjectFlags::READONLY);
    }

    // -----------------------------------------------------------------------
    // Extension data and locks
    // -----------------------------------------------------------------------

    #[test]
    fn ext_data_is_typed() {
        let a = Object::new(&group(), "a");
        assert_eq!(a.set_ext(String::from("x")), None);
        assert_eq!(a.set_ext(3u8), None);
        assert_eq!(a.with_ext(|s: &mut String| s.push('y')), Some(()));
        assert_eq!(a.with_ext(|n: &mut u8| *n), Some(3));
        assert_eq!(a.with_ext(|_: &mut i64| ()), None);
        assert_eq!(a.take_ext::<String>().as_deref(), Some("xy"));
    }

    #[test]
    fn locks_are_reentrant() {
        let class = group();
        let root = Object::new(&class, "root");
        let a = Object::new(&class, "a");
        a.attach(&root);
        let n = a.with_vfs_lock(|| root.with_vfs_lock(|| a.with_lock(|| a.with_lock(|| a.child_count()))));
        assert_eq!(n, 0);
    }

    #[test]
    fn tree_is_shared_across_threads() {
        let class = group();
        let root = Object::new(&class, "root");
        std::thread::scope(|scope| {
            for i in 0..4 {
                let root = root.clone();
                let class = Arc::clone(&class);
                scope.spawn(move || {
                    let o = Object::new(&class, &format!("t{i}"));
                    o.attach(&root);
                });
            }
        });
        assert_eq!(root.child_count(), 4);
    }

    // -----------------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn parent_links_stay_consistent(ops in proptest::collection::vec((0usize..8, 0usize..8, any::<bool>()), 0..40)) {
            let class = group();
            let nodes: Vec<_> = (0..8).map(|i| Object::new(&class, &format!("n{i}"))).collect();

            for (a, b, attach) in ops {
                let (x, y) = (&nodes[a], &nodes[b]);
                if attach {
                    let mut up = Some(y.clone());
                    let mut cyclic = false;
                    while let Some(n) = up {
                        cyclic |= n.ptr_eq(x);
                        up = n.parent();
                    }
                    if x.is_root() && !cyclic {
                        x.attach(y);
                    }
                } else {
                    x.detach();
                }
            }

            for o in &nodes {
                match o.parent() {
                    None => prop_assert!(o.root().ptr_eq(o)),
                    Some(p) => {
                        let hits = p.children().iter().filter(|c| c.ptr_eq(o)).count();
                        prop_assert_eq!(hits, 1);
                        prop_assert!(o.root().ptr_eq(&p.root()));
                    }
                }
            }
        }
    }
}
