//! Variable accessors on [`Object`].
//!
//! Every setter locates the named variable or creates it, then coerces it
//! to the requested form. An existing variable of another type is replaced
//! in place under the node lock; bound storage it referred to is released
//! by dropping the reference, never freed.

use std::borrow::Cow;

use tracing::{trace, warn};

use crate::error::{CoreError, CoreResult};
use crate::object::{Object, ObjectEvent, State};
use crate::types::VarType;
use crate::value::{AnyPtr, Binding, ExtLock, FlagBinding, Shared, StrBuf, Uint, Value, VarScalar};
use crate::variable::{clamp_name, Data, Variable, VARIABLE_NAME_MAX};

fn key(name: &str) -> &str {
    clamp_name(name, VARIABLE_NAME_MAX)
}

/// Previous data of a replaced variable, dropped once the node lock is
/// released.
struct Replaced {
    prev: Option<Data>,
    change: Option<(VarType, VarType)>,
}

/// Result of a setter's critical section.
enum Outcome<T> {
    Stored(Replaced),
    /// The variable is bound; `T` carries what is needed to write through.
    Bound(T),
}

/// Give `name` in `s` new data, creating it if missing.
fn replace_data(s: &mut State, name: &str, data: Data, lock: Option<ExtLock>) -> Replaced {
    match s.vars.iter_mut().find(|v| v.name == name) {
        Some(var) => {
            let old = var.var_type();
            let new = data.var_type();
            let prev = std::mem::replace(&mut var.data, data);
            var.lock = lock;
            Replaced {
                prev: Some(prev),
                change: (old != new).then_some((old, new)),
            }
        }
        None => {
            s.vars.push(Variable::new(name, data, lock));
            Replaced {
                prev: None,
                change: None,
            }
        }
    }
}

fn finish(name: &str, replaced: Replaced) {
    if let Some((old, new)) = replaced.change {
        trace!(var = name, ?old, ?new, "variable type changed");
    }
    drop(replaced.prev);
}

/// Bound string storage picked out of a variable under the node lock.
struct BoundString {
    cell: Shared<StrBuf>,
    lock: Option<ExtLock>,
}

impl BoundString {
    fn assign(&self, name: &str, text: &str) {
        let _guard = self.lock.as_ref().map(|l| l.lock());
        let mut buf = self.cell.lock();
        if buf.assign(text) {
            warn!(
                var = name,
                len = text.len(),
                capacity = buf.capacity(),
                "string truncated into bound buffer"
            );
        }
    }
}

impl Object {
    pub(crate) fn with_var<R>(&self, name: &str, f: impl FnOnce(&Variable) -> R) -> Option<R> {
        let name = key(name);
        self.read(|s| s.vars.iter().find(|v| v.name == name).map(f))
    }

    /// Locate-or-create `name` and give it `data`.
    fn put(&self, name: &str, data: Data, lock: Option<ExtLock>) {
        let name = key(name);
        let replaced = self.write(|s| replace_data(s, name, data, lock));
        finish(name, replaced);
    }

    fn bind_data(&self, name: &str, data: Data, lock: Option<ExtLock>) {
        self.put(name, data, lock);
        self.fire(ObjectEvent::Bound(key(name).to_owned()));
    }

    // -----------------------------------------------------------------------
    // Set / bind
    // -----------------------------------------------------------------------

    /// Store an immediate copy of `value`.
    pub fn set<T: VarScalar>(&self, name: &str, value: T) {
        self.put(name, Data::Value(value.into_value()), None);
    }

    /// Store an immediate copy of a dynamically typed value.
    pub fn set_value(&self, name: &str, value: Value) {
        match value {
            Value::String(s) => self.set_string_nodup(name, s),
            v => self.put(name, Data::Value(v), None),
        }
    }

    /// Refer to caller-owned storage.
    pub fn bind<T: VarScalar>(&self, name: &str, cell: &Shared<T>) {
        self.bind_data(name, Data::Bound(T::binding(cell.clone())), None);
    }

    /// Refer to caller-owned storage guarded by `lock` on every access.
    pub fn bind_locked<T: VarScalar>(&self, name: &str, cell: &Shared<T>, lock: &ExtLock) {
        self.bind_data(name, Data::Bound(T::binding(cell.clone())), Some(lock.clone()));
    }

    /// Store a copy of `text`.
    ///
    /// A bound string keeps its buffer and receives a truncated copy.
    pub fn set_string(&self, name: &str, text: &str) {
        self.put_string(name, Cow::Borrowed(text));
    }

    /// Like [`set_string`](Self::set_string), adopting `text` instead of
    /// copying it when the variable is not bound.
    pub fn set_string_nodup(&self, name: &str, text: String) {
        self.put_string(name, Cow::Owned(text));
    }

    /// Decide between bound assignment and replacement in one critical
    /// section; the bound buffer itself is written after the node lock is
    /// released.
    fn put_string(&self, name: &str, text: Cow<'_, str>) {
        let name = key(name);
        let outcome = self.write(|s| {
            if let Some(var) = s.vars.iter().find(|v| v.name == name) {
                if let Data::Bound(Binding::String(cell)) = &var.data {
                    let bound = BoundString {
                        cell: cell.clone(),
                        lock: var.lock.clone(),
                    };
                    return Outcome::Bound((bound, text));
                }
            }
            let data = Data::Value(Value::String(text.into_owned()));
            Outcome::Stored(replace_data(s, name, data, None))
        });
        match outcome {
            Outcome::Stored(replaced) => finish(name, replaced),
            Outcome::Bound((bound, text)) => bound.assign(name, &text),
        }
    }

    pub fn bind_string(&self, name: &str, cell: &Shared<StrBuf>) {
        self.bind_data(name, Data::Bound(Binding::String(cell.clone())), None);
    }

    pub fn bind_string_locked(&self, name: &str, cell: &Shared<StrBuf>, lock: &ExtLock) {
        self.bind_data(name, Data::Bound(Binding::String(cell.clone())), Some(lock.clone()));
    }

    pub fn set_pointer(&self, name: &str, ptr: AnyPtr) {
        self.put(name, Data::Pointer(ptr), None);
    }

    pub fn set_const_pointer(&self, name: &str, ptr: AnyPtr) {
        self.put(name, Data::ConstPointer(ptr), None);
    }

    /// Bind bit `mask` of a machine-width word.
    pub fn bind_flag(&self, name: &str, word: &Shared<Uint>, mask: u32) {
        self.bind_data(name, Data::Flag(FlagBinding::Word(word.clone(), mask)), None);
    }

    pub fn bind_flag8(&self, name: &str, word: &Shared<u8>, mask: u8) {
        self.bind_data(name, Data::Flag(FlagBinding::Bits8(word.clone(), mask)), None);
    }

    pub fn bind_flag16(&self, name: &str, word: &Shared<u16>, mask: u16) {
        self.bind_data(name, Data::Flag(FlagBinding::Bits16(word.clone(), mask)), None);
    }

    pub fn bind_flag32(&self, name: &str, word: &Shared<u32>, mask: u32) {
        self.bind_data(name, Data::Flag(FlagBinding::Bits32(word.clone(), mask)), None);
    }

    /// Refer to another object without keeping it alive.
    pub fn bind_object(&self, name: &str, target: &Object) {
        self.bind_data(name, Data::Object(target.downgrade()), None);
    }

    /// Refer to variable `var` of `target`; reads resolve through it.
    pub fn bind_variable(&self, name: &str, target: &Object, var: &str) {
        let data = Data::Variable {
            target: target.downgrade(),
            key: key(var).to_owned(),
        };
        self.bind_data(name, data, None);
    }

    // -----------------------------------------------------------------------
    // Get
    // -----------------------------------------------------------------------

    /// Read a scalar, dereferencing bound storage.
    ///
    /// # Panics
    ///
    /// If the variable does not exist or does not hold a `T`.
    pub fn get<T: VarScalar>(&self, name: &str) -> T {
        match self.try_get(name) {
            Ok(Some(v)) => v,
            Ok(None) => panic!("no variable {name:?} on {}", self.path()),
            Err(e) => panic!("{e} on {}", self.path()),
        }
    }

    /// Read a scalar: `Ok(None)` if missing, an error if of another type.
    pub fn try_get<T: VarScalar>(&self, name: &str) -> CoreResult<Option<T>> {
        let Some(var) = self.variable(name) else {
            return Ok(None);
        };
        let value = var.value();
        match value.as_ref().and_then(T::from_value) {
            Some(v) => Ok(Some(v)),
            None => Err(CoreError::TypeMismatch {
                name: var.name,
                expected: T::TYPE,
                found: value.map_or(var.data.var_type(), |v| v.var_type()),
            }),
        }
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        self.variable(name)?.string()
    }

    pub fn get_flag(&self, name: &str) -> Option<bool> {
        self.variable(name)?.flag()
    }

    /// Set or clear a bound flag. Returns `false` if `name` is not a flag.
    pub fn set_flag(&self, name: &str, on: bool) -> bool {
        self.variable(name).is_some_and(|v| v.set_flag(on))
    }

    pub fn get_pointer(&self, name: &str) -> Option<AnyPtr> {
        self.variable(name)?.pointer()
    }

    pub fn get_object(&self, name: &str) -> Option<Object> {
        self.variable(name)?.object()
    }

    // -----------------------------------------------------------------------
    // Table
    // -----------------------------------------------------------------------

    pub fn unset(&self, name: &str) -> bool {
        let name = key(name);
        self.write(|s| {
            let before = s.vars.len();
            s.vars.retain(|v| v.name != name);
            s.vars.len() != before
        })
    }

    /// Shallow copy of the named variable.
    pub fn variable(&self, name: &str) -> Option<Variable> {
        self.with_var(name, Variable::clone)
    }

    /// Shallow copies of every variable, in creation order.
    pub fn variables(&self) -> Vec<Variable> {
        self.read(|s| s.vars.clone())
    }

    pub fn variable_type(&self, name: &str) -> Option<VarType> {
        self.with_var(name, Variable::var_type)
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.read(|s| s.vars.iter().map(|v| v.name.clone()).collect())
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.with_var(name, |_| ()).is_some()
    }

    /// Dereferencing duplicate of the named variable.
    pub fn deref_variable(&self, name: &str) -> CoreResult<Option<Variable>> {
        self.variable(name).map(|v| v.deref()).transpose()
    }

    pub fn print_variable(&self, name: &str) -> Option<String> {
        Some(self.variable(name)?.print())
    }

    /// Restore an archived value.
    ///
    /// A bound variable whose target type matches receives the value
    /// through its binding; anything else is replaced by a value-form copy.
    pub fn load_value(&self, name: &str, value: Value) {
        let name = key(name);
        let outcome = self.write(|s| {
            if let Some(var) = s.vars.iter().find(|v| v.name == name) {
                if var.is_bound() && var.var_type().target() == value.var_type() {
                    return Outcome::Bound((var.clone(), value));
                }
            }
            Outcome::Stored(replace_data(s, name, Data::Value(value), None))
        });
        match outcome {
            Outcome::Stored(replaced) => finish(name, replaced),
            Outcome::Bound((var, value)) => {
                if var.store(&value) == Some(true) {
                    warn!(var = name, "archived string truncated into bound buffer");
                }
            }
        }
    }

    /// Drop the value of `name`, leaving a typeless variable in its place.
    pub fn clear(&self, name: &str) {
        self.put(name, Data::Null, None);
    }

    // -----------------------------------------------------------------------
    // Substitution
    // -----------------------------------------------------------------------

    /// Expand `$(key)` tokens.
    ///
    /// `name` and `class` resolve to this object's name and leaf class
    /// name; other keys print the variable of that name. Unknown keys
    /// expand to nothing. An unterminated `$(` is copied verbatim.
    pub fn subst(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("$(") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find(')') else {
                out.push_str(&rest[start..]);
                return out;
            };
            let token = &after[..end];
            match token {
                "name" => out.push_str(&self.name()),
                "class" => out.push_str(self.class().name()),
                _ => {
                    if let Some(text) = self.print_variable(token) {
                        out.push_str(&text);
                    }
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{Class, ClassRegistry, ClassSpec};
    use crate::value::{ext_lock, shared, Int, Long};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn class() -> Arc<Class> {
        ClassRegistry::new().register(ClassSpec::new("Thing")).unwrap()
    }

    fn obj() -> Object {
        Object::new(&class(), "o")
    }

    // -----------------------------------------------------------------------
    // Set and type mutation
    // -----------------------------------------------------------------------

    #[test]
    fn set_then_mutate_to_string() {
        let o = obj();
        o.set("count", 42u32);
        assert_eq!(o.get::<u32>("count"), 42);

        o.set_string("count", "hello");
        assert_eq!(o.variable_type("count"), Some(VarType::String));
        assert_eq!(o.get_string("count").as_deref(), Some("hello"));
        assert!(matches!(
            o.try_get::<u32>("count"),
            Err(CoreError::TypeMismatch { found: VarType::String, .. })
        ));
        assert_eq!(o.variable_names(), ["count"]);
    }

    #[test]
    fn set_same_type_reuses_slot() {
        let o = obj();
        o.set("a", 1i64);
        o.set("b", 2i64);
        o.set("a", 3i64);
        assert_eq!(o.variable_names(), ["a", "b"]);
        assert_eq!(o.get::<i64>("a"), 3);
    }

    #[test]
    fn machine_width_types_are_distinct() {
        let o = obj();
        o.set("i", Int(-5));
        o.set("l", Long(1 << 40));
        assert_eq!(o.variable_type("i"), Some(VarType::Int));
        assert_eq!(o.get::<Int>("i"), Int(-5));
        assert!(o.try_get::<i32>("i").is_err());
        assert_eq!(o.get::<Long>("l"), Long(1 << 40));
    }

    #[test]
    #[should_panic(expected = "no variable")]
    fn get_missing_panics() {
        obj().get::<u8>("nope");
    }

    #[test]
    fn try_get_missing_is_none() {
        assert!(matches!(obj().try_get::<u8>("nope"), Ok(None)));
    }

    // -----------------------------------------------------------------------
    // Bind
    // -----------------------------------------------------------------------

    #[test]
    fn bind_reads_and_writes_through() {
        let o = obj();
        let cell = shared(10u16);
        o.bind("w", &cell);
        assert_eq!(o.variable_type("w"), Some(VarType::PUint16));
        *cell.lock() = 11;
        assert_eq!(o.get::<u16>("w"), 11);

        // Set on a bound name replaces the binding; storage is untouched.
        o.set("w", 99u16);
        assert_eq!(o.variable_type("w"), Some(VarType::Uint16));
        assert_eq!(*cell.lock(), 11);
        assert_eq!(Arc::strong_count(&cell), 1);
    }

    #[test]
    fn bind_fires_bound_event() {
        let o = obj();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        o.add_event_handler(move |_, ev| sink.lock().push(ev.clone()));
        o.bind("x", &shared(0u8));
        o.set("y", 0u8);
        assert_eq!(*seen.lock(), [ObjectEvent::Bound("x".into())]);
    }

    #[test]
    fn bind_locked_uses_external_lock() {
        let o = obj();
        let lock = ext_lock();
        let cell = shared(1.5f64);
        o.bind_locked("d", &cell, &lock);
        let var = o.variable("d").unwrap();
        assert!(Arc::ptr_eq(var.ext_lock().unwrap(), &lock));
        assert_eq!(o.get::<f64>("d"), 1.5);
    }

    #[test]
    fn set_string_into_bound_buffer_truncates() {
        let o = obj();
        let buf = shared(StrBuf::new(4));
        o.bind_string("s", &buf);
        o.set_string("s", "abcdefgh");
        assert_eq!(o.variable_type("s"), Some(VarType::PString));
        assert_eq!(buf.lock().as_str(), "abcd");
        assert_eq!(o.get_string("s").as_deref(), Some("abcd"));
    }

    #[test]
    fn set_string_nodup_adopts() {
        let o = obj();
        o.set("n", 1u8);
        o.set_string_nodup("n", String::from("owned"));
        assert_eq!(o.get_string("n").as_deref(), Some("owned"));
    }

    #[test]
    fn concurrent_set_string_keeps_binding() {
        let o = obj();
        let buf = shared(StrBuf::new(16));
        o.bind_string("s", &buf);

        std::thread::scope(|scope| {
            for t in 0..4 {
                let o = o.clone();
                scope.spawn(move || {
                    for i in 0..200 {
                        o.set_string("s", &format!("t{t}-{i}"));
                        o.load_value("s", Value::String(format!("l{t}-{i}")));
                    }
                });
            }
        });

        assert_eq!(o.variable_type("s"), Some(VarType::PString));
        let text = buf.lock().as_str().to_owned();
        assert!(text.starts_with('t') || text.starts_with('l'), "{text}");
        assert_eq!(o.get_string("s"), Some(text));
    }

    #[test]
    fn clear_leaves_typeless_variable() {
        let o = obj();
        let cell = shared(5u8);
        o.bind("c", &cell);
        o.clear("c");
        assert!(o.has_variable("c"));
        assert_eq!(o.variable_type("c"), Some(VarType::Null));
        assert_eq!(o.print_variable("c").as_deref(), Some("(null)"));
        assert!(o.variable("c").unwrap().value().is_none());
        assert_eq!(Arc::strong_count(&cell), 1);

        o.set("c", 1u8);
        assert_eq!(o.get::<u8>("c"), 1);
    }

    #[test]
    fn flags() {
        let o = obj();
        let word = shared(Uint(0));
        o.bind_flag("f", &word, 0x4);
        assert_eq!(o.get_flag("f"), Some(false));
        assert!(o.set_flag("f", true));
        assert_eq!(word.lock().0, 0x4);
        assert_eq!(o.print_variable("f").as_deref(), Some("1"));

        let bits = shared(0u16);
        o.bind_flag16("g", &bits, 0x100);
        assert!(o.set_flag("g", true));
        assert_eq!(*bits.lock(), 0x100);
        assert!(!o.set_flag("missing", true));
        o.set("plain", 1u8);
        assert!(!o.set_flag("plain", true));
    }

    #[test]
    fn pointers_are_not_persistent() {
        let o = obj();
        let data: AnyPtr = Arc::new(vec![1u8, 2, 3]);
        o.set_pointer("p", Arc::clone(&data));
        o.set_const_pointer("c", data);
        let p = o.get_pointer("p").unwrap();
        assert_eq!(p.downcast_ref::<Vec<u8>>(), Some(&vec![1, 2, 3]));
        assert!(!o.variable("p").unwrap().is_persistent());
        assert_eq!(o.variable_type("c"), Some(VarType::ConstPointer));
    }

    // -----------------------------------------------------------------------
    // References
    // -----------------------------------------------------------------------

    #[test]
    fn object_reference_is_weak() {
        let class = class();
        let o = Object::new(&class, "o");
        let target = Object::new(&class, "t");
        o.bind_object("ref", &target);
        assert!(o.get_object("ref").unwrap().ptr_eq(&target));
        assert_eq!(o.print_variable("ref").as_deref(), Some("/t"));
        drop(target);
        assert!(o.get_object("ref").is_none());
    }

    #[test]
    fn variable_reference_resolves() {
        let class = class();
        let o = Object::new(&class, "o");
        let t = Object::new(&class, "t");
        t.set("x", 5u32);
        o.bind_variable("alias", &t, "x");
        assert_eq!(o.get::<u32>("alias"), 5);
        t.set("x", 6u32);
        assert_eq!(o.get::<u32>("alias"), 6);

        // Deref keeps the reference rather than copying the value.
        let d = o.deref_variable("alias").unwrap().unwrap();
        assert_eq!(d.var_type(), VarType::PVariable);
    }

    #[test]
    fn variable_reference_cycle_reads_none() {
        let o = obj();
        o.bind_variable("a", &o, "b");
        o.bind_variable("b", &o, "a");
        assert_eq!(o.variable("a").unwrap().value(), None);
        assert!(o.try_get::<u32>("a").is_err());
    }

    #[test]
    fn in_use_sees_references() {
        let class = class();
        let root = Object::new(&class, "root");
        let a = Object::new(&class, "a");
        let b = Object::new(&class, "b");
        a.attach(&root);
        b.attach(&root);
        assert!(!b.in_use());
        a.bind_object("peer", &b);
        assert!(b.in_use());
        a.unset("peer");
        a.bind_variable("peer", &b, "x");
        assert!(b.in_use());
        assert!(!a.in_use());
    }

    // -----------------------------------------------------------------------
    // Load replay
    // -----------------------------------------------------------------------

    #[test]
    fn load_value_writes_through_matching_binding() {
        let o = obj();
        let cell = shared(0u32);
        o.bind("x", &cell);
        o.load_value("x", Value::Uint32(7));
        assert_eq!(*cell.lock(), 7);
        assert_eq!(o.variable_type("x"), Some(VarType::PUint32));

        // Mismatched archived type replaces the binding.
        o.load_value("x", Value::Sint8(-1));
        assert_eq!(o.variable_type("x"), Some(VarType::Sint8));
        assert_eq!(*cell.lock(), 7);
    }

    // -----------------------------------------------------------------------
    // Substitution
    // -----------------------------------------------------------------------

    #[test]
    fn subst_expands_tokens() {
        let o = obj();
        o.set("n", 3u8);
        o.set_string("title", "hi");
        assert_eq!(o.subst("$(name):$(class) $(title)x$(n)"), "o:Thing hix3");
        assert_eq!(o.subst("a$(missing)b"), "ab");
        assert_eq!(o.subst("open $(name"), "open $(name");
        assert_eq!(o.subst("$$(n))"), "$3)");
    }

    #[test]
    fn unset_removes() {
        let o = obj();
        o.set("a", 1u8);
        assert!(o.unset("a"));
        assert!(!o.unset("a"));
        assert!(!o.has_variable("a"));
    }

    proptest! {
        #[test]
        fn names_stay_unique(ops in proptest::collection::vec((0usize..5, 0u8..4), 0..50)) {
            let o = obj();
            let names = ["a", "b", "c", "d", "e"];
            for (n, kind) in ops {
                match kind {
                    0 => o.set(names[n], n as u32),
                    1 => o.set_string(names[n], "s"),
                    2 => o.bind(names[n], &shared(n as i8)),
                    _ => { o.unset(names[n]); }
                }
            }
            let mut seen = o.variable_names();
            let total = seen.len();
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), total);
        }

        #[test]
        fn set_then_set_other_type_reads_latest(a in any::<u64>(), b in any::<i16>()) {
            let o = obj();
            o.set("v", a);
            o.set_string("v", "tmp");
            o.set("v", b);
            prop_assert_eq!(o.get::<i16>("v"), b);
            prop_assert!(o.get_string("v").is_none());
        }
    }
}
