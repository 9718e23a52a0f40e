use std::fmt;
use std::sync::Arc;

use crate::error::CoreResult;
use crate::object::{Object, ObjectRef};
use crate::types::{TypeInfo, VarType};
use crate::value::{AnyPtr, Binding, ExtLock, FlagBinding, Value, VarScalar};

/// Longest variable name, in bytes. Longer names are truncated.
pub const VARIABLE_NAME_MAX: usize = 40;

/// Deepest chain of variable-to-variable references followed on read.
pub const MAX_VARIABLE_CHAIN: usize = 16;

/// Storage of a variable, one arm per indirection kind.
#[derive(Clone)]
pub(crate) enum Data {
    Null,
    Value(Value),
    Bound(Binding),
    Pointer(AnyPtr),
    ConstPointer(AnyPtr),
    Flag(FlagBinding),
    Object(ObjectRef),
    Variable { target: ObjectRef, key: String },
}

impl Data {
    pub(crate) fn var_type(&self) -> VarType {
        match self {
            Data::Null => VarType::Null,
            Data::Value(v) => v.var_type(),
            Data::Bound(b) => b.var_type(),
            Data::Pointer(_) => VarType::Pointer,
            Data::ConstPointer(_) => VarType::ConstPointer,
            Data::Flag(f) => f.var_type(),
            Data::Object(_) => VarType::PObject,
            Data::Variable { .. } => VarType::PVariable,
        }
    }
}

/// Truncate `name` to [`VARIABLE_NAME_MAX`] bytes on a character boundary.
pub(crate) fn clamp_name(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut cut = max;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    &name[..cut]
}

fn dup_string(s: &str) -> CoreResult<String> {
    let mut out = String::new();
    out.try_reserve_exact(s.len())?;
    out.push_str(s);
    Ok(out)
}

/// A named, dynamically typed value cell.
///
/// Value forms hold their datum. Pointer forms (see [`VarType::is_bound`])
/// refer to storage owned by someone else and read or write through it,
/// holding the optional external lock for the duration of each access.
///
/// `Clone` is the shallow copy: owned strings are duplicated, while bound
/// storage, opaque pointers and object references are aliased.
#[derive(Clone)]
pub struct Variable {
    pub(crate) name: String,
    pub(crate) data: Data,
    pub(crate) lock: Option<ExtLock>,
}

impl Variable {
    pub(crate) fn new(name: &str, data: Data, lock: Option<ExtLock>) -> Self {
        Self {
            name: clamp_name(name, VARIABLE_NAME_MAX).to_owned(),
            data,
            lock,
        }
    }

    /// Standalone value-form variable.
    pub fn from_value(name: &str, value: Value) -> Self {
        Self::new(name, Data::Value(value), None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var_type(&self) -> VarType {
        self.data.var_type()
    }

    pub fn info(&self) -> &'static TypeInfo {
        self.var_type().info()
    }

    pub fn is_bound(&self) -> bool {
        self.var_type().is_bound()
    }

    pub fn is_persistent(&self) -> bool {
        self.var_type().is_persistent()
    }

    pub fn ext_lock(&self) -> Option<&ExtLock> {
        self.lock.as_ref()
    }

    fn guarded<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock.as_ref().map(|l| l.lock());
        f()
    }

    /// Current value, dereferencing bound storage and variable references.
    ///
    /// Returns `None` for types that carry no archivable value (null,
    /// pointers, flags, object references) and for dangling or cyclic
    /// variable references.
    pub fn value(&self) -> Option<Value> {
        self.value_at(0)
    }

    pub(crate) fn value_at(&self, depth: usize) -> Option<Value> {
        match &self.data {
            Data::Value(v) => Some(v.clone()),
            Data::Bound(b) => Some(self.guarded(|| b.load())),
            Data::Variable { target, key } => {
                if depth >= MAX_VARIABLE_CHAIN {
                    return None;
                }
                let obj = target.upgrade()?;
                obj.with_var(key, |v| v.value_at(depth + 1)).flatten()
            }
            _ => None,
        }
    }

    pub fn get<T: VarScalar>(&self) -> Option<T> {
        self.value().as_ref().and_then(T::from_value)
    }

    pub fn string(&self) -> Option<String> {
        match self.value()? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// State of a bound flag.
    pub fn flag(&self) -> Option<bool> {
        match &self.data {
            Data::Flag(f) => Some(self.guarded(|| f.get())),
            _ => None,
        }
    }

    pub fn pointer(&self) -> Option<AnyPtr> {
        match &self.data {
            Data::Pointer(p) | Data::ConstPointer(p) => Some(Arc::clone(p)),
            _ => None,
        }
    }

    /// Object referred to by a `PObject` variable, if still alive.
    pub fn object(&self) -> Option<Object> {
        match &self.data {
            Data::Object(r) => r.upgrade(),
            _ => None,
        }
    }

    /// Write `value` through a bound variable.
    ///
    /// Returns `None` if this is not a pointer form whose target type
    /// matches `value`; otherwise whether a string was truncated.
    pub fn store(&self, value: &Value) -> Option<bool> {
        match &self.data {
            Data::Bound(b) => self.guarded(|| b.store(value)),
            _ => None,
        }
    }

    pub(crate) fn set_flag(&self, on: bool) -> bool {
        match &self.data {
            Data::Flag(f) => {
                self.guarded(|| f.set(on));
                true
            }
            _ => false,
        }
    }

    /// Dereferencing duplicate.
    ///
    /// Bound scalars and flags become value forms holding a copy of the
    /// pointee; strings of either form are duplicated into owned storage.
    /// Opaque pointers and object/variable references are copied as
    /// references and keep their type.
    pub fn deref(&self) -> CoreResult<Variable> {
        let data = match &self.data {
            Data::Value(Value::String(s)) => Data::Value(Value::String(dup_string(s)?)),
            Data::Bound(Binding::String(cell)) => {
                let s = self.guarded(|| dup_string(cell.lock().as_str()))?;
                Data::Value(Value::String(s))
            }
            Data::Bound(b) => Data::Value(self.guarded(|| b.load())),
            Data::Flag(f) => Data::Value(self.guarded(|| f.word())),
            other => other.clone(),
        };
        Ok(Variable {
            name: self.name.clone(),
            data,
            lock: None,
        })
    }

    /// Exact comparison.
    ///
    /// Type tags must match exactly; a value-form and a pointer-form
    /// variable are never equal even if they dereference to the same
    /// value. Strings compare by content, everything else by
    /// representation (for pointer forms, the identity of the storage).
    pub fn compare(&self, other: &Variable) -> bool {
        if self.var_type() != other.var_type() {
            return false;
        }
        match (&self.data, &other.data) {
            (Data::Null, Data::Null) => true,
            (Data::Value(a), Data::Value(b)) => a.same_bits(b),
            (Data::Bound(Binding::String(a)), Data::Bound(Binding::String(b))) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let left = self.guarded(|| a.lock().as_str().to_owned());
                other.guarded(|| b.lock().as_str() == left)
            }
            (Data::Bound(a), Data::Bound(b)) => a.same_target(b),
            (Data::Pointer(a), Data::Pointer(b))
            | (Data::ConstPointer(a), Data::ConstPointer(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Data::Flag(a), Data::Flag(b)) => a.same_target(b),
            (Data::Object(a), Data::Object(b)) => a.ptr_eq(b),
            (
                Data::Variable { target: a, key: k },
                Data::Variable { target: b, key: l },
            ) => a.ptr_eq(b) && k == l,
            _ => false,
        }
    }

    /// Human-readable rendering of the current value.
    pub fn print(&self) -> String {
        match &self.data {
            Data::Null => "(null)".to_owned(),
            Data::Value(v) => v.to_string(),
            Data::Bound(b) => self.guarded(|| b.load()).to_string(),
            Data::Pointer(p) | Data::ConstPointer(p) => format!("{:p}", Arc::as_ptr(p)),
            Data::Flag(f) => {
                if self.guarded(|| f.get()) { "1" } else { "0" }.to_owned()
            }
            Data::Object(r) => r
                .upgrade()
                .map(|o| o.path())
                .unwrap_or_else(|| "(null)".to_owned()),
            Data::Variable { .. } => self
                .value()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "(null)".to_owned()),
        }
    }

    /// True if this is an object or variable reference pointing at `obj`.
    pub(crate) fn refers_to(&self, obj: &Object) -> bool {
        match &self.data {
            Data::Object(r) | Data::Variable { target: r, .. } => r.points_to(obj),
            _ => false,
        }
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("type", &self.var_type())
            .field("value", &self.print())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ext_lock, shared, StrBuf, Uint};

    fn bound(name: &str, b: Binding) -> Variable {
        Variable::new(name, Data::Bound(b), None)
    }

    // -----------------------------------------------------------------------
    // Deref
    // -----------------------------------------------------------------------

    #[test]
    fn deref_bound_scalar_becomes_value_form() {
        let cell = shared(7u32);
        let v = bound("x", Binding::Uint32(cell.clone()));
        let d = v.deref().unwrap();
        assert_eq!(d.var_type(), VarType::Uint32);
        assert_eq!(d.get::<u32>(), Some(7));

        // The copy is immediate: later writes to the storage do not show.
        *cell.lock() = 8;
        assert_eq!(d.get::<u32>(), Some(7));
        assert_eq!(v.get::<u32>(), Some(8));
    }

    #[test]
    fn deref_bound_string_duplicates() {
        let cell = shared(StrBuf::with_text(16, "hello"));
        let v = bound("s", Binding::String(cell.clone()));
        let d = v.deref().unwrap();
        assert_eq!(d.var_type(), VarType::String);
        cell.lock().assign("changed");
        assert_eq!(d.string().as_deref(), Some("hello"));
    }

    #[test]
    fn deref_flag_copies_word() {
        let word = shared(Uint(0b101));
        let v = Variable::new("f", Data::Flag(FlagBinding::Word(word, 0b100)), None);
        let d = v.deref().unwrap();
        assert_eq!(d.var_type(), VarType::Uint);
        assert_eq!(d.get::<Uint>(), Some(Uint(0b101)));
    }

    #[test]
    fn deref_keeps_pointers_as_references() {
        let p: AnyPtr = Arc::new(5i32);
        let v = Variable::new("p", Data::Pointer(p.clone()), None);
        let d = v.deref().unwrap();
        assert_eq!(d.var_type(), VarType::Pointer);
        assert!(Arc::ptr_eq(&d.pointer().unwrap(), &p));
    }

    // -----------------------------------------------------------------------
    // Copy and compare
    // -----------------------------------------------------------------------

    #[test]
    fn clone_duplicates_owned_string() {
        let a = Variable::from_value("s", Value::String("one".into()));
        let mut b = a.clone();
        b.data = Data::Value(Value::String("two".into()));
        assert_eq!(a.string().as_deref(), Some("one"));
    }

    #[test]
    fn clone_aliases_bound_storage() {
        let cell = shared(1i16);
        let a = bound("x", Binding::Sint16(cell.clone()));
        let b = a.clone();
        *cell.lock() = -4;
        assert_eq!(b.get::<i16>(), Some(-4));
        assert!(a.compare(&b));
    }

    #[test]
    fn compare_requires_exact_type() {
        let cell = shared(3u32);
        let value = Variable::from_value("x", Value::Uint32(3));
        let pointer = bound("x", Binding::Uint32(cell));
        assert_eq!(pointer.value(), value.value());
        assert!(!value.compare(&pointer));
        assert!(!value.compare(&Variable::from_value("x", Value::Sint32(3))));
        assert!(value.compare(&Variable::from_value("y", Value::Uint32(3))));
    }

    #[test]
    fn compare_bound_strings_by_content() {
        let a = bound("s", Binding::String(shared(StrBuf::with_text(8, "abc"))));
        let b = bound("s", Binding::String(shared(StrBuf::with_text(32, "abc"))));
        assert!(a.compare(&b));
        assert!(a.compare(&a.clone()));
    }

    #[test]
    fn compare_distinct_storage_is_unequal() {
        let a = bound("x", Binding::Uint8(shared(1)));
        let b = bound("x", Binding::Uint8(shared(1)));
        assert!(!a.compare(&b));
    }

    // -----------------------------------------------------------------------
    // Locking, print, names
    // -----------------------------------------------------------------------

    #[test]
    fn external_lock_is_reentrant_around_access() {
        let lock = ext_lock();
        let v = Variable::new("x", Data::Bound(Binding::Uint64(shared(9))), Some(lock.clone()));
        let _held = lock.lock();
        // Same thread can still read through the variable.
        assert_eq!(v.get::<u64>(), Some(9));
    }

    #[test]
    fn print_values() {
        assert_eq!(Variable::from_value("a", Value::Sint8(-3)).print(), "-3");
        assert_eq!(Variable::from_value("a", Value::String("hi".into())).print(), "hi");
        assert_eq!(Variable::new("n", Data::Null, None).print(), "(null)");
        let flag = Variable::new("f", Data::Flag(FlagBinding::Bits16(shared(2), 2)), None);
        assert_eq!(flag.print(), "1");
    }

    #[test]
    fn long_names_are_truncated() {
        let long = "n".repeat(VARIABLE_NAME_MAX + 10);
        let v = Variable::from_value(&long, Value::Uint8(0));
        assert_eq!(v.name().len(), VARIABLE_NAME_MAX);
    }
}
