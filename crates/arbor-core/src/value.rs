use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::types::VarType;

/// Caller-owned storage that a bound variable refers to.
///
/// The variable holds a clone of the `Arc`; it never owns the value
/// exclusively, and dropping the variable leaves the storage alive for
/// every other holder.
pub type Shared<T> = Arc<Mutex<T>>;

/// External lock acquired around every access to a bound variable.
pub type ExtLock = Arc<ReentrantMutex<()>>;

/// Opaque pointer held by `Pointer`/`ConstPointer` variables.
pub type AnyPtr = Arc<dyn Any + Send + Sync>;

/// Wrap a value as bindable storage.
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Create a fresh external lock.
pub fn ext_lock() -> ExtLock {
    Arc::new(ReentrantMutex::new(()))
}

/// Machine-width unsigned integer (`Uint` variables).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uint(pub u32);

/// Machine-width signed integer (`Int` variables).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Int(pub i32);

/// Machine-width unsigned long (`Ulong` variables).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ulong(pub u64);

/// Machine-width signed long (`Long` variables).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Long(pub i64);

/// Fixed-capacity string buffer for bound string variables.
///
/// Assignments never reallocate past `capacity` bytes; longer input is
/// truncated on a character boundary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StrBuf {
    text: String,
    capacity: usize,
}

impl StrBuf {
    pub fn new(capacity: usize) -> Self {
        Self {
            text: String::with_capacity(capacity),
            capacity,
        }
    }

    pub fn with_text(capacity: usize, text: &str) -> Self {
        let mut buf = Self::new(capacity);
        buf.assign(text);
        buf
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replace the contents, returning `true` if `text` was truncated.
    pub fn assign(&mut self, text: &str) -> bool {
        self.text.clear();
        if text.len() <= self.capacity {
            self.text.push_str(text);
            return false;
        }
        let mut cut = self.capacity;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&text[..cut]);
        true
    }
}

/// A dereferenced, archivable value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Uint(u32),
    Int(i32),
    Ulong(u64),
    Long(i64),
    Uint8(u8),
    Sint8(i8),
    Uint16(u16),
    Sint16(i16),
    Uint32(u32),
    Sint32(i32),
    Uint64(u64),
    Sint64(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl Value {
    pub fn var_type(&self) -> VarType {
        match self {
            Value::Uint(_) => VarType::Uint,
            Value::Int(_) => VarType::Int,
            Value::Ulong(_) => VarType::Ulong,
            Value::Long(_) => VarType::Long,
            Value::Uint8(_) => VarType::Uint8,
            Value::Sint8(_) => VarType::Sint8,
            Value::Uint16(_) => VarType::Uint16,
            Value::Sint16(_) => VarType::Sint16,
            Value::Uint32(_) => VarType::Uint32,
            Value::Sint32(_) => VarType::Sint32,
            Value::Uint64(_) => VarType::Uint64,
            Value::Sint64(_) => VarType::Sint64,
            Value::Float(_) => VarType::Float,
            Value::Double(_) => VarType::Double,
            Value::String(_) => VarType::String,
        }
    }

    /// Bitwise equality: floats compare by representation, not by `==`.
    pub fn same_bits(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uint(v) | Value::Uint32(v) => write!(f, "{v}"),
            Value::Int(v) | Value::Sint32(v) => write!(f, "{v}"),
            Value::Ulong(v) | Value::Uint64(v) => write!(f, "{v}"),
            Value::Long(v) | Value::Sint64(v) => write!(f, "{v}"),
            Value::Uint8(v) => write!(f, "{v}"),
            Value::Sint8(v) => write!(f, "{v}"),
            Value::Uint16(v) => write!(f, "{v}"),
            Value::Sint16(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
        }
    }
}

/// Pointer-form storage of a bound scalar or string.
#[doc(hidden)]
#[derive(Clone)]
pub enum Binding {
    Uint(Shared<Uint>),
    Int(Shared<Int>),
    Ulong(Shared<Ulong>),
    Long(Shared<Long>),
    Uint8(Shared<u8>),
    Sint8(Shared<i8>),
    Uint16(Shared<u16>),
    Sint16(Shared<i16>),
    Uint32(Shared<u32>),
    Sint32(Shared<i32>),
    Uint64(Shared<u64>),
    Sint64(Shared<i64>),
    Float(Shared<f32>),
    Double(Shared<f64>),
    String(Shared<StrBuf>),
}

macro_rules! for_each_binding {
    ($self:expr, $cell:ident => $body:expr) => {
        match $self {
            Binding::Uint($cell) => $body,
            Binding::Int($cell) => $body,
            Binding::Ulong($cell) => $body,
            Binding::Long($cell) => $body,
            Binding::Uint8($cell) => $body,
            Binding::Sint8($cell) => $body,
            Binding::Uint16($cell) => $body,
            Binding::Sint16($cell) => $body,
            Binding::Uint32($cell) => $body,
            Binding::Sint32($cell) => $body,
            Binding::Uint64($cell) => $body,
            Binding::Sint64($cell) => $body,
            Binding::Float($cell) => $body,
            Binding::Double($cell) => $body,
            Binding::String($cell) => $body,
        }
    };
}

impl Binding {
    pub(crate) fn var_type(&self) -> VarType {
        match self {
            Binding::Uint(_) => VarType::PUint,
            Binding::Int(_) => VarType::PInt,
            Binding::Ulong(_) => VarType::PUlong,
            Binding::Long(_) => VarType::PLong,
            Binding::Uint8(_) => VarType::PUint8,
            Binding::Sint8(_) => VarType::PSint8,
            Binding::Uint16(_) => VarType::PUint16,
            Binding::Sint16(_) => VarType::PSint16,
            Binding::Uint32(_) => VarType::PUint32,
            Binding::Sint32(_) => VarType::PSint32,
            Binding::Uint64(_) => VarType::PUint64,
            Binding::Sint64(_) => VarType::PSint64,
            Binding::Float(_) => VarType::PFloat,
            Binding::Double(_) => VarType::PDouble,
            Binding::String(_) => VarType::PString,
        }
    }

    /// Read the pointee.
    pub(crate) fn load(&self) -> Value {
        match self {
            Binding::Uint(c) => Value::Uint(c.lock().0),
            Binding::Int(c) => Value::Int(c.lock().0),
            Binding::Ulong(c) => Value::Ulong(c.lock().0),
            Binding::Long(c) => Value::Long(c.lock().0),
            Binding::Uint8(c) => Value::Uint8(*c.lock()),
            Binding::Sint8(c) => Value::Sint8(*c.lock()),
            Binding::Uint16(c) => Value::Uint16(*c.lock()),
            Binding::Sint16(c) => Value::Sint16(*c.lock()),
            Binding::Uint32(c) => Value::Uint32(*c.lock()),
            Binding::Sint32(c) => Value::Sint32(*c.lock()),
            Binding::Uint64(c) => Value::Uint64(*c.lock()),
            Binding::Sint64(c) => Value::Sint64(*c.lock()),
            Binding::Float(c) => Value::Float(*c.lock()),
            Binding::Double(c) => Value::Double(*c.lock()),
            Binding::String(c) => Value::String(c.lock().as_str().to_owned()),
        }
    }

    /// Write through to the pointee if `value` has the target type.
    ///
    /// Returns `None` on a type mismatch, otherwise whether a string had to
    /// be truncated to fit the bound buffer.
    pub(crate) fn store(&self, value: &Value) -> Option<bool> {
        match (self, value) {
            (Binding::Uint(c), Value::Uint(v)) => *c.lock() = Uint(*v),
            (Binding::Int(c), Value::Int(v)) => *c.lock() = Int(*v),
            (Binding::Ulong(c), Value::Ulong(v)) => *c.lock() = Ulong(*v),
            (Binding::Long(c), Value::Long(v)) => *c.lock() = Long(*v),
            (Binding::Uint8(c), Value::Uint8(v)) => *c.lock() = *v,
            (Binding::Sint8(c), Value::Sint8(v)) => *c.lock() = *v,
            (Binding::Uint16(c), Value::Uint16(v)) => *c.lock() = *v,
            (Binding::Sint16(c), Value::Sint16(v)) => *c.lock() = *v,
            (Binding::Uint32(c), Value::Uint32(v)) => *c.lock() = *v,
            (Binding::Sint32(c), Value::Sint32(v)) => *c.lock() = *v,
            (Binding::Uint64(c), Value::Uint64(v)) => *c.lock() = *v,
            (Binding::Sint64(c), Value::Sint64(v)) => *c.lock() = *v,
            (Binding::Float(c), Value::Float(v)) => *c.lock() = *v,
            (Binding::Double(c), Value::Double(v)) => *c.lock() = *v,
            (Binding::String(c), Value::String(s)) => return Some(c.lock().assign(s)),
            _ => return None,
        }
        Some(false)
    }

    /// Identity of the referenced storage.
    pub(crate) fn same_target(&self, other: &Binding) -> bool {
        self.var_type() == other.var_type() && self.addr() == other.addr()
    }

    fn addr(&self) -> *const () {
        for_each_binding!(self, cell => Arc::as_ptr(cell) as *const ())
    }
}

/// Pointer-form storage of a bit flag.
#[doc(hidden)]
#[derive(Clone)]
pub enum FlagBinding {
    Word(Shared<Uint>, u32),
    Bits8(Shared<u8>, u8),
    Bits16(Shared<u16>, u16),
    Bits32(Shared<u32>, u32),
}

impl FlagBinding {
    pub(crate) fn var_type(&self) -> VarType {
        match self {
            FlagBinding::Word(..) => VarType::PFlag,
            FlagBinding::Bits8(..) => VarType::PFlag8,
            FlagBinding::Bits16(..) => VarType::PFlag16,
            FlagBinding::Bits32(..) => VarType::PFlag32,
        }
    }

    pub(crate) fn get(&self) -> bool {
        match self {
            FlagBinding::Word(c, m) => c.lock().0 & m != 0,
            FlagBinding::Bits8(c, m) => *c.lock() & m != 0,
            FlagBinding::Bits16(c, m) => *c.lock() & m != 0,
            FlagBinding::Bits32(c, m) => *c.lock() & m != 0,
        }
    }

    pub(crate) fn set(&self, on: bool) {
        match self {
            FlagBinding::Word(c, m) => {
                let mut w = c.lock();
                w.0 = if on { w.0 | m } else { w.0 & !m };
            }
            FlagBinding::Bits8(c, m) => {
                let mut w = c.lock();
                *w = if on { *w | m } else { *w & !m };
            }
            FlagBinding::Bits16(c, m) => {
                let mut w = c.lock();
                *w = if on { *w | m } else { *w & !m };
            }
            FlagBinding::Bits32(c, m) => {
                let mut w = c.lock();
                *w = if on { *w | m } else { *w & !m };
            }
        }
    }

    /// Whole word the flag lives in, as a value of the flag's target type.
    pub(crate) fn word(&self) -> Value {
        match self {
            FlagBinding::Word(c, _) => Value::Uint(c.lock().0),
            FlagBinding::Bits8(c, _) => Value::Uint8(*c.lock()),
            FlagBinding::Bits16(c, _) => Value::Uint16(*c.lock()),
            FlagBinding::Bits32(c, _) => Value::Uint32(*c.lock()),
        }
    }

    pub(crate) fn same_target(&self, other: &FlagBinding) -> bool {
        match (self, other) {
            (FlagBinding::Word(a, m), FlagBinding::Word(b, n)) => Arc::ptr_eq(a, b) && m == n,
            (FlagBinding::Bits8(a, m), FlagBinding::Bits8(b, n)) => Arc::ptr_eq(a, b) && m == n,
            (FlagBinding::Bits16(a, m), FlagBinding::Bits16(b, n)) => Arc::ptr_eq(a, b) && m == n,
            (FlagBinding::Bits32(a, m), FlagBinding::Bits32(b, n)) => Arc::ptr_eq(a, b) && m == n,
            _ => false,
        }
    }
}

/// Scalar types usable with the generic variable accessors.
pub trait VarScalar: Copy + Send + 'static {
    /// Value-form tag produced by `set`.
    const TYPE: VarType;

    fn into_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;

    #[doc(hidden)]
    fn binding(cell: Shared<Self>) -> Binding;
}

macro_rules! var_scalar {
    ($($ty:ty => $variant:ident, wrap: $wrap:expr, unwrap: $unwrap:expr;)*) => {
        $(
            impl VarScalar for $ty {
                const TYPE: VarType = VarType::$variant;

                fn into_value(self) -> Value {
                    Value::$variant(($unwrap)(self))
                }

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(($wrap)(*v)),
                        _ => None,
                    }
                }

                fn binding(cell: Shared<Self>) -> Binding {
                    Binding::$variant(cell)
                }
            }
        )*
    };
}

var_scalar! {
    Uint => Uint, wrap: Uint, unwrap: |v: Uint| v.0;
    Int => Int, wrap: Int, unwrap: |v: Int| v.0;
    Ulong => Ulong, wrap: Ulong, unwrap: |v: Ulong| v.0;
    Long => Long, wrap: Long, unwrap: |v: Long| v.0;
    u8 => Uint8, wrap: |v| v, unwrap: |v| v;
    i8 => Sint8, wrap: |v| v, unwrap: |v| v;
    u16 => Uint16, wrap: |v| v, unwrap: |v| v;
    i16 => Sint16, wrap: |v| v, unwrap: |v| v;
    u32 => Uint32, wrap: |v| v, unwrap: |v| v;
    i32 => Sint32, wrap: |v| v, unwrap: |v| v;
    u64 => Uint64, wrap: |v| v, unwrap: |v| v;
    i64 => Sint64, wrap: |v| v, unwrap: |v| v;
    f32 => Float, wrap: |v| v, unwrap: |v| v;
    f64 => Double, wrap: |v| v, unwrap: |v| v;
}
