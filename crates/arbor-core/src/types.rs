//! Variable type tags and the type-info table.
//!
//! Every algorithm that needs to know how a type dereferences, how wide it
//! is or how it is tagged on disk goes through [`VarType::info`]; there is
//! no other source for that mapping.

use std::mem::size_of;

/// Type tag of a [`Variable`](crate::Variable).
///
/// Each value type has a pointer ("bound") counterpart prefixed with `P`
/// that refers to caller-owned storage instead of holding the datum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum VarType {
    Null,
    Uint,
    PUint,
    Int,
    PInt,
    Ulong,
    PUlong,
    Long,
    PLong,
    Uint8,
    PUint8,
    Sint8,
    PSint8,
    Uint16,
    PUint16,
    Sint16,
    PSint16,
    Uint32,
    PUint32,
    Sint32,
    PSint32,
    Uint64,
    PUint64,
    Sint64,
    PSint64,
    Float,
    PFloat,
    Double,
    PDouble,
    String,
    PString,
    Pointer,
    ConstPointer,
    PFlag,
    PFlag8,
    PFlag16,
    PFlag32,
    PObject,
    PVariable,
}

/// Static description of one [`VarType`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    pub ty: VarType,
    pub name: &'static str,
    /// Type obtained by dereferencing; equal to `ty` for value forms.
    pub target: VarType,
    /// On-disk type code, or `-1` if the type is never archived.
    pub code: i32,
    /// 0 for value forms, 1 for pointer forms.
    pub indirection: u8,
    /// Width of the stored representation in bytes (0 for variable length).
    pub size: usize,
}

const PTR: usize = size_of::<usize>();

macro_rules! info {
    ($ty:ident, $name:literal, $target:ident, $code:expr, $indir:expr, $size:expr) => {
        TypeInfo {
            ty: VarType::$ty,
            name: $name,
            target: VarType::$target,
            code: $code,
            indirection: $indir,
            size: $size,
        }
    };
}

/// Indexed by `VarType as usize`.
pub static TYPE_INFO: [TypeInfo; 39] = [
    info!(Null, "Null", Null, -1, 0, 0),
    info!(Uint, "Uint", Uint, 1, 0, 4),
    info!(PUint, "Uint *", Uint, 1, 1, PTR),
    info!(Int, "Int", Int, 2, 0, 4),
    info!(PInt, "Int *", Int, 2, 1, PTR),
    info!(Ulong, "Ulong", Ulong, 3, 0, 8),
    info!(PUlong, "Ulong *", Ulong, 3, 1, PTR),
    info!(Long, "Long", Long, 4, 0, 8),
    info!(PLong, "Long *", Long, 4, 1, PTR),
    info!(Uint8, "Uint8", Uint8, 5, 0, 1),
    info!(PUint8, "Uint8 *", Uint8, 5, 1, PTR),
    info!(Sint8, "Sint8", Sint8, 6, 0, 1),
    info!(PSint8, "Sint8 *", Sint8, 6, 1, PTR),
    info!(Uint16, "Uint16", Uint16, 7, 0, 2),
    info!(PUint16, "Uint16 *", Uint16, 7, 1, PTR),
    info!(Sint16, "Sint16", Sint16, 8, 0, 2),
    info!(PSint16, "Sint16 *", Sint16, 8, 1, PTR),
    info!(Uint32, "Uint32", Uint32, 9, 0, 4),
    info!(PUint32, "Uint32 *", Uint32, 9, 1, PTR),
    info!(Sint32, "Sint32", Sint32, 10, 0, 4),
    info!(PSint32, "Sint32 *", Sint32, 10, 1, PTR),
    info!(Uint64, "Uint64", Uint64, 11, 0, 8),
    info!(PUint64, "Uint64 *", Uint64, 11, 1, PTR),
    info!(Sint64, "Sint64", Sint64, 12, 0, 8),
    info!(PSint64, "Sint64 *", Sint64, 12, 1, PTR),
    info!(Float, "Float", Float, 13, 0, 4),
    info!(PFloat, "Float *", Float, 13, 1, PTR),
    info!(Double, "Double", Double, 14, 0, 8),
    info!(PDouble, "Double *", Double, 14, 1, PTR),
    info!(String, "String", String, 15, 0, 0),
    info!(PString, "String *", String, 15, 1, PTR),
    info!(Pointer, "Pointer", Pointer, -1, 0, PTR),
    info!(ConstPointer, "Const Pointer", ConstPointer, -1, 0, PTR),
    info!(PFlag, "Flag", Uint, -1, 1, PTR),
    info!(PFlag8, "Flag8", Uint8, -1, 1, PTR),
    info!(PFlag16, "Flag16", Uint16, -1, 1, PTR),
    info!(PFlag32, "Flag32", Uint32, -1, 1, PTR),
    info!(PObject, "Object *", PObject, -1, 1, PTR),
    info!(PVariable, "Variable *", PVariable, -1, 1, PTR),
];

impl VarType {
    pub fn info(self) -> &'static TypeInfo {
        &TYPE_INFO[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Dereferenced type.
    pub fn target(self) -> VarType {
        self.info().target
    }

    /// On-disk code, or `None` for types that are never archived.
    pub fn code(self) -> Option<i32> {
        let code = self.info().code;
        (code >= 0).then_some(code)
    }

    pub fn is_persistent(self) -> bool {
        self.info().code >= 0
    }

    /// True for pointer forms that refer to caller-owned storage.
    pub fn is_bound(self) -> bool {
        self.info().indirection > 0
    }

    /// Value-form type carrying the given on-disk code.
    pub fn from_code(code: i32) -> Option<VarType> {
        if code < 0 {
            return None;
        }
        TYPE_INFO
            .iter()
            .find(|info| info.code == code && info.indirection == 0)
            .map(|info| info.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_tag() {
        for (i, info) in TYPE_INFO.iter().enumerate() {
            assert_eq!(info.ty as usize, i, "row {i} is {:?}", info.ty);
        }
    }

    #[test]
    fn pointer_forms_target_value_forms() {
        for info in TYPE_INFO.iter().filter(|i| i.indirection == 1) {
            let target = info.target.info();
            match info.ty {
                VarType::PObject | VarType::PVariable => assert_eq!(target.ty, info.ty),
                _ => assert_eq!(target.indirection, 0, "{:?}", info.ty),
            }
        }
    }

    #[test]
    fn bound_scalars_share_their_target_code() {
        assert_eq!(VarType::PUint32.code(), VarType::Uint32.code());
        assert_eq!(VarType::PString.code(), VarType::String.code());
    }

    #[test]
    fn references_and_pointers_are_not_persistent() {
        for ty in [
            VarType::Null,
            VarType::Pointer,
            VarType::ConstPointer,
            VarType::PObject,
            VarType::PVariable,
            VarType::PFlag,
        ] {
            assert!(!ty.is_persistent(), "{ty:?}");
        }
    }

    #[test]
    fn codes_map_back_to_value_forms() {
        for info in TYPE_INFO.iter().filter(|i| i.code >= 0) {
            let back = VarType::from_code(info.code).unwrap();
            assert_eq!(back, info.target);
        }
        assert_eq!(VarType::from_code(-1), None);
        assert_eq!(VarType::from_code(999), None);
    }
}
