//! Variable table encoding.
//!
//! ```text
//! version  u32 (= 1)
//! count    u32
//! count x { name: string, code: i32, value }
//! ```
//!
//! Values use fixed-width encodings per type code; machine-width integers
//! are written as 32 or 64 bits regardless of the host.

use arbor_core::{Value, VarType, Variable};
use arbor_io::DataSource;

use crate::error::{ArchiveError, ArchiveResult};
use crate::format::VARIABLE_TABLE_VERSION;

pub fn write_value(src: &mut DataSource<'_>, value: &Value) -> ArchiveResult<()> {
    match value {
        Value::Uint(v) | Value::Uint32(v) => src.write_u32(*v)?,
        Value::Int(v) | Value::Sint32(v) => src.write_i32(*v)?,
        Value::Ulong(v) | Value::Uint64(v) => src.write_u64(*v)?,
        Value::Long(v) | Value::Sint64(v) => src.write_i64(*v)?,
        Value::Uint8(v) => src.write_u8(*v)?,
        Value::Sint8(v) => src.write_i8(*v)?,
        Value::Uint16(v) => src.write_u16(*v)?,
        Value::Sint16(v) => src.write_i16(*v)?,
        Value::Float(v) => src.write_f32(*v)?,
        Value::Double(v) => src.write_f64(*v)?,
        Value::String(s) => src.write_string(s)?,
    }
    Ok(())
}

/// Read a value of the value-form type `ty`.
///
/// Returns `None` for types that have no archived encoding.
pub fn read_value(src: &mut DataSource<'_>, ty: VarType) -> ArchiveResult<Option<Value>> {
    let value = match ty {
        VarType::Uint => Value::Uint(src.read_u32()?),
        VarType::Int => Value::Int(src.read_i32()?),
        VarType::Ulong => Value::Ulong(src.read_u64()?),
        VarType::Long => Value::Long(src.read_i64()?),
        VarType::Uint8 => Value::Uint8(src.read_u8()?),
        VarType::Sint8 => Value::Sint8(src.read_i8()?),
        VarType::Uint16 => Value::Uint16(src.read_u16()?),
        VarType::Sint16 => Value::Sint16(src.read_i16()?),
        VarType::Uint32 => Value::Uint32(src.read_u32()?),
        VarType::Sint32 => Value::Sint32(src.read_i32()?),
        VarType::Uint64 => Value::Uint64(src.read_u64()?),
        VarType::Sint64 => Value::Sint64(src.read_i64()?),
        VarType::Float => Value::Float(src.read_f32()?),
        VarType::Double => Value::Double(src.read_f64()?),
        VarType::String => Value::String(src.read_string()?),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Persistent entries of `vars`: pointer forms contribute their
/// dereferenced value under the target's code.
pub fn persistent_entries(vars: &[Variable]) -> Vec<(String, i32, Value)> {
    vars.iter()
        .filter_map(|var| {
            let code = var.var_type().code()?;
            let value = var.value()?;
            Some((var.name().to_owned(), code, value))
        })
        .collect()
}

pub fn write_variables(src: &mut DataSource<'_>, vars: &[Variable]) -> ArchiveResult<()> {
    let entries = persistent_entries(vars);
    src.write_u32(VARIABLE_TABLE_VERSION)?;
    src.write_u32(entries.len() as u32)?;
    for (name, code, value) in &entries {
        src.write_string(name)?;
        src.write_i32(*code)?;
        write_value(src, value)?;
    }
    Ok(())
}

pub fn read_variables(src: &mut DataSource<'_>) -> ArchiveResult<Vec<(String, Value)>> {
    let version = src.read_u32()?;
    if version != VARIABLE_TABLE_VERSION {
        return Err(ArchiveError::UnsupportedTableVersion(version));
    }
    let count = src.read_u32()?;
    let mut out = Vec::new();
    for _ in 0..count {
        let name = src.read_string()?;
        let code = src.read_i32()?;
        let value = match VarType::from_code(code) {
            Some(ty) => read_value(src, ty)?,
            None => None,
        };
        match value {
            Some(value) => out.push((name, value)),
            None => return Err(ArchiveError::UnknownVariableCode { name, code }),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{shared, ClassRegistry, ClassSpec, Object, StrBuf, Uint};
    use std::sync::Arc;

    fn object() -> Object {
        let class = ClassRegistry::new().register(ClassSpec::new("Thing")).unwrap();
        Object::new(&class, "t")
    }

    fn encode(vars: &[Variable]) -> Vec<u8> {
        let mut src = DataSource::open_auto();
        write_variables(&mut src, vars).unwrap();
        src.into_bytes().unwrap()
    }

    #[test]
    fn table_skips_non_persistent_types() {
        let o = object();
        o.set("a", 1u8);
        o.set_pointer("p", Arc::new(0u8));
        o.bind_object("self", &o);
        o.set_string("s", "text");

        let decoded = read_variables(&mut DataSource::open_const(&encode(&o.variables()))).unwrap();
        assert_eq!(
            decoded,
            vec![
                ("a".to_owned(), Value::Uint8(1)),
                ("s".to_owned(), Value::String("text".into())),
            ]
        );
    }

    #[test]
    fn bound_values_are_dereferenced() {
        let o = object();
        let cell = shared(Uint(77));
        let text = shared(StrBuf::with_text(8, "bound"));
        o.bind("u", &cell);
        o.bind_string("s", &text);

        let entries = persistent_entries(&o.variables());
        assert_eq!(entries[0], ("u".to_owned(), VarType::Uint.code().unwrap(), Value::Uint(77)));
        assert_eq!(entries[1].2, Value::String("bound".into()));
    }

    #[test]
    fn every_value_type_decodes() {
        let o = object();
        o.set("u", Uint(1));
        o.set("i", arbor_core::Int(-2));
        o.set("ul", arbor_core::Ulong(3));
        o.set("l", arbor_core::Long(-4));
        o.set("u8", 5u8);
        o.set("i8", -6i8);
        o.set("u16", 7u16);
        o.set("i16", -8i16);
        o.set("u32", 9u32);
        o.set("i32", -10i32);
        o.set("u64", 11u64);
        o.set("i64", -12i64);
        o.set("f", 1.25f32);
        o.set("d", -2.5f64);
        o.set_string("s", "str");

        let decoded = read_variables(&mut DataSource::open_const(&encode(&o.variables()))).unwrap();
        let original = persistent_entries(&o.variables());
        assert_eq!(decoded.len(), original.len());
        for ((name, value), (orig_name, _, orig)) in decoded.iter().zip(&original) {
            assert_eq!(name, orig_name);
            assert!(value.same_bits(orig), "{name}");
        }
    }

    #[test]
    fn unknown_code_is_an_error() {
        let mut src = DataSource::open_auto();
        src.write_u32(VARIABLE_TABLE_VERSION).unwrap();
        src.write_u32(1).unwrap();
        src.write_string("bad").unwrap();
        src.write_i32(99).unwrap();
        let bytes = src.into_bytes().unwrap();
        assert!(matches!(
            read_variables(&mut DataSource::open_const(&bytes)),
            Err(ArchiveError::UnknownVariableCode { code: 99, .. })
        ));
    }

    #[test]
    fn table_version_is_checked() {
        let mut src = DataSource::open_auto();
        src.write_u32(2).unwrap();
        src.write_u32(0).unwrap();
        let bytes = src.into_bytes().unwrap();
        assert!(matches!(
            read_variables(&mut DataSource::open_const(&bytes)),
            Err(ArchiveError::UnsupportedTableVersion(2))
        ));
    }
}
