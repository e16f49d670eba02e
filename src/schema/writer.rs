//! Emits a [`Schema`] as a `TYPE` section: the exact inverse of
//! `schema::reader::read_type_section`.

use std::io::{Seek, Write};

use anyhow::Result;

use crate::primitive::TagWrite;
use crate::section::{begin_section, pad_to};

use super::{flag, Schema, Template, TypeId};

/// Collects the first-seen-order string pools `writeTypeSection` needs:
/// type/template names in one pool, field names in another.
fn build_string_pools(schema: &Schema) -> (Vec<String>, Vec<String>) {
    let mut type_strings: Vec<String> = Vec::new();
    let mut field_strings: Vec<String> = Vec::new();

    for typ in &schema.types {
        if !type_strings.iter().any(|s| s == &*typ.name) {
            type_strings.push(typ.name.to_string());
        }
        for template in &typ.templates {
            let name = template.name();
            if !type_strings.iter().any(|s| s == name) {
                type_strings.push(name.to_string());
            }
        }
        for member in &typ.members {
            if !field_strings.iter().any(|s| s == &*member.name) {
                field_strings.push(member.name.to_string());
            }
        }
    }

    (type_strings, field_strings)
}

fn wire_index(id: Option<TypeId>) -> u64 {
    Schema::wire_index(id) as u64
}

pub fn write_type_section<W: Write + Seek>(w: &mut W, schema: &Schema) -> Result<()> {
    let outer = begin_section(w, b"TYPE", false)?;

    let tptr = begin_section(w, b"TPTR", true)?;
    w.write_all(&vec![0u8; 8 * (schema.types.len() + 1)])?;
    tptr.end(w)?;

    let (type_strings, field_strings) = build_string_pools(schema);

    let tstr = begin_section(w, b"TSTR", true)?;
    for s in &type_strings {
        w.write_all(s.as_bytes())?;
        w.write_u8(0)?;
    }
    tstr.end(w)?;

    let tnam = begin_section(w, b"TNAM", true)?;
    w.write_packed(schema.types.len() as u64)?;
    for typ in &schema.types {
        let name_idx = type_strings.iter().position(|s| s == &*typ.name).unwrap();
        w.write_packed(name_idx as u64)?;
        w.write_packed(typ.templates.len() as u64)?;
        for template in &typ.templates {
            let tname_idx = type_strings
                .iter()
                .position(|s| s == template.name())
                .unwrap();
            w.write_packed(tname_idx as u64)?;
            match template {
                Template::Value { value, .. } => w.write_packed(*value as u64)?,
                Template::Type { value, .. } => w.write_packed(wire_index(Some(*value)))?,
            }
        }
    }
    tnam.end(w)?;

    let fstr = begin_section(w, b"FSTR", true)?;
    for s in &field_strings {
        w.write_all(s.as_bytes())?;
        w.write_u8(0)?;
    }
    fstr.end(w)?;

    let tbod = begin_section(w, b"TBOD", true)?;
    for (i, typ) in schema.types.iter().enumerate() {
        w.write_packed(wire_index(Some(TypeId(i as u32))))?;
        w.write_packed(wire_index(typ.parent))?;
        w.write_packed(typ.flags as u64)?;

        if typ.flags & flag::HAS_FORMAT_INFO != 0 {
            w.write_packed(typ.format_info as u64)?;
        }
        if typ.flags & flag::HAS_SUB_TYPE != 0 {
            w.write_packed(wire_index(typ.sub_type))?;
        }
        if typ.flags & flag::HAS_VERSION != 0 {
            w.write_packed(typ.version as u64)?;
        }
        if typ.flags & flag::HAS_BYTE_SIZE != 0 {
            w.write_packed(typ.byte_size as u64)?;
            w.write_packed(typ.alignment as u64)?;
        }
        if typ.flags & flag::HAS_UNKNOWN_FLAGS != 0 {
            w.write_packed(typ.abstract_value as u64)?;
        }
        if typ.flags & flag::HAS_MEMBERS != 0 {
            w.write_packed(typ.members.len() as u64)?;
            for member in &typ.members {
                let idx = field_strings
                    .iter()
                    .position(|s| s == &*member.name)
                    .unwrap();
                w.write_packed(idx as u64)?;
                w.write_packed(member.flags as u64)?;
                w.write_packed(member.byte_offset as u64)?;
                w.write_packed(wire_index(Some(member.typ)))?;
            }
        }
        if typ.flags & flag::HAS_INTERFACES != 0 {
            w.write_packed(typ.interfaces.len() as u64)?;
            for (iface_typ, iface_flag) in &typ.interfaces {
                w.write_packed(wire_index(Some(*iface_typ)))?;
                w.write_packed(*iface_flag as u64)?;
            }
        }
    }
    tbod.end(w)?;

    let thsh = begin_section(w, b"THSH", true)?;
    let hashed: Vec<(usize, u32)> = schema
        .types
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.hash.map(|h| (i, h)))
        .collect();
    w.write_packed(hashed.len() as u64)?;
    for (i, hash) in hashed {
        w.write_packed(wire_index(Some(TypeId(i as u32))))?;
        w.write_u32(hash)?;
    }
    thsh.end(w)?;

    let tpad = begin_section(w, b"TPAD", true)?;
    pad_to(w, 4)?;
    tpad.end(w)?;

    outer.end(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::reader::read_type_section;
    use crate::schema::{flag, Member, Type};
    use std::io::Cursor;

    #[test]
    fn roundtrips_a_small_schema() {
        let mut base = Type::new("hkInt32");
        base.flags = flag::HAS_FORMAT_INFO | flag::HAS_BYTE_SIZE;
        base.format_info = 0x04 | super::super::FLAG_INT32 | super::super::FLAG_IS_SIGNED;
        base.byte_size = 4;
        base.alignment = 4;

        let mut derived = Type::new("MyClass");
        derived.flags = flag::HAS_FORMAT_INFO | flag::HAS_BYTE_SIZE | flag::HAS_MEMBERS;
        derived.format_info = 0x07; // Class
        derived.byte_size = 4;
        derived.alignment = 4;
        derived.members.push(Member {
            name: "field".into(),
            flags: 0,
            byte_offset: 0,
            typ: TypeId(0),
        });

        let schema = Schema {
            types: vec![base, derived],
        };

        let mut buf = Cursor::new(Vec::new());
        write_type_section(&mut buf, &schema).unwrap();

        let mut cur = Cursor::new(buf.into_inner());
        let parsed = read_type_section(&mut cur, None).unwrap();
        assert_eq!(parsed.types.len(), 2);
        assert_eq!(&*parsed.types[1].name, "MyClass");
        assert_eq!(parsed.types[1].members.len(), 1);
        assert_eq!(&*parsed.types[1].members[0].name, "field");
    }
}
