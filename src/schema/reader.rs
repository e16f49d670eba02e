//! Parses the `TYPE`/`TCRF` section into a [`Schema`], and the sidecar
//! `TCM0` compendium container that a `TCRF` reference may point at.

use std::io::{Read, Seek};

use anyhow::{ensure, Context, Result};

use crate::primitive::TagRead;
use crate::section::{read_section_header, skip_to_section_end};

use super::{flag, Member, Schema, Template, Type};

/// A sidecar file holding a type list shared by one or more lean tag files,
/// each of which references it by an 8-byte id rather than carrying its
/// own `TYPE` section.
#[derive(Clone)]
pub struct Compendium {
    pub ids: Vec<[u8; 8]>,
    pub schema: Schema,
}

impl Compendium {
    pub fn contains(&self, id: &[u8; 8]) -> bool {
        self.ids.iter().any(|x| x == id)
    }
}

/// Reads a `TCM0` container: `TCID` (list of 8-byte ids) followed by an
/// inline `TYPE` body (never a `TCRF` — a compendium always carries its
/// own schema).
pub fn read_compendium<R: Read + Seek>(r: &mut R) -> Result<Compendium> {
    let root = read_section_header(r, &["TCM0"])?;

    let tcid = read_section_header(r, &["TCID"])?;
    let count = tcid.len() / 8;
    let mut ids = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut id = [0u8; 8];
        r.read_exact(&mut id)?;
        ids.push(id);
    }
    skip_to_section_end(r, &tcid)?;

    let schema = read_type_section(r, None)?;
    skip_to_section_end(r, &root)?;

    Ok(Compendium { ids, schema })
}

/// Reads the `TYPE`-or-`TCRF` section that follows `DATA` in a `TAG0`
/// container. `compendium` is consulted only for the `TCRF` case.
pub fn read_type_section<R: Read + Seek>(
    r: &mut R,
    compendium: Option<&Compendium>,
) -> Result<Schema> {
    let header = read_section_header(r, &["TYPE", "TCRF"])?;

    if &header.signature == b"TCRF" {
        let mut id = [0u8; 8];
        r.read_exact(&mut id)?;
        let compendium = compendium.context("TCRF section present but no compendium was supplied")?;
        ensure!(
            compendium.contains(&id),
            "compendium does not contain id {:02x?}",
            id
        );
        skip_to_section_end(r, &header)?;
        return Ok(compendium.schema.clone());
    }

    let tptr = read_section_header(r, &["TPTR"])?;
    skip_to_section_end(r, &tptr)?;

    let tstr = read_section_header(r, &["TSTR"])?;
    let mut buf = vec![0u8; tstr.len() as usize];
    r.read_exact(&mut buf)?;
    let type_strings = split_nul_pool(&buf);
    skip_to_section_end(r, &tstr)?;

    let tnam = read_section_header(r, &["TNAM", "TNA1"])?;
    let type_count = r.read_packed_u32()?;
    let mut types: Vec<Type> = (0..type_count).map(|_| Type::new("")).collect();

    for typ in types.iter_mut() {
        let name_idx = r.read_packed_u32()? as usize;
        typ.name = type_strings[name_idx].clone().into_boxed_str();

        let template_count = r.read_packed_u32()?;
        for _ in 0..template_count {
            let tname_idx = r.read_packed_u32()? as usize;
            let name = type_strings[tname_idx].clone().into_boxed_str();
            let raw_value = r.read_packed_u32()?;
            let template = if name.starts_with('t') {
                Template::Type {
                    name,
                    value: super::TypeId(raw_value.wrapping_sub(1)),
                }
            } else {
                Template::Value {
                    name,
                    value: raw_value as i64,
                }
            };
            typ.templates.push(template);
        }
    }
    skip_to_section_end(r, &tnam)?;

    let fstr = read_section_header(r, &["FSTR"])?;
    let mut buf = vec![0u8; fstr.len() as usize];
    r.read_exact(&mut buf)?;
    let field_strings = split_nul_pool(&buf);
    skip_to_section_end(r, &fstr)?;

    let tbod = read_section_header(r, &["TBOD", "TBDY"])?;
    while r.stream_position()? < tbod.body_end {
        let type_idx = r.read_packed_u32()?;
        if type_idx == 0 {
            continue;
        }
        let id = type_idx - 1;
        let parent_idx = r.read_packed_u32()?;
        let parent = if parent_idx == 0 {
            None
        } else {
            Some(super::TypeId(parent_idx - 1))
        };
        let flags = r.read_packed_u32()?;
        ensure!(
            flags & flag::RESERVED as u32 == 0,
            "type has the unknown-flag bit (0x80) set"
        );
        let flags = flags as u8;

        let mut format_info = 0u32;
        if flags & flag::HAS_FORMAT_INFO != 0 {
            format_info = r.read_packed_u32()?;
        }

        let mut sub_type = None;
        if flags & flag::HAS_SUB_TYPE != 0 {
            let idx = r.read_packed_u32()?;
            sub_type = if idx == 0 {
                None
            } else {
                Some(super::TypeId(idx - 1))
            };
        }

        let mut version = 0u32;
        if flags & flag::HAS_VERSION != 0 {
            version = r.read_packed_u32()?;
        }

        let mut byte_size = 0u32;
        let mut alignment = 0u32;
        if flags & flag::HAS_BYTE_SIZE != 0 {
            byte_size = r.read_packed_u32()?;
            alignment = r.read_packed_u32()?;
        }

        let mut abstract_value = 0u32;
        if flags & flag::HAS_UNKNOWN_FLAGS != 0 {
            abstract_value = r.read_packed_u32()?;
        }

        let mut members = Vec::new();
        if flags & flag::HAS_MEMBERS != 0 {
            let lead = r.read_u8()?;
            let count = if lead == 0xC3 {
                let b2 = r.read_u8()?;
                if b2 == 0 {
                    r.read_packed_u32()?
                } else {
                    (b2 & 0x3F) as u32
                }
            } else {
                (lead & 0x3F) as u32
            };
            for _ in 0..count {
                let field_idx = r.read_packed_u32()? as usize;
                let mflags = r.read_packed_u32()? as u8;
                let byte_offset = r.read_packed_u32()?;
                let typ_idx = r.read_packed_u32()?;
                members.push(Member {
                    name: field_strings[field_idx].clone().into_boxed_str(),
                    flags: mflags,
                    byte_offset,
                    typ: super::TypeId(typ_idx.wrapping_sub(1)),
                });
            }
        }

        let mut interfaces = Vec::new();
        if flags & flag::HAS_INTERFACES != 0 {
            let count = r.read_packed_u32()?;
            for _ in 0..count {
                let tidx = r.read_packed_u32()?;
                let iflags = r.read_packed_u32()?;
                interfaces.push((super::TypeId(tidx.wrapping_sub(1)), iflags));
            }
        }

        let typ = &mut types[id as usize];
        typ.parent = parent;
        typ.flags = flags;
        typ.format_info = format_info;
        typ.sub_type = sub_type;
        typ.version = version;
        typ.byte_size = byte_size;
        typ.alignment = alignment;
        typ.abstract_value = abstract_value;
        typ.members = members;
        typ.interfaces = interfaces;
    }
    skip_to_section_end(r, &tbod)?;

    let thsh = read_section_header(r, &["THSH"])?;
    let hash_count = r.read_packed_u32()?;
    for _ in 0..hash_count {
        let idx = r.read_packed_u32()?;
        let hash = r.read_u32()?;
        if idx != 0 {
            types[(idx - 1) as usize].hash = Some(hash);
        }
    }
    skip_to_section_end(r, &thsh)?;

    let tpad = read_section_header(r, &["TPAD"])?;
    skip_to_section_end(r, &tpad)?;

    skip_to_section_end(r, &header)?;
    Ok(Schema { types })
}

fn split_nul_pool(buf: &[u8]) -> Vec<String> {
    buf.split(|&b| b == 0)
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::TagWrite;
    use crate::section::begin_section;
    use std::io::{Cursor, Write};

    /// Builds the smallest valid `TYPE` section: one scalar type (`hkInt32`)
    /// with no parent, no members.
    fn build_minimal_type_section() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        let outer = begin_section(&mut buf, b"TYPE", false).unwrap();

        let tptr = begin_section(&mut buf, b"TPTR", true).unwrap();
        tptr.end(&mut buf).unwrap();

        let tstr = begin_section(&mut buf, b"TSTR", true).unwrap();
        buf.write_all(b"hkInt32\0").unwrap();
        tstr.end(&mut buf).unwrap();

        let tnam = begin_section(&mut buf, b"TNAM", true).unwrap();
        buf.write_packed(1).unwrap(); // type count
        buf.write_packed(0).unwrap(); // name index
        buf.write_packed(0).unwrap(); // template count
        tnam.end(&mut buf).unwrap();

        let fstr = begin_section(&mut buf, b"FSTR", true).unwrap();
        buf.write_all(b"\0").unwrap();
        fstr.end(&mut buf).unwrap();

        let tbod = begin_section(&mut buf, b"TBOD", true).unwrap();
        buf.write_packed(1).unwrap(); // type index (1-based)
        buf.write_packed(0).unwrap(); // parent (none)
        let flags = flag::HAS_FORMAT_INFO | flag::HAS_BYTE_SIZE;
        buf.write_packed(flags as u64).unwrap();
        buf.write_packed(0x04 | super::FLAG_INT32 as u64 | super::FLAG_IS_SIGNED as u64)
            .unwrap();
        buf.write_packed(4).unwrap(); // byteSize
        buf.write_packed(4).unwrap(); // alignment
        tbod.end(&mut buf).unwrap();

        let thsh = begin_section(&mut buf, b"THSH", true).unwrap();
        buf.write_packed(0).unwrap();
        thsh.end(&mut buf).unwrap();

        let tpad = begin_section(&mut buf, b"TPAD", true).unwrap();
        tpad.end(&mut buf).unwrap();

        outer.end(&mut buf).unwrap();
        buf.into_inner()
    }

    #[test]
    fn parses_minimal_type_section() {
        let bytes = build_minimal_type_section();
        let mut cur = Cursor::new(bytes);
        let schema = read_type_section(&mut cur, None).unwrap();
        assert_eq!(schema.types.len(), 1);
        assert_eq!(&*schema.types[0].name, "hkInt32");
        assert_eq!(schema.types[0].byte_size, 4);
        assert!(schema.types[0].is_signed());
    }
}
