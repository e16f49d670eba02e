//! Type-directed object reader (§4.F) and the `TAG0`/`TCM0` top-level
//! entry points that sit on top of it.
//!
//! Mirrors the split `idb-rs` draws between a section-framed container and
//! the type-directed walk over its payload: `schema::reader` already
//! recovers the type system, this module walks it to decode object
//! bodies. Items are materialized lazily and memoized by `ItemId`
//! (§3.5/§4.F) rather than eagerly walking the whole item table up front,
//! so an item reachable only via a pointer cycle back to itself resolves
//! to the same, possibly still-being-filled, arena slot instead of
//! recursing forever.

use std::io::{Read, Seek, SeekFrom};

use anyhow::{anyhow, ensure, Result};

use crate::error::Error;
use crate::item::{decode_item_flags, Item, ItemId, ItemTable};
use crate::object::{ObjectGraph, ObjectId, Value};
use crate::primitive::TagRead;
use crate::schema::reader::{read_type_section, Compendium};
use crate::schema::{Schema, SubKind, TypeId, TypeResolver};
use crate::section::{read_section_header, skip_to_section_end};

/// SDK version tags this codec is known to round-trip. Anything else is
/// `UnsupportedSdkVersion` — the one place the format's own self-describing
/// nature doesn't save us, since the SDK tag isn't interpreted further.
pub const SUPPORTED_SDK_VERSIONS: &[&str] =
    &["20150100", "20160100", "20160200", "20180100"];

/// The decoded result of reading one `TAG0` container: the type system it
/// carried (or borrowed from a compendium), every object reached while
/// decoding, and the root object's id.
pub struct TagFile {
    pub schema: Schema,
    pub graph: ObjectGraph,
    pub root: ObjectId,
}

/// Reads a `TAG0` container. `compendium` is consulted only if the file's
/// `TYPE` section turns out to be a `TCRF` cross-reference.
pub fn read_tag0<R: Read + Seek>(
    r: &mut R,
    compendium: Option<&Compendium>,
) -> Result<TagFile> {
    let root = read_section_header(r, &["TAG0"])?;

    let sdkv = read_section_header(r, &["SDKV"])?;
    let mut sdk = [0u8; 8];
    r.read_exact(&mut sdk)?;
    let sdk_str = String::from_utf8_lossy(&sdk).into_owned();
    ensure!(
        SUPPORTED_SDK_VERSIONS.contains(&sdk_str.as_str()),
        Error::UnsupportedSdkVersion(sdk_str.clone().into_boxed_str())
    );
    skip_to_section_end(r, &sdkv)?;

    let data = read_section_header(r, &["DATA"])?;
    let data_start = data.body_start;
    skip_to_section_end(r, &data)?;

    let schema = read_type_section(r, compendium)?;
    let items = read_item_table(r)?;

    let mut reader = ObjectReader::new(&schema, items, data_start);
    let root_ids = reader.materialize(r, ItemId(1))?;
    let root_id = *root_ids
        .first()
        .ok_or_else(|| anyhow!("item #1 (the root item) is empty"))?;

    skip_to_section_end(r, &root)?;

    Ok(TagFile {
        schema,
        graph: reader.graph,
        root: root_id,
    })
}

/// Reads the `INDX` section: `ITEM` (the item table proper) followed by
/// `PTCH` (relocations, needed only by writers — skipped here per §4.E).
fn read_item_table<R: Read + Seek>(r: &mut R) -> Result<ItemTable> {
    let indx = read_section_header(r, &["INDX"])?;

    let item_sec = read_section_header(r, &["ITEM"])?;
    ensure!(
        item_sec.len() % 12 == 0,
        "ITEM section length {} is not a multiple of the 12-byte record size",
        item_sec.len()
    );
    let record_count = item_sec.len() / 12;
    ensure!(record_count >= 1, "ITEM section is missing its null entry");

    let mut table = ItemTable::new();
    // The first record is the reserved null entry `ItemTable::new` already
    // accounts for; consume and discard its bytes.
    let mut null_rec = [0u8; 12];
    r.read_exact(&mut null_rec)?;

    for _ in 1..record_count {
        let dword0 = r.read_u32()?;
        let (type_wire, is_ptr, is_value_array) = decode_item_flags(dword0);
        let offset = r.read_u32()?;
        let count = r.read_u32()?;
        let typ = TypeId(type_wire.wrapping_sub(1));
        table.push(Item {
            typ,
            offset,
            count,
            is_ptr,
            is_value_array,
            value: None,
        });
    }
    skip_to_section_end(r, &item_sec)?;

    let ptch = read_section_header(r, &["PTCH"])?;
    skip_to_section_end(r, &ptch)?;

    skip_to_section_end(r, &indx)?;
    Ok(table)
}

struct ObjectReader<'s> {
    schema: &'s Schema,
    resolver: TypeResolver<'s>,
    items: ItemTable,
    graph: ObjectGraph,
    data_start: u64,
    cache: std::collections::HashMap<ItemId, Vec<ObjectId>>,
}

impl<'s> ObjectReader<'s> {
    fn new(schema: &'s Schema, items: ItemTable, data_start: u64) -> Self {
        ObjectReader {
            schema,
            resolver: TypeResolver::new(schema),
            items,
            graph: ObjectGraph::new(),
            data_start,
            cache: std::collections::HashMap::new(),
        }
    }

    fn seek_data<R: Seek>(&self, r: &mut R, offset: u64) -> Result<()> {
        r.seek(SeekFrom::Start(self.data_start + offset))?;
        Ok(())
    }

    /// Materializes item `id`'s element sequence, caching the result by
    /// `ItemId`. The cache entry is installed with freshly allocated (but
    /// not-yet-decoded) arena slots *before* any element is decoded, so a
    /// pointer cycle reaching back into this same item during decoding
    /// sees the same stable ids rather than recursing.
    fn materialize<R: Read + Seek>(&mut self, r: &mut R, id: ItemId) -> Result<Vec<ObjectId>> {
        if let Some(ids) = self.cache.get(&id) {
            return Ok(ids.clone());
        }
        let item = self.items.get(id);
        let elem_type = item.typ;
        let count = item.count;
        let offset = item.offset as u64;
        let stride = self.resolver.super_type(elem_type)?;
        let stride = self.schema.get(stride).byte_size as u64;

        let ids: Vec<ObjectId> = (0..count)
            .map(|_| self.graph.insert(elem_type, Value::Int(0)))
            .collect();
        self.cache.insert(id, ids.clone());

        for (i, &slot) in ids.iter().enumerate() {
            let elem_offset = offset + i as u64 * stride;
            let value = self.decode_value(r, elem_type, elem_offset)?;
            self.graph.get_mut(slot).value = value;
        }

        Ok(ids)
    }

    /// Reads one object of type `typ` at `offset` (relative to `DATA`'s
    /// start) and returns a freshly allocated object for it. Used for
    /// nested values that don't need item-table sharing (class members,
    /// tuple elements) — `materialize` handles the item-table cases.
    fn read_object<R: Read + Seek>(&mut self, r: &mut R, typ: TypeId, offset: u64) -> Result<ObjectId> {
        let value = self.decode_value(r, typ, offset)?;
        Ok(self.graph.insert(typ, value))
    }

    fn decode_value<R: Read + Seek>(&mut self, r: &mut R, typ: TypeId, offset: u64) -> Result<Value> {
        let s_id = self.resolver.super_type(typ)?;
        let s = self.schema.get(s_id).clone();
        let sub_kind = s
            .sub_kind()
            .ok_or_else(|| anyhow!("type {:?} has no recognized sub-kind", s.name))?;

        match sub_kind {
            SubKind::Void | SubKind::Invalid => Ok(Value::Int(0)),
            SubKind::Bool => {
                self.seek_data(r, offset)?;
                let raw = self.read_int_fixed(r, &s)?;
                Ok(Value::Bool(raw != 0))
            }
            SubKind::Int => {
                self.seek_data(r, offset)?;
                let raw = self.read_int_fixed(r, &s)?;
                Ok(Value::Int(raw))
            }
            SubKind::Float => {
                self.seek_data(r, offset)?;
                Ok(Value::Float(r.read_f32()?))
            }
            SubKind::String => {
                self.seek_data(r, offset)?;
                let wire = r.read_u32()?;
                let item_id = ItemTable::resolve_wire(wire);
                let Some(item_id) = item_id else {
                    return Ok(Value::String(Vec::new()));
                };
                let item = self.items.get(item_id);
                let string_offset = self.data_start + item.offset as u64;
                r.seek(SeekFrom::Start(string_offset))?;
                let mut buf = vec![0u8; item.count as usize];
                r.read_exact(&mut buf)?;
                if let Some(nul_at) = buf.iter().position(|&b| b == 0) {
                    buf.truncate(nul_at);
                }
                Ok(Value::String(buf))
            }
            SubKind::Pointer => {
                self.seek_data(r, offset)?;
                let wire = r.read_u32()?;
                let Some(item_id) = ItemTable::resolve_wire(wire) else {
                    return Ok(Value::Pointer(None));
                };
                let count = self.items.get(item_id).count;
                match count {
                    0 => Ok(Value::Pointer(None)),
                    1 => {
                        let ids = self.materialize(r, item_id)?;
                        Ok(Value::Pointer(Some(ids[0])))
                    }
                    // Tolerated per §7/§4.F: an item with >1 element behind
                    // a pointer field is malformed; coerce to null rather
                    // than abort the transaction.
                    _ => Ok(Value::Pointer(None)),
                }
            }
            SubKind::Array => {
                self.seek_data(r, offset)?;
                let wire = r.read_u32()?;
                let Some(item_id) = ItemTable::resolve_wire(wire) else {
                    return Ok(Value::Array(Vec::new()));
                };
                let ids = self.materialize(r, item_id)?;
                Ok(Value::Array(ids))
            }
            SubKind::Class => {
                let members = self.resolver.all_members(s_id)?;
                let mut out = Vec::with_capacity(members.len());
                for member in members.iter() {
                    if member.is_void() {
                        continue;
                    }
                    let member_typ = member.typ;
                    let member_offset = offset + member.byte_offset as u64;
                    let id = self.read_object(r, member_typ, member_offset)?;
                    out.push((member.name.clone(), id));
                }
                Ok(Value::Class(out))
            }
            SubKind::Tuple => {
                let tuple_size = s.tuple_size();
                let elem_typ = s
                    .sub_type
                    .ok_or_else(|| anyhow!("tuple type {:?} has no subType", s.name))?;
                let elem_super = self.resolver.super_type(elem_typ)?;
                let stride = self.schema.get(elem_super).byte_size as u64;
                let mut out = Vec::with_capacity(tuple_size as usize);
                for i in 0..tuple_size {
                    let id = self.read_object(r, elem_typ, offset + i as u64 * stride)?;
                    out.push(id);
                }
                Ok(Value::Tuple(out))
            }
        }
    }

    fn read_int_fixed<R: Read>(&self, r: &mut R, s: &crate::schema::Type) -> Result<i64> {
        let width = s.int_width_bytes();
        let signed = s.is_signed();
        Ok(match width {
            1 => {
                let v = r.read_u8()?;
                if signed {
                    v as i8 as i64
                } else {
                    v as i64
                }
            }
            2 => {
                let v = r.read_u16()?;
                if signed {
                    v as i16 as i64
                } else {
                    v as i64
                }
            }
            4 => {
                let v = r.read_u32()?;
                if signed {
                    v as i32 as i64
                } else {
                    v as i64
                }
            }
            8 => {
                let v = r.read_u64()?;
                if signed {
                    v as i64
                } else {
                    v as i64
                }
            }
            other => return Err(anyhow!("unsupported integer width {other}")),
        })
    }
}
