//! Type-directed object writer (§4.G): the inverse of `reader.rs`.
//!
//! Mirrors the source's two-phase emission: first a `typeScan` over the
//! object graph that discovers which types are actually reachable and
//! assigns each referenced item its place in the item table, then a single
//! `DATA` pass that writes every object body, recording `PTCH` relocations
//! as it goes. Splitting this into two passes (rather than writing `DATA`
//! and the item table in one walk) is what lets every pointer/array/string
//! field write its item's wire index *before* that item's own body has
//! necessarily been emitted — item numbers are handed out up front.

use std::collections::HashMap;
use std::io::{Seek, SeekFrom, Write};

use anyhow::{anyhow, Result};

use crate::item::{encode_item_flags, Item, ItemId, ItemTable, PatchList};
use crate::object::{ObjectGraph, ObjectId, Value};
use crate::primitive::{next_power_of_two, TagWrite};
use crate::schema::{flag, Schema, SubKind, Type, TypeId, TypeResolver, FLAG_INT8};
use crate::section::{begin_section, pad_to};

/// SDK version tag stamped on freshly written files; matches the newest
/// entry `reader::SUPPORTED_SDK_VERSIONS` accepts.
pub const DEFAULT_SDK_VERSION: &[u8; 8] = b"20180100";

/// Finds the schema's `char` type (a string's element type, §4.G's
/// `makeItem`), appending a synthesized byte-wide one if the caller's
/// schema doesn't already carry one. A full type database always has
/// this entry; hand-built schemas in tests generally don't.
fn ensure_char_type(schema: &mut Schema) -> TypeId {
    if let Some(id) = schema.find_by_name("char") {
        return id;
    }
    let mut char_type = Type::new("char");
    char_type.flags = flag::HAS_FORMAT_INFO | flag::HAS_BYTE_SIZE;
    char_type.format_info = 0x04 | FLAG_INT8; // Int sub-kind, 8-bit
    char_type.byte_size = 1;
    char_type.alignment = 1;
    schema.types.push(char_type);
    TypeId((schema.types.len() - 1) as u32)
}

/// Writes a complete `TAG0` container for `root`, with `schema` as its
/// (always inline, never `TCRF`) type section.
pub fn write_tag0<W: Write + Seek>(
    w: &mut W,
    schema: &Schema,
    graph: &ObjectGraph,
    root: ObjectId,
) -> Result<()> {
    let tag0 = begin_section(w, b"TAG0", true)?;

    let sdkv = begin_section(w, b"SDKV", false)?;
    w.write_all(DEFAULT_SDK_VERSION)?;
    sdkv.end(w)?;

    let mut schema = schema.clone();
    let char_type = ensure_char_type(&mut schema);

    let mut planner = ItemPlanner::new(&schema, graph);
    let root_item = planner.plan_root(root)?;

    let data = begin_section(w, b"DATA", true)?;
    let data_start = w.stream_position()?;
    let mut emitter = ObjectEmitter::new(
        &schema,
        graph,
        data_start,
        planner.items,
        planner.patches,
        char_type,
    );
    emitter.emit_all(w)?;
    pad_to(w, 16)?;
    data.end(w)?;

    crate::schema::writer::write_type_section(w, &schema)?;

    write_item_table(w, &emitter.items, &emitter.patches, root_item)?;

    tag0.end(w)
}

/// Rounds `offset` up to the next-power-of-two of `alignment` (§4.A/§4.G:
/// "pad to next-power-of-two of the element type's alignment").
fn pad_offset(offset: u32, alignment: u32) -> u32 {
    let align = next_power_of_two(alignment.max(1));
    let rem = offset % align;
    if rem == 0 {
        offset
    } else {
        offset + (align - rem)
    }
}

/// Phase one: walks the graph reachable from `root`, deciding which objects
/// need an item-table entry (anything reached through a pointer, array, or
/// string field — §4.G's `makeItem`) and registering them in emission
/// order. Scalars and class/tuple members embedded directly in a parent's
/// byte range never get their own item.
struct ItemPlanner<'s> {
    schema: &'s Schema,
    graph: &'s ObjectGraph,
    resolver: TypeResolver<'s>,
    items: ItemTable,
    patches: PatchList,
    /// Memoizes the item already allocated for a given (first) object of a
    /// sequence, so a pointer reached twice shares one item rather than
    /// being emitted twice.
    item_for_object: HashMap<ObjectId, ItemId>,
}

impl<'s> ItemPlanner<'s> {
    fn new(schema: &'s Schema, graph: &'s ObjectGraph) -> Self {
        ItemPlanner {
            schema,
            graph,
            resolver: TypeResolver::new(schema),
            items: ItemTable::new(),
            patches: PatchList::new(),
            item_for_object: HashMap::new(),
        }
    }

    /// The root item always wraps `root` as a single-element, pointer-like
    /// sequence (§4.G: "the root item is item #1").
    fn plan_root(&mut self, root: ObjectId) -> Result<ItemId> {
        let typ = self.graph.get(root).typ;
        let id = self.alloc_item(typ, vec![root], true, false)?;
        self.walk(root)?;
        Ok(id)
    }

    fn alloc_item(
        &mut self,
        typ: TypeId,
        members: Vec<ObjectId>,
        is_ptr: bool,
        is_value_array: bool,
    ) -> Result<ItemId> {
        let count = members.len() as u32;
        let id = self.items.push(Item {
            typ,
            offset: 0,
            count,
            is_ptr,
            is_value_array,
            value: Some(members.clone()),
        });
        if let Some(&first) = members.first() {
            self.item_for_object.insert(first, id);
        }
        Ok(id)
    }

    /// Recursively discovers items reachable from `id`, without assigning
    /// byte offsets yet (that happens in the emit pass once every item's
    /// size is known).
    fn walk(&mut self, id: ObjectId) -> Result<()> {
        let obj_typ = self.graph.get(id).typ;
        let super_id = self.resolver.super_type(obj_typ)?;
        let sub_kind = self
            .schema
            .get(super_id)
            .sub_kind()
            .ok_or_else(|| anyhow!("type {:?} has no recognized sub-kind", self.schema.get(super_id).name))?;

        match &self.graph.get(id).value {
            Value::Class(members) => {
                let members = members.clone();
                for (_, member_id) in members {
                    self.walk(member_id)?;
                }
            }
            Value::Tuple(elems) => {
                let elems = elems.clone();
                for elem in elems {
                    self.walk(elem)?;
                }
            }
            Value::Pointer(Some(target)) => {
                if !self.item_for_object.contains_key(target) {
                    let target_typ = self.graph.get(*target).typ;
                    self.alloc_item(target_typ, vec![*target], true, false)?;
                    self.walk(*target)?;
                }
            }
            Value::Array(elems) => {
                if !elems.is_empty() && !self.item_for_object.contains_key(&elems[0]) {
                    let elem_typ = self.graph.get(elems[0]).typ;
                    let is_value_array = !matches!(sub_kind, SubKind::Pointer);
                    self.alloc_item(elem_typ, elems.clone(), false, is_value_array)?;
                    for &e in elems {
                        self.walk(e)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Phase two: lays out every planned item's byte offset inside `DATA` and
/// writes both the object bytes and the item/patch tables that describe
/// them.
///
/// String bodies can't be sized up front the way object items can (their
/// length is data, not type, dependent), so they're handled as their own
/// sub-phase: `write_object` only records where each non-empty string's
/// wire field lives and what bytes it needs, and `emit_all` appends the
/// actual bytes — each becoming its own item — only after every object
/// item's fixed-size region has been fully written, then seeks back to
/// patch each recorded wire field. Doing this inline (appending at
/// "current end of stream" the moment a string is encountered) would
/// collide with later fields of the very object being written, since a
/// class's members are emitted in ascending byte-offset order but a
/// string member rarely sits last.
struct ObjectEmitter<'s> {
    schema: &'s Schema,
    graph: &'s ObjectGraph,
    resolver: TypeResolver<'s>,
    data_start: u64,
    items: ItemTable,
    patches: PatchList,
    item_for_object: HashMap<ObjectId, ItemId>,
    /// `char` type to tag synthesized string items with (§4.G's
    /// `makeItem`: `item.typ = self.getType("char")`), not the string
    /// field's own type.
    char_type: TypeId,
    pending_strings: Vec<(u64, Vec<u8>)>,
}

impl<'s> ObjectEmitter<'s> {
    fn new(
        schema: &'s Schema,
        graph: &'s ObjectGraph,
        data_start: u64,
        items: ItemTable,
        patches: PatchList,
        char_type: TypeId,
    ) -> Self {
        let mut item_for_object = HashMap::new();
        for (idx, item) in items.iter().enumerate() {
            if let Some(values) = &item.value {
                if let Some(&first) = values.first() {
                    item_for_object.insert(first, ItemId(idx as u32 + 1));
                }
            }
        }
        ObjectEmitter {
            schema,
            graph,
            resolver: TypeResolver::new(schema),
            data_start,
            items,
            patches,
            item_for_object,
            char_type,
            pending_strings: Vec::new(),
        }
    }

    fn emit_all<W: Write + Seek>(&mut self, w: &mut W) -> Result<()> {
        // Fix each item's offset first (every item's stride is just its
        // element type's byte size) so cross-references written while
        // walking item N can point at item M>N correctly. Each item is
        // padded up to the next-power-of-two of its element type's
        // alignment before its offset is recorded (§4.A/§4.G; §8.1's
        // `I.offset % alignment(I.type) == 0` invariant).
        let mut offset = 0u32;
        let item_count = self.items.len();
        for i in 1..=item_count {
            let id = ItemId(i as u32);
            let typ = self.items.get(id).typ;
            let super_id = self.resolver.super_type(typ)?;
            let element = self.schema.get(super_id);
            let stride = element.byte_size;
            let count = self.items.get(id).count;
            offset = pad_offset(offset, element.alignment);
            self.items.get_mut(id).offset = offset;
            offset += stride.max(1) * count;
        }

        for i in 1..=item_count {
            let id = ItemId(i as u32);
            let values = self.items.get(id).value.clone().unwrap_or_default();
            let typ = self.items.get(id).typ;
            let super_id = self.resolver.super_type(typ)?;
            let stride = self.schema.get(super_id).byte_size as u64;
            let item_offset = self.items.get(id).offset as u64;
            for (i, &obj) in values.iter().enumerate() {
                let pos = item_offset + i as u64 * stride;
                self.write_object(w, obj, pos)?;
            }
        }

        let char_alignment = self.schema.get(self.char_type).alignment;
        let mut cursor = offset as u64;
        for (field_offset, bytes) in std::mem::take(&mut self.pending_strings) {
            cursor = pad_offset(cursor as u32, char_alignment) as u64;
            let item_id = self.items.push(Item {
                typ: self.char_type,
                offset: cursor as u32,
                count: bytes.len() as u32,
                is_ptr: false,
                is_value_array: true,
                value: None,
            });
            self.seek_data(w, cursor)?;
            w.write_all(&bytes)?;
            cursor += bytes.len() as u64;

            self.seek_data(w, field_offset)?;
            self.write_wire(w, ItemTable::wire_index(Some(item_id)))?;
        }
        Ok(())
    }

    fn seek_data<W: Seek>(&self, w: &mut W, offset: u64) -> Result<()> {
        w.seek(SeekFrom::Start(self.data_start + offset))?;
        Ok(())
    }

    fn write_object<W: Write + Seek>(&mut self, w: &mut W, id: ObjectId, offset: u64) -> Result<()> {
        let obj_typ = self.graph.get(id).typ;
        let super_id = self.resolver.super_type(obj_typ)?;
        let typ = self.schema.get(super_id).clone();
        let sub_kind = typ
            .sub_kind()
            .ok_or_else(|| anyhow!("type {:?} has no recognized sub-kind", typ.name))?;
        let value = &self.graph.get(id).value;

        match (sub_kind, value) {
            (SubKind::Void | SubKind::Invalid, _) => {}
            (SubKind::Bool, Value::Bool(b)) => {
                self.seek_data(w, offset)?;
                self.write_int_fixed(w, &typ, *b as i64)?;
            }
            (SubKind::Int, Value::Int(v)) => {
                self.seek_data(w, offset)?;
                self.write_int_fixed(w, &typ, *v)?;
            }
            (SubKind::Float, Value::Float(f)) => {
                self.seek_data(w, offset)?;
                w.write_f32(*f)?;
            }
            (SubKind::String, Value::String(bytes)) => {
                if bytes.is_empty() {
                    self.seek_data(w, offset)?;
                    w.write_u32(0)?;
                } else {
                    let mut buf = bytes.clone();
                    buf.push(0);
                    self.patches.record(super_id, offset as u32);
                    self.pending_strings.push((offset, buf));
                }
            }
            (SubKind::Pointer, Value::Pointer(target)) => {
                self.seek_data(w, offset)?;
                let wire = match target {
                    None => 0,
                    Some(obj) => {
                        self.patches.record(super_id, offset as u32);
                        let item = *self
                            .item_for_object
                            .get(obj)
                            .ok_or_else(|| anyhow!("pointer target was not planned as an item"))?;
                        ItemTable::wire_index(Some(item))
                    }
                };
                self.write_wire(w, wire)?;
            }
            (SubKind::Array, Value::Array(elems)) => {
                self.seek_data(w, offset)?;
                let wire = if elems.is_empty() {
                    0
                } else {
                    self.patches.record(super_id, offset as u32);
                    let item = *self
                        .item_for_object
                        .get(&elems[0])
                        .ok_or_else(|| anyhow!("array was not planned as an item"))?;
                    ItemTable::wire_index(Some(item))
                };
                self.write_wire(w, wire)?;
            }
            (SubKind::Class, Value::Class(members)) => {
                let members = members.clone();
                let all_members = self.resolver.all_members(super_id)?;
                for member in all_members.iter() {
                    if member.is_void() {
                        continue;
                    }
                    let Some(obj) = members.iter().find(|(n, _)| n == &member.name).map(|(_, o)| *o)
                    else {
                        continue;
                    };
                    let member_offset = offset + member.byte_offset as u64;
                    self.write_object(w, obj, member_offset)?;
                }
            }
            (SubKind::Tuple, Value::Tuple(elems)) => {
                let elems = elems.clone();
                let elem_typ = typ
                    .sub_type
                    .ok_or_else(|| anyhow!("tuple type {:?} has no subType", typ.name))?;
                let elem_super = self.resolver.super_type(elem_typ)?;
                let stride = self.schema.get(elem_super).byte_size as u64;
                for (i, elem) in elems.into_iter().enumerate() {
                    self.write_object(w, elem, offset + i as u64 * stride)?;
                }
            }
            (kind, value) => {
                return Err(anyhow!(
                    "object value {value:?} does not match its type's sub-kind {kind:?}"
                ))
            }
        }
        Ok(())
    }

    fn write_wire<W: Write>(&self, w: &mut W, wire: u32) -> Result<()> {
        w.write_u32(wire)
    }

    fn write_int_fixed<W: Write>(&self, w: &mut W, typ: &crate::schema::Type, value: i64) -> Result<()> {
        match typ.int_width_bytes() {
            1 => w.write_u8(value as u8),
            2 => w.write_u16(value as u16),
            4 => w.write_u32(value as u32),
            8 => w.write_u64(value as u64),
            other => Err(anyhow!("unsupported integer width {other}")),
        }
    }
}

fn write_item_table<W: Write + Seek>(
    w: &mut W,
    items: &ItemTable,
    patches: &PatchList,
    root: ItemId,
) -> Result<()> {
    let _ = root; // root is always item #1 by construction; kept for callers' clarity.
    let indx = begin_section(w, b"INDX", true)?;

    let item_sec = begin_section(w, b"ITEM", false)?;
    w.write_all(&[0u8; 12])?; // reserved null entry
    for item in items.iter() {
        let type_wire = Schema::wire_index(Some(item.typ));
        w.write_u32(encode_item_flags(type_wire, item.is_ptr, item.is_value_array))?;
        w.write_u32(item.offset)?;
        w.write_u32(item.count)?;
    }
    item_sec.end(w)?;

    let ptch = begin_section(w, b"PTCH", false)?;
    for (typ, offsets) in patches.sorted_groups() {
        w.write_packed(Schema::wire_index(Some(typ)) as u64)?;
        w.write_packed(offsets.len() as u64)?;
        for off in offsets {
            w.write_u32(off)?;
        }
    }
    ptch.end(w)?;

    indx.end(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_tag0;
    use crate::schema::{flag, FLAG_INT32, FLAG_IS_SIGNED};
    use std::io::Cursor;

    fn int32_type() -> crate::schema::Type {
        let mut t = crate::schema::Type::new("hkInt32");
        t.flags = flag::HAS_FORMAT_INFO | flag::HAS_BYTE_SIZE;
        t.format_info = 0x04 | FLAG_INT32 | FLAG_IS_SIGNED;
        t.byte_size = 4;
        t.alignment = 4;
        t
    }

    #[test]
    fn writes_and_reads_back_a_scalar_root() {
        let schema = Schema {
            types: vec![int32_type()],
        };
        let mut graph = ObjectGraph::new();
        let root = graph.insert(TypeId(0), Value::Int(42));

        let mut buf = Cursor::new(Vec::new());
        write_tag0(&mut buf, &schema, &graph, root).unwrap();

        let mut cur = Cursor::new(buf.into_inner());
        let file = read_tag0(&mut cur, None).unwrap();
        match file.graph.get(file.root).value {
            Value::Int(v) => assert_eq!(v, 42),
            ref other => panic!("expected Int, got {other:?}"),
        }
    }

    #[test]
    fn writes_and_reads_back_a_pointer_chain() {
        let mut ptr_type = crate::schema::Type::new("hkRefPtr");
        ptr_type.flags = flag::HAS_FORMAT_INFO | flag::HAS_BYTE_SIZE | flag::HAS_SUB_TYPE;
        ptr_type.format_info = 0x06;
        ptr_type.byte_size = 4;
        ptr_type.alignment = 4;
        ptr_type.sub_type = Some(TypeId(0));

        let schema = Schema {
            types: vec![int32_type(), ptr_type],
        };
        let mut graph = ObjectGraph::new();
        let leaf = graph.insert(TypeId(0), Value::Int(9));
        let root = graph.insert(TypeId(1), Value::Pointer(Some(leaf)));

        let mut buf = Cursor::new(Vec::new());
        write_tag0(&mut buf, &schema, &graph, root).unwrap();

        let mut cur = Cursor::new(buf.into_inner());
        let file = read_tag0(&mut cur, None).unwrap();
        let Value::Pointer(Some(target)) = file.graph.get(file.root).value else {
            panic!("expected a resolved pointer");
        };
        match file.graph.get(target).value {
            Value::Int(v) => assert_eq!(v, 9),
            ref other => panic!("expected Int, got {other:?}"),
        }
    }

    /// A class with two string members makes sure the deferred
    /// string-appending pass doesn't let one string's bytes clobber a
    /// sibling field's fixed-size slot.
    #[test]
    fn writes_and_reads_back_a_class_with_two_strings() {
        let mut str_type = crate::schema::Type::new("hkStringPtr");
        str_type.flags = flag::HAS_FORMAT_INFO | flag::HAS_BYTE_SIZE;
        str_type.format_info = 0x03;
        str_type.byte_size = 4;
        str_type.alignment = 4;

        let mut class_type = crate::schema::Type::new("Pair");
        class_type.flags = flag::HAS_FORMAT_INFO | flag::HAS_BYTE_SIZE | flag::HAS_MEMBERS;
        class_type.format_info = 0x07;
        class_type.byte_size = 12;
        class_type.alignment = 4;
        class_type.members = vec![
            crate::schema::Member {
                name: "first".into(),
                flags: 0,
                byte_offset: 0,
                typ: TypeId(0),
            },
            crate::schema::Member {
                name: "tag".into(),
                flags: 0,
                byte_offset: 4,
                typ: TypeId(1),
            },
            crate::schema::Member {
                name: "second".into(),
                flags: 0,
                byte_offset: 8,
                typ: TypeId(1),
            },
        ];

        let schema = Schema {
            types: vec![int32_type(), str_type, class_type],
        };
        let mut graph = ObjectGraph::new();
        let first = graph.insert(TypeId(0), Value::Int(1));
        let tag = graph.insert(TypeId(1), Value::String(b"hello".to_vec()));
        let second = graph.insert(TypeId(1), Value::String(b"world!!".to_vec()));
        let root = graph.insert(
            TypeId(2),
            Value::Class(vec![
                ("first".into(), first),
                ("tag".into(), tag),
                ("second".into(), second),
            ]),
        );

        let mut buf = Cursor::new(Vec::new());
        write_tag0(&mut buf, &schema, &graph, root).unwrap();

        let mut cur = Cursor::new(buf.into_inner());
        let file = read_tag0(&mut cur, None).unwrap();
        let Value::Class(members) = &file.graph.get(file.root).value else {
            panic!("expected Class");
        };
        let first_id = members.iter().find(|(n, _)| &**n == "first").unwrap().1;
        let tag_id = members.iter().find(|(n, _)| &**n == "tag").unwrap().1;
        let second_id = members.iter().find(|(n, _)| &**n == "second").unwrap().1;

        assert!(matches!(file.graph.get(first_id).value, Value::Int(1)));
        let Value::String(tag_bytes) = &file.graph.get(tag_id).value else {
            panic!("expected String");
        };
        assert_eq!(tag_bytes, b"hello");
        let Value::String(second_bytes) = &file.graph.get(second_id).value else {
            panic!("expected String");
        };
        assert_eq!(second_bytes, b"world!!");
    }

    /// A 16-aligned tuple item (`hkVector4`-shaped) reached through a
    /// pointer after a 4-aligned one must land on a 16-byte boundary, not
    /// wherever the previous item's stride happened to end (§4.A/§4.G,
    /// §8.1 scenario 4).
    #[test]
    fn item_offsets_are_padded_to_the_elements_alignment() {
        let real_type = {
            let mut t = crate::schema::Type::new("hkReal");
            t.flags = flag::HAS_FORMAT_INFO | flag::HAS_BYTE_SIZE;
            t.format_info = 0x05;
            t.byte_size = 4;
            t.alignment = 4;
            t
        };
        let int_ptr = {
            let mut t = crate::schema::Type::new("hkRefPtrInt");
            t.flags = flag::HAS_FORMAT_INFO | flag::HAS_BYTE_SIZE | flag::HAS_SUB_TYPE;
            t.format_info = 0x06;
            t.byte_size = 4;
            t.alignment = 4;
            t.sub_type = Some(TypeId(1));
            t
        };
        let vec4 = {
            let mut t = crate::schema::Type::new("hkVector4");
            t.flags = flag::HAS_FORMAT_INFO | flag::HAS_BYTE_SIZE | flag::HAS_SUB_TYPE;
            t.format_info = 0x28 | (4 << 8); // Tuple, tupleSize 4
            t.byte_size = 16;
            t.alignment = 16;
            t.sub_type = Some(TypeId(0));
            t
        };
        let vec4_ptr = {
            let mut t = crate::schema::Type::new("hkRefPtrVec4");
            t.flags = flag::HAS_FORMAT_INFO | flag::HAS_BYTE_SIZE | flag::HAS_SUB_TYPE;
            t.format_info = 0x06;
            t.byte_size = 4;
            t.alignment = 4;
            t.sub_type = Some(TypeId(3));
            t
        };
        let root_class = {
            let mut t = crate::schema::Type::new("Root");
            t.flags = flag::HAS_FORMAT_INFO | flag::HAS_BYTE_SIZE | flag::HAS_MEMBERS;
            t.format_info = 0x07;
            t.byte_size = 8;
            t.alignment = 4;
            t.members = vec![
                crate::schema::Member { name: "small".into(), flags: 0, byte_offset: 0, typ: TypeId(2) },
                crate::schema::Member { name: "big".into(), flags: 0, byte_offset: 4, typ: TypeId(4) },
            ];
            t
        };

        // indices: 0=hkReal, 1=hkInt32, 2=hkRefPtrInt, 3=hkVector4, 4=hkRefPtrVec4, 5=Root
        let schema = Schema {
            types: vec![real_type, int32_type(), int_ptr, vec4, vec4_ptr, root_class],
        };

        let mut graph = ObjectGraph::new();
        let int_obj = graph.insert(TypeId(1), Value::Int(5));
        let small = graph.insert(TypeId(2), Value::Pointer(Some(int_obj)));
        let floats: Vec<ObjectId> = [1.0f32, 0.0, 0.0, 0.0]
            .into_iter()
            .map(|f| graph.insert(TypeId(0), Value::Float(f)))
            .collect();
        let vec4_obj = graph.insert(TypeId(3), Value::Tuple(floats));
        let big = graph.insert(TypeId(4), Value::Pointer(Some(vec4_obj)));
        let root = graph.insert(
            TypeId(5),
            Value::Class(vec![("small".into(), small), ("big".into(), big)]),
        );

        let mut planner = ItemPlanner::new(&schema, &graph);
        planner.plan_root(root).unwrap();

        // No strings appear in this graph, so char_type is never actually
        // looked up for a pending string body, but `emit_all` still reads
        // its alignment up front — reuse `hkReal` (TypeId(0)) as a stand-in.
        let mut emitter = ObjectEmitter::new(&schema, &graph, 0, planner.items, planner.patches, TypeId(0));
        let mut buf = Cursor::new(Vec::new());
        emitter.emit_all(&mut buf).unwrap();

        let offsets: Vec<u32> = emitter.items.iter().map(|item| item.offset).collect();
        // item 1: Root (align 4) at 0, size 8 -> next would be 8
        // item 2: hkInt32 target (align 4) at 8, size 4 -> next would be 12
        // item 3: hkVector4 target (align 16) must be padded up from 12 to 16
        assert_eq!(offsets[0], 0);
        assert_eq!(offsets[1], 8);
        assert_eq!(offsets[2], 16, "16-aligned item must not sit at an unaligned offset");
        assert_eq!(offsets[2] % 16, 0);
    }
}
