//! The flat item table (§3.5 / §4.E): a pool of referenceable
//! values/arrays indexed by 32-bit integers embedded in `DATA`, plus the
//! writer's patch (relocation) list.

use std::collections::HashMap;

use crate::object::ObjectId;
use crate::schema::TypeId;

/// Bits of an `ITEM` record's first dword that aren't the type index
/// (§6.2): `isPtr` for pointer-target items, `isValueArray` for item
/// arrays that hold plain values rather than pointer-like elements.
pub const ITEM_IS_PTR: u32 = 0x1000_0000;
pub const ITEM_IS_VALUE_ARRAY: u32 = 0x2000_0000;
const ITEM_TYPE_MASK: u32 = !(ITEM_IS_PTR | ITEM_IS_VALUE_ARRAY);

pub fn decode_item_flags(dword0: u32) -> (u32, bool, bool) {
    (
        dword0 & ITEM_TYPE_MASK,
        dword0 & ITEM_IS_PTR != 0,
        dword0 & ITEM_IS_VALUE_ARRAY != 0,
    )
}

pub fn encode_item_flags(type_wire_idx: u32, is_ptr: bool, is_value_array: bool) -> u32 {
    let mut w = type_wire_idx & ITEM_TYPE_MASK;
    if is_ptr {
        w |= ITEM_IS_PTR;
    }
    if is_value_array {
        w |= ITEM_IS_VALUE_ARRAY;
    }
    w
}

/// Index into `ItemTable::items`. Wire index `0` always means "no item"
/// (a null pointer); `ItemTable` reserves slot 0 as a sentinel so this can
/// stay a plain index rather than an `Option`-wrapped one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u32);

pub struct Item {
    pub typ: TypeId,
    /// Byte offset from the start of `DATA`.
    pub offset: u32,
    pub count: u32,
    pub is_ptr: bool,
    pub is_value_array: bool,
    /// Materialized element sequence. `None` until the reader's first
    /// access reifies it (§4.F's laziness); always `Some` once the writer
    /// creates the item, since the writer always knows the full sequence
    /// up front.
    pub value: Option<Vec<ObjectId>>,
}

pub struct ItemTable {
    items: Vec<Item>,
}

impl ItemTable {
    /// Starts with the reserved null sentinel at index 0.
    pub fn new() -> Self {
        ItemTable {
            items: vec![Item {
                typ: TypeId(0),
                offset: 0,
                count: 0,
                is_ptr: false,
                is_value_array: false,
                value: Some(Vec::new()),
            }],
        }
    }

    pub fn resolve_wire(wire_idx: u32) -> Option<ItemId> {
        if wire_idx == 0 {
            None
        } else {
            Some(ItemId(wire_idx))
        }
    }

    pub fn wire_index(id: Option<ItemId>) -> u32 {
        match id {
            None => 0,
            Some(i) => i.0,
        }
    }

    pub fn push(&mut self, item: Item) -> ItemId {
        let id = ItemId(self.items.len() as u32);
        self.items.push(item);
        id
    }

    pub fn get(&self, id: ItemId) -> &Item {
        &self.items[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ItemId) -> &mut Item {
        &mut self.items[id.0 as usize]
    }

    /// All real items, in emission/reading order (sentinel excluded).
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().skip(1)
    }

    pub fn len(&self) -> usize {
        self.items.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ItemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-type relocation list: every `DATA` offset whose 32-bit value is an
/// item index for that type. Populated by the writer as it emits pointer,
/// array, and string fields; never needed to decode, only to produce a
/// `PTCH` section (see §4.E, §6.3).
#[derive(Default)]
pub struct PatchList {
    by_type: HashMap<TypeId, Vec<u32>>,
}

impl PatchList {
    pub fn new() -> Self {
        PatchList::default()
    }

    pub fn record(&mut self, typ: TypeId, data_offset: u32) {
        self.by_type.entry(typ).or_default().push(data_offset);
    }

    /// Groups sorted by type index, each group's offsets ascending and
    /// deduplicated — the ordering invariant §4.G calls out explicitly.
    pub fn sorted_groups(&self) -> Vec<(TypeId, Vec<u32>)> {
        let mut groups: Vec<(TypeId, Vec<u32>)> = self
            .by_type
            .iter()
            .map(|(typ, offsets)| {
                let mut offsets = offsets.clone();
                offsets.sort_unstable();
                offsets.dedup();
                (*typ, offsets)
            })
            .collect();
        groups.sort_by_key(|(typ, _)| typ.0);
        groups
    }
}
