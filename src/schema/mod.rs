//! In-memory type model: `Type`, `Member`, `Template`, and the memoized
//! `superType`/`allMembers` resolvers that sit on top of it.
//!
//! Types live in a flat arena (`Schema::types`) rather than behind `Box`
//! pointers the way the teacher's `til::Type` tree does, because this
//! format's types form a genuine graph (parent chains, pointer-to-self
//! members) rather than a tree — the same reason the object model in
//! `crate::object` also uses an arena. `TypeId` is the arena index;
//! wire-format type references are one higher (`0` means "no type" on the
//! wire, never a valid arena index here).

pub mod backport;
pub mod reader;
pub mod writer;

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use anyhow::{anyhow, ensure, Result};

/// Arena index into `Schema::types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Bits of `Type::flags`, gating which optional TBOD fields are present.
/// Bit 7 (`RESERVED`) is never expected to be set by a well-formed file;
/// seeing it set is `UnknownTypeFlag`.
pub mod flag {
    pub const HAS_FORMAT_INFO: u8 = 0x01;
    pub const HAS_SUB_TYPE: u8 = 0x02;
    pub const HAS_VERSION: u8 = 0x04;
    pub const HAS_BYTE_SIZE: u8 = 0x08;
    pub const HAS_UNKNOWN_FLAGS: u8 = 0x10;
    pub const HAS_MEMBERS: u8 = 0x20;
    pub const HAS_INTERFACES: u8 = 0x40;
    pub const RESERVED: u8 = 0x80;
}

/// Low 7 bits of `formatInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubKind {
    Void,
    Invalid,
    Bool,
    String,
    Int,
    Float,
    Pointer,
    Class,
    Array,
    Tuple,
}

impl SubKind {
    pub fn from_bits(format_info: u32) -> Option<SubKind> {
        Some(match format_info & 0x7F {
            0x00 => SubKind::Void,
            0x01 => SubKind::Invalid,
            0x02 => SubKind::Bool,
            0x03 => SubKind::String,
            0x04 => SubKind::Int,
            0x05 => SubKind::Float,
            0x06 => SubKind::Pointer,
            0x07 => SubKind::Class,
            0x08 => SubKind::Array,
            0x28 => SubKind::Tuple,
            _ => return None,
        })
    }

    /// Used by the graph-walking code (type scan, XML scan) where Tuple is
    /// treated identically to Array; everywhere else the two are handled
    /// as distinct cases.
    pub fn is_array_like(format_info: u32) -> bool {
        format_info & 0x0F == 0x08
    }
}

pub const FLAG_IS_SIGNED: u32 = 0x200;
pub const FLAG_INT8: u32 = 0x2000;
pub const FLAG_INT16: u32 = 0x4000;
pub const FLAG_INT32: u32 = 0x8000;
pub const FLAG_INT64: u32 = 0x10000;

#[derive(Debug, Clone)]
pub enum Template {
    Value { name: Box<str>, value: i64 },
    Type { name: Box<str>, value: TypeId },
}

impl Template {
    pub fn name(&self) -> &str {
        match self {
            Template::Value { name, .. } => name,
            Template::Type { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Member {
    pub name: Box<str>,
    pub flags: u8,
    pub byte_offset: u32,
    pub typ: TypeId,
}

impl Member {
    /// Bit 0 of a member's flags marks it void/absent (the schema still
    /// lists it but no storage is reserved).
    pub fn is_void(&self) -> bool {
        self.flags & 0x1 != 0
    }
}

#[derive(Debug, Clone)]
pub struct Type {
    pub name: Box<str>,
    pub templates: Vec<Template>,
    pub parent: Option<TypeId>,
    pub flags: u8,
    pub format_info: u32,
    pub sub_type: Option<TypeId>,
    pub version: u32,
    pub byte_size: u32,
    pub alignment: u32,
    pub abstract_value: u32,
    pub members: Vec<Member>,
    pub interfaces: Vec<(TypeId, u32)>,
    pub hash: Option<u32>,
}

impl Type {
    pub fn new(name: impl Into<Box<str>>) -> Self {
        Type {
            name: name.into(),
            templates: Vec::new(),
            parent: None,
            flags: 0,
            format_info: 0,
            sub_type: None,
            version: 0,
            byte_size: 0,
            alignment: 0,
            abstract_value: 0,
            members: Vec::new(),
            interfaces: Vec::new(),
            hash: None,
        }
    }

    pub fn has_own_format_info(&self) -> bool {
        self.flags & flag::HAS_FORMAT_INFO != 0
    }

    pub fn sub_kind(&self) -> Option<SubKind> {
        SubKind::from_bits(self.format_info)
    }

    pub fn tuple_size(&self) -> u32 {
        self.format_info >> 8
    }

    pub fn is_signed(&self) -> bool {
        self.format_info & FLAG_IS_SIGNED != 0
    }

    /// Byte width implied by the `Int8`/`Int16`/`Int32`/`Int64` bits. Falls
    /// back to 4 bytes if none is set (not observed in practice, but every
    /// caller needs *some* answer rather than a panic).
    pub fn int_width_bytes(&self) -> u32 {
        if self.format_info & FLAG_INT8 != 0 {
            1
        } else if self.format_info & FLAG_INT16 != 0 {
            2
        } else if self.format_info & FLAG_INT32 != 0 {
            4
        } else if self.format_info & FLAG_INT64 != 0 {
            8
        } else {
            4
        }
    }
}

/// The recovered or externally supplied type system for one transaction.
#[derive(Clone)]
pub struct Schema {
    pub types: Vec<Type>,
}

impl Schema {
    pub fn empty() -> Self {
        Schema { types: Vec::new() }
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.idx()]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.idx()]
    }

    pub fn find_by_name(&self, name: &str) -> Option<TypeId> {
        self.types
            .iter()
            .position(|t| &*t.name == name)
            .map(|i| TypeId(i as u32))
    }

    /// Wire type index `0` means "no type"; everything else is one past
    /// the arena index.
    pub fn resolve_wire(&self, wire_idx: u32) -> Option<TypeId> {
        if wire_idx == 0 {
            None
        } else {
            Some(TypeId(wire_idx - 1))
        }
    }

    pub fn wire_index(id: Option<TypeId>) -> u32 {
        match id {
            None => 0,
            Some(t) => t.0 + 1,
        }
    }
}

/// Memoized, cycle-guarded resolver for the two derived properties that
/// recurse through `parent`: `superType` and `allMembers`. The
/// `solved`/`solving` split mirrors the teacher's `TILTypeSizeSolver`
/// exactly — a cache plus an in-progress set used purely to detect cycles.
pub struct TypeResolver<'a> {
    schema: &'a Schema,
    super_type: HashMap<TypeId, TypeId>,
    solving: HashSet<TypeId>,
    all_members: HashMap<TypeId, Rc<[Member]>>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        TypeResolver {
            schema,
            super_type: HashMap::new(),
            solving: HashSet::new(),
            all_members: HashMap::new(),
        }
    }

    /// The nearest ancestor (including `id` itself) that carries its own
    /// `formatInfo`. This is where sub-kind, width, size and alignment are
    /// actually read from for any type in a derived chain.
    pub fn super_type(&mut self, id: TypeId) -> Result<TypeId> {
        if let Some(&s) = self.super_type.get(&id) {
            return Ok(s);
        }
        ensure!(
            self.solving.insert(id),
            "cyclic parent chain reached while resolving superType of {:?}",
            self.schema.get(id).name
        );
        let ty = self.schema.get(id);
        let result = if ty.has_own_format_info() {
            id
        } else {
            let parent = ty
                .parent
                .ok_or_else(|| anyhow!("type {:?} has no parent and no format info", ty.name))?;
            self.super_type(parent)?
        };
        self.solving.remove(&id);
        self.super_type.insert(id, result);
        Ok(result)
    }

    /// `allMembers(parent) ++ T.members`, preserving declaration order.
    pub fn all_members(&mut self, id: TypeId) -> Result<Rc<[Member]>> {
        if let Some(m) = self.all_members.get(&id) {
            return Ok(m.clone());
        }
        ensure!(
            self.solving.insert(id),
            "cyclic parent chain reached while resolving allMembers of {:?}",
            self.schema.get(id).name
        );
        let ty = self.schema.get(id);
        let mut members = Vec::new();
        if let Some(parent) = ty.parent {
            members.extend(self.all_members(parent)?.iter().cloned());
        }
        members.extend(ty.members.iter().cloned());
        self.solving.remove(&id);
        let rc: Rc<[Member]> = members.into();
        self.all_members.insert(id, rc.clone());
        Ok(rc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with_chain() -> Schema {
        // base <- derived, base carries formatInfo (Int32), derived doesn't.
        let mut base = Type::new("hkInt32");
        base.flags = flag::HAS_FORMAT_INFO;
        base.format_info = 0x04 | FLAG_INT32 | FLAG_IS_SIGNED;
        base.byte_size = 4;
        base.alignment = 4;

        let mut derived = Type::new("MyInt");
        derived.parent = Some(TypeId(0));
        derived.members.push(Member {
            name: "extra".into(),
            flags: 0,
            byte_offset: 4,
            typ: TypeId(0),
        });

        Schema {
            types: vec![base, derived],
        }
    }

    #[test]
    fn super_type_follows_parent_chain() {
        let schema = schema_with_chain();
        let mut resolver = TypeResolver::new(&schema);
        assert_eq!(resolver.super_type(TypeId(1)).unwrap(), TypeId(0));
        assert_eq!(resolver.super_type(TypeId(0)).unwrap(), TypeId(0));
    }

    #[test]
    fn all_members_concatenates_parent_first() {
        let mut schema = schema_with_chain();
        schema.types[0].members.push(Member {
            name: "base_field".into(),
            flags: 0,
            byte_offset: 0,
            typ: TypeId(0),
        });
        let mut resolver = TypeResolver::new(&schema);
        let members = resolver.all_members(TypeId(1)).unwrap();
        let names: Vec<&str> = members.iter().map(|m| &*m.name).collect();
        assert_eq!(names, vec!["base_field", "extra"]);
    }

    #[test]
    fn cyclic_parent_chain_is_malformed() {
        let mut a = Type::new("A");
        a.parent = Some(TypeId(1));
        let mut b = Type::new("B");
        b.parent = Some(TypeId(0));
        let schema = Schema {
            types: vec![a, b],
        };
        let mut resolver = TypeResolver::new(&schema);
        assert!(resolver.super_type(TypeId(0)).is_err());
    }
}
