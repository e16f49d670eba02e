//! The typed object graph: §3.4's tagged-union `Object`, stored in a flat
//! arena rather than behind `Rc`/`RefCell`.
//!
//! Pointer-valued objects can form cycles (a class member pointing back to
//! an ancestor), which a tree of owned values can't represent in safe Rust
//! without reference counting. An arena sidesteps that the same way the
//! schema's `TypeId` does: edges are plain indices, so the graph itself
//! never needs interior mutability. "Attachment" (§3.4's scratch
//! back-reference, used during writing and XML serialization) is
//! deliberately *not* a field here — per §9's own recommendation it lives
//! in side-tables owned by whichever transaction needs it (see
//! `writer::Writer`'s item map, `xml::serializer`'s id map).

use std::collections::HashMap;

use crate::schema::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f32),
    /// Raw bytes, not yet NUL-terminated; the binary/XML layers append or
    /// strip the terminator at their own boundary.
    String(Vec<u8>),
    Pointer(Option<ObjectId>),
    /// Only members actually present are populated; order is insertion
    /// order, not the schema's member order (the schema is consulted
    /// separately whenever iteration order matters, e.g. writing).
    Class(Vec<(Box<str>, ObjectId)>),
    Array(Vec<ObjectId>),
    Tuple(Vec<ObjectId>),
}

impl Value {
    pub fn class_get(&self, name: &str) -> Option<ObjectId> {
        match self {
            Value::Class(members) => members.iter().find(|(n, _)| &**n == name).map(|(_, id)| *id),
            _ => None,
        }
    }

    pub fn class_set(&mut self, name: impl Into<Box<str>>, id: ObjectId) {
        if let Value::Class(members) = self {
            let name = name.into();
            if let Some(slot) = members.iter_mut().find(|(n, _)| *n == name) {
                slot.1 = id;
            } else {
                members.push((name, id));
            }
        }
    }

    /// Mirrors the writer's `makeItem` null check: "no value" is either a
    /// null pointer or an empty sequence (array/tuple/string/class all
    /// have `__len__` in the source; only Bool/Int/Float/Pointer can be
    /// "falsy" in the other sense used by the XML serializer).
    pub fn is_empty_sequence(&self) -> bool {
        match self {
            Value::Pointer(None) => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) | Value::Tuple(a) => a.is_empty(),
            _ => false,
        }
    }
}

pub struct Object {
    pub typ: TypeId,
    pub value: Value,
}

/// Arena owning every `Object` produced or consumed in one transaction.
#[derive(Default)]
pub struct ObjectGraph {
    objects: Vec<Object>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        ObjectGraph { objects: Vec::new() }
    }

    pub fn insert(&mut self, typ: TypeId, value: Value) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(Object { typ, value });
        id
    }

    pub fn get(&self, id: ObjectId) -> &Object {
        &self.objects[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ObjectId) -> &mut Object {
        &mut self.objects[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// A side-table mapping objects to scratch state, used in place of a
/// mutable `attachment` field on `Object` itself (per §9 and §5's
/// resource-model notes). `V` is `item::ItemId` while writing binary, or a
/// `u32` XML id while serializing.
pub type Attachments<V> = HashMap<ObjectId, V>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_set_then_get_roundtrips() {
        let mut graph = ObjectGraph::new();
        let leaf = graph.insert(TypeId(0), Value::Int(7));
        let class_id = graph.insert(TypeId(1), Value::Class(Vec::new()));
        graph.get_mut(class_id).value.class_set("a", leaf);
        assert_eq!(graph.get(class_id).value.class_get("a"), Some(leaf));
        assert_eq!(graph.get(class_id).value.class_get("missing"), None);
    }

    #[test]
    fn empty_sequence_detection_matches_make_item_null_check() {
        assert!(Value::Pointer(None).is_empty_sequence());
        assert!(Value::Array(vec![]).is_empty_sequence());
        assert!(!Value::Array(vec![ObjectId(0)]).is_empty_sequence());
        assert!(!Value::Bool(false).is_empty_sequence());
    }
}
