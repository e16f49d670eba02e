//! Emits a typed object tree as the `<hktagfile>` textual form (§4.I):
//! one `<class>` per reachable class-kind type, then one `<object>` per
//! reachable Object, ids assigned in discovery order starting at 1.

use std::collections::HashMap;
use std::io::{Cursor, Write};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use crate::error::Result;
use crate::object::{ObjectGraph, ObjectId, Value};
use crate::schema::{Schema, SubKind, Type, TypeId, TypeResolver};

use super::{alias_for, emits_class_declaration, encode_hex_float, is_transform, mangle_type_name, scalar_tag};

const SDK_VERSION_ATTR: &str = "hk_2012.2.0-r1";

/// One `<class>` declaration: either a real reachable type, or a
/// synthetic placeholder inserted for an aliased type's original
/// (pre-alias) mangled name (§4.I).
enum ClassDecl {
    Real(TypeId),
    Fake { name: String, parent: String },
}

struct Serializer<'s> {
    schema: &'s Schema,
    graph: &'s ObjectGraph,
    resolver: TypeResolver<'s>,
    /// Discovery-order id assigned to each reachable object (1-based).
    ids: HashMap<ObjectId, u32>,
    order: Vec<ObjectId>,
    classes: Vec<ClassDecl>,
    seen_classes: std::collections::HashSet<TypeId>,
}

impl<'s> Serializer<'s> {
    fn new(schema: &'s Schema, graph: &'s ObjectGraph) -> Self {
        Serializer {
            schema,
            graph,
            resolver: TypeResolver::new(schema),
            ids: HashMap::new(),
            order: Vec::new(),
            classes: Vec::new(),
            seen_classes: std::collections::HashSet::new(),
        }
    }

    fn discover(&mut self, id: ObjectId) -> anyhow::Result<()> {
        if self.ids.contains_key(&id) {
            return Ok(());
        }
        let next = self.ids.len() as u32 + 1;
        self.ids.insert(id, next);
        self.order.push(id);

        let typ = self.graph.get(id).typ;
        let super_id = self.resolver.super_type(typ)?;
        self.note_class(super_id);

        match &self.graph.get(id).value {
            Value::Class(members) => {
                for (_, m) in members {
                    self.discover(*m)?;
                }
            }
            Value::Pointer(Some(target)) => self.discover(*target)?,
            Value::Array(elems) | Value::Tuple(elems) => {
                for &e in elems {
                    self.discover(e)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn note_class(&mut self, typ: TypeId) {
        if !self.seen_classes.insert(typ) {
            return;
        }
        if !emits_class_declaration(self.schema, self.schema.get(typ)) {
            return;
        }
        self.classes.push(ClassDecl::Real(typ));
        if let Some((raw, alias)) = alias_for(self.schema, typ) {
            self.classes.push(ClassDecl::Fake { name: alias, parent: raw });
        }
    }

    fn write_class_decl<W: Write>(&self, w: &mut Writer<W>, decl: &ClassDecl) -> Result<()> {
        match decl {
            ClassDecl::Real(typ_id) => {
                let typ = self.schema.get(*typ_id);
                let name = mangle_type_name(self.schema, *typ_id);
                let version = typ.version.to_string();
                let mut start = BytesStart::new("class");
                start.push_attribute(("name", name.as_str()));
                start.push_attribute(("version", version.as_str()));
                if let Some(parent) = typ.parent {
                    start.push_attribute(("parent", mangle_type_name(self.schema, parent).as_str()));
                }
                w.write_event(Event::Start(start))?;

                for member in &typ.members {
                    if member.is_void() {
                        continue;
                    }
                    let mut m = BytesStart::new("member");
                    m.push_attribute(("name", &*member.name));
                    m.push_attribute(("type", mangle_type_name(self.schema, member.typ).as_str()));
                    w.write_event(Event::Empty(m))?;
                }

                w.write_event(Event::End(BytesEnd::new("class")))?;
            }
            ClassDecl::Fake { name, parent } => {
                let mut start = BytesStart::new("class");
                start.push_attribute(("name", name.as_str()));
                start.push_attribute(("version", "0"));
                start.push_attribute(("parent", parent.as_str()));
                w.write_event(Event::Empty(start))?;
            }
        }
        Ok(())
    }

    fn write_object<W: Write>(&mut self, w: &mut Writer<W>, id: ObjectId) -> Result<()> {
        let typ = self.graph.get(id).typ;
        let mangled = mangle_type_name(self.schema, typ);
        let xml_id = self.ids[&id];

        let mut start = BytesStart::new("object");
        start.push_attribute(("id", format!("#{xml_id:04}").as_str()));
        start.push_attribute(("type", mangled.as_str()));
        w.write_event(Event::Start(start))?;

        self.write_value(w, id)?;

        w.write_event(Event::End(BytesEnd::new("object")))?;
        Ok(())
    }

    fn write_value<W: Write>(&mut self, w: &mut Writer<W>, id: ObjectId) -> Result<()> {
        let obj_typ = self.graph.get(id).typ;
        let super_id = self
            .resolver
            .super_type(obj_typ)
            .map_err(|e| crate::error::Error::MalformedSchema(e.to_string().into()))?;
        let s = self.schema.get(super_id).clone();
        let sub_kind = s.sub_kind().ok_or_else(|| {
            crate::error::Error::MalformedSchema(format!("type {:?} has no sub-kind", s.name).into())
        })?;

        match sub_kind {
            SubKind::Void | SubKind::Invalid => {}
            SubKind::Bool | SubKind::Int | SubKind::Float | SubKind::String | SubKind::Pointer => {
                self.write_scalar(w, id, sub_kind)?;
            }
            SubKind::Class => {
                if is_transform(self.schema, super_id) {
                    self.write_vec12(w, id)?;
                } else {
                    self.write_struct(w, id, super_id)?;
                }
            }
            SubKind::Array => self.write_array(w, id, super_id)?,
            SubKind::Tuple => self.write_tuple(w, id, &s)?,
        }
        Ok(())
    }

    fn write_scalar<W: Write>(&mut self, w: &mut Writer<W>, id: ObjectId, sub_kind: SubKind) -> Result<()> {
        let tag = scalar_tag(sub_kind).unwrap();
        let text = match &self.graph.get(id).value {
            Value::Bool(b) => b.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(f) => encode_hex_float(*f),
            Value::String(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Value::Pointer(None) => "#0000".to_string(),
            Value::Pointer(Some(target)) => format!("#{:04}", self.ids.get(target).copied().unwrap_or(0)),
            other => return Err(crate::error::Error::Xml(format!("{other:?} is not a scalar").into())),
        };
        w.write_event(Event::Start(BytesStart::new(tag)))?;
        w.write_event(Event::Text(BytesText::new(&text)))?;
        w.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(())
    }

    fn write_struct<W: Write>(&mut self, w: &mut Writer<W>, id: ObjectId, super_id: TypeId) -> Result<()> {
        w.write_event(Event::Start(BytesStart::new("struct")))?;
        let members = self
            .resolver
            .all_members(super_id)
            .map_err(|e| crate::error::Error::MalformedSchema(e.to_string().into()))?;
        let present = match &self.graph.get(id).value {
            Value::Class(m) => m.clone(),
            _ => Vec::new(),
        };
        for member in members.iter() {
            if member.is_void() {
                continue;
            }
            let Some(&(_, obj)) = present.iter().find(|(n, _)| n == &member.name) else {
                continue;
            };
            let mut m = BytesStart::new("member");
            m.push_attribute(("name", &*member.name));
            w.write_event(Event::Start(m))?;
            self.write_value(w, obj)?;
            w.write_event(Event::End(BytesEnd::new("member")))?;
        }
        w.write_event(Event::End(BytesEnd::new("struct")))?;
        Ok(())
    }

    fn write_array<W: Write>(&mut self, w: &mut Writer<W>, id: ObjectId, super_id: TypeId) -> Result<()> {
        let elem_typ = self.schema.get(super_id).sub_type;
        let elem_super = match elem_typ {
            Some(t) => Some(
                self.resolver
                    .super_type(t)
                    .map_err(|e| crate::error::Error::MalformedSchema(e.to_string().into()))?,
            ),
            None => None,
        };
        let elem_sub_kind = elem_super.and_then(|t| self.schema.get(t).sub_kind());

        let elems = match &self.graph.get(id).value {
            Value::Array(e) => e.clone(),
            _ => Vec::new(),
        };

        let mut start = BytesStart::new("array");
        if !matches!(elem_sub_kind, Some(SubKind::Float)) {
            start.push_attribute(("size", elems.len().to_string().as_str()));
        }
        w.write_event(Event::Start(start))?;

        match elem_sub_kind {
            Some(SubKind::Bool) => {
                let text = elems
                    .iter()
                    .map(|&e| match self.graph.get(e).value {
                        Value::Bool(b) => if b { "true" } else { "false" }.to_string(),
                        _ => "false".to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                w.write_event(Event::Text(BytesText::new(&text)))?;
            }
            Some(SubKind::Int) => {
                let text = elems
                    .iter()
                    .map(|&e| match self.graph.get(e).value {
                        Value::Int(v) => v.to_string(),
                        _ => "0".to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                w.write_event(Event::Text(BytesText::new(&text)))?;
            }
            Some(SubKind::Float) => {
                let text = elems
                    .iter()
                    .map(|&e| match self.graph.get(e).value {
                        Value::Float(f) => encode_hex_float(f),
                        _ => encode_hex_float(0.0),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                w.write_event(Event::Text(BytesText::new(&text)))?;
            }
            _ => {
                for e in elems {
                    w.write_event(Event::Start(BytesStart::new("item")))?;
                    self.write_value(w, e)?;
                    w.write_event(Event::End(BytesEnd::new("item")))?;
                }
            }
        }

        w.write_event(Event::End(BytesEnd::new("array")))?;
        Ok(())
    }

    fn write_tuple<W: Write>(&mut self, w: &mut Writer<W>, id: ObjectId, typ: &Type) -> Result<()> {
        let elems = match &self.graph.get(id).value {
            Value::Tuple(e) => e.clone(),
            _ => Vec::new(),
        };
        let elem_typ = typ.sub_type;
        let elem_sub_kind = match elem_typ {
            Some(t) => {
                let s = self
                    .resolver
                    .super_type(t)
                    .map_err(|e| crate::error::Error::MalformedSchema(e.to_string().into()))?;
                self.schema.get(s).sub_kind()
            }
            None => None,
        };

        let tag = match (elems.len(), elem_sub_kind) {
            (4, Some(SubKind::Float)) => "vec4",
            (16, Some(SubKind::Float)) => "vec16",
            _ => "tuple",
        };

        if tag == "vec4" || tag == "vec16" {
            let text = elems
                .iter()
                .map(|&e| match self.graph.get(e).value {
                    Value::Float(f) => encode_hex_float(f),
                    _ => encode_hex_float(0.0),
                })
                .collect::<Vec<_>>()
                .join(" ");
            w.write_event(Event::Start(BytesStart::new(tag)))?;
            w.write_event(Event::Text(BytesText::new(&text)))?;
            w.write_event(Event::End(BytesEnd::new(tag)))?;
        } else {
            let mut start = BytesStart::new("tuple");
            start.push_attribute(("size", elems.len().to_string().as_str()));
            w.write_event(Event::Start(start))?;
            for e in elems {
                w.write_event(Event::Start(BytesStart::new("item")))?;
                self.write_value(w, e)?;
                w.write_event(Event::End(BytesEnd::new("item")))?;
            }
            w.write_event(Event::End(BytesEnd::new("tuple")))?;
        }
        Ok(())
    }

    /// `hkQsTransformf`'s members (`translation`, `rotation`, `scale`,
    /// each a 4-float tuple) concatenated into 12 hex-floats (§4.I).
    fn write_vec12<W: Write>(&mut self, w: &mut Writer<W>, id: ObjectId) -> Result<()> {
        let members = match &self.graph.get(id).value {
            Value::Class(m) => m.clone(),
            _ => Vec::new(),
        };
        let mut floats = Vec::with_capacity(12);
        for name in ["translation", "rotation", "scale"] {
            let Some(&(_, obj)) = members.iter().find(|(n, _)| &**n == name) else {
                for _ in 0..4 {
                    floats.push(0.0f32);
                }
                continue;
            };
            match &self.graph.get(obj).value {
                Value::Tuple(elems) => {
                    for &e in elems.iter().take(4) {
                        floats.push(match self.graph.get(e).value {
                            Value::Float(f) => f,
                            _ => 0.0,
                        });
                    }
                }
                _ => floats.extend([0.0f32; 4]),
            }
        }
        let text = floats.iter().map(|f| encode_hex_float(*f)).collect::<Vec<_>>().join(" ");
        w.write_event(Event::Start(BytesStart::new("vec12")))?;
        w.write_event(Event::Text(BytesText::new(&text)))?;
        w.write_event(Event::End(BytesEnd::new("vec12")))?;
        Ok(())
    }
}

/// Serializes `root` (and everything reachable from it) as an
/// `<hktagfile>` document.
pub fn write_xml(schema: &Schema, graph: &ObjectGraph, root: ObjectId) -> Result<Vec<u8>> {
    let mut ser = Serializer::new(schema, graph);
    ser.discover(root)
        .map_err(|e| crate::error::Error::MalformedSchema(e.to_string().into()))?;

    let mut w = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    let mut root_tag = BytesStart::new("hktagfile");
    root_tag.push_attribute(("version", "1"));
    root_tag.push_attribute(("sdkversion", SDK_VERSION_ATTR));
    w.write_event(Event::Start(root_tag))?;

    for i in 0..ser.classes.len() {
        ser.write_class_decl(&mut w, &ser.classes[i])?;
    }

    for i in 0..ser.order.len() {
        let id = ser.order[i];
        ser.write_object(&mut w, id)?;
    }

    w.write_event(Event::End(BytesEnd::new("hktagfile")))?;

    Ok(w.into_inner().into_inner())
}
