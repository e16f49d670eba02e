//! Reads the `<hktagfile>` textual form into a typed object tree, against
//! a schema supplied by the caller (§4.H). The binary `TYPE` section has
//! no counterpart here — XML carries only `type="..."` name references,
//! resolved against whatever type database the host already loaded.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{Error, Result};
use crate::object::{ObjectGraph, ObjectId, Value};
use crate::schema::{Schema, SubKind, TypeId};

use super::{decode_hex_float, mangle_type_name};

/// A minimal DOM: enough to do the two-pass (discover ids, then resolve
/// references) walk §4.H needs without re-parsing the byte stream twice.
struct Elem {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

enum Node {
    Text(String),
    Elem(Elem),
}

impl Elem {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn child_elems(&self) -> impl Iterator<Item = &Elem> {
        self.children.iter().filter_map(|n| match n {
            Node::Elem(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    fn first_child_elem(&self) -> Option<&Elem> {
        self.child_elems().next()
    }

    fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Elem(_) => None,
            })
            .collect()
    }
}

fn parse_ast(xml: &[u8]) -> Result<Elem> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Elem> = vec![Elem {
        name: String::new(),
        attrs: Vec::new(),
        children: Vec::new(),
    }];
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut attrs = Vec::new();
                for a in e.attributes() {
                    let a = a?;
                    let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
                    let value = a.unescape_value()?.into_owned();
                    attrs.push((key, value));
                }
                stack.push(Elem {
                    name,
                    attrs,
                    children: Vec::new(),
                });
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut attrs = Vec::new();
                for a in e.attributes() {
                    let a = a?;
                    let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
                    let value = a.unescape_value()?.into_owned();
                    attrs.push((key, value));
                }
                let elem = Elem {
                    name,
                    attrs,
                    children: Vec::new(),
                };
                stack.last_mut().unwrap().children.push(Node::Elem(elem));
            }
            Event::End(_) => {
                let finished = stack.pop().expect("unbalanced XML end tag");
                stack.last_mut().unwrap().children.push(Node::Elem(finished));
            }
            Event::Text(t) => {
                let text = t.unescape()?.into_owned();
                if !text.trim().is_empty() {
                    stack.last_mut().unwrap().children.push(Node::Text(text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let mut root = stack.pop().expect("document root missing");
    let doc = root
        .children
        .drain(..)
        .find_map(|n| match n {
            Node::Elem(e) if e.name == "hktagfile" => Some(e),
            _ => None,
        })
        .ok_or_else(|| Error::Xml("no <hktagfile> root element".into()))?;
    Ok(doc)
}

fn parse_xml_id(text: &str) -> Option<u32> {
    text.trim().trim_start_matches('#').parse().ok()
}

struct Parser<'s> {
    schema: &'s Schema,
    names: HashMap<String, TypeId>,
    ids: HashMap<u32, ObjectId>,
    graph: ObjectGraph,
}

impl<'s> Parser<'s> {
    fn new(schema: &'s Schema) -> Self {
        let mut names = HashMap::new();
        for i in 0..schema.types.len() {
            let id = TypeId(i as u32);
            names.insert(mangle_type_name(schema, id), id);
        }
        Parser {
            schema,
            names,
            ids: HashMap::new(),
            graph: ObjectGraph::new(),
        }
    }

    fn resolve_type(&self, name: &str) -> Result<TypeId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| Error::TypeNotFound(name.into()))
    }

    /// Pass 1: every `<object id=.. type=..>` gets a placeholder object
    /// (value filled with a zeroed scalar) so forward `<ref>`s resolve
    /// before that target's own body has been parsed.
    fn preallocate(&mut self, objects: &[&Elem]) -> Result<()> {
        for obj in objects {
            let xml_id = obj
                .attr("id")
                .and_then(parse_xml_id)
                .ok_or_else(|| Error::Xml("<object> missing a valid id attribute".into()))?;
            let type_name = obj
                .attr("type")
                .ok_or_else(|| Error::Xml("<object> missing a type attribute".into()))?;
            let typ = self.resolve_type(type_name)?;
            let placeholder = self.graph.insert(typ, Value::Int(0));
            self.ids.insert(xml_id, placeholder);
        }
        Ok(())
    }

    fn fill_bodies(&mut self, objects: &[&Elem]) -> Result<()> {
        for obj in objects {
            let xml_id = obj.attr("id").and_then(parse_xml_id).unwrap();
            let slot = self.ids[&xml_id];
            let typ = self.graph.get(slot).typ;
            let value = self
                .parse_value(obj, typ)?
                .unwrap_or(Value::Pointer(None));
            self.graph.get_mut(slot).value = value;
        }
        Ok(())
    }

    /// `Ok(None)` is the "dead object" outcome §4.H calls out: a class
    /// whose member failed to parse. It propagates exactly one level —
    /// the immediate container becomes null/empty, not the whole tree.
    fn parse_value(&mut self, elem: &Elem, typ: TypeId) -> Result<Option<Value>> {
        let super_id = {
            let mut resolver = crate::schema::TypeResolver::new(self.schema);
            resolver.super_type(typ).map_err(|e| Error::MalformedSchema(e.to_string().into()))?
        };
        let s = self.schema.get(super_id);
        let sub_kind = s
            .sub_kind()
            .ok_or_else(|| Error::MalformedSchema(format!("type {:?} has no sub-kind", s.name).into()))?;

        Ok(match sub_kind {
            SubKind::Void | SubKind::Invalid => Some(Value::Int(0)),
            SubKind::Bool => match elem.text().trim() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            SubKind::Int => elem.text().trim().parse::<i64>().ok().map(Value::Int),
            SubKind::Float => decode_hex_float(elem.text().trim()).ok().map(Value::Float),
            SubKind::String => Some(Value::String(elem.text().into_bytes())),
            SubKind::Pointer => {
                let text = elem.text();
                let text = text.trim();
                if text.is_empty() || text == "#0000" {
                    Some(Value::Pointer(None))
                } else {
                    match parse_xml_id(text) {
                        Some(id) => self.ids.get(&id).map(|&obj| Value::Pointer(Some(obj))),
                        None => None,
                    }
                }
            }
            SubKind::Class => self.parse_class(elem, super_id)?,
            SubKind::Array => self.parse_array(elem, super_id)?,
            SubKind::Tuple => self.parse_tuple(elem, s)?,
        })
    }

    fn parse_class(&mut self, elem: &Elem, super_id: TypeId) -> Result<Option<Value>> {
        if super::is_transform(self.schema, super_id) {
            return self.parse_vec12(elem, super_id);
        }
        let members = {
            let mut resolver = crate::schema::TypeResolver::new(self.schema);
            resolver
                .all_members(super_id)
                .map_err(|e| Error::MalformedSchema(e.to_string().into()))?
        };
        let mut out = Vec::new();
        for member in members.iter() {
            if member.is_void() {
                continue;
            }
            let Some(node) = elem
                .child_elems()
                .find(|c| c.name == "member" && c.attr("name") == Some(&*member.name))
            else {
                continue;
            };
            let Some(value_elem) = node.first_child_elem() else {
                continue;
            };
            match self.parse_value(value_elem, member.typ)? {
                Some(value) => {
                    let id = self.graph.insert(member.typ, value);
                    out.push((member.name.clone(), id));
                }
                None => return Ok(None),
            }
        }
        Ok(Some(Value::Class(out)))
    }

    fn parse_array(&mut self, elem: &Elem, super_id: TypeId) -> Result<Option<Value>> {
        let elem_typ = self
            .schema
            .get(super_id)
            .sub_type
            .ok_or_else(|| Error::MalformedSchema("array type has no subType".into()))?;
        let elem_super = {
            let mut resolver = crate::schema::TypeResolver::new(self.schema);
            resolver.super_type(elem_typ).map_err(|e| Error::MalformedSchema(e.to_string().into()))?
        };
        let elem_sub_kind = self.schema.get(elem_super).sub_kind();

        let mut ids = Vec::new();
        match elem_sub_kind {
            Some(SubKind::Bool) => {
                for tok in elem.text().split_whitespace() {
                    let v = matches!(tok, "true" | "1");
                    ids.push(self.graph.insert(elem_typ, Value::Bool(v)));
                }
            }
            Some(SubKind::Int) => {
                for tok in elem.text().split_whitespace() {
                    let v: i64 = tok.parse().map_err(|_| Error::Xml("bad int in array".into()))?;
                    ids.push(self.graph.insert(elem_typ, Value::Int(v)));
                }
            }
            Some(SubKind::Float) => {
                for tok in elem.text().split_whitespace() {
                    let v = decode_hex_float(tok).map_err(|e| Error::Xml(e.to_string().into()))?;
                    ids.push(self.graph.insert(elem_typ, Value::Float(v)));
                }
            }
            _ => {
                for item in elem.child_elems().filter(|c| c.name == "item") {
                    let Some(inner) = item.first_child_elem() else {
                        continue;
                    };
                    match self.parse_value(inner, elem_typ)? {
                        Some(value) => ids.push(self.graph.insert(elem_typ, value)),
                        None => return Ok(None),
                    }
                }
            }
        }
        Ok(Some(Value::Array(ids)))
    }

    fn parse_tuple(&mut self, elem: &Elem, typ: &crate::schema::Type) -> Result<Option<Value>> {
        let elem_typ = typ
            .sub_type
            .ok_or_else(|| Error::MalformedSchema("tuple type has no subType".into()))?;
        match elem.name.as_str() {
            "vec4" | "vec16" => {
                let mut ids = Vec::new();
                for tok in elem.text().split_whitespace() {
                    let v = decode_hex_float(tok).map_err(|e| Error::Xml(e.to_string().into()))?;
                    ids.push(self.graph.insert(elem_typ, Value::Float(v)));
                }
                Ok(Some(Value::Tuple(ids)))
            }
            _ => {
                let mut ids = Vec::new();
                for item in elem.child_elems().filter(|c| c.name == "item") {
                    let Some(inner) = item.first_child_elem() else {
                        continue;
                    };
                    match self.parse_value(inner, elem_typ)? {
                        Some(value) => ids.push(self.graph.insert(elem_typ, value)),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::Tuple(ids)))
            }
        }
    }

    /// `hkQsTransformf`'s textual form: 12 hex-floats split into
    /// `translation`/`rotation`/`scale`, each a 4-float tuple (§4.H).
    ///
    /// The three synthetic tuple objects (and their float elements) are
    /// tagged with the real member/subtype `TypeId`s from `super_id`'s own
    /// schema entry, not an arbitrary placeholder — the binary writer reads
    /// `sub_kind` from each object's own `typ`, so a wrong type here would
    /// silently corrupt re-serialization to `TAG0`.
    fn parse_vec12(&mut self, elem: &Elem, super_id: TypeId) -> Result<Option<Value>> {
        let floats: std::result::Result<Vec<f32>, _> =
            elem.text().split_whitespace().map(decode_hex_float).collect();
        let Ok(floats) = floats else {
            return Ok(None);
        };
        if floats.len() != 12 {
            return Ok(None);
        }
        let members = {
            let mut resolver = crate::schema::TypeResolver::new(self.schema);
            resolver
                .all_members(super_id)
                .map_err(|e| Error::MalformedSchema(e.to_string().into()))?
        };
        let mut member_typ = |name: &str| -> Result<TypeId> {
            members
                .iter()
                .find(|m| &*m.name == name)
                .map(|m| m.typ)
                .ok_or_else(|| Error::MalformedSchema(format!("{:?} has no {name:?} member", self.schema.get(super_id).name).into()))
        };
        let translation_typ = member_typ("translation")?;
        let rotation_typ = member_typ("rotation")?;
        let scale_typ = member_typ("scale")?;

        let mut make_vec4 = |tuple_typ: TypeId, slice: &[f32]| -> Result<ObjectId> {
            let elem_typ = self
                .schema
                .get(tuple_typ)
                .sub_type
                .ok_or_else(|| Error::MalformedSchema("vec4 member has no subType".into()))?;
            let ids: Vec<ObjectId> = slice
                .iter()
                .map(|&f| self.graph.insert(elem_typ, Value::Float(f)))
                .collect();
            Ok(self.graph.insert(tuple_typ, Value::Tuple(ids)))
        };
        let translation = make_vec4(translation_typ, &floats[0..4])?;
        let rotation = make_vec4(rotation_typ, &floats[4..8])?;
        let scale = make_vec4(scale_typ, &floats[8..12])?;
        Ok(Some(Value::Class(vec![
            ("translation".into(), translation),
            ("rotation".into(), rotation),
            ("scale".into(), scale),
        ])))
    }
}

/// Parses an `<hktagfile>` document against `schema`, returning the
/// completed object graph and the root object's id (the lowest-numbered
/// `<object>` in the document, matching the serializer's discovery order).
pub fn parse_xml(xml: &[u8], schema: &Schema) -> Result<(ObjectGraph, ObjectId)> {
    let doc = parse_ast(xml)?;
    let objects: Vec<&Elem> = doc.child_elems().filter(|c| c.name == "object").collect();
    if objects.is_empty() {
        return Err(Error::Xml("document has no <object> elements".into()));
    }

    let mut parser = Parser::new(schema);
    parser.preallocate(&objects)?;
    parser.fill_bodies(&objects)?;

    let root_xml_id = objects
        .iter()
        .filter_map(|o| o.attr("id").and_then(parse_xml_id))
        .min()
        .unwrap();
    let root = parser.ids[&root_xml_id];
    Ok((parser.graph, root))
}
