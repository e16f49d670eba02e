//! The XML textual form of a typed object tree (§4.H/§4.I) and the
//! handful of conventions shared between reading and writing it: value
//! tag names, hex-float encoding, and type-name mangling.

pub mod parser;
pub mod serializer;

use crate::schema::{Schema, Template, Type, TypeId};

pub use parser::parse_xml;
pub use serializer::write_xml;

/// Friendlier aliases for a handful of heavily templated static-tree
/// storage types, each paired with the synthetic type the serializer
/// inserts (parented to the original mangled name) so a reader that
/// doesn't know the alias can still resolve the real shape.
pub const ALIAS_TABLE: &[(&str, &str)] = &[
    (
        "hkcdStaticTreeDefaultTreeStorage6hkcdStaticTreeCodec6",
        "hkcdStaticTreeTreeStorage6",
    ),
    (
        "hkcdStaticTreeDefaultTreeStorage4hkcdStaticTreeCodec4",
        "hkcdStaticTreeTreeStorage4",
    ),
    (
        "hkcdStaticTreeDynamicTreeDefaultTreeStorage6hkcdStaticTreeCodec6",
        "hkcdStaticTreeDynamicTreeStorage6",
    ),
    (
        "hkcdStaticTreeDynamicTreeDefaultTreeStorage4hkcdStaticTreeCodec4",
        "hkcdStaticTreeDynamicTreeStorage4",
    ),
];

/// The type's own name followed by each template's contribution (a type
/// template contributes its referent's own mangled name; a value template
/// contributes its integer in decimal), with `:` and spaces stripped
/// throughout (§4.I) — before the alias table substitutes a friendlier
/// name. Exposed separately from [`mangle_type_name`] so the serializer
/// can use the pre-alias form as the synthetic fake type's `parent` text.
pub fn raw_mangled_name(schema: &Schema, id: TypeId) -> String {
    let typ = schema.get(id);
    let mut name = strip_punct(&typ.name);
    for template in &typ.templates {
        match template {
            Template::Value { value, .. } => name.push_str(&value.to_string()),
            Template::Type { value, .. } => name.push_str(&mangle_type_name(schema, *value)),
        }
    }
    name
}

/// Builds the mangled name the serializer uses for a `<class>` declaration
/// and an object's `type` attribute (§4.I).
pub fn mangle_type_name(schema: &Schema, id: TypeId) -> String {
    let name = raw_mangled_name(schema, id);
    match ALIAS_TABLE.iter().find(|(from, _)| *from == name) {
        Some((_, alias)) => alias.to_string(),
        None => name,
    }
}

/// `Some((raw, alias))` if `id`'s mangled name is one the alias table
/// rewrites. The serializer uses this to insert a synthetic type — tagged
/// with the alias, parented to `raw` — alongside the real declaration
/// (§4.I).
pub fn alias_for(schema: &Schema, id: TypeId) -> Option<(String, String)> {
    let raw = raw_mangled_name(schema, id);
    ALIAS_TABLE
        .iter()
        .find(|(from, _)| *from == raw)
        .map(|(_, alias)| (raw, alias.to_string()))
}

fn strip_punct(s: &str) -> String {
    s.chars().filter(|c| *c != ':' && *c != ' ').collect()
}

/// Formats an IEEE-754 little-endian bit pattern the way §4.H/§4.I
/// require: `x` followed by 8 hex digits.
pub fn encode_hex_float(value: f32) -> String {
    format!("x{:08x}", value.to_bits())
}

pub fn decode_hex_float(text: &str) -> anyhow::Result<f32> {
    let digits = text
        .strip_prefix('x')
        .ok_or_else(|| anyhow::anyhow!("hex-float {text:?} missing leading 'x'"))?;
    let bits = u32::from_str_radix(digits, 16)?;
    Ok(f32::from_bits(bits))
}

/// The element tag a value of this sub-kind is serialized under, per
/// §4.H's supported element list. `Tuple` is handled specially by the
/// serializer itself (`vec4`/`vec16`/generic `tuple`) so isn't covered
/// here.
pub fn scalar_tag(sub_kind: crate::schema::SubKind) -> Option<&'static str> {
    use crate::schema::SubKind::*;
    Some(match sub_kind {
        Bool => "bool",
        Int => "int",
        Float => "real",
        String => "string",
        Pointer => "ref",
        Class => "struct",
        Array => "array",
        _ => return None,
    })
}

pub(crate) const TRANSFORM_TYPE_NAME: &str = "hkQsTransformf";

pub(crate) fn is_transform(schema: &Schema, id: TypeId) -> bool {
    &*schema.get(id).name == TRANSFORM_TYPE_NAME
}

/// `true` for any class-kind type other than `hkQsTransformf`, which gets
/// its own `vec12` treatment instead of a `<class>` declaration (§4.I).
pub(crate) fn emits_class_declaration(schema: &Schema, typ: &Type) -> bool {
    typ.sub_kind() == Some(crate::schema::SubKind::Class) && &*typ.name != TRANSFORM_TYPE_NAME
}
