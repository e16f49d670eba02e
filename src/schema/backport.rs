//! Rewrites a recovered schema to the shape an older SDK release expects.
//!
//! Each rule is gated on the target type's current `version` being newer
//! than the version it backports to; setting `version` to that target as
//! part of the edit is what makes a second application of the whole
//! function a no-op (the gate is simply false the second time around).
//! `hkpStaticCompoundShape`'s member retag is the one rule with no gate at
//! all — it always runs, matching the source's own unconditional call.
//!
//! A type missing from the schema (not emitted by this file's producer,
//! or already removed by an earlier rule) is silently skipped: backport is
//! best-effort, never a hard failure.

use super::{Member, Schema, TypeId};

fn remove_member(typ: &mut super::Type, name: &str) {
    typ.members.retain(|m| &*m.name != name);
}

fn member_mut<'a>(typ: &'a mut super::Type, name: &str) -> Option<&'a mut Member> {
    typ.members.iter_mut().find(|m| &*m.name == name)
}

/// Drops every type in `names` (exact match) or whose name starts with
/// `hkHash`, remapping every surviving `TypeId` reference so indices stay
/// contiguous. Dangling references into the removed set (there should be
/// none, by construction of the rules that call this) are left pointing at
/// a now out-of-range index; nothing downstream is expected to exercise
/// that path.
fn remove_types(schema: &mut Schema, names: &[&str]) {
    let keep: Vec<bool> = schema
        .types
        .iter()
        .map(|t| !(names.contains(&&*t.name) || t.name.starts_with("hkHash")))
        .collect();

    let mut new_index = vec![0u32; schema.types.len()];
    let mut next = 0u32;
    for (i, k) in keep.iter().enumerate() {
        if *k {
            new_index[i] = next;
            next += 1;
        }
    }

    let remap_id = |id: TypeId, new_index: &[u32], keep: &[bool]| -> Option<TypeId> {
        if keep[id.0 as usize] {
            Some(TypeId(new_index[id.0 as usize]))
        } else {
            None
        }
    };

    let mut new_types = Vec::with_capacity(next as usize);
    for (i, mut typ) in std::mem::take(&mut schema.types).into_iter().enumerate() {
        if !keep[i] {
            continue;
        }
        typ.parent = typ.parent.and_then(|p| remap_id(p, &new_index, &keep));
        typ.sub_type = typ.sub_type.and_then(|p| remap_id(p, &new_index, &keep));
        for m in typ.members.iter_mut() {
            if let Some(id) = remap_id(m.typ, &new_index, &keep) {
                m.typ = id;
            }
        }
        for t in typ.templates.iter_mut() {
            if let super::Template::Type { value, .. } = t {
                if let Some(id) = remap_id(*value, &new_index, &keep) {
                    *value = id;
                }
            }
        }
        for (iface_ty, _) in typ.interfaces.iter_mut() {
            if let Some(id) = remap_id(*iface_ty, &new_index, &keep) {
                *iface_ty = id;
            }
        }
        new_types.push(typ);
    }
    schema.types = new_types;
}

/// Applies every rule this backporter knows, targeting the 2012.2 shape.
pub fn backport_2012(schema: &mut Schema) {
    if let Some(id) = schema.find_by_name("hkReferencedObject") {
        let typ = schema.get_mut(id);
        if typ.version > 0 {
            remove_member(typ, "propertyBag");
            if let Some(m) = member_mut(typ, "refCount") {
                m.name = "referenceCount".into();
            }
            typ.version = 0;
            remove_types(
                schema,
                &[
                    "hkDefaultPropertyBag",
                    "hkPropertyId",
                    "hkPtrAndInt",
                    "hkPropertyDesc",
                    "hkTuple",
                ],
            );
        }
    }

    if let Some(id) = schema.find_by_name("hkxMeshSection") {
        let typ = schema.get_mut(id);
        if typ.version > 4 {
            remove_member(typ, "boneMatrixMap");
            typ.version = 4;
        }
    }

    if let Some(id) = schema.find_by_name("hkxVertexBuffer::VertexData") {
        let typ = schema.get_mut(id);
        if typ.version > 0 {
            typ.version = 0;
        }
    }

    if let Some(id) = schema.find_by_name("hkxVertexDescription::ElementDecl") {
        let typ = schema.get_mut(id);
        if typ.version > 3 {
            remove_member(typ, "channelID");
            typ.version = 3;
        }
    }

    if let Some(id) = schema.find_by_name("hkxMaterial") {
        let typ = schema.get_mut(id);
        if typ.version > 4 {
            remove_member(typ, "userData");
            typ.version = 4;
        }
    }

    if let Some(id) = schema.find_by_name("hkaSkeleton") {
        let typ = schema.get_mut(id);
        if typ.version > 5 {
            typ.version = 5;
        }
    }

    if let Some(id) = schema.find_by_name("hkcdStaticMeshTreeBase") {
        let typ = schema.get_mut(id);
        if typ.version > 0 {
            remove_member(typ, "primitiveStoresIsFlatConvex");
            typ.version = 0;
        }
    }

    if let Some(id) = schema.find_by_name("hkaInterleavedUncompressedAnimation") {
        let typ = schema.get_mut(id);
        if typ.version > 0 {
            typ.version = 0;
        }
    }

    if let Some(id) = schema.find_by_name("hkpStaticCompoundShape") {
        let instance_extra_infos_typ = schema
            .get(id)
            .members
            .iter()
            .find(|m| &*m.name == "instanceExtraInfos")
            .map(|m| m.typ);
        if let Some(array_typ) = instance_extra_infos_typ {
            let element_type = schema.get(array_typ).sub_type;
            if let (Some(element_type), Some(m)) = (
                element_type,
                member_mut(schema.get_mut(id), "numBitsForChildShapeKey"),
            ) {
                m.typ = element_type;
            }
        }
    }

    if let Some(id) = schema.find_by_name("hkpStaticCompoundShape::Instance") {
        let typ = schema.get_mut(id);
        if typ.version > 0 {
            typ.version = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Type;

    #[test]
    fn drops_property_bag_and_renames_ref_count() {
        let mut ref_obj = Type::new("hkReferencedObject");
        ref_obj.version = 3;
        ref_obj.members = vec![
            Member {
                name: "memSizeAndFlags".into(),
                flags: 0,
                byte_offset: 0,
                typ: TypeId(0),
            },
            Member {
                name: "refCount".into(),
                flags: 0,
                byte_offset: 4,
                typ: TypeId(0),
            },
            Member {
                name: "propertyBag".into(),
                flags: 0,
                byte_offset: 8,
                typ: TypeId(2),
            },
        ];
        let prop_bag = Type::new("hkDefaultPropertyBag");

        let mut schema = Schema {
            types: vec![Type::new("hkInt32"), ref_obj, prop_bag],
        };
        schema.types[1].parent = Some(TypeId(0));

        backport_2012(&mut schema);

        let updated = schema.find_by_name("hkReferencedObject").unwrap();
        let typ = schema.get(updated);
        assert_eq!(typ.version, 0);
        let names: Vec<&str> = typ.members.iter().map(|m| &*m.name).collect();
        assert_eq!(names, vec!["memSizeAndFlags", "referenceCount"]);
        assert!(schema.find_by_name("hkDefaultPropertyBag").is_none());
    }

    #[test]
    fn idempotent_on_second_application() {
        let mut mesh = Type::new("hkxMeshSection");
        mesh.version = 9;
        mesh.members.push(Member {
            name: "boneMatrixMap".into(),
            flags: 0,
            byte_offset: 0,
            typ: TypeId(0),
        });
        let mut schema = Schema {
            types: vec![Type::new("hkInt32"), mesh],
        };

        backport_2012(&mut schema);
        let after_first = schema.types.len();
        backport_2012(&mut schema);
        assert_eq!(schema.types.len(), after_first);
        let id = schema.find_by_name("hkxMeshSection").unwrap();
        assert_eq!(schema.get(id).version, 4);
        assert!(schema.get(id).members.is_empty());
    }
}
