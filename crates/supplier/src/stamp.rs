//! Provenance stamping and symlink extraction for outgoing entities.
//!
//! Every entity leaving the supplier records the routing trail it came from in
//! `_digger.warehouse`. `select` results are additionally scanned for symlink
//! directives (`symlinks: { <link-id>: <target> }`), which are lifted into a
//! side-channel packet so an upstream composer can fetch the linked data.

use serde_json::{Map, Value};

use crate::response::{
    Entity, LinkedHeaders, LinkedReply, Payload, SymlinkEntry, SymlinkKind, SymlinkPacket,
};

/// Reserved metadata field on every entity.
pub const METADATA_FIELD: &str = "_digger";
/// Provenance field inside the metadata.
pub const WAREHOUSE_FIELD: &str = "warehouse";
/// Field holding symlink directives.
pub const SYMLINKS_FIELD: &str = "symlinks";

/// Link ids with this prefix point at a single attribute.
const ATTR_PREFIX: &str = "attr:";

/// Overwrites the entity's provenance with `route`.
///
/// Non-object entities pass through untouched. A missing or non-object
/// metadata field is replaced with a fresh object.
pub fn stamp(entity: &mut Entity, route: Option<&str>) {
    let Value::Object(fields) = entity else {
        return;
    };
    let warehouse = route.map_or(Value::Null, |trail| Value::String(trail.to_owned()));
    if let Some(Value::Object(metadata)) = fields.get_mut(METADATA_FIELD) {
        metadata.insert(WAREHOUSE_FIELD.to_owned(), warehouse);
        return;
    }
    let mut metadata = Map::new();
    metadata.insert(WAREHOUSE_FIELD.to_owned(), warehouse);
    fields.insert(METADATA_FIELD.to_owned(), Value::Object(metadata));
}

/// Stamps every entity in place.
pub fn stamp_all(entities: &mut [Entity], route: Option<&str>) {
    for entity in entities {
        stamp(entity, route);
    }
}

/// Lifts symlink directives out of `entities`.
///
/// Only the first directive of each entity is considered. `attr:` links keep
/// the entity and record its data; any other link replaces the entity with a
/// stub carrying only its metadata. Entries for the same link id on later
/// entities replace earlier ones.
pub fn split_symlinks(entities: Vec<Entity>) -> (Vec<Entity>, SymlinkPacket) {
    let mut packet = SymlinkPacket::new();
    let body = entities
        .into_iter()
        .enumerate()
        .map(|(index, entity)| {
            let Some((link_id, target)) = first_directive(&entity) else {
                return entity;
            };

            if link_id.starts_with(ATTR_PREFIX) {
                packet.insert(
                    link_id,
                    SymlinkEntry {
                        kind: SymlinkKind::Attr,
                        targetindex: index,
                        link: target,
                        data: Some(entity.clone()),
                    },
                );
                entity
            } else {
                packet.insert(
                    link_id,
                    SymlinkEntry {
                        kind: SymlinkKind::Symlink,
                        targetindex: index,
                        link: target,
                        data: None,
                    },
                );
                stub(&entity)
            }
        })
        .collect();
    (body, packet)
}

/// Builds the reply payload for a `select` result.
///
/// Symlinks are split out first, then every entity (stubs included) is
/// stamped. The envelope shape is used only when a directive was found.
pub fn select_payload(entities: Vec<Entity>, route: Option<&str>) -> Payload {
    let (mut body, symlinks) = split_symlinks(entities);
    stamp_all(&mut body, route);

    if symlinks.is_empty() {
        Payload::Entities(body)
    } else {
        Payload::Linked(LinkedReply {
            headers: LinkedHeaders { symlinks },
            body,
        })
    }
}

/// Builds the reply payload for `append`, `save` and `remove` results.
pub fn mutation_payload(mut entities: Vec<Entity>, route: Option<&str>) -> Payload {
    stamp_all(&mut entities, route);
    Payload::Entities(entities)
}

/// Synthetic reply to a `/ping` request.
pub fn ping_payload() -> Payload {
    let mut metadata = Map::new();
    metadata.insert(String::from("tag"), Value::String(String::from("pong")));
    let mut pong = Map::new();
    pong.insert(METADATA_FIELD.to_owned(), Value::Object(metadata));
    Payload::Entities(vec![Value::Object(pong)])
}

fn first_directive(entity: &Entity) -> Option<(String, Value)> {
    entity
        .get(SYMLINKS_FIELD)
        .and_then(Value::as_object)
        .and_then(|directives| directives.iter().next())
        .map(|(link_id, target)| (link_id.clone(), target.clone()))
}

fn stub(entity: &Entity) -> Entity {
    let metadata = entity
        .get(METADATA_FIELD)
        .filter(|metadata| metadata.is_object())
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    let mut fields = Map::new();
    fields.insert(METADATA_FIELD.to_owned(), metadata);
    Value::Object(fields)
}
