//! Conversion between external records and generic instances.

use serde_json::{Map, Value};

use crate::config::WritePolicy;
use crate::entity::EntityType;
use crate::mapping::{is_skipped, FieldMappingTable};
use crate::types::{Attributes, ExternalRecord, Instance};

/// Read path: external record -> flat generic instance.
///
/// Skip-listed properties and null values are dropped; every other property
/// is renamed through the reverse mapping (unmapped names pass through).
/// `createdAt`, `updatedAt` and `archived` are copied when present. A record
/// without an id yields the id `"undefined"`; callers filter those out with
/// [`ExternalRecord::has_id`] first.
pub fn to_generic(record: &ExternalRecord, entity: EntityType, table: &FieldMappingTable) -> Instance {
    let mut instance = Instance::new(entity, record.id_string());

    for (key, value) in record.property_bag(entity) {
        if is_skipped(key) || value.is_null() {
            continue;
        }
        let generic = table.to_generic(entity, key);
        if generic == "id" {
            continue;
        }
        instance.insert(generic.to_string(), value.clone());
    }

    if let Some(created) = &record.created_at {
        instance.insert("createdAt".to_string(), created.clone());
    }
    if let Some(updated) = &record.updated_at {
        instance.insert("updatedAt".to_string(), updated.clone());
    }
    if let Some(archived) = record.archived {
        instance.insert("archived".to_string(), Value::Bool(archived));
    }

    instance
}

/// Write path: generic attributes -> external property bag.
///
/// Only writable fields declared in the entity's mapping are written;
/// unknown and read-only names are dropped so nothing unexpected leaks to
/// the CRM. Values the `WritePolicy` considers empty are dropped too.
pub fn to_external_properties(
    attributes: &Attributes,
    entity: EntityType,
    table: &FieldMappingTable,
    policy: WritePolicy,
) -> Map<String, Value> {
    let mut properties = Map::new();
    let Some(map) = table.map(entity) else {
        return properties;
    };

    for generic in map.fields().filter(|g| map.is_writable(g)) {
        let Some(value) = attributes.get(generic) else {
            continue;
        };
        if !policy.keeps(value) {
            continue;
        }
        let external = map.to_external(generic);
        if is_skipped(external) {
            continue;
        }
        properties.insert(external.to_string(), value.clone());
    }

    properties
}
