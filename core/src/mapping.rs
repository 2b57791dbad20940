//! Per-entity field mapping between generic names and HubSpot property names.
//!
//! # Design
//! Each entity has a forward table (generic -> external) and a reverse table
//! built once when the mapping is constructed. The reverse table is not
//! guaranteed injective: if two generic names map to the same external
//! property, only the later pair survives in the reverse direction and the
//! read path will surface the value under that later name. Collisions are
//! detected at build time, logged, and returned to the caller so a custom
//! table can be rejected if lossy reads are unacceptable.
//!
//! Unmapped names translate to themselves in both directions.
//!
//! Some mapped fields are read-only: they are surfaced on read but never
//! written, e.g. HubSpot's activity rollups on contacts.

use std::collections::{HashMap, HashSet};

use crate::entity::EntityType;

/// External properties that are internal bookkeeping (timestamps, internal
/// ids, computed aggregates). Never surfaced on read, never written.
pub const SKIP_LIST: &[&str] = &[
    "hs_object_id",
    "createdate",
    "lastmodifieddate",
    "hs_createdate",
    "hs_lastmodifieddate",
    "hs_all_owner_ids",
    "hs_all_team_ids",
    "hs_all_accessible_team_ids",
    "hs_user_ids_of_all_owners",
    "hs_object_source",
    "hs_object_source_id",
    "hs_object_source_label",
    "hs_updated_by_user_id",
    "hs_created_by_user_id",
    "hs_num_associated_contacts",
    "num_associated_contacts",
    "num_associated_deals",
    "hs_was_imported",
];

pub fn is_skipped(external: &str) -> bool {
    SKIP_LIST.contains(&external)
}

const CONTACT_FIELDS: &[(&str, &str)] = &[
    ("first_name", "firstname"),
    ("last_name", "lastname"),
    ("email", "email"),
    ("job_title", "jobtitle"),
    ("lead_status", "hs_lead_status"),
    ("lifecycle_stage", "lifecyclestage"),
    ("mobile_phone_number", "mobilephone"),
    ("website_url", "website"),
    ("salutation", "salutation"),
    ("last_contacted", "notes_last_contacted"),
    ("last_activity_date", "notes_last_updated"),
    ("owner", "hubspot_owner_id"),
];

/// Surfaced on read, never sent on create or update.
const CONTACT_READ_ONLY: &[&str] = &["salutation", "last_contacted", "last_activity_date"];

const COMPANY_FIELDS: &[(&str, &str)] = &[
    ("name", "name"),
    ("description", "description"),
    ("industry", "industry"),
    ("country", "country"),
    ("city", "city"),
    ("domain", "domain"),
    ("phone", "phone"),
    ("year_founded", "founded_year"),
    ("website_url", "website"),
    ("owner", "hubspot_owner_id"),
];

const DEAL_FIELDS: &[(&str, &str)] = &[
    ("deal_name", "dealname"),
    ("deal_stage", "dealstage"),
    ("amount", "amount"),
    ("close_date", "closedate"),
    ("deal_type", "dealtype"),
    ("pipeline", "pipeline"),
    ("priority", "hs_priority"),
    ("description", "description"),
    ("owner", "hubspot_owner_id"),
];

const TASK_FIELDS: &[(&str, &str)] = &[
    ("task_type", "hs_task_type"),
    ("title", "hs_task_subject"),
    ("priority", "hs_task_priority"),
    ("assigned_to", "hs_task_assigned_to"),
    ("due_date", "hs_timestamp"),
    ("status", "hs_task_status"),
    ("description", "hs_task_body"),
    ("owner", "hubspot_owner_id"),
];

const MEETING_FIELDS: &[(&str, &str)] = &[
    ("title", "hs_meeting_title"),
    ("description", "hs_meeting_body"),
    ("start_time", "hs_meeting_start_time"),
    ("end_time", "hs_meeting_end_time"),
    ("location", "hs_meeting_location"),
    ("outcome", "hs_meeting_outcome"),
    ("timestamp", "hs_timestamp"),
    ("internal_notes", "hs_internal_meeting_notes"),
    ("owner", "hubspot_owner_id"),
];

const NOTE_FIELDS: &[(&str, &str)] = &[
    ("body", "hs_note_body"),
    ("timestamp", "hs_timestamp"),
    ("owner", "hubspot_owner_id"),
];

const OWNER_FIELDS: &[(&str, &str)] = &[
    ("email", "email"),
    ("first_name", "firstName"),
    ("last_name", "lastName"),
    ("user_id", "userId"),
];

/// Two generic names claiming the same external property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub entity: EntityType,
    pub external: String,
    /// The generic name that lost the reverse slot.
    pub dropped: String,
    /// The generic name that now owns it.
    pub kept: String,
}

/// Bidirectional mapping for a single entity.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    /// Generic names in declaration order.
    fields: Vec<String>,
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
    read_only: HashSet<String>,
}

impl FieldMap {
    fn build(entity: EntityType, pairs: &[(&str, &str)], collisions: &mut Vec<Collision>) -> Self {
        let mut map = FieldMap::default();
        for &(generic, external) in pairs {
            if map.forward.insert(generic.to_string(), external.to_string()).is_none() {
                map.fields.push(generic.to_string());
            }
            if let Some(previous) = map.reverse.insert(external.to_string(), generic.to_string()) {
                if previous != generic {
                    tracing::warn!(
                        %entity,
                        external,
                        dropped = %previous,
                        kept = generic,
                        "field mapping collision; reverse lookup keeps the later name"
                    );
                    collisions.push(Collision {
                        entity,
                        external: external.to_string(),
                        dropped: previous,
                        kept: generic.to_string(),
                    });
                }
            }
        }
        map
    }

    pub fn to_external<'a>(&'a self, generic: &'a str) -> &'a str {
        self.forward.get(generic).map(String::as_str).unwrap_or(generic)
    }

    pub fn to_generic<'a>(&'a self, external: &'a str) -> &'a str {
        self.reverse.get(external).map(String::as_str).unwrap_or(external)
    }

    /// True when `generic` is a declared field of this entity.
    pub fn recognizes(&self, generic: &str) -> bool {
        self.forward.contains_key(generic)
    }

    /// True when `generic` is declared and may be sent on create or update.
    pub fn is_writable(&self, generic: &str) -> bool {
        self.recognizes(generic) && !self.read_only.contains(generic)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }
}

/// Field mappings for every entity type, built once per adapter.
#[derive(Debug, Clone)]
pub struct FieldMappingTable {
    maps: HashMap<EntityType, FieldMap>,
}

impl FieldMappingTable {
    /// The built-in HubSpot mapping. It has no collisions.
    pub fn standard() -> Self {
        let (table, _) = Self::builder()
            .entity(EntityType::Contact, CONTACT_FIELDS)
            .entity(EntityType::Company, COMPANY_FIELDS)
            .entity(EntityType::Deal, DEAL_FIELDS)
            .entity(EntityType::Task, TASK_FIELDS)
            .entity(EntityType::Meeting, MEETING_FIELDS)
            .entity(EntityType::Note, NOTE_FIELDS)
            .entity(EntityType::Owner, OWNER_FIELDS)
            .read_only(EntityType::Contact, CONTACT_READ_ONLY)
            .build();
        table
    }

    pub fn builder() -> FieldMappingTableBuilder {
        FieldMappingTableBuilder::default()
    }

    pub fn map(&self, entity: EntityType) -> Option<&FieldMap> {
        self.maps.get(&entity)
    }

    pub fn to_external<'a>(&'a self, entity: EntityType, generic: &'a str) -> &'a str {
        match self.maps.get(&entity) {
            Some(map) => map.to_external(generic),
            None => generic,
        }
    }

    pub fn to_generic<'a>(&'a self, entity: EntityType, external: &'a str) -> &'a str {
        match self.maps.get(&entity) {
            Some(map) => map.to_generic(external),
            None => external,
        }
    }

    pub fn recognizes(&self, entity: EntityType, generic: &str) -> bool {
        self.maps.get(&entity).is_some_and(|m| m.recognizes(generic))
    }

    pub fn is_writable(&self, entity: EntityType, generic: &str) -> bool {
        self.maps.get(&entity).is_some_and(|m| m.is_writable(generic))
    }
}

impl Default for FieldMappingTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Collects per-entity pairs; `build` computes reverse tables and reports
/// collisions.
#[derive(Debug, Default)]
pub struct FieldMappingTableBuilder {
    entries: Vec<(EntityType, Vec<(String, String)>)>,
    read_only: HashMap<EntityType, HashSet<String>>,
}

impl FieldMappingTableBuilder {
    pub fn entity<G, E>(mut self, entity: EntityType, pairs: &[(G, E)]) -> Self
    where
        G: AsRef<str>,
        E: AsRef<str>,
    {
        let pairs = pairs
            .iter()
            .map(|(g, e)| (g.as_ref().to_string(), e.as_ref().to_string()))
            .collect();
        self.entries.push((entity, pairs));
        self
    }

    /// Mark generic names of `entity` as read-only. Applies regardless of
    /// call order relative to `entity`.
    pub fn read_only(mut self, entity: EntityType, generics: &[&str]) -> Self {
        self.read_only
            .entry(entity)
            .or_default()
            .extend(generics.iter().map(|g| g.to_string()));
        self
    }

    pub fn build(self) -> (FieldMappingTable, Vec<Collision>) {
        let mut collisions = Vec::new();
        let mut maps = HashMap::new();
        let mut seen = HashSet::new();
        for (entity, pairs) in self.entries {
            if !seen.insert(entity) {
                tracing::warn!(%entity, "entity mapped twice; later definition replaces earlier");
            }
            let borrowed: Vec<(&str, &str)> =
                pairs.iter().map(|(g, e)| (g.as_str(), e.as_str())).collect();
            let mut map = FieldMap::build(entity, &borrowed, &mut collisions);
            if let Some(read_only) = self.read_only.get(&entity) {
                map.read_only = read_only.clone();
            }
            maps.insert(entity, map);
        }
        (FieldMappingTable { maps }, collisions)
    }
}
