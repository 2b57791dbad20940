//! The closed set of CRM entity types exposed to the host runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A CRM entity type. Fixed, closed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Contact,
    Company,
    Deal,
    Task,
    Meeting,
    Owner,
    Note,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Contact,
        EntityType::Company,
        EntityType::Deal,
        EntityType::Task,
        EntityType::Meeting,
        EntityType::Owner,
        EntityType::Note,
    ];

    /// Plural object name used in CRM paths (`/crm/v3/objects/{name}`).
    pub fn object_name(&self) -> &'static str {
        match self {
            EntityType::Contact => "contacts",
            EntityType::Company => "companies",
            EntityType::Deal => "deals",
            EntityType::Task => "tasks",
            EntityType::Meeting => "meetings",
            EntityType::Owner => "owners",
            EntityType::Note => "notes",
        }
    }

    /// Base collection path relative to the API root. Owners live outside
    /// the objects API.
    pub fn collection_path(&self) -> String {
        match self {
            EntityType::Owner => "/crm/v3/owners".to_string(),
            other => format!("/crm/v3/objects/{}", other.object_name()),
        }
    }

    /// Owners are read-only; every other entity accepts writes.
    pub fn is_writable(&self) -> bool {
        !matches!(self, EntityType::Owner)
    }

    /// Owners have no search endpoint.
    pub fn supports_search(&self) -> bool {
        !matches!(self, EntityType::Owner)
    }

    /// Owner records are flat; every other entity nests values under
    /// `properties`.
    pub fn has_property_bag(&self) -> bool {
        !matches!(self, EntityType::Owner)
    }

    /// Name as the host runtime knows it, e.g. `hubspot/Deal`.
    pub fn qualified_name(&self) -> String {
        format!("hubspot/{self}")
    }

    /// HUBSPOT_DEFINED association type id for `self -> to`, when the pair
    /// can be associated.
    pub fn association_type_id(&self, to: EntityType) -> Option<u32> {
        use EntityType::*;
        match (self, to) {
            (Contact, Company) => Some(279),
            (Contact, Deal) => Some(4),
            (Company, Contact) => Some(280),
            (Company, Deal) => Some(342),
            (Deal, Contact) => Some(3),
            (Deal, Company) => Some(341),
            (Task, Contact) => Some(204),
            (Task, Company) => Some(192),
            (Task, Deal) => Some(216),
            (Meeting, Contact) => Some(200),
            (Meeting, Company) => Some(188),
            (Meeting, Deal) => Some(212),
            (Note, Contact) => Some(202),
            (Note, Company) => Some(190),
            (Note, Deal) => Some(214),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityType::Contact => "Contact",
            EntityType::Company => "Company",
            EntityType::Deal => "Deal",
            EntityType::Task => "Task",
            EntityType::Meeting => "Meeting",
            EntityType::Owner => "Owner",
            EntityType::Note => "Note",
        };
        f.write_str(name)
    }
}

impl FromStr for EntityType {
    type Err = String;

    /// Accepts the bare name (`Deal`), the qualified name (`hubspot/Deal`)
    /// or the object name (`deals`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s.rsplit('/').next().unwrap_or(s);
        EntityType::ALL
            .into_iter()
            .find(|t| {
                t.to_string().eq_ignore_ascii_case(bare) || t.object_name().eq_ignore_ascii_case(bare)
            })
            .ok_or_else(|| format!("unknown entity type: {s}"))
    }
}
