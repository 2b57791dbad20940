//! Wire DTOs for the HubSpot API and the host runtime's instance shape.
//!
//! # Design
//! `ExternalRecord` mirrors what the CRM returns and is never mutated after
//! deserialization. `Instance` is the flat shape the host runtime consumes;
//! it is built fresh by the transformer for every call. `Attributes` is the
//! typed attribute bag callers pass into queries and mutations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::EntityType;

/// A record as returned by the CRM: flat id plus a nested property bag.
///
/// Owner records carry their fields at the top level; those land in
/// `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExternalRecord {
    /// The id rendered as a string. Numeric ids are stringified; a missing
    /// id renders as `"undefined"`, so callers validate with `has_id` first.
    pub fn id_string(&self) -> String {
        match &self.id {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "undefined".to_string(),
            Some(other) => other.to_string(),
        }
    }

    pub fn has_id(&self) -> bool {
        !matches!(self.id, None | Some(Value::Null))
    }

    /// The bag of external properties for `entity`.
    pub fn property_bag(&self, entity: EntityType) -> &Map<String, Value> {
        if entity.has_property_bag() {
            &self.properties
        } else {
            &self.extra
        }
    }
}

/// Envelope for list and search responses. Only the first page is read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub results: Vec<ExternalRecord>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Filtered-search request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub filter_groups: Vec<FilterGroup>,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
}

/// An equality predicate sent to the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub property_name: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl Filter {
    pub fn eq(property_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            operator: FilterOperator::Eq,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterOperator {
    Eq,
}

/// Write body for create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertiesBody {
    pub properties: Map<String, Value>,
}

/// Body for `/crm/v4/associations/{from}/{to}/batch/create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationBatch {
    pub inputs: Vec<AssociationInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationInput {
    pub from: ObjectRef,
    pub to: ObjectRef,
    pub types: Vec<AssociationSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationSpec {
    pub association_category: String,
    pub association_type_id: u32,
}

impl AssociationSpec {
    pub fn hubspot_defined(type_id: u32) -> Self {
        Self {
            association_category: "HUBSPOT_DEFINED".to_string(),
            association_type_id: type_id,
        }
    }
}

/// Generic instance handed to the host runtime: a flat map that always
/// carries a string `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instance {
    #[serde(skip)]
    entity: EntityType,
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

impl Instance {
    pub fn new(entity: EntityType, id: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), Value::String(id.into()));
        Self { entity, fields }
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    pub fn id(&self) -> &str {
        self.fields.get("id").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Convenience accessor for string-valued fields.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Set a field. `id` is always kept as a string.
    pub(crate) fn insert(&mut self, key: String, value: Value) {
        if key == "id" {
            let id = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.fields.insert(key, Value::String(id));
        } else {
            self.fields.insert(key, value);
        }
    }
}

/// Typed attribute bag passed into queries and mutations.
///
/// Keys starting with `__` are reserved markers (e.g. `__path__`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, Value>);

impl Attributes {
    pub const PATH_KEY: &'static str = "__path__";
    pub const ID_KEY: &'static str = "id";
    pub const RESERVED_PREFIX: &'static str = "__";

    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The record id, if one is present and non-empty.
    pub fn id(&self) -> Option<String> {
        self.get(Self::ID_KEY).and_then(value_as_key)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Render a scalar JSON value as the string the CRM expects. Null, empty
/// strings and non-scalars yield `None`.
pub(crate) fn value_as_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
