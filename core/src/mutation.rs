//! Create, update and delete for every writable entity.
//!
//! # Design
//! Each operation has a `try_*` form that returns `Result` and a host-facing
//! form that folds the outcome into a `MutationResult`, so callers branch on
//! `result` instead of handling control-flow errors. Validation (missing id,
//! missing required fields, read-only entity) happens before any network
//! call.
//!
//! Associations requested on create are written after the primary record
//! exists. They are issued concurrently, one batch per related entity kind,
//! and their failures are logged only: the created record is reported as a
//! success either way.

use serde::{Deserialize, Serialize};

use crate::adapter::CrmAdapter;
use crate::entity::EntityType;
use crate::error::CrmError;
use crate::transform::{to_external_properties, to_generic};
use crate::types::{
    value_as_key, AssociationBatch, AssociationInput, AssociationSpec, Attributes, ExternalRecord,
    Instance, ObjectRef,
};

/// Outcome of a mutation as seen by the host runtime.
///
/// Serializes as `{"result":"success","id":..,"message":..}` or
/// `{"result":"error","message":..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum MutationResult {
    Success {
        id: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        instance: Option<Instance>,
    },
    Error {
        message: String,
    },
}

impl MutationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, MutationResult::Success { .. })
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            MutationResult::Success { id, .. } => Some(id),
            MutationResult::Error { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            MutationResult::Success { message, .. } | MutationResult::Error { message } => message,
        }
    }

    pub fn instance(&self) -> Option<&Instance> {
        match self {
            MutationResult::Success { instance, .. } => instance.as_ref(),
            MutationResult::Error { .. } => None,
        }
    }

    fn written(instance: Instance, verb: &str) -> Self {
        MutationResult::Success {
            id: instance.id().to_string(),
            message: format!("{} {verb} successfully", instance.entity()),
            instance: Some(instance),
        }
    }
}

impl From<CrmError> for MutationResult {
    fn from(err: CrmError) -> Self {
        MutationResult::Error {
            message: err.to_string(),
        }
    }
}

/// Related record ids to link to a newly created record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Associations {
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub deals: Vec<String>,
}

impl Associations {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty() && self.companies.is_empty() && self.deals.is_empty()
    }
}

impl CrmAdapter {
    /// Create a record and link it to `associations`. Association failures
    /// are logged and never change the result.
    pub async fn create(
        &self,
        entity: EntityType,
        attributes: &Attributes,
        associations: &Associations,
    ) -> MutationResult {
        match self.try_create(entity, attributes).await {
            Ok(instance) => {
                let failures = self.associate(entity, instance.id(), associations).await;
                if !failures.is_empty() {
                    tracing::warn!(
                        %entity,
                        id = instance.id(),
                        failed = failures.len(),
                        "record created with incomplete associations"
                    );
                }
                MutationResult::written(instance, "created")
            }
            Err(err) => {
                tracing::warn!(%entity, error = %err, "create failed");
                err.into()
            }
        }
    }

    pub async fn try_create(&self, entity: EntityType, attributes: &Attributes) -> Result<Instance, CrmError> {
        ensure_writable(entity)?;
        let attributes = prepare_create(entity, attributes)?;
        let properties = to_external_properties(&attributes, entity, &self.table, self.write_policy());
        let request = self.client.build_create_record(entity, properties)?;
        let response = self.gateway.send(request).await?;
        let record = self.client.parse_record(response)?;
        self.written_instance(entity, &record)
    }

    /// Update the record identified by `attributes["id"]` with the mapped
    /// fields of `new_attributes`.
    pub async fn update(
        &self,
        entity: EntityType,
        attributes: &Attributes,
        new_attributes: &Attributes,
    ) -> MutationResult {
        match self.try_update(entity, attributes, new_attributes).await {
            Ok(instance) => MutationResult::written(instance, "updated"),
            Err(err) => {
                tracing::warn!(%entity, error = %err, "update failed");
                err.into()
            }
        }
    }

    pub async fn try_update(
        &self,
        entity: EntityType,
        attributes: &Attributes,
        new_attributes: &Attributes,
    ) -> Result<Instance, CrmError> {
        ensure_writable(entity)?;
        let id = require_id(entity, attributes, "update")?;
        let properties = to_external_properties(new_attributes, entity, &self.table, self.write_policy());
        let request = self.client.build_update_record(entity, &id, properties)?;
        let response = self.gateway.send(request).await?;
        let record = self.client.parse_record(response)?;
        self.written_instance(entity, &record)
    }

    pub async fn delete(&self, entity: EntityType, attributes: &Attributes) -> MutationResult {
        match self.try_delete(entity, attributes).await {
            Ok(id) => MutationResult::Success {
                id,
                message: format!("{entity} deleted successfully"),
                instance: None,
            },
            Err(err) => {
                tracing::warn!(%entity, error = %err, "delete failed");
                err.into()
            }
        }
    }

    /// Returns the id of the deleted record.
    pub async fn try_delete(&self, entity: EntityType, attributes: &Attributes) -> Result<String, CrmError> {
        ensure_writable(entity)?;
        let id = require_id(entity, attributes, "delete")?;
        let request = self.client.build_delete_record(entity, &id)?;
        let response = self.gateway.send(request).await?;
        self.client.parse_delete(response)?;
        Ok(id)
    }

    /// Link `id` to every related record. Batches for contacts, companies
    /// and deals run concurrently and fail independently; the failures are
    /// logged and returned.
    pub async fn associate(&self, entity: EntityType, id: &str, associations: &Associations) -> Vec<CrmError> {
        if associations.is_empty() {
            return Vec::new();
        }
        let (contacts, companies, deals) = tokio::join!(
            self.associate_batch(entity, id, EntityType::Contact, &associations.contacts),
            self.associate_batch(entity, id, EntityType::Company, &associations.companies),
            self.associate_batch(entity, id, EntityType::Deal, &associations.deals),
        );
        [contacts, companies, deals]
            .into_iter()
            .filter_map(Result::err)
            .collect()
    }

    async fn associate_batch(
        &self,
        from: EntityType,
        id: &str,
        to: EntityType,
        targets: &[String],
    ) -> Result<(), CrmError> {
        let targets: Vec<&String> = targets.iter().filter(|t| !t.is_empty()).collect();
        if targets.is_empty() {
            return Ok(());
        }

        let result: Result<(), CrmError> = async {
            let type_id = from.association_type_id(to).ok_or_else(|| {
                CrmError::Validation(format!("{from} cannot be associated with {to}"))
            })?;
            let batch = AssociationBatch {
                inputs: targets
                    .iter()
                    .map(|target| AssociationInput {
                        from: ObjectRef { id: id.to_string() },
                        to: ObjectRef {
                            id: (*target).clone(),
                        },
                        types: vec![AssociationSpec::hubspot_defined(type_id)],
                    })
                    .collect(),
            };
            let request = self.client.build_create_associations(from, to, &batch)?;
            let response = self.gateway.send(request).await?;
            self.client.parse_associations(response)
        }
        .await;

        result.map_err(|err| {
            tracing::warn!(%from, %to, id, error = %err, "association failed");
            CrmError::Association {
                from: from.to_string(),
                to: to.to_string(),
                message: err.to_string(),
            }
        })
    }

    fn written_instance(&self, entity: EntityType, record: &ExternalRecord) -> Result<Instance, CrmError> {
        if !record.has_id() {
            return Err(CrmError::Deserialization(format!("{entity} response carried no id")));
        }
        Ok(to_generic(record, entity, &self.table))
    }
}

fn ensure_writable(entity: EntityType) -> Result<(), CrmError> {
    if entity.is_writable() {
        Ok(())
    } else {
        Err(CrmError::Validation(format!("{entity} is read-only")))
    }
}

fn require_id(entity: EntityType, attributes: &Attributes, verb: &str) -> Result<String, CrmError> {
    attributes
        .id()
        .ok_or_else(|| CrmError::Validation(format!("{entity} ID is required for {verb}")))
}

/// Enforce per-entity required fields and fill derived ones.
fn prepare_create(entity: EntityType, attributes: &Attributes) -> Result<Attributes, CrmError> {
    let required: &[&str] = match entity {
        EntityType::Meeting => &["title", "start_time", "end_time"],
        EntityType::Note => &["body"],
        _ => &[],
    };
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|field| attributes.get(field).and_then(value_as_key).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(CrmError::Validation(format!(
            "{entity} fields required for create: {}",
            missing.join(", ")
        )));
    }

    let mut prepared = attributes.clone();
    if entity == EntityType::Meeting && attributes.get("timestamp").and_then(value_as_key).is_none() {
        if let Some(start) = attributes.get("start_time") {
            prepared.insert("timestamp", start.clone());
        }
    }
    Ok(prepared)
}
