//! Entry point the host runtime talks to.
//!
//! `CrmAdapter` bundles the request builders, the gateway, the field
//! mapping table and the write policy. Query operations live in
//! `query.rs`, mutations in `mutation.rs`; both extend this type.

use std::sync::Arc;

use crate::client::CrmClient;
use crate::config::{CrmConfig, WritePolicy};
use crate::entity::EntityType;
use crate::gateway::{Gateway, ReqwestTransport, Transport};
use crate::mapping::FieldMappingTable;
use crate::transform;
use crate::types::{ExternalRecord, Instance};

#[derive(Debug, Clone)]
pub struct CrmAdapter {
    pub(crate) client: CrmClient,
    pub(crate) gateway: Gateway,
    pub(crate) table: Arc<FieldMappingTable>,
    config: CrmConfig,
}

impl CrmAdapter {
    /// Adapter over the production `reqwest` transport.
    pub fn new(config: CrmConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(config: CrmConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_parts(config, transport, FieldMappingTable::standard())
    }

    /// Adapter with a custom mapping table, e.g. one extended with
    /// portal-specific custom properties.
    pub fn with_parts(config: CrmConfig, transport: Arc<dyn Transport>, table: FieldMappingTable) -> Self {
        Self {
            client: CrmClient::new(&config.base_url),
            gateway: Gateway::new(transport, config.access_token.clone(), config.timeout),
            table: Arc::new(table),
            config,
        }
    }

    pub fn config(&self) -> &CrmConfig {
        &self.config
    }

    pub fn mapping(&self) -> &FieldMappingTable {
        &self.table
    }

    pub(crate) fn write_policy(&self) -> WritePolicy {
        self.config.write_policy
    }

    /// Transform records, dropping any without an id so no instance ever
    /// carries the placeholder id.
    pub(crate) fn to_instances(&self, entity: EntityType, records: &[ExternalRecord]) -> Vec<Instance> {
        records
            .iter()
            .filter(|record| {
                let ok = record.has_id();
                if !ok {
                    tracing::warn!(%entity, "dropping record without id");
                }
                ok
            })
            .map(|record| transform::to_generic(record, entity, &self.table))
            .collect()
    }
}
