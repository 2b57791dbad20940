//! HubSpot CRM adapter for a host runtime that speaks generic instances.
//!
//! # Overview
//! Exposes contacts, companies, deals, tasks, meetings, notes and owners as
//! flat generic instances. Queries are resolved to a single CRM call (fetch
//! by id, filtered search, or fetch-all), writes are translated through a
//! per-entity field mapping, and a poller pushes periodic snapshots to a
//! subscription sink.
//!
//! # Design
//! - `CrmClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values without touching the network; the `Gateway` executes them over
//!   a pluggable `Transport` with auth, timeout and tracing applied.
//! - `FieldMappingTable` is built once per adapter; its reverse index is
//!   computed at build time and collisions are reported, not hidden.
//! - Query failures become empty lists only at `CrmAdapter::query`;
//!   `try_query` keeps them distinguishable. Mutations report
//!   `MutationResult` values instead of erroring.
//! - `PollerRegistry` owns one timer task per entity type.

pub mod adapter;
pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod http;
pub mod mapping;
pub mod mutation;
pub mod poller;
pub mod query;
pub mod transform;
pub mod types;

pub use adapter::CrmAdapter;
pub use client::CrmClient;
pub use config::{CrmConfig, WritePolicy};
pub use entity::EntityType;
pub use error::{CrmError, TransportError};
pub use gateway::{Gateway, ReqwestTransport, Transport};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use mapping::{FieldMappingTable, SKIP_LIST};
pub use mutation::{Associations, MutationResult};
pub use poller::{PollerRegistry, SubscriptionSink};
pub use query::{plan_query, QueryPlan};
pub use types::{Attributes, ExternalRecord, Filter, Instance};
