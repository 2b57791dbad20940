//! Query resolution: turns host query attributes into one CRM call.
//!
//! # Design
//! Resolution is split into a pure planning step (`plan_query`) and an
//! executing step on `CrmAdapter`. The plan is evaluated in strict order:
//!
//! 1. An id from `__path__` (last path segment) or the `id` attribute
//!    means a single-record fetch. Other attributes are ignored then, so
//!    `{email, id}` is a lookup by id, not a search.
//! 2. Otherwise every remaining attribute that is not reserved and carries
//!    a usable value becomes an equality filter for the search endpoint.
//! 3. With no usable filters, an attribute bag that was empty to begin with
//!    means fetch-all; a bag whose values were all empty or reserved means
//!    an empty result. A caller's blank filter never turns into an
//!    unbounded fetch.
//!
//! `try_query` keeps failures distinguishable; `query` is the host-facing
//! boundary that logs them and answers with an empty list.

use crate::adapter::CrmAdapter;
use crate::entity::EntityType;
use crate::error::CrmError;
use crate::mapping::FieldMappingTable;
use crate::types::{value_as_key, Attributes, ExternalRecord, Filter, Instance};

/// What a query resolves to before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    ById(String),
    Search(Vec<Filter>),
    FetchAll,
    Empty,
}

pub fn plan_query(entity: EntityType, attributes: &Attributes, table: &FieldMappingTable) -> QueryPlan {
    if let Some(id) = id_from_path(attributes).or_else(|| attributes.id()) {
        return QueryPlan::ById(id);
    }

    let filters: Vec<Filter> = attributes
        .iter()
        .filter(|(key, _)| key.as_str() != Attributes::ID_KEY)
        .filter(|(key, _)| !key.starts_with(Attributes::RESERVED_PREFIX))
        .filter_map(|(key, value)| {
            value_as_key(value).map(|v| Filter::eq(table.to_external(entity, key), v))
        })
        .collect();

    if !filters.is_empty() {
        QueryPlan::Search(filters)
    } else if attributes.is_empty() {
        QueryPlan::FetchAll
    } else {
        QueryPlan::Empty
    }
}

/// Trailing segment of `__path__`, e.g. `/contacts/123` -> `123`.
fn id_from_path(attributes: &Attributes) -> Option<String> {
    let path = attributes.get(Attributes::PATH_KEY)?.as_str()?;
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

impl CrmAdapter {
    /// Resolve a query for the host runtime. Failures are logged and yield
    /// an empty list, so "no results" may also mean "fetch failed".
    pub async fn query(&self, entity: EntityType, attributes: &Attributes) -> Vec<Instance> {
        match self.try_query(entity, attributes).await {
            Ok(instances) => instances,
            Err(err) => {
                tracing::warn!(%entity, error = %err, "query failed; returning no results");
                Vec::new()
            }
        }
    }

    /// Resolve a query, surfacing failures. A missing record is not a
    /// failure: it resolves to an empty list.
    pub async fn try_query(&self, entity: EntityType, attributes: &Attributes) -> Result<Vec<Instance>, CrmError> {
        let plan = plan_query(entity, attributes, &self.table);
        tracing::debug!(%entity, ?plan, "resolved query plan");

        let records = match plan {
            QueryPlan::ById(id) => match self.fetch_record(entity, &id).await {
                Ok(record) => vec![record],
                Err(CrmError::NotFound) => Vec::new(),
                Err(err) => return Err(err),
            },
            QueryPlan::Search(filters) => self.search_records(entity, filters).await?,
            QueryPlan::FetchAll => self.fetch_all_records(entity).await?,
            QueryPlan::Empty => Vec::new(),
        };

        Ok(self.to_instances(entity, &records))
    }

    /// Every record of `entity` on the first page.
    pub async fn fetch_all(&self, entity: EntityType) -> Result<Vec<Instance>, CrmError> {
        let records = self.fetch_all_records(entity).await?;
        Ok(self.to_instances(entity, &records))
    }

    async fn fetch_record(&self, entity: EntityType, id: &str) -> Result<ExternalRecord, CrmError> {
        let request = self.client.build_get_record(entity, id)?;
        let response = self.gateway.send(request).await?;
        self.client.parse_record(response)
    }

    async fn fetch_all_records(&self, entity: EntityType) -> Result<Vec<ExternalRecord>, CrmError> {
        let request = self.client.build_list_records(entity);
        let response = self.gateway.send(request).await?;
        self.client.parse_record_list(response)
    }

    async fn search_records(&self, entity: EntityType, filters: Vec<Filter>) -> Result<Vec<ExternalRecord>, CrmError> {
        if !entity.supports_search() {
            // No search endpoint: filter the listing locally with the same
            // equality semantics.
            let records = self.fetch_all_records(entity).await?;
            return Ok(records
                .into_iter()
                .filter(|record| matches_all(record, entity, &filters))
                .collect());
        }
        let request = self.client.build_search(entity, filters)?;
        let response = self.gateway.send(request).await?;
        self.client.parse_record_list(response)
    }
}

fn matches_all(record: &ExternalRecord, entity: EntityType, filters: &[Filter]) -> bool {
    let bag = record.property_bag(entity);
    filters.iter().all(|filter| {
        bag.get(&filter.property_name)
            .and_then(value_as_key)
            .is_some_and(|v| v == filter.value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrmConfig;
    use crate::error::TransportError;
    use crate::gateway::fake::FakeTransport;
    use crate::http::HttpMethod;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn table() -> FieldMappingTable {
        FieldMappingTable::standard()
    }

    fn adapter(transport: Arc<FakeTransport>) -> CrmAdapter {
        let config = CrmConfig::default()
            .with_access_token("test-token")
            .with_base_url("http://crm.test");
        CrmAdapter::with_transport(config, transport)
    }

    const CONTACT_PAGE: &str = r#"{"results":[
        {"id":"1","properties":{"email":"a@b.com","firstname":"Ada"}},
        {"id":"2","properties":{"email":"c@d.com","firstname":"Cy"}}
    ]}"#;

    #[test]
    fn plan_prefers_path_id() {
        let attrs = Attributes::new()
            .with("__path__", "/contacts/123")
            .with("email", "a@b.com");
        assert_eq!(plan_query(EntityType::Contact, &attrs, &table()), QueryPlan::ById("123".into()));
    }

    #[test]
    fn plan_uses_id_attribute() {
        let attrs = Attributes::new().with("id", "123");
        assert_eq!(plan_query(EntityType::Contact, &attrs, &table()), QueryPlan::ById("123".into()));
    }

    #[test]
    fn plan_ignores_trailing_slash_in_path() {
        let attrs = Attributes::new().with("__path__", "hubspot/Contact/77/");
        assert_eq!(plan_query(EntityType::Contact, &attrs, &table()), QueryPlan::ById("77".into()));
    }

    #[test]
    fn plan_builds_translated_filters() {
        let attrs = Attributes::new()
            .with("lead_status", "NEW")
            .with("custom_score", 7)
            .with("first_name", "");
        assert_eq!(
            plan_query(EntityType::Contact, &attrs, &table()),
            QueryPlan::Search(vec![
                Filter::eq("custom_score", "7"),
                Filter::eq("hs_lead_status", "NEW"),
            ])
        );
    }

    #[test]
    fn plan_never_filters_on_id() {
        // An empty id is not resolvable, and must not become a filter.
        let attrs = Attributes::new().with("id", "").with("email", "a@b.com");
        assert_eq!(
            plan_query(EntityType::Contact, &attrs, &table()),
            QueryPlan::Search(vec![Filter::eq("email", "a@b.com")])
        );
    }

    #[test]
    fn plan_empty_values_resolve_to_empty() {
        let attrs = Attributes::new().with("lead_status", "");
        assert_eq!(plan_query(EntityType::Contact, &attrs, &table()), QueryPlan::Empty);

        let attrs = Attributes::new()
            .with("owner", Value::Null)
            .with("__tag__", "x");
        assert_eq!(plan_query(EntityType::Contact, &attrs, &table()), QueryPlan::Empty);
    }

    #[test]
    fn plan_no_attributes_fetches_all() {
        assert_eq!(plan_query(EntityType::Deal, &Attributes::new(), &table()), QueryPlan::FetchAll);
    }

    #[tokio::test]
    async fn id_lookup_issues_exactly_one_get() {
        let transport = FakeTransport::new();
        transport.on(HttpMethod::Get, "/objects/contacts/123", 200, r#"{"id":"123","properties":{"email":"a@b.com"}}"#);
        let adapter = adapter(transport.clone());

        let results = adapter.query(EntityType::Contact, &Attributes::new().with("id", "123")).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "123");
        assert_eq!(results[0].get_str("email"), Some("a@b.com"));

        let sent = transport.recorded();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Get);
        assert_eq!(sent[0].path, "http://crm.test/crm/v3/objects/contacts/123");
    }

    #[tokio::test]
    async fn id_lookup_not_found_is_empty_not_error() {
        let transport = FakeTransport::new();
        transport.on(HttpMethod::Get, "/objects/deals/9", 404, r#"{"message":"Object not found"}"#);
        let adapter = adapter(transport);

        let results = adapter
            .try_query(EntityType::Deal, &Attributes::new().with("__path__", "/deals/9"))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_sends_one_filter_and_skips_id() {
        let transport = FakeTransport::new();
        transport.on(HttpMethod::Post, "/objects/contacts/search", 200, CONTACT_PAGE);
        let adapter = adapter(transport.clone());

        // `id` present but blank: not a lookup, and never a filter.
        let attrs = Attributes::new().with("email", "a@b.com").with("id", Value::Null);
        let results = adapter.query(EntityType::Contact, &attrs).await;
        assert_eq!(results.len(), 2);

        let sent = transport.recorded();
        assert_eq!(sent.len(), 1);
        let body: Value = serde_json::from_str(sent[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(
            body["filterGroups"][0]["filters"],
            json!([{"propertyName": "email", "operator": "EQ", "value": "a@b.com"}])
        );
        assert_eq!(body["limit"], 100);
    }

    #[tokio::test]
    async fn usable_id_wins_over_filters() {
        let transport = FakeTransport::new();
        transport.on(HttpMethod::Get, "/objects/contacts/999", 200, r#"{"id":"999","properties":{"email":"z@b.com"}}"#);
        transport.on(HttpMethod::Post, "/objects/contacts/search", 200, CONTACT_PAGE);
        let adapter = adapter(transport.clone());

        let attrs = Attributes::new().with("email", "a@b.com").with("id", "999");
        assert_eq!(plan_query(EntityType::Contact, &attrs, &table()), QueryPlan::ById("999".into()));

        let results = adapter.query(EntityType::Contact, &attrs).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "999");

        let sent = transport.recorded();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Get);
        assert_eq!(sent[0].path, "http://crm.test/crm/v3/objects/contacts/999");
        assert!(sent.iter().all(|r| !r.path.ends_with("/search")));
    }

    #[tokio::test]
    async fn blank_filters_issue_no_call() {
        let transport = FakeTransport::new();
        let adapter = adapter(transport.clone());
        let results = adapter
            .query(EntityType::Contact, &Attributes::new().with("lead_status", ""))
            .await;
        assert!(results.is_empty());
        assert!(transport.recorded().is_empty());
    }

    #[tokio::test]
    async fn no_attributes_fetches_everything() {
        let transport = FakeTransport::new();
        transport.on(HttpMethod::Get, "/objects/contacts", 200, CONTACT_PAGE);
        let adapter = adapter(transport.clone());
        let results = adapter.query(EntityType::Contact, &Attributes::new()).await;
        let ids: Vec<&str> = results.iter().map(Instance::id).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(transport.recorded()[0].method, HttpMethod::Get);
    }

    #[tokio::test]
    #[traced_test]
    async fn failures_are_swallowed_at_the_boundary_only() {
        let transport = FakeTransport::new();
        transport.fail(HttpMethod::Get, "/objects/tasks", TransportError::Connect("reset".into()));
        let adapter = adapter(transport);

        let err = adapter.try_query(EntityType::Task, &Attributes::new()).await.unwrap_err();
        assert!(matches!(err, CrmError::Transport(_)));

        let results = adapter.query(EntityType::Task, &Attributes::new()).await;
        assert!(results.is_empty());
        assert!(logs_contain("query failed; returning no results"));
    }

    #[tokio::test]
    async fn http_errors_on_search_surface_from_try_query() {
        let transport = FakeTransport::new();
        transport.on(HttpMethod::Post, "/objects/deals/search", 400, r#"{"message":"bad filter"}"#);
        let adapter = adapter(transport);
        let err = adapter
            .try_query(EntityType::Deal, &Attributes::new().with("deal_stage", "won"))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Http { status: 400, .. }));
    }

    #[tokio::test]
    async fn missing_token_yields_empty_without_calls() {
        let transport = FakeTransport::new();
        let adapter = CrmAdapter::with_transport(CrmConfig::default(), transport.clone());
        assert!(adapter.query(EntityType::Contact, &Attributes::new()).await.is_empty());
        assert!(transport.recorded().is_empty());
    }

    #[tokio::test]
    async fn owner_filters_apply_locally() {
        let transport = FakeTransport::new();
        transport.on(
            HttpMethod::Get,
            "/crm/v3/owners",
            200,
            r#"{"results":[
                {"id":"1","email":"a@x.com","firstName":"Ann","userId":11},
                {"id":"2","email":"b@x.com","firstName":"Bob","userId":12}
            ]}"#,
        );
        let adapter = adapter(transport.clone());
        let results = adapter
            .query(EntityType::Owner, &Attributes::new().with("first_name", "Bob"))
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "2");
        assert_eq!(results[0].get_str("email"), Some("b@x.com"));

        let sent = transport.recorded();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Get);
    }

    #[tokio::test]
    #[traced_test]
    async fn records_without_id_are_dropped() {
        let transport = FakeTransport::new();
        transport.on(
            HttpMethod::Get,
            "/objects/notes",
            200,
            r#"{"results":[{"properties":{"hs_note_body":"orphan"}},{"id":"3","properties":{}}]}"#,
        );
        let adapter = adapter(transport);
        let results = adapter.query(EntityType::Note, &Attributes::new()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "3");
        assert!(logs_contain("dropping record without id"));
    }
}
