//! Stateless HTTP request builder and response parser for the HubSpot CRM API.
//!
//! # Design
//! `CrmClient` holds only a `base_url` and carries no mutable state between
//! calls. Each outbound call is split into a `build_*` method that produces
//! an `HttpRequest` and a `parse_*` method that consumes an `HttpResponse`.
//! The `Gateway` executes the round-trip in between, so everything here is
//! deterministic and free of I/O.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::entity::EntityType;
use crate::error::CrmError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    AssociationBatch, ExternalRecord, Filter, FilterGroup, PropertiesBody, RecordPage,
    SearchRequest,
};

/// Page size for filtered searches. Only the first page is ever read.
pub const SEARCH_LIMIT: u32 = 100;

/// Builds `HttpRequest` values and parses `HttpResponse` values without
/// touching the network.
#[derive(Debug, Clone)]
pub struct CrmClient {
    base_url: String,
}

impl CrmClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_get_record(&self, entity: EntityType, id: &str) -> Result<HttpRequest, CrmError> {
        Ok(HttpRequest {
            method: HttpMethod::Get,
            path: self.record_url(entity, id)?,
            headers: Vec::new(),
            body: None,
        })
    }

    pub fn build_list_records(&self, entity: EntityType) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: format!("{}{}", self.base_url, entity.collection_path()),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Single filter group; all filters are AND-ed by the CRM.
    pub fn build_search(&self, entity: EntityType, filters: Vec<Filter>) -> Result<HttpRequest, CrmError> {
        if !entity.supports_search() {
            return Err(CrmError::Validation(format!("{entity} does not support search")));
        }
        let body = SearchRequest {
            filter_groups: vec![FilterGroup { filters }],
            limit: SEARCH_LIMIT,
        };
        json_request(
            HttpMethod::Post,
            format!("{}{}/search", self.base_url, entity.collection_path()),
            &body,
        )
    }

    pub fn build_create_record(
        &self,
        entity: EntityType,
        properties: Map<String, Value>,
    ) -> Result<HttpRequest, CrmError> {
        json_request(
            HttpMethod::Post,
            format!("{}{}", self.base_url, entity.collection_path()),
            &PropertiesBody { properties },
        )
    }

    pub fn build_update_record(
        &self,
        entity: EntityType,
        id: &str,
        properties: Map<String, Value>,
    ) -> Result<HttpRequest, CrmError> {
        json_request(HttpMethod::Patch, self.record_url(entity, id)?, &PropertiesBody { properties })
    }

    pub fn build_delete_record(&self, entity: EntityType, id: &str) -> Result<HttpRequest, CrmError> {
        Ok(HttpRequest {
            method: HttpMethod::Delete,
            path: self.record_url(entity, id)?,
            headers: Vec::new(),
            body: None,
        })
    }

    pub fn build_create_associations(
        &self,
        from: EntityType,
        to: EntityType,
        batch: &AssociationBatch,
    ) -> Result<HttpRequest, CrmError> {
        json_request(
            HttpMethod::Post,
            format!(
                "{}/crm/v4/associations/{}/{}/batch/create",
                self.base_url,
                from.object_name(),
                to.object_name()
            ),
            batch,
        )
    }

    /// Single record from a get, create or update response.
    pub fn parse_record(&self, response: HttpResponse) -> Result<ExternalRecord, CrmError> {
        check_status(&response, &[200, 201])?;
        decode(&response.body)
    }

    /// First page of a list or search response.
    pub fn parse_record_list(&self, response: HttpResponse) -> Result<Vec<ExternalRecord>, CrmError> {
        check_status(&response, &[200])?;
        let page: RecordPage = decode(&response.body)?;
        Ok(page.results)
    }

    pub fn parse_delete(&self, response: HttpResponse) -> Result<(), CrmError> {
        check_status(&response, &[200, 204])
    }

    /// 207 means the batch partially failed and is reported as an error.
    pub fn parse_associations(&self, response: HttpResponse) -> Result<(), CrmError> {
        check_status(&response, &[200, 201])
    }

    fn record_url(&self, entity: EntityType, id: &str) -> Result<String, CrmError> {
        validate_id(entity, id)?;
        Ok(format!("{}{}/{id}", self.base_url, entity.collection_path()))
    }
}

/// Ids are interpolated into the path, so anything that would change the
/// path shape is rejected.
fn validate_id(entity: EntityType, id: &str) -> Result<(), CrmError> {
    let malformed = id.is_empty()
        || id
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%' | '\\'));
    if malformed {
        return Err(CrmError::Validation(format!("invalid {entity} id: {id:?}")));
    }
    Ok(())
}

fn json_request<T: Serialize>(method: HttpMethod, path: String, body: &T) -> Result<HttpRequest, CrmError> {
    let body = serde_json::to_string(body).map_err(|e| CrmError::Serialization(e.to_string()))?;
    Ok(HttpRequest {
        method,
        path,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: Some(body),
    })
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, CrmError> {
    serde_json::from_str(body).map_err(|e| CrmError::Deserialization(e.to_string()))
}

/// Map non-success status codes to the appropriate `CrmError` variant.
fn check_status(response: &HttpResponse, expected: &[u16]) -> Result<(), CrmError> {
    if expected.contains(&response.status) {
        return Ok(());
    }
    if response.status == 404 {
        return Err(CrmError::NotFound);
    }
    Err(CrmError::Http {
        status: response.status,
        body: error_message(&response.body),
    })
}

/// The CRM's JSON error envelope carries a `message`; fall back to the raw
/// body otherwise.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssociationInput, AssociationSpec, ObjectRef};
    use serde_json::json;

    fn client() -> CrmClient {
        CrmClient::new("http://localhost:3000")
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse::new(status, body)
    }

    #[test]
    fn build_get_record_produces_correct_request() {
        let req = client().build_get_record(EntityType::Contact, "123").unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:3000/crm/v3/objects/contacts/123");
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn build_get_owner_uses_owners_api() {
        let req = client().build_get_record(EntityType::Owner, "9").unwrap();
        assert_eq!(req.path, "http://localhost:3000/crm/v3/owners/9");
    }

    #[test]
    fn build_get_record_rejects_path_breaking_ids() {
        for id in ["", "1/2", "1?x=y", "a b", "%2F"] {
            let err = client().build_get_record(EntityType::Deal, id).unwrap_err();
            assert!(matches!(err, CrmError::Validation(_)), "{id:?}");
        }
    }

    #[test]
    fn build_list_records_produces_correct_request() {
        let req = client().build_list_records(EntityType::Company);
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:3000/crm/v3/objects/companies");
        assert!(req.body.is_none());
    }

    #[test]
    fn build_search_produces_correct_request() {
        let req = client()
            .build_search(EntityType::Contact, vec![Filter::eq("email", "a@b.com")])
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/crm/v3/objects/contacts/search");
        assert_eq!(
            req.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "filterGroups": [{"filters": [{"propertyName": "email", "operator": "EQ", "value": "a@b.com"}]}],
                "limit": 100
            })
        );
    }

    #[test]
    fn build_search_refuses_owners() {
        let err = client().build_search(EntityType::Owner, vec![]).unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[test]
    fn build_create_record_wraps_properties() {
        let mut props = Map::new();
        props.insert("dealname".to_string(), json!("Renewal"));
        let req = client().build_create_record(EntityType::Deal, props).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/crm/v3/objects/deals");
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"properties": {"dealname": "Renewal"}}));
    }

    #[test]
    fn build_update_record_uses_patch() {
        let req = client().build_update_record(EntityType::Task, "44", Map::new()).unwrap();
        assert_eq!(req.method, HttpMethod::Patch);
        assert_eq!(req.path, "http://localhost:3000/crm/v3/objects/tasks/44");
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"properties": {}}));
    }

    #[test]
    fn build_delete_record_produces_correct_request() {
        let req = client().build_delete_record(EntityType::Note, "8").unwrap();
        assert_eq!(req.method, HttpMethod::Delete);
        assert_eq!(req.path, "http://localhost:3000/crm/v3/objects/notes/8");
        assert!(req.body.is_none());
    }

    #[test]
    fn build_create_associations_produces_correct_request() {
        let batch = AssociationBatch {
            inputs: vec![AssociationInput {
                from: ObjectRef { id: "1".to_string() },
                to: ObjectRef { id: "2".to_string() },
                types: vec![AssociationSpec::hubspot_defined(3)],
            }],
        };
        let req = client()
            .build_create_associations(EntityType::Deal, EntityType::Contact, &batch)
            .unwrap();
        assert_eq!(
            req.path,
            "http://localhost:3000/crm/v4/associations/deals/contacts/batch/create"
        );
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({"inputs": [{
                "from": {"id": "1"},
                "to": {"id": "2"},
                "types": [{"associationCategory": "HUBSPOT_DEFINED", "associationTypeId": 3}]
            }]})
        );
    }

    #[test]
    fn parse_record_success() {
        let record = client()
            .parse_record(response(200, r#"{"id":"1","properties":{"email":"a@b.com"}}"#))
            .unwrap();
        assert_eq!(record.id_string(), "1");
        assert_eq!(record.properties["email"], "a@b.com");
    }

    #[test]
    fn parse_record_accepts_created() {
        assert!(client().parse_record(response(201, r#"{"id":"1"}"#)).is_ok());
    }

    #[test]
    fn parse_record_not_found() {
        let err = client().parse_record(response(404, "")).unwrap_err();
        assert!(matches!(err, CrmError::NotFound));
    }

    #[test]
    fn parse_record_extracts_error_message() {
        let err = client()
            .parse_record(response(
                400,
                r#"{"status":"error","message":"Property values were not valid","category":"VALIDATION_ERROR"}"#,
            ))
            .unwrap_err();
        match err {
            CrmError::Http { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "Property values were not valid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_record_list_reads_results() {
        let records = client()
            .parse_record_list(response(
                200,
                r#"{"results":[{"id":"1","properties":{}},{"id":"2","properties":{}}],"paging":{"next":{"after":"2"}}}"#,
            ))
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn parse_record_list_missing_results_is_empty() {
        let records = client().parse_record_list(response(200, r#"{"total":0}"#)).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn parse_record_list_bad_json() {
        let err = client().parse_record_list(response(200, "not json")).unwrap_err();
        assert!(matches!(err, CrmError::Deserialization(_)));
    }

    #[test]
    fn parse_delete_success() {
        assert!(client().parse_delete(response(204, "")).is_ok());
    }

    #[test]
    fn parse_associations_multi_status_is_error() {
        let err = client()
            .parse_associations(response(207, r#"{"status":"COMPLETE","errors":[{"message":"bad id"}]}"#))
            .unwrap_err();
        assert!(matches!(err, CrmError::Http { status: 207, .. }));
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let client = CrmClient::new("http://localhost:3000/");
        let req = client.build_list_records(EntityType::Deal);
        assert_eq!(req.path, "http://localhost:3000/crm/v3/objects/deals");
    }
}
