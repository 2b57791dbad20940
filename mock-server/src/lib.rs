//! In-memory stand-in for the slice of the HubSpot CRM API the adapter uses.
//!
//! Objects (contacts, companies, deals, tasks, meetings, notes) support
//! list, get, create, patch, delete and EQ-filter search. Owners are seeded
//! and read-only. Association batches are validated against stored ids.
//! Every route requires `Authorization: Bearer <token>`.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};

pub const DEFAULT_TOKEN: &str = "mock-token";

const OBJECT_TYPES: &[&str] = &["contacts", "companies", "deals", "tasks", "meetings", "notes"];
const SEARCH_MAX: usize = 200;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub properties: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
    pub archived: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub user_id: u64,
    pub created_at: String,
    pub updated_at: String,
    pub archived: bool,
}

/// A stored association link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Link {
    pub from_type: String,
    pub from_id: String,
    pub to_type: String,
    pub to_id: String,
    pub type_id: u32,
}

#[derive(Debug, Default)]
pub struct Store {
    next_id: u64,
    objects: HashMap<String, BTreeMap<u64, Record>>,
    owners: Vec<Owner>,
    pub links: Vec<Link>,
}

impl Store {
    /// Empty object store with two owners.
    pub fn seeded() -> Self {
        let now = timestamp();
        let owner = |id: &str, email: &str, first: &str, last: &str, user_id| Owner {
            id: id.to_string(),
            email: email.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            user_id,
            created_at: now.clone(),
            updated_at: now.clone(),
            archived: false,
        };
        Self {
            next_id: 1000,
            objects: HashMap::new(),
            owners: vec![
                owner("101", "ana@example.com", "Ana", "Ruiz", 9001),
                owner("102", "ben@example.com", "Ben", "Okafor", 9002),
            ],
            links: Vec::new(),
        }
    }

    fn exists(&self, object: &str, id: &str) -> bool {
        id.parse::<u64>()
            .ok()
            .and_then(|id| self.objects.get(object).map(|m| m.contains_key(&id)))
            .unwrap_or(false)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<RwLock<Store>>,
    pub token: Arc<str>,
}

#[derive(Deserialize)]
pub struct PropertiesInput {
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchInput {
    #[serde(default)]
    pub filter_groups: Vec<FilterGroupInput>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct FilterGroupInput {
    #[serde(default)]
    pub filters: Vec<FilterInput>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterInput {
    pub property_name: String,
    pub operator: String,
    pub value: Option<String>,
}

#[derive(Deserialize)]
pub struct BatchInput {
    pub inputs: Vec<LinkInput>,
}

#[derive(Deserialize)]
pub struct LinkInput {
    pub from: IdRef,
    pub to: IdRef,
    #[serde(default)]
    pub types: Vec<LinkType>,
}

#[derive(Deserialize)]
pub struct IdRef {
    pub id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkType {
    pub association_type_id: u32,
}

/// HubSpot-style JSON error.
pub struct ApiError {
    status: StatusCode,
    category: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, category: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            category,
            message: message.into(),
        }
    }

    fn not_found(object: &str, id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "OBJECT_NOT_FOUND", format!("{object} {id} not found"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({"status": "error", "message": self.message, "category": self.category});
        (self.status, Json(body)).into_response()
    }
}

pub fn app() -> Router {
    app_with_state(AppState {
        db: Arc::new(RwLock::new(Store::seeded())),
        token: Arc::from(DEFAULT_TOKEN),
    })
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/crm/v3/objects/{object}", get(list_records).post(create_record))
        .route("/crm/v3/objects/{object}/search", post(search_records))
        .route(
            "/crm/v3/objects/{object}/{id}",
            get(get_record).patch(update_record).delete(delete_record),
        )
        .route("/crm/v3/owners", get(list_owners))
        .route("/crm/v3/owners/{id}", get(get_owner))
        .route("/crm/v4/associations/{from}/{to}/batch/create", post(create_links))
        .layer(middleware::from_fn_with_state(state.clone(), require_token))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = format!("Bearer {}", state.token);
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        tracing::debug!(path = %request.uri().path(), "rejected unauthenticated request");
        return ApiError::new(
            StatusCode::UNAUTHORIZED,
            "INVALID_AUTHENTICATION",
            "Authentication credentials not found",
        )
        .into_response();
    }
    next.run(request).await
}

fn known_object(object: &str) -> Result<(), ApiError> {
    if OBJECT_TYPES.contains(&object) {
        Ok(())
    } else {
        Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            format!("Unable to infer object type from: {object}"),
        ))
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Drop nulls and empty strings; the CRM stores them as unset.
fn merge_properties(target: &mut Map<String, Value>, input: Map<String, Value>) {
    for (key, value) in input {
        match value {
            Value::Null => {
                target.remove(&key);
            }
            Value::String(s) if s.is_empty() => {
                target.remove(&key);
            }
            Value::String(s) => {
                target.insert(key, Value::String(s));
            }
            other => {
                target.insert(key, Value::String(other.to_string()));
            }
        }
    }
}

async fn list_records(
    State(state): State<AppState>,
    Path(object): Path<String>,
) -> Result<Json<Value>, ApiError> {
    known_object(&object)?;
    let db = state.db.read().await;
    let results: Vec<Record> = db
        .objects
        .get(&object)
        .map(|m| m.values().cloned().collect())
        .unwrap_or_default();
    Ok(Json(json!({ "results": results })))
}

async fn create_record(
    State(state): State<AppState>,
    Path(object): Path<String>,
    Json(input): Json<PropertiesInput>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    known_object(&object)?;
    let mut db = state.db.write().await;
    db.next_id += 1;
    let id = db.next_id;
    let now = timestamp();

    let mut properties = Map::new();
    merge_properties(&mut properties, input.properties);
    properties.insert("hs_object_id".to_string(), Value::String(id.to_string()));
    properties.insert("createdate".to_string(), Value::String(now.clone()));
    properties.insert("lastmodifieddate".to_string(), Value::String(now.clone()));

    let record = Record {
        id: id.to_string(),
        properties,
        created_at: now.clone(),
        updated_at: now,
        archived: false,
    };
    db.objects.entry(object).or_default().insert(id, record.clone());
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_record(
    State(state): State<AppState>,
    Path((object, id)): Path<(String, String)>,
) -> Result<Json<Record>, ApiError> {
    known_object(&object)?;
    let db = state.db.read().await;
    id.parse::<u64>()
        .ok()
        .and_then(|key| db.objects.get(&object).and_then(|m| m.get(&key)).cloned())
        .map(Json)
        .ok_or_else(|| ApiError::not_found(&object, &id))
}

async fn update_record(
    State(state): State<AppState>,
    Path((object, id)): Path<(String, String)>,
    Json(input): Json<PropertiesInput>,
) -> Result<Json<Record>, ApiError> {
    known_object(&object)?;
    let mut db = state.db.write().await;
    let record = id
        .parse::<u64>()
        .ok()
        .and_then(|key| db.objects.get_mut(&object).and_then(|m| m.get_mut(&key)))
        .ok_or_else(|| ApiError::not_found(&object, &id))?;
    let now = timestamp();
    merge_properties(&mut record.properties, input.properties);
    record
        .properties
        .insert("lastmodifieddate".to_string(), Value::String(now.clone()));
    record.updated_at = now;
    Ok(Json(record.clone()))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((object, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    known_object(&object)?;
    let mut db = state.db.write().await;
    id.parse::<u64>()
        .ok()
        .and_then(|key| db.objects.get_mut(&object).and_then(|m| m.remove(&key)))
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| ApiError::not_found(&object, &id))
}

async fn search_records(
    State(state): State<AppState>,
    Path(object): Path<String>,
    Json(input): Json<SearchInput>,
) -> Result<Json<Value>, ApiError> {
    known_object(&object)?;
    for filter in input.filter_groups.iter().flat_map(|g| &g.filters) {
        if filter.operator != "EQ" {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Unsupported operator: {}", filter.operator),
            ));
        }
        if filter.value.as_deref().map_or(true, str::is_empty) {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Filter on {} is missing a value", filter.property_name),
            ));
        }
    }

    let limit = input.limit.unwrap_or(10).min(SEARCH_MAX);
    let db = state.db.read().await;
    let matches: Vec<Record> = db
        .objects
        .get(&object)
        .map(|m| {
            m.values()
                .filter(|record| {
                    // Groups are OR-ed, filters within a group AND-ed.
                    input.filter_groups.is_empty()
                        || input.filter_groups.iter().any(|group| {
                            group.filters.iter().all(|f| {
                                record.properties.get(&f.property_name).and_then(Value::as_str)
                                    == f.value.as_deref()
                            })
                        })
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    let total = matches.len();
    let results: Vec<Record> = matches.into_iter().take(limit).collect();
    Ok(Json(json!({ "total": total, "results": results })))
}

async fn list_owners(State(state): State<AppState>) -> Json<Value> {
    let db = state.db.read().await;
    Json(json!({ "results": db.owners }))
}

async fn get_owner(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Owner>, ApiError> {
    let db = state.db.read().await;
    db.owners
        .iter()
        .find(|o| o.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("owner", &id))
}

async fn create_links(
    State(state): State<AppState>,
    Path((from, to)): Path<(String, String)>,
    Json(input): Json<BatchInput>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    known_object(&from)?;
    known_object(&to)?;
    let mut db = state.db.write().await;

    for link in &input.inputs {
        if !db.exists(&from, &link.from.id) {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("{from} {} does not exist", link.from.id),
            ));
        }
        if !db.exists(&to, &link.to.id) {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("{to} {} does not exist", link.to.id),
            ));
        }
    }

    let mut created = Vec::new();
    for link in input.inputs {
        for kind in link.types {
            let stored = Link {
                from_type: from.clone(),
                from_id: link.from.id.clone(),
                to_type: to.clone(),
                to_id: link.to.id.clone(),
                type_id: kind.association_type_id,
            };
            created.push(json!({
                "fromObjectId": stored.from_id,
                "toObjectId": stored.to_id,
                "labels": [],
            }));
            db.links.push(stored);
        }
    }
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "COMPLETE", "results": created })),
    ))
}
