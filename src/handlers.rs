//! HTTP handlers: thin translation between the wire and the record store.
//! All invariants are enforced below this layer.

use crate::error::EngineError;
use crate::repo::RecordStore;
use crate::response::{self, SuccessMany, SuccessOne};
use crate::schema::snapshot::TableSnapshot;
use crate::schema::types::{PrimaryKey, TableDefinition};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};

fn table<'a>(state: &'a AppState, name: &str) -> Result<&'a TableDefinition, EngineError> {
    state
        .schema
        .table(name)
        .ok_or_else(|| EngineError::NotFound(format!("no table '{}'", name)))
}

/// Parse the id path segment per the table's key strategy. Composite
/// identities arrive as a JSON object in the (percent-decoded) segment.
fn parse_identity(table: &TableDefinition, id_str: &str) -> Result<Value, EngineError> {
    match table.primary_key() {
        PrimaryKey::AutoIncrement { .. } => {
            let n: i64 = id_str
                .parse()
                .map_err(|_| EngineError::BadRequest("invalid id".into()))?;
            Ok(Value::Number(n.into()))
        }
        PrimaryKey::Uuid { .. } => Ok(Value::String(id_str.to_string())),
        PrimaryKey::Composite { .. } => {
            let v: Value = serde_json::from_str(id_str)
                .map_err(|_| EngineError::BadRequest("composite identity must be a JSON object".into()))?;
            Ok(v)
        }
    }
}

fn body_to_map(value: Value) -> Result<Map<String, Value>, EngineError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(EngineError::BadRequest("body must be a JSON object".into())),
    }
}

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Deserialize)]
pub struct BulkUpdateBody {
    pub ids: Vec<Value>,
    pub set: Value,
}

#[derive(Deserialize)]
pub struct BulkDeleteBody {
    pub ids: Vec<Value>,
}

pub async fn list_tables(State(state): State<AppState>) -> Json<crate::schema::SchemaSnapshot> {
    Json(state.schema.snapshot())
}

pub async fn get_table(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TableSnapshot>, EngineError> {
    let t = table(&state, &name)?;
    Ok(Json(TableSnapshot::of(t)))
}

pub async fn list_records(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<SuccessMany<Value>>, EngineError> {
    let t = table(&state, &name)?;
    let rows = RecordStore::list(&state.pool, t, params.limit, params.offset).await?;
    Ok(Json(response::many(rows)))
}

pub async fn create_record(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<SuccessOne<Value>>), EngineError> {
    let t = table(&state, &name)?;
    let body = body_to_map(body)?;
    let row = RecordStore::create(&state.pool, t, &body).await?;
    Ok((StatusCode::CREATED, Json(response::one(row))))
}

pub async fn bulk_create(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<SuccessMany<Value>>), EngineError> {
    let t = table(&state, &name)?;
    let items: Vec<Map<String, Value>> = match body {
        Value::Array(arr) => arr.into_iter().map(body_to_map).collect::<Result<_, _>>()?,
        _ => return Err(EngineError::BadRequest("body must be a JSON array".into())),
    };
    let rows = RecordStore::create_many(&state.pool, t, &items).await?;
    Ok((StatusCode::CREATED, Json(response::many(rows))))
}

pub async fn read_record(
    State(state): State<AppState>,
    Path((name, id_str)): Path<(String, String)>,
) -> Result<Json<SuccessOne<Value>>, EngineError> {
    let t = table(&state, &name)?;
    let id = parse_identity(t, &id_str)?;
    let row = RecordStore::read(&state.pool, t, &id).await?;
    Ok(Json(response::one(row)))
}

pub async fn update_record(
    State(state): State<AppState>,
    Path((name, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<SuccessOne<Value>>, EngineError> {
    let t = table(&state, &name)?;
    let id = parse_identity(t, &id_str)?;
    let body = body_to_map(body)?;
    let row = RecordStore::update(&state.pool, t, &id, &body).await?;
    Ok(Json(response::one(row)))
}

pub async fn delete_record(
    State(state): State<AppState>,
    Path((name, id_str)): Path<(String, String)>,
) -> Result<StatusCode, EngineError> {
    let t = table(&state, &name)?;
    let id = parse_identity(t, &id_str)?;
    RecordStore::delete(&state.pool, t, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn bulk_update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<BulkUpdateBody>,
) -> Result<Json<SuccessOne<Value>>, EngineError> {
    let t = table(&state, &name)?;
    let set = body_to_map(body.set)?;
    let count = RecordStore::update_many(&state.pool, t, &body.ids, &set).await?;
    Ok(Json(response::one(serde_json::json!({ "count": count }))))
}

pub async fn bulk_delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<BulkDeleteBody>,
) -> Result<Json<SuccessOne<Value>>, EngineError> {
    let t = table(&state, &name)?;
    let count = RecordStore::delete_many(&state.pool, t, &body.ids).await?;
    Ok(Json(response::one(serde_json::json!({ "count": count }))))
}
