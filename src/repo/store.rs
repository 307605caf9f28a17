//! Record CRUD against a compiled table.
//!
//! Every write runs the same pipeline: required-field validation, identity
//! assignment, uniqueness pre-check, persistence. The backing unique index
//! remains the final arbiter; its violations surface as the same `Conflict`
//! as the pre-check.

use crate::error::EngineError;
use crate::repo::validation::{check_unique, nulled_required, require_fields};
use crate::schema::types::{FieldDefinition, FieldType, PrimaryKey, TableDefinition};
use crate::sql::{self, PgBindValue, QueryBuf};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool};

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 1000;

pub struct RecordStore;

impl RecordStore {
    /// Insert one record. Returns the stored record including its assigned
    /// identity. The store is left untouched on any validation failure.
    pub async fn create(
        pool: &PgPool,
        table: &TableDefinition,
        payload: &Map<String, Value>,
    ) -> Result<Value, EngineError> {
        require_fields(table, payload)?;
        let (values, record) = insert_values(table, payload);
        let mut conn = pool.acquire().await?;
        check_unique(&mut conn, table, &record, None).await?;
        let q = sql::insert(table, &values);
        let row = fetch_optional(&mut conn, &q)
            .await
            .map_err(|e| EngineError::from_write(e, &table.name))?
            .ok_or_else(|| EngineError::Db(sqlx::Error::RowNotFound))?;
        Ok(row)
    }

    /// Insert a batch, all-or-nothing: one failing payload rejects the whole
    /// batch and persists nothing.
    pub async fn create_many(
        pool: &PgPool,
        table: &TableDefinition,
        payloads: &[Map<String, Value>],
    ) -> Result<Vec<Value>, EngineError> {
        for payload in payloads {
            require_fields(table, payload)?;
        }
        let mut tx = pool.begin().await?;
        let mut out = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let (values, record) = insert_values(table, payload);
            // Inside the transaction, so an earlier insert in this batch is
            // visible to the pre-check.
            check_unique(&mut tx, table, &record, None).await?;
            let q = sql::insert(table, &values);
            let row = fetch_optional(&mut tx, &q)
                .await
                .map_err(|e| EngineError::from_write(e, &table.name))?
                .ok_or_else(|| EngineError::Db(sqlx::Error::RowNotFound))?;
            out.push(row);
        }
        tx.commit().await?;
        Ok(out)
    }

    /// Fetch one record by identity.
    pub async fn read(
        pool: &PgPool,
        table: &TableDefinition,
        id: &Value,
    ) -> Result<Value, EngineError> {
        let key = identity_pairs(table, id)?;
        let q = sql::select_by_pk(table, &key);
        let mut conn = pool.acquire().await?;
        fetch_optional(&mut conn, &q)
            .await?
            .ok_or_else(|| not_found(table, id))
    }

    /// List records ordered by identity. Limit defaults to 100, capped at
    /// 1000; offset defaults to 0.
    pub async fn list(
        pool: &PgPool,
        table: &TableDefinition,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Value>, EngineError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = offset.unwrap_or(0);
        let q = sql::select_list(table, limit, offset);
        let mut conn = pool.acquire().await?;
        fetch_all(&mut conn, &q).await.map_err(EngineError::Db)
    }

    /// Update one record. Primary-key fields in the payload are silently
    /// ignored: stored identity is never altered. Required-field and
    /// uniqueness checks apply to the merged result, excluding the record's
    /// own current values.
    pub async fn update(
        pool: &PgPool,
        table: &TableDefinition,
        id: &Value,
        payload: &Map<String, Value>,
    ) -> Result<Value, EngineError> {
        let key = identity_pairs(table, id)?;
        let sets = update_sets(table, payload)?;
        let mut conn = pool.acquire().await?;
        let existing = fetch_optional(&mut conn, &sql::select_by_pk(table, &key))
            .await?
            .ok_or_else(|| not_found(table, id))?;
        if sets.is_empty() {
            return Ok(existing);
        }
        let merged = merge_record(table, &existing, &sets);
        // A required column added after this record was stored may still hold
        // NULL; the merged result has to satisfy the current definition.
        require_fields(table, &merged)?;
        check_unique(&mut conn, table, &merged, Some(&key)).await?;
        let q = sql::update_by_pk(table, &sets, &key);
        fetch_optional(&mut conn, &q)
            .await
            .map_err(|e| EngineError::from_write(e, &table.name))?
            .ok_or_else(|| not_found(table, id))
    }

    /// Apply one partial payload to every listed record. Missing ids are
    /// skipped; the count reflects records actually updated. Any uniqueness
    /// violation aborts the whole batch.
    pub async fn update_many(
        pool: &PgPool,
        table: &TableDefinition,
        ids: &[Value],
        payload: &Map<String, Value>,
    ) -> Result<u64, EngineError> {
        let sets = update_sets(table, payload)?;
        if sets.is_empty() {
            return Ok(0);
        }
        let mut tx = pool.begin().await?;
        let mut count = 0u64;
        for id in ids {
            let key = identity_pairs(table, id)?;
            let Some(existing) = fetch_optional(&mut tx, &sql::select_by_pk(table, &key)).await?
            else {
                continue;
            };
            let merged = merge_record(table, &existing, &sets);
            require_fields(table, &merged)?;
            check_unique(&mut tx, table, &merged, Some(&key)).await?;
            let q = sql::update_by_pk(table, &sets, &key);
            fetch_optional(&mut tx, &q)
                .await
                .map_err(|e| EngineError::from_write(e, &table.name))?;
            count += 1;
        }
        tx.commit().await?;
        Ok(count)
    }

    /// Delete one record. Deleting a missing id is a no-op, not an error.
    pub async fn delete(
        pool: &PgPool,
        table: &TableDefinition,
        id: &Value,
    ) -> Result<(), EngineError> {
        let key = identity_pairs(table, id)?;
        let q = sql::delete_by_pk(table, &key);
        let mut conn = pool.acquire().await?;
        execute(&mut conn, &q).await?;
        Ok(())
    }

    /// Delete records by identity; missing ids are no-ops. Returns the
    /// number of records actually removed.
    pub async fn delete_many(
        pool: &PgPool,
        table: &TableDefinition,
        ids: &[Value],
    ) -> Result<u64, EngineError> {
        if ids.is_empty() {
            return Ok(0);
        }
        match table.primary_key() {
            PrimaryKey::Composite { .. } => {
                let mut tx = pool.begin().await?;
                let mut removed = 0u64;
                for id in ids {
                    let key = identity_pairs(table, id)?;
                    removed += execute(&mut tx, &sql::delete_by_pk(table, &key)).await?;
                }
                tx.commit().await?;
                Ok(removed)
            }
            PrimaryKey::AutoIncrement { field } | PrimaryKey::Uuid { field } => {
                for id in ids {
                    identity_pairs(table, id)?;
                }
                let q = sql::delete_where_in(table, &field, ids);
                let mut conn = pool.acquire().await?;
                Ok(execute(&mut conn, &q).await?)
            }
        }
    }
}

fn not_found(table: &TableDefinition, id: &Value) -> EngineError {
    EngineError::NotFound(format!("table '{}': no record with identity {}", table.name, id))
}

/// Resolve a caller-supplied identity into (field, value) pairs in
/// primary-key order. Single-field keys take a scalar; composite keys take
/// an object carrying every key field.
fn identity_pairs(table: &TableDefinition, id: &Value) -> Result<Vec<(String, Value)>, EngineError> {
    match table.primary_key() {
        PrimaryKey::AutoIncrement { field } | PrimaryKey::Uuid { field } => match id {
            Value::Number(_) | Value::String(_) => Ok(vec![(field, id.clone())]),
            _ => Err(EngineError::BadRequest(format!(
                "table '{}': identity must be a scalar value",
                table.name
            ))),
        },
        PrimaryKey::Composite { fields } => {
            let Value::Object(map) = id else {
                return Err(EngineError::BadRequest(format!(
                    "table '{}': composite identity must be an object with fields ({})",
                    table.name,
                    fields.join(", ")
                )));
            };
            let mut pairs = Vec::with_capacity(fields.len());
            for f in &fields {
                let v = map.get(f).filter(|v| !v.is_null()).ok_or_else(|| {
                    EngineError::BadRequest(format!(
                        "table '{}': composite identity is missing field '{}'",
                        table.name, f
                    ))
                })?;
                pairs.push((f.clone(), v.clone()));
            }
            Ok(pairs)
        }
    }
}

/// Column/value pairs for an insert, plus the resulting record view used by
/// the uniqueness pre-check. Unknown payload keys are dropped; the
/// auto-increment key is never bound (the sequence assigns it); a uuid key
/// is generated here.
fn insert_values(
    table: &TableDefinition,
    payload: &Map<String, Value>,
) -> (Vec<(String, Value)>, Map<String, Value>) {
    let pk = table.primary_key();
    let mut values = Vec::new();
    let mut record = Map::new();

    if let PrimaryKey::Uuid { field } = &pk {
        let generated = Value::String(uuid::Uuid::new_v4().to_string());
        values.push((field.clone(), generated.clone()));
        record.insert(field.clone(), generated);
    }

    for field in &table.fields {
        if matches!(&pk, PrimaryKey::AutoIncrement { field: f } if *f == field.name) {
            continue;
        }
        if matches!(&pk, PrimaryKey::Uuid { field: f } if *f == field.name) {
            continue;
        }
        if let Some(v) = payload.get(&field.name) {
            let v = field_value(field, v);
            values.push((field.name.clone(), v.clone()));
            record.insert(field.name.clone(), v);
        }
    }
    (values, record)
}

/// Normalization applied to every stored value: email addresses are
/// lowercased so uniqueness and lookups are case-insensitive.
fn field_value(field: &FieldDefinition, v: &Value) -> Value {
    match (&field.field_type, v) {
        (FieldType::Email, Value::String(s)) => Value::String(s.to_lowercase()),
        _ => v.clone(),
    }
}

/// Columns an update may set: declared fields present in the payload, with
/// primary-key fields silently dropped. Nulling a required field is the one
/// validation an update adds over create.
fn update_sets(
    table: &TableDefinition,
    payload: &Map<String, Value>,
) -> Result<Vec<(String, Value)>, EngineError> {
    let nulled = nulled_required(table, payload);
    if !nulled.is_empty() {
        return Err(EngineError::Validation(format!(
            "table '{}': required fields cannot be null: {}",
            table.name,
            nulled.join(", ")
        )));
    }
    let pk_fields = table.primary_key();
    let pk_fields = pk_fields.fields();
    Ok(table
        .fields
        .iter()
        .filter(|f| !pk_fields.contains(&f.name.as_str()))
        .filter_map(|f| payload.get(&f.name).map(|v| (f.name.clone(), field_value(f, v))))
        .collect())
}

/// Existing record overlaid with the pending sets, restricted to declared
/// fields plus the key; input to the uniqueness pre-check.
fn merge_record(
    table: &TableDefinition,
    existing: &Value,
    sets: &[(String, Value)],
) -> Map<String, Value> {
    let mut merged = Map::new();
    if let Value::Object(row) = existing {
        let pk = table.primary_key();
        for name in table.fields.iter().map(|f| f.name.as_str()).chain(pk.fields()) {
            if let Some(v) = row.get(name) {
                merged.insert(name.to_string(), v.clone());
            }
        }
    }
    for (k, v) in sets {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

async fn fetch_optional(
    conn: &mut PgConnection,
    q: &QueryBuf,
) -> Result<Option<Value>, sqlx::Error> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    let row = query.fetch_optional(&mut *conn).await?;
    Ok(row.map(|r| row_to_json(&r)))
}

async fn fetch_all(conn: &mut PgConnection, q: &QueryBuf) -> Result<Vec<Value>, sqlx::Error> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    let rows = query.fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

async fn execute(conn: &mut PgConnection, q: &QueryBuf) -> Result<u64, sqlx::Error> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    let done = query.execute(&mut *conn).await?;
    Ok(done.rows_affected())
}

fn row_to_json(row: &PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
