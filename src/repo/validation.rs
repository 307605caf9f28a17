//! Shared write-path validation: required fields and uniqueness.
//!
//! The uniqueness check here is the friendly pre-check; the store's own
//! unique index is the final arbiter under concurrency (see
//! `EngineError::from_write`).

use crate::error::EngineError;
use crate::schema::types::{PrimaryKey, TableDefinition};
use crate::sql::{self, PgBindValue};
use serde_json::{Map, Value};
use sqlx::PgConnection;

/// One set of fields whose value-tuple must be unique across the table.
#[derive(Clone, Debug, PartialEq)]
pub struct UniqueGroup {
    pub label: String,
    pub fields: Vec<String>,
}

/// All uniqueness groups of a table: the primary key (unless auto-increment,
/// where the sequence guarantees it), every unique constraint, every unique
/// index, and every field flagged unique.
pub fn unique_groups(table: &TableDefinition) -> Vec<UniqueGroup> {
    let mut groups = Vec::new();
    match table.primary_key() {
        PrimaryKey::AutoIncrement { .. } => {}
        PrimaryKey::Uuid { field } => {
            groups.push(UniqueGroup { label: "primary key".into(), fields: vec![field] });
        }
        PrimaryKey::Composite { fields } => {
            groups.push(UniqueGroup { label: "primary key".into(), fields });
        }
    }
    for uc in &table.unique_constraints {
        groups.push(UniqueGroup {
            label: format!("unique constraint '{}'", uc.name),
            fields: uc.fields.clone(),
        });
    }
    for idx in table.indexes.iter().filter(|i| i.unique) {
        groups.push(UniqueGroup {
            label: format!("unique index '{}'", idx.name),
            fields: idx.fields.clone(),
        });
    }
    for field in table.fields.iter().filter(|f| f.unique) {
        groups.push(UniqueGroup {
            label: format!("unique field '{}'", field.name),
            fields: vec![field.name.clone()],
        });
    }
    groups
}

/// Required fields (and composite-key fields, which have no system-assigned
/// fallback) that are absent or null in a create payload. Aggregated so the
/// client sees every violation at once.
pub fn missing_required(table: &TableDefinition, payload: &Map<String, Value>) -> Vec<String> {
    let mut missing = Vec::new();
    let mut note = |name: &str| {
        if !missing.iter().any(|m| m == name) {
            missing.push(name.to_string());
        }
    };
    for field in table.fields.iter().filter(|f| f.required) {
        if payload.get(&field.name).map_or(true, Value::is_null) {
            note(&field.name);
        }
    }
    if let PrimaryKey::Composite { fields } = table.primary_key() {
        for f in &fields {
            if payload.get(f).map_or(true, Value::is_null) {
                note(f);
            }
        }
    }
    missing
}

/// Required fields an update payload attempts to null out. Absent fields
/// keep their stored value and are fine.
pub fn nulled_required(table: &TableDefinition, payload: &Map<String, Value>) -> Vec<String> {
    table
        .fields
        .iter()
        .filter(|f| f.required)
        .filter(|f| matches!(payload.get(&f.name), Some(Value::Null)))
        .map(|f| f.name.clone())
        .collect()
}

pub fn require_fields(table: &TableDefinition, payload: &Map<String, Value>) -> Result<(), EngineError> {
    let missing = missing_required(table, payload);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "table '{}': missing required fields: {}",
            table.name,
            missing.join(", ")
        )))
    }
}

/// Pre-check every uniqueness group against the record's final values,
/// excluding the record being updated (if any). Groups with an absent or
/// null member are skipped: NULL never collides, in the pre-check and in
/// the backing index alike.
pub async fn check_unique(
    conn: &mut PgConnection,
    table: &TableDefinition,
    record: &Map<String, Value>,
    exclude: Option<&[(String, Value)]>,
) -> Result<(), EngineError> {
    for group in unique_groups(table) {
        let mut pairs = Vec::with_capacity(group.fields.len());
        let mut complete = true;
        for f in &group.fields {
            match record.get(f) {
                Some(v) if !v.is_null() => pairs.push((f.clone(), v.clone())),
                _ => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            continue;
        }
        let q = sql::exists_where(table, &pairs, exclude);
        tracing::debug!(sql = %q.sql, params = ?q.params, "uniqueness pre-check");
        let mut query = sqlx::query_scalar::<_, bool>(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let taken = query.fetch_one(&mut *conn).await?;
        if taken {
            return Err(EngineError::Conflict(format!(
                "table '{}': {} already holds this value for ({})",
                table.name,
                group.label,
                group.fields.join(", ")
            )));
        }
    }
    Ok(())
}
