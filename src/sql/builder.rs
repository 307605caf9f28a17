//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from a table
//! definition. Identifiers come from validated configuration, values are
//! always bound.

use crate::schema::types::{PrimaryKey, TableDefinition};
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from validated config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf { sql: String::new(), params: Vec::new() }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }

    fn placeholder(&mut self, table: &TableDefinition, column: &str, v: Value) -> String {
        let n = self.push_param(v);
        match bind_cast(table, column) {
            Some(cast) => format!("${}::{}", n, cast),
            None => format!("${}", n),
        }
    }
}

/// SQL cast for a bound parameter, so JSON strings land in DATE/BIGINT/BOOLEAN
/// columns correctly. The synthesized auto-increment key is a bigint.
fn bind_cast(table: &TableDefinition, column: &str) -> Option<&'static str> {
    if let Some(field) = table.field(column) {
        return field.field_type.bind_cast();
    }
    match table.primary_key() {
        PrimaryKey::AutoIncrement { field } if field == column => Some("bigint"),
        _ => None,
    }
}

fn order_by_pk(table: &TableDefinition) -> String {
    let cols: Vec<String> = table.primary_key().fields().iter().map(|f| quoted(f)).collect();
    format!(" ORDER BY {}", cols.join(", "))
}

fn where_eq(q: &mut QueryBuf, table: &TableDefinition, pairs: &[(String, Value)]) -> String {
    let parts: Vec<String> = pairs
        .iter()
        .map(|(col, val)| {
            let ph = q.placeholder(table, col, val.clone());
            format!("{} = {}", quoted(col), ph)
        })
        .collect();
    parts.join(" AND ")
}

/// INSERT with RETURNING *. The caller has already assembled the final
/// column/value pairs (declared fields present in the payload plus any
/// generated identity value).
pub fn insert(table: &TableDefinition, values: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    if values.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quoted(&table.name));
        return q;
    }
    let mut cols = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    for (col, val) in values {
        let ph = q.placeholder(table, col, val.clone());
        cols.push(quoted(col));
        placeholders.push(ph);
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        quoted(&table.name),
        cols.join(", "),
        placeholders.join(", ")
    );
    q
}

/// SELECT one record by its identity (one pair per primary-key field).
pub fn select_by_pk(table: &TableDefinition, key: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cond = where_eq(&mut q, table, key);
    q.sql = format!("SELECT * FROM {} WHERE {}", quoted(&table.name), cond);
    q
}

/// SELECT all records ordered by primary key, with LIMIT/OFFSET.
pub fn select_list(table: &TableDefinition, limit: u32, offset: u32) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT * FROM {}{} LIMIT {} OFFSET {}",
        quoted(&table.name),
        order_by_pk(table),
        limit,
        offset
    );
    q
}

/// SELECT EXISTS over a value-tuple, optionally excluding one record by
/// identity (the record being updated).
pub fn exists_where(
    table: &TableDefinition,
    pairs: &[(String, Value)],
    exclude: Option<&[(String, Value)]>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cond = where_eq(&mut q, table, pairs);
    if let Some(key) = exclude {
        let excl = where_eq(&mut q, table, key);
        cond = format!("{} AND NOT ({})", cond, excl);
    }
    q.sql = format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE {})",
        quoted(&table.name),
        cond
    );
    q
}

/// UPDATE by identity, setting only the given columns. RETURNING *.
pub fn update_by_pk(
    table: &TableDefinition,
    sets: &[(String, Value)],
    key: &[(String, Value)],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let set_parts: Vec<String> = sets
        .iter()
        .map(|(col, val)| {
            let ph = q.placeholder(table, col, val.clone());
            format!("{} = {}", quoted(col), ph)
        })
        .collect();
    let cond = where_eq(&mut q, table, key);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING *",
        quoted(&table.name),
        set_parts.join(", "),
        cond
    );
    q
}

/// DELETE by identity.
pub fn delete_by_pk(table: &TableDefinition, key: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cond = where_eq(&mut q, table, key);
    q.sql = format!("DELETE FROM {} WHERE {}", quoted(&table.name), cond);
    q
}

/// DELETE WHERE column IN (...) for single-field identities.
pub fn delete_where_in(table: &TableDefinition, column: &str, values: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::new();
    if values.is_empty() {
        q.sql = format!("DELETE FROM {} WHERE 1 = 0", quoted(&table.name));
        return q;
    }
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| q.placeholder(table, column, v.clone()))
        .collect();
    q.sql = format!(
        "DELETE FROM {} WHERE {} IN ({})",
        quoted(&table.name),
        quoted(column),
        placeholders.join(", ")
    );
    q
}
