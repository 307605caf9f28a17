//! Applies compiled schema operations to the database, once at startup.
//!
//! Idempotent: every operation first checks the store's current schema and
//! only creates what is missing. Additive-only: nothing is ever dropped, and
//! pieces present in the store but absent from configuration are left alone.
//! Transactional per table: a failure rolls back that table's changes only
//! and aborts startup.

use crate::error::EngineError;
use crate::schema::{ColumnSpec, SchemaOperation};
use crate::sql::quoted;
use sqlx::{PgConnection, PgPool};

/// Apply all operations. Operations are grouped by table (the compiler
/// already emits them contiguously per table) and each group runs in one
/// transaction.
pub async fn apply(pool: &PgPool, ops: &[SchemaOperation]) -> Result<(), EngineError> {
    let mut groups: Vec<(&str, Vec<&SchemaOperation>)> = Vec::new();
    for op in ops {
        match groups.last_mut() {
            Some((table, group)) if *table == op.table() => group.push(op),
            _ => groups.push((op.table(), vec![op])),
        }
    }

    for (table, group) in groups {
        let mut tx = pool.begin().await.map_err(|e| migration_err(table, e))?;
        for op in group {
            apply_op(&mut tx, op)
                .await
                .map_err(|e| migration_err(table, e))?;
        }
        tx.commit().await.map_err(|e| migration_err(table, e))?;
        tracing::info!(table = %table, "schema migrated");
    }
    Ok(())
}

fn migration_err(table: &str, e: sqlx::Error) -> EngineError {
    EngineError::Migration { table: table.to_string(), message: e.to_string() }
}

async fn apply_op(conn: &mut PgConnection, op: &SchemaOperation) -> Result<(), sqlx::Error> {
    match op {
        SchemaOperation::CreateTable { table, columns } => {
            create_table(conn, table, columns).await
        }
        SchemaOperation::AddPrimaryKey { table, columns } => {
            add_primary_key(conn, table, columns).await
        }
        SchemaOperation::AddUniqueConstraint { table, name, columns } => {
            add_unique_constraint(conn, table, name, columns).await
        }
        SchemaOperation::CreateIndex { table, name, columns, unique } => {
            create_index(conn, table, name, columns, *unique).await
        }
    }
}

async fn create_table(
    conn: &mut PgConnection,
    table: &str,
    columns: &[ColumnSpec],
) -> Result<(), sqlx::Error> {
    let col_defs: Vec<String> = columns
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quoted(&c.name), c.sql_type);
            if let Some(d) = &c.default {
                def.push_str(&format!(" DEFAULT {}", d));
            }
            if c.not_null {
                def.push_str(" NOT NULL");
            }
            def
        })
        .collect();
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quoted(table),
        col_defs.join(",\n  ")
    );
    tracing::debug!(sql = %sql, "migrate");
    sqlx::query(&sql).execute(&mut *conn).await?;

    // A table that predates this configuration may be missing newly declared
    // columns. Adding them stays additive; NOT NULL is left off because
    // existing rows cannot satisfy it (the repository enforces required
    // fields on every write regardless). A declared DEFAULT is kept so
    // existing rows are backfilled with it.
    for c in columns {
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
            quoted(table),
            quoted(&c.name),
            c.sql_type
        );
        if let Some(d) = &c.default {
            sql.push_str(&format!(" DEFAULT {}", d));
        }
        tracing::debug!(sql = %sql, "migrate");
        sqlx::query(&sql).execute(&mut *conn).await?;
    }
    Ok(())
}

async fn add_primary_key(
    conn: &mut PgConnection,
    table: &str,
    columns: &[String],
) -> Result<(), sqlx::Error> {
    // The strategy is fixed at table creation: if any primary key exists it
    // is assumed to be the expected one, and this is a no-op.
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (
            SELECT 1 FROM information_schema.table_constraints
            WHERE table_schema = current_schema()
              AND table_name = $1
              AND constraint_type = 'PRIMARY KEY'
        )",
    )
    .bind(table)
    .fetch_one(&mut *conn)
    .await?;
    if exists {
        return Ok(());
    }
    let cols: Vec<String> = columns.iter().map(|c| quoted(c)).collect();
    let sql = format!(
        "ALTER TABLE {} ADD PRIMARY KEY ({})",
        quoted(table),
        cols.join(", ")
    );
    tracing::debug!(sql = %sql, "migrate");
    sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(())
}

async fn add_unique_constraint(
    conn: &mut PgConnection,
    table: &str,
    name: &str,
    columns: &[String],
) -> Result<(), sqlx::Error> {
    let physical = physical_name(table, name);
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (
            SELECT 1 FROM information_schema.table_constraints
            WHERE table_schema = current_schema()
              AND table_name = $1
              AND constraint_name = $2
              AND constraint_type = 'UNIQUE'
        )",
    )
    .bind(table)
    .bind(&physical)
    .fetch_one(&mut *conn)
    .await?;
    if exists {
        return Ok(());
    }
    let cols: Vec<String> = columns.iter().map(|c| quoted(c)).collect();
    let sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
        quoted(table),
        quoted(&physical),
        cols.join(", ")
    );
    tracing::debug!(sql = %sql, "migrate");
    sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(())
}

async fn create_index(
    conn: &mut PgConnection,
    table: &str,
    name: &str,
    columns: &[String],
    unique: bool,
) -> Result<(), sqlx::Error> {
    let cols: Vec<String> = columns.iter().map(|c| quoted(c)).collect();
    let sql = format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if unique { "UNIQUE " } else { "" },
        quoted(&physical_name(table, name)),
        quoted(table),
        cols.join(", ")
    );
    tracing::debug!(sql = %sql, "migrate");
    sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(())
}

/// Constraint and index names are unique per table in configuration, but
/// their backing relations are schema-global in Postgres, so the physical
/// name carries the table prefix.
pub fn physical_name(table: &str, name: &str) -> String {
    format!("{}_{}", table, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_names_are_table_prefixed() {
        assert_eq!(physical_name("users", "by_tenant"), "users_by_tenant");
    }
}
