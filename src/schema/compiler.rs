//! Compiles validated table definitions into an ordered list of schema
//! operations. Ordering matters: columns must exist before the primary key,
//! the primary key before constraints, constraints before indexes.

use crate::error::SchemaError;
use crate::schema::types::{PrimaryKey, TableDefinition};
use crate::schema::validate::validate_tables;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    /// Rendered SQL literal for the column DEFAULT clause, if declared.
    pub default: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SchemaOperation {
    CreateTable {
        table: String,
        columns: Vec<ColumnSpec>,
    },
    AddPrimaryKey {
        table: String,
        columns: Vec<String>,
    },
    AddUniqueConstraint {
        table: String,
        name: String,
        columns: Vec<String>,
    },
    CreateIndex {
        table: String,
        name: String,
        columns: Vec<String>,
        unique: bool,
    },
}

impl SchemaOperation {
    /// The table this operation belongs to; the migration runner groups
    /// operations by this into one transaction per table.
    pub fn table(&self) -> &str {
        match self {
            SchemaOperation::CreateTable { table, .. }
            | SchemaOperation::AddPrimaryKey { table, .. }
            | SchemaOperation::AddUniqueConstraint { table, .. }
            | SchemaOperation::CreateIndex { table, .. } => table,
        }
    }
}

/// Validate the definitions and produce the operations that bring a store's
/// schema in line with them. Fail-fast on the first structural violation.
pub fn compile(tables: &[TableDefinition]) -> Result<Vec<SchemaOperation>, SchemaError> {
    validate_tables(tables)?;

    let mut ops = Vec::new();
    for table in tables {
        let pk = table.primary_key();
        ops.push(SchemaOperation::CreateTable {
            table: table.name.clone(),
            columns: column_specs(table, &pk),
        });
        ops.push(SchemaOperation::AddPrimaryKey {
            table: table.name.clone(),
            columns: pk.fields().iter().map(|s| s.to_string()).collect(),
        });
        for uc in &table.unique_constraints {
            ops.push(SchemaOperation::AddUniqueConstraint {
                table: table.name.clone(),
                name: uc.name.clone(),
                columns: uc.fields.clone(),
            });
        }
        for idx in &table.indexes {
            ops.push(SchemaOperation::CreateIndex {
                table: table.name.clone(),
                name: idx.name.clone(),
                columns: idx.fields.clone(),
                unique: idx.unique,
            });
        }
        // Field-level uniqueness and indexing flags compile to single-column
        // indexes with derived names.
        for field in &table.fields {
            if field.unique {
                ops.push(SchemaOperation::CreateIndex {
                    table: table.name.clone(),
                    name: format!("{}_key", field.name),
                    columns: vec![field.name.clone()],
                    unique: true,
                });
            }
            if field.indexed && !field.unique {
                ops.push(SchemaOperation::CreateIndex {
                    table: table.name.clone(),
                    name: format!("{}_idx", field.name),
                    columns: vec![field.name.clone()],
                    unique: false,
                });
            }
        }
    }
    Ok(ops)
}

fn column_specs(table: &TableDefinition, pk: &PrimaryKey) -> Vec<ColumnSpec> {
    let mut columns = Vec::with_capacity(table.fields.len() + 1);

    // A defaulted auto-increment key may name a column nobody declared;
    // synthesize it ahead of the declared fields.
    if table.primary_key.is_none() {
        if let PrimaryKey::AutoIncrement { field } = pk {
            if !table.has_field(field) {
                columns.push(ColumnSpec {
                    name: field.clone(),
                    sql_type: "BIGINT GENERATED BY DEFAULT AS IDENTITY".into(),
                    not_null: true,
                    default: None,
                });
            }
        }
    }

    for field in &table.fields {
        let is_auto = matches!(pk, PrimaryKey::AutoIncrement { field: f } if *f == field.name);
        let sql_type = if is_auto {
            "BIGINT GENERATED BY DEFAULT AS IDENTITY".into()
        } else {
            field.field_type.column_type().to_string()
        };
        let is_pk = pk.fields().contains(&field.name.as_str());
        columns.push(ColumnSpec {
            name: field.name.clone(),
            sql_type,
            not_null: field.required || is_pk,
            default: field.default.as_ref().and_then(default_literal),
        });
    }
    columns
}

/// Render a declared field default as a SQL literal. Validation restricts
/// defaults to scalars, so non-scalars never reach this point.
fn default_literal(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "TRUE".into() } else { "FALSE".into() }),
        _ => None,
    }
}
