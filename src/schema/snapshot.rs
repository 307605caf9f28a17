//! Read-only view of the compiled model for administrative introspection.

use crate::schema::types::{PrimaryKey, TableDefinition};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Serialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableSnapshot>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TableSnapshot {
    pub id: u64,
    pub name: String,
    pub primary_key: PrimaryKey,
    pub fields: Vec<FieldSnapshot>,
    pub unique_constraints: Vec<ConstraintSnapshot>,
    pub indexes: Vec<IndexSnapshot>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldSnapshot {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: &'static str,
    pub required: bool,
    pub unique: bool,
    pub indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConstraintSnapshot {
    pub name: String,
    pub fields: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IndexSnapshot {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}

impl TableSnapshot {
    pub fn of(table: &TableDefinition) -> Self {
        TableSnapshot {
            id: table.id,
            name: table.name.clone(),
            primary_key: table.primary_key(),
            fields: table
                .fields
                .iter()
                .map(|f| FieldSnapshot {
                    id: f.id,
                    name: f.name.clone(),
                    field_type: f.field_type.name(),
                    required: f.required,
                    unique: f.unique,
                    indexed: f.indexed,
                    default: f.default.clone(),
                })
                .collect(),
            unique_constraints: table
                .unique_constraints
                .iter()
                .map(|uc| ConstraintSnapshot { name: uc.name.clone(), fields: uc.fields.clone() })
                .collect(),
            indexes: table
                .indexes
                .iter()
                .map(|idx| IndexSnapshot {
                    name: idx.name.clone(),
                    fields: idx.fields.clone(),
                    unique: idx.unique,
                })
                .collect(),
        }
    }
}

impl SchemaSnapshot {
    pub fn of(tables: &[TableDefinition]) -> Self {
        SchemaSnapshot { tables: tables.iter().map(TableSnapshot::of).collect() }
    }
}
