//! Structural validation of table definitions.
//!
//! Fail-fast: the first violation, walking tables in declaration order and
//! each table's properties in order (name, fields, primary key, unique
//! constraints, indexes), is returned as a `SchemaError` naming the table,
//! the property, and the violated rule.

use crate::error::SchemaError;
use crate::schema::types::{FieldType, PrimaryKey, TableDefinition};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Identifier pattern shared by table, field, constraint, and index names.
pub const IDENT_PATTERN: &str = "^[a-z][a-z0-9_]*$";

pub fn is_identifier(s: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(IDENT_PATTERN).expect("identifier pattern is valid"))
        .is_match(s)
}

pub fn validate_tables(tables: &[TableDefinition]) -> Result<(), SchemaError> {
    let mut seen_ids: HashSet<u64> = HashSet::new();
    let mut seen_names: HashSet<&str> = HashSet::new();

    for table in tables {
        if table.id == 0 {
            return Err(SchemaError::violation(
                &table.name,
                "id",
                "positive",
                "table id must be a positive integer",
            ));
        }
        if !seen_ids.insert(table.id) {
            return Err(SchemaError::violation(
                &table.name,
                "id",
                "unique items",
                format!("table id {} is declared more than once", table.id),
            ));
        }
        if !is_identifier(&table.name) {
            return Err(SchemaError::violation(
                &table.name,
                "name",
                "pattern",
                format!("table name must match {}", IDENT_PATTERN),
            ));
        }
        if !seen_names.insert(table.name.as_str()) {
            return Err(SchemaError::violation(
                &table.name,
                "name",
                "unique items",
                format!("table name '{}' is declared more than once", table.name),
            ));
        }
        validate_table(table)?;
    }
    Ok(())
}

fn validate_table(table: &TableDefinition) -> Result<(), SchemaError> {
    if table.fields.is_empty() {
        return Err(SchemaError::violation(
            &table.name,
            "fields",
            "minimum items",
            "a table must declare at least one field",
        ));
    }
    let mut field_names: HashSet<&str> = HashSet::new();
    for field in &table.fields {
        if !is_identifier(&field.name) {
            return Err(SchemaError::violation(
                &table.name,
                format!("fields.{}", field.name),
                "pattern",
                format!("field name must match {}", IDENT_PATTERN),
            ));
        }
        if !field_names.insert(field.name.as_str()) {
            return Err(SchemaError::violation(
                &table.name,
                format!("fields.{}", field.name),
                "unique items",
                format!("field name '{}' is declared more than once", field.name),
            ));
        }
        if let Some(d) = &field.default {
            if !(d.is_string() || d.is_number() || d.is_boolean()) {
                return Err(SchemaError::violation(
                    &table.name,
                    format!("fields.{}.default", field.name),
                    "type",
                    "a field default must be a string, number, or boolean",
                ));
            }
        }
    }

    validate_primary_key(table)?;

    // Constraint and index names share one namespace per table: both become
    // schema objects prefixed by the table name. Field-level unique/indexed
    // flags compile to indexes with derived names, so those are reserved in
    // the same namespace.
    let derived: Vec<String> = table
        .fields
        .iter()
        .filter_map(|f| {
            if f.unique {
                Some(format!("{}_key", f.name))
            } else if f.indexed {
                Some(format!("{}_idx", f.name))
            } else {
                None
            }
        })
        .collect();
    let mut object_names: HashSet<&str> = derived.iter().map(String::as_str).collect();
    for uc in &table.unique_constraints {
        if !is_identifier(&uc.name) {
            return Err(SchemaError::violation(
                &table.name,
                format!("unique_constraints.{}", uc.name),
                "pattern",
                format!("constraint name must match {}", IDENT_PATTERN),
            ));
        }
        if !object_names.insert(uc.name.as_str()) {
            return Err(SchemaError::violation(
                &table.name,
                format!("unique_constraints.{}", uc.name),
                "unique items",
                format!(
                    "constraint name '{}' collides with another constraint, index, or derived index",
                    uc.name
                ),
            ));
        }
        let distinct: HashSet<&str> = uc.fields.iter().map(String::as_str).collect();
        if distinct.len() < 2 {
            return Err(SchemaError::violation(
                &table.name,
                format!("unique_constraints.{}.fields", uc.name),
                "minimum items",
                "a unique constraint requires at least 2 distinct fields",
            ));
        }
        for f in &uc.fields {
            if !table.has_field(f) {
                return Err(SchemaError::violation(
                    &table.name,
                    format!("unique_constraints.{}.fields", uc.name),
                    "unknown field",
                    format!("field '{}' is not declared on this table", f),
                ));
            }
        }
    }

    for idx in &table.indexes {
        if !is_identifier(&idx.name) {
            return Err(SchemaError::violation(
                &table.name,
                format!("indexes.{}", idx.name),
                "pattern",
                format!("index name must match {}", IDENT_PATTERN),
            ));
        }
        if !object_names.insert(idx.name.as_str()) {
            return Err(SchemaError::violation(
                &table.name,
                format!("indexes.{}", idx.name),
                "unique items",
                format!(
                    "index name '{}' collides with another constraint, index, or derived index",
                    idx.name
                ),
            ));
        }
        if idx.fields.is_empty() {
            return Err(SchemaError::violation(
                &table.name,
                format!("indexes.{}.fields", idx.name),
                "minimum items",
                "an index requires at least 1 field",
            ));
        }
        for f in &idx.fields {
            if !table.has_field(f) {
                return Err(SchemaError::violation(
                    &table.name,
                    format!("indexes.{}.fields", idx.name),
                    "unknown field",
                    format!("field '{}' is not declared on this table", f),
                ));
            }
        }
    }

    Ok(())
}

fn validate_primary_key(table: &TableDefinition) -> Result<(), SchemaError> {
    // An omitted strategy synthesizes the `id` column; only an explicit
    // strategy must resolve against declared fields.
    let Some(pk) = &table.primary_key else {
        return Ok(());
    };
    match pk {
        PrimaryKey::AutoIncrement { field } => {
            let Some(f) = table.field(field) else {
                return Err(unknown_pk_field(table, field));
            };
            if f.field_type != FieldType::Integer {
                return Err(SchemaError::violation(
                    &table.name,
                    "primary_key.field",
                    "type",
                    format!("auto-increment field '{}' must be of type integer", field),
                ));
            }
        }
        PrimaryKey::Uuid { field } => {
            let Some(f) = table.field(field) else {
                return Err(unknown_pk_field(table, field));
            };
            if f.field_type != FieldType::Text {
                return Err(SchemaError::violation(
                    &table.name,
                    "primary_key.field",
                    "type",
                    format!("uuid field '{}' must be of type text", field),
                ));
            }
        }
        PrimaryKey::Composite { fields } => {
            let distinct: HashSet<&str> = fields.iter().map(String::as_str).collect();
            if distinct.len() < 2 {
                return Err(SchemaError::violation(
                    &table.name,
                    "primary_key.fields",
                    "minimum items",
                    "a composite primary key requires at least 2 distinct fields",
                ));
            }
            for f in fields {
                if !table.has_field(f) {
                    return Err(unknown_pk_field(table, f));
                }
            }
        }
    }
    Ok(())
}

fn unknown_pk_field(table: &TableDefinition, field: &str) -> SchemaError {
    SchemaError::violation(
        &table.name,
        "primary_key",
        "unknown field",
        format!("field '{}' is not declared on this table", field),
    )
}
