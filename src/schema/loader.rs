//! Load table definitions from JSON configuration.

use crate::error::SchemaError;
use crate::schema::types::TableDefinition;
use std::path::Path;

/// Parse a JSON array of table definitions. Structural validation happens
/// later at compile time; this only enforces the wire shape (including the
/// closed field-type set, which serde rejects on its own).
pub fn tables_from_json(json: &str) -> Result<Vec<TableDefinition>, SchemaError> {
    serde_json::from_str(json).map_err(|e| {
        SchemaError::violation("<config>", "tables", "format", e.to_string())
    })
}

pub fn tables_from_path(path: impl AsRef<Path>) -> Result<Vec<TableDefinition>, SchemaError> {
    let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        SchemaError::violation(
            "<config>",
            "tables",
            "format",
            format!("{}: {}", path.as_ref().display(), e),
        )
    })?;
    tables_from_json(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_table_list() {
        let tables = tables_from_json(
            r#"[
                {
                    "id": 1,
                    "name": "users",
                    "fields": [
                        {"id": 1, "name": "email", "type": "email", "required": true},
                        {"id": 2, "name": "tenant_id", "type": "integer"}
                    ],
                    "unique_constraints": [
                        {"name": "email_per_tenant", "fields": ["email", "tenant_id"]}
                    ]
                }
            ]"#,
        )
        .unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "users");
        assert_eq!(tables[0].unique_constraints[0].fields.len(), 2);
    }

    #[test]
    fn malformed_json_is_a_schema_error() {
        let err = tables_from_json("[{").unwrap_err();
        assert_eq!(err.rule(), "format");
    }
}
