//! Schema model: immutable table definitions, structural validation,
//! compilation into schema operations, and introspection.

pub mod compiler;
pub mod loader;
pub mod snapshot;
pub mod types;
pub mod validate;

pub use compiler::{compile, ColumnSpec, SchemaOperation};
pub use loader::{tables_from_json, tables_from_path};
pub use snapshot::SchemaSnapshot;
pub use types::{
    FieldDefinition, FieldType, IndexDefinition, PrimaryKey, TableDefinition, UniqueConstraint,
};

use crate::error::SchemaError;
use std::collections::HashMap;

/// The compiled schema model. Built once at startup, read-only afterwards,
/// passed explicitly to the migration runner and the record store.
#[derive(Clone, Debug)]
pub struct Schema {
    tables: Vec<TableDefinition>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    /// Validate and compile the definitions, returning the immutable model
    /// together with the operations the migration runner must apply.
    pub fn compile(tables: Vec<TableDefinition>) -> Result<(Schema, Vec<SchemaOperation>), SchemaError> {
        let ops = compiler::compile(&tables)?;
        let by_name = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Ok((Schema { tables, by_name }, ops))
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    pub fn snapshot(&self) -> SchemaSnapshot {
        SchemaSnapshot::of(&self.tables)
    }
}
