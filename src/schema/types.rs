//! Declarative table definitions as deserialized from configuration.
//!
//! These are pure data: validation lives in `schema::validate`, compilation
//! in `schema::compiler`. The whole model is loaded once at startup and
//! never mutated afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of field types. Unknown type strings fail deserialization,
/// so a bad type is a configuration error, never a runtime surprise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FieldType {
    Text,
    LongText,
    Email,
    Integer,
    Date,
    Boolean,
    SingleSelect {
        #[serde(default)]
        options: Vec<String>,
    },
    File,
}

impl FieldType {
    /// Configuration-facing name of the type.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::LongText => "long-text",
            FieldType::Email => "email",
            FieldType::Integer => "integer",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
            FieldType::SingleSelect { .. } => "single-select",
            FieldType::File => "file",
        }
    }

    /// Postgres column type for this field type.
    pub fn column_type(&self) -> &'static str {
        match self {
            FieldType::Text | FieldType::LongText | FieldType::Email => "TEXT",
            FieldType::Integer => "BIGINT",
            FieldType::Date => "DATE",
            FieldType::Boolean => "BOOLEAN",
            FieldType::SingleSelect { .. } => "TEXT",
            FieldType::File => "TEXT",
        }
    }

    /// SQL cast suffix for bound parameters, where binding a JSON value as
    /// text would otherwise confuse Postgres (e.g. dates arrive as strings).
    pub fn bind_cast(&self) -> Option<&'static str> {
        match self {
            FieldType::Integer => Some("bigint"),
            FieldType::Date => Some("date"),
            FieldType::Boolean => Some("boolean"),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: u64,
    pub name: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Value assigned when a create payload omits the field. Scalar only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// No two records may share this field's value (single-column uniqueness).
    #[serde(default)]
    pub unique: bool,
    /// Advertise a single-column index for read-path optimization.
    #[serde(default)]
    pub indexed: bool,
}

/// How a record's identity is assigned. Fixed at table creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PrimaryKey {
    /// System-assigned, strictly increasing per table, starting at 1.
    AutoIncrement { field: String },
    /// System-generated opaque unique string per insert.
    Uuid { field: String },
    /// Identity is the tuple of the listed fields' values (at least 2).
    Composite { fields: Vec<String> },
}

impl Default for PrimaryKey {
    fn default() -> Self {
        PrimaryKey::AutoIncrement { field: "id".into() }
    }
}

impl PrimaryKey {
    /// Field names composing the identity, in declaration order.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            PrimaryKey::AutoIncrement { field } | PrimaryKey::Uuid { field } => {
                vec![field.as_str()]
            }
            PrimaryKey::Composite { fields } => fields.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, PrimaryKey::Composite { .. })
    }
}

/// Named rule forbidding duplicate value-tuples across a set of fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: String,
    pub fields: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableDefinition {
    pub id: u64,
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default)]
    pub unique_constraints: Vec<UniqueConstraint>,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    /// Effective primary-key strategy (auto-increment `id` when omitted).
    pub fn primary_key(&self) -> PrimaryKey {
        self.primary_key.clone().unwrap_or_default()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}
