//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Configuration-time violation. Fatal: a schema that fails validation
/// prevents the process from serving traffic at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("table '{table}': {property} violates '{rule}': {detail}")]
    Violation {
        table: String,
        property: String,
        rule: &'static str,
        detail: String,
    },
}

impl SchemaError {
    pub fn violation(
        table: impl Into<String>,
        property: impl Into<String>,
        rule: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        SchemaError::Violation {
            table: table.into(),
            property: property.into(),
            rule,
            detail: detail.into(),
        }
    }

    /// The violated rule, e.g. "pattern" or "minimum items".
    pub fn rule(&self) -> &'static str {
        match self {
            SchemaError::Violation { rule, .. } => rule,
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("validation: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("migration failed for table '{table}': {message}")]
    Migration { table: String, message: String },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl EngineError {
    /// Translate a store-level write error: a unique-index violation
    /// (SQLSTATE 23505) becomes the same `Conflict` the pre-check surfaces,
    /// closing the race window between check and insert.
    pub fn from_write(e: sqlx::Error, table: &str) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some("23505") {
                return EngineError::Conflict(format!(
                    "duplicate value violates uniqueness on table '{}': {}",
                    table,
                    db.message()
                ));
            }
        }
        EngineError::Db(e)
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            EngineError::Schema(_) => (StatusCode::INTERNAL_SERVER_ERROR, "schema_error"),
            EngineError::Migration { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "migration_error"),
            EngineError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            EngineError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EngineError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            EngineError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
