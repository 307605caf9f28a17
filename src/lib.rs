//! Tablekit: configuration-driven table engine over PostgreSQL.
//!
//! Declarative table definitions are validated and compiled into schema
//! operations, applied idempotently at startup, and served through a
//! constrained record repository.

pub mod error;
pub mod handlers;
pub mod migration;
pub mod repo;
pub mod response;
pub mod routes;
pub mod schema;
pub mod sql;
pub mod state;

pub use error::{EngineError, SchemaError};
pub use migration::apply;
pub use repo::RecordStore;
pub use routes::table_routes;
pub use schema::{compile, tables_from_json, tables_from_path, Schema, SchemaOperation, TableDefinition};
pub use state::AppState;
