//! Shared application state for all routes. The schema is compiled once at
//! startup and read-only afterwards, so no locking is needed.

use crate::schema::Schema;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub schema: Arc<Schema>,
}
