//! Example server: loads table definitions from a JSON file, compiles and
//! migrates the schema, then serves CRUD over HTTP.
//!
//! TABLES_PATH points at a JSON array of table definitions (default
//! `demos/tables.json`); DATABASE_URL at the target Postgres.

use std::sync::Arc;
use tablekit::{table_routes, AppState, Schema};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tablekit=info".parse()?))
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/tablekit".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let tables_path =
        std::env::var("TABLES_PATH").unwrap_or_else(|_| "demos/tables.json".into());
    let tables = tablekit::tables_from_path(&tables_path)?;
    let (schema, ops) = Schema::compile(tables)?;
    tablekit::apply(&pool, &ops).await?;

    let state = AppState { pool, schema: Arc::new(schema) };
    let app = table_routes(state);

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
