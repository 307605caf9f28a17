//! Record and schema routes. Handlers resolve the table by path segment.

use crate::handlers::{
    bulk_create, bulk_delete, bulk_update, create_record, delete_record, get_table, list_records,
    list_tables, read_record, update_record,
};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};
use tower_http::limit::RequestBodyLimitLayer;

const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

pub fn table_routes(state: AppState) -> Router {
    Router::new()
        .route("/tables", get(list_tables))
        .route("/tables/:table", get(get_table))
        .route(
            "/tables/:table/records",
            get(list_records)
                .post(create_record)
                .patch(bulk_update)
                .delete(bulk_delete),
        )
        .route("/tables/:table/records/bulk", post(bulk_create))
        .route(
            "/tables/:table/records/:id",
            get(read_record).patch(update_record).delete(delete_record),
        )
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .with_state(state)
}
