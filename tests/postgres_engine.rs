//! End-to-end engine tests against a live PostgreSQL.
//!
//! Run with a scratch database:
//!   DATABASE_URL=postgres://localhost/tablekit_test cargo test -- --ignored
//!
//! Each test drops and re-migrates its own tables, so tests are independent
//! and re-runnable.

use serde_json::{json, Map, Value};
use sqlx::PgPool;
use tablekit::{EngineError, RecordStore, Schema};

// =============================================================================
// Helpers
// =============================================================================

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/tablekit_test".into());
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to test database")
}

async fn fresh_schema(pool: &PgPool, tables_json: &str) -> Schema {
    let tables = tablekit::tables_from_json(tables_json).unwrap();
    for t in &tables {
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", t.name))
            .execute(pool)
            .await
            .unwrap();
    }
    let (schema, ops) = Schema::compile(tables).unwrap();
    tablekit::apply(pool, &ops).await.unwrap();
    schema
}

fn obj(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => panic!("expected object"),
    }
}

// =============================================================================
// Scenario A: multi-field unique constraint
// =============================================================================

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn scenario_a_unique_constraint_conflicts() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "scn_a_users",
            "fields": [
                {"id": 1, "name": "email", "type": "email", "required": true},
                {"id": 2, "name": "tenant_id", "type": "integer"}
            ],
            "unique_constraints": [
                {"name": "email_per_tenant", "fields": ["email", "tenant_id"]}
            ]
        }]"#,
    )
    .await;
    let t = schema.table("scn_a_users").unwrap();

    let payload = obj(json!({"email": "u@x.com", "tenant_id": 1}));
    RecordStore::create(&pool, t, &payload).await.unwrap();

    let err = RecordStore::create(&pool, t, &payload).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {:?}", err);

    let other = obj(json!({"email": "u@x.com", "tenant_id": 2}));
    RecordStore::create(&pool, t, &other).await.unwrap();
}

// =============================================================================
// Scenario B: auto-increment identity
// =============================================================================

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn scenario_b_auto_increment_starts_at_one_and_increases() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "scn_b_products",
            "fields": [{"id": 1, "name": "sku", "type": "text"}]
        }]"#,
    )
    .await;
    let t = schema.table("scn_b_products").unwrap();

    let first = RecordStore::create(&pool, t, &obj(json!({"sku": "a"}))).await.unwrap();
    let second = RecordStore::create(&pool, t, &obj(json!({"sku": "b"}))).await.unwrap();
    assert_eq!(first["id"], json!(1));
    assert_eq!(second["id"], json!(2));
}

// =============================================================================
// Scenario C: composite primary key
// =============================================================================

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn scenario_c_composite_identity_conflicts() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "scn_c_user_roles",
            "fields": [
                {"id": 1, "name": "tenant_id", "type": "integer"},
                {"id": 2, "name": "user_id", "type": "integer"}
            ],
            "primary_key": {"strategy": "composite", "fields": ["tenant_id", "user_id"]}
        }]"#,
    )
    .await;
    let t = schema.table("scn_c_user_roles").unwrap();

    RecordStore::create(&pool, t, &obj(json!({"tenant_id": 1, "user_id": 1}))).await.unwrap();
    let err = RecordStore::create(&pool, t, &obj(json!({"tenant_id": 1, "user_id": 1})))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {:?}", err);
    RecordStore::create(&pool, t, &obj(json!({"tenant_id": 1, "user_id": 2}))).await.unwrap();

    let fetched = RecordStore::read(&pool, t, &json!({"tenant_id": 1, "user_id": 2}))
        .await
        .unwrap();
    assert_eq!(fetched["user_id"], json!(2));
}

// =============================================================================
// Scenario D: identity is immutable under update
// =============================================================================

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn scenario_d_update_never_changes_identity() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "scn_d_items",
            "fields": [{"id": 1, "name": "label", "type": "text"}]
        }]"#,
    )
    .await;
    let t = schema.table("scn_d_items").unwrap();

    let created = RecordStore::create(&pool, t, &obj(json!({"label": "before"}))).await.unwrap();
    let id = created["id"].clone();

    let updated = RecordStore::update(&pool, t, &id, &obj(json!({"id": 999, "label": "after"})))
        .await
        .unwrap();
    assert_eq!(updated["id"], id);
    assert_eq!(updated["label"], json!("after"));

    let fetched = RecordStore::read(&pool, t, &id).await.unwrap();
    assert_eq!(fetched, updated);
}

// =============================================================================
// Scenario E: bulk create is all-or-nothing
// =============================================================================

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn scenario_e_bulk_create_rejects_whole_batch() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "scn_e_contacts",
            "fields": [{"id": 1, "name": "email", "type": "email", "required": true}]
        }]"#,
    )
    .await;
    let t = schema.table("scn_e_contacts").unwrap();

    let batch = vec![
        obj(json!({"email": "a@x.com"})),
        obj(json!({})),
        obj(json!({"email": "c@x.com"})),
    ];
    let err = RecordStore::create_many(&pool, t, &batch).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {:?}", err);

    let rows = RecordStore::list(&pool, t, None, None).await.unwrap();
    assert!(rows.is_empty(), "nothing may persist from a rejected batch");
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn bulk_create_rolls_back_on_in_batch_conflict() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "scn_e2_contacts",
            "fields": [{"id": 1, "name": "email", "type": "email", "unique": true}]
        }]"#,
    )
    .await;
    let t = schema.table("scn_e2_contacts").unwrap();

    let batch = vec![
        obj(json!({"email": "dup@x.com"})),
        obj(json!({"email": "dup@x.com"})),
    ];
    let err = RecordStore::create_many(&pool, t, &batch).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {:?}", err);

    let rows = RecordStore::list(&pool, t, None, None).await.unwrap();
    assert!(rows.is_empty());
}

// =============================================================================
// Round-trip and uuid identity
// =============================================================================

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn read_after_create_round_trips() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "rt_events",
            "fields": [
                {"id": 1, "name": "title", "type": "text", "required": true},
                {"id": 2, "name": "on_date", "type": "date"},
                {"id": 3, "name": "done", "type": "boolean"}
            ]
        }]"#,
    )
    .await;
    let t = schema.table("rt_events").unwrap();

    let created = RecordStore::create(
        &pool,
        t,
        &obj(json!({"title": "kickoff", "on_date": "2024-06-01", "done": false})),
    )
    .await
    .unwrap();
    let fetched = RecordStore::read(&pool, t, &created["id"]).await.unwrap();
    assert_eq!(created, fetched);
    assert_eq!(fetched["on_date"], json!("2024-06-01"));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn uuid_identity_is_assigned_per_insert() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "rt_sessions",
            "fields": [
                {"id": 1, "name": "token", "type": "text"},
                {"id": 2, "name": "label", "type": "text"}
            ],
            "primary_key": {"strategy": "uuid", "field": "token"}
        }]"#,
    )
    .await;
    let t = schema.table("rt_sessions").unwrap();

    let a = RecordStore::create(&pool, t, &obj(json!({"label": "one"}))).await.unwrap();
    let b = RecordStore::create(&pool, t, &obj(json!({"label": "two"}))).await.unwrap();
    assert_ne!(a["token"], b["token"]);

    let fetched = RecordStore::read(&pool, t, &a["token"]).await.unwrap();
    assert_eq!(fetched["label"], json!("one"));
}

// =============================================================================
// Migration idempotence and additive behavior
// =============================================================================

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn applying_the_same_definitions_twice_is_a_no_op() {
    let pool = pool().await;
    let json_def = r#"[{
        "id": 1,
        "name": "mig_notes",
        "fields": [
            {"id": 1, "name": "body", "type": "long-text", "required": true},
            {"id": 2, "name": "author", "type": "text", "indexed": true}
        ],
        "unique_constraints": [{"name": "body_author", "fields": ["body", "author"]}]
    }]"#;
    let schema = fresh_schema(&pool, json_def).await;
    let t = schema.table("mig_notes").unwrap();
    RecordStore::create(&pool, t, &obj(json!({"body": "hello", "author": "ann"})))
        .await
        .unwrap();

    // Second boot against the same store.
    let tables = tablekit::tables_from_json(json_def).unwrap();
    let (schema2, ops) = Schema::compile(tables).unwrap();
    tablekit::apply(&pool, &ops).await.unwrap();

    let cols: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.columns
         WHERE table_schema = current_schema() AND table_name = 'mig_notes'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(cols, 3, "id, body, author — and nothing duplicated");

    // Existing data and enforcement both survive.
    let t2 = schema2.table("mig_notes").unwrap();
    let rows = RecordStore::list(&pool, t2, None, None).await.unwrap();
    assert_eq!(rows.len(), 1);
    let err = RecordStore::create(&pool, t2, &obj(json!({"body": "hello", "author": "ann"})))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn new_fields_are_added_to_an_existing_table() {
    let pool = pool().await;
    fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "mig_grow",
            "fields": [{"id": 1, "name": "a", "type": "text"}]
        }]"#,
    )
    .await;

    // Same table, one more field; the runner only adds what is missing.
    let tables = tablekit::tables_from_json(
        r#"[{
            "id": 1,
            "name": "mig_grow",
            "fields": [
                {"id": 1, "name": "a", "type": "text"},
                {"id": 2, "name": "b", "type": "integer"}
            ]
        }]"#,
    )
    .unwrap();
    let (schema, ops) = Schema::compile(tables).unwrap();
    tablekit::apply(&pool, &ops).await.unwrap();

    let t = schema.table("mig_grow").unwrap();
    let row = RecordStore::create(&pool, t, &obj(json!({"a": "x", "b": 7}))).await.unwrap();
    assert_eq!(row["b"], json!(7));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn field_defaults_fill_omitted_values() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "mig_accounts",
            "fields": [
                {"id": 1, "name": "email", "type": "email", "required": true},
                {"id": 2, "name": "plan", "type": "text", "default": "free"},
                {"id": 3, "name": "active", "type": "boolean", "default": true}
            ]
        }]"#,
    )
    .await;
    let t = schema.table("mig_accounts").unwrap();

    let row = RecordStore::create(&pool, t, &obj(json!({"email": "a@x.com"}))).await.unwrap();
    assert_eq!(row["plan"], json!("free"));
    assert_eq!(row["active"], json!(true));

    let row = RecordStore::create(&pool, t, &obj(json!({"email": "b@x.com", "plan": "pro"})))
        .await
        .unwrap();
    assert_eq!(row["plan"], json!("pro"));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn defaults_backfill_columns_added_by_migration() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "mig_backfill",
            "fields": [{"id": 1, "name": "a", "type": "text"}]
        }]"#,
    )
    .await;
    RecordStore::create(&pool, schema.table("mig_backfill").unwrap(), &obj(json!({"a": "x"})))
        .await
        .unwrap();

    let tables = tablekit::tables_from_json(
        r#"[{
            "id": 1,
            "name": "mig_backfill",
            "fields": [
                {"id": 1, "name": "a", "type": "text"},
                {"id": 2, "name": "plan", "type": "text", "default": "free"}
            ]
        }]"#,
    )
    .unwrap();
    let (schema, ops) = Schema::compile(tables).unwrap();
    tablekit::apply(&pool, &ops).await.unwrap();

    let rows = RecordStore::list(&pool, schema.table("mig_backfill").unwrap(), None, None)
        .await
        .unwrap();
    assert_eq!(rows[0]["plan"], json!("free"));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn email_uniqueness_is_case_insensitive() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "rt_members",
            "fields": [{"id": 1, "name": "email", "type": "email", "unique": true}]
        }]"#,
    )
    .await;
    let t = schema.table("rt_members").unwrap();

    let row = RecordStore::create(&pool, t, &obj(json!({"email": "Ada@X.Com"}))).await.unwrap();
    assert_eq!(row["email"], json!("ada@x.com"));

    let err = RecordStore::create(&pool, t, &obj(json!({"email": "ADA@x.com"})))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {:?}", err);
}

// =============================================================================
// Update and delete semantics
// =============================================================================

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn update_excludes_own_values_from_uniqueness() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "upd_users",
            "fields": [
                {"id": 1, "name": "email", "type": "email", "unique": true},
                {"id": 2, "name": "bio", "type": "long-text"}
            ]
        }]"#,
    )
    .await;
    let t = schema.table("upd_users").unwrap();

    let a = RecordStore::create(&pool, t, &obj(json!({"email": "a@x.com"}))).await.unwrap();
    RecordStore::create(&pool, t, &obj(json!({"email": "b@x.com"}))).await.unwrap();

    // Re-asserting its own email is not a conflict.
    RecordStore::update(&pool, t, &a["id"], &obj(json!({"email": "a@x.com", "bio": "hi"})))
        .await
        .unwrap();
    // Taking the other record's email is.
    let err = RecordStore::update(&pool, t, &a["id"], &obj(json!({"email": "b@x.com"})))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {:?}", err);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn update_rejects_records_missing_a_newly_required_field() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "upd_legacy",
            "fields": [{"id": 1, "name": "a", "type": "text"}]
        }]"#,
    )
    .await;
    let row = RecordStore::create(&pool, schema.table("upd_legacy").unwrap(), &obj(json!({"a": "x"})))
        .await
        .unwrap();

    // Same table grows a required field with no default; the stored row
    // holds NULL for it.
    let tables = tablekit::tables_from_json(
        r#"[{
            "id": 1,
            "name": "upd_legacy",
            "fields": [
                {"id": 1, "name": "a", "type": "text"},
                {"id": 2, "name": "b", "type": "text", "required": true}
            ]
        }]"#,
    )
    .unwrap();
    let (schema, ops) = Schema::compile(tables).unwrap();
    tablekit::apply(&pool, &ops).await.unwrap();
    let t = schema.table("upd_legacy").unwrap();

    let err = RecordStore::update(&pool, t, &row["id"], &obj(json!({"a": "y"})))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {:?}", err);

    let updated = RecordStore::update(&pool, t, &row["id"], &obj(json!({"a": "y", "b": "now"})))
        .await
        .unwrap();
    assert_eq!(updated["b"], json!("now"));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn update_many_counts_only_existing_records() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "upd_flags",
            "fields": [{"id": 1, "name": "done", "type": "boolean"}]
        }]"#,
    )
    .await;
    let t = schema.table("upd_flags").unwrap();

    let a = RecordStore::create(&pool, t, &obj(json!({"done": false}))).await.unwrap();
    let b = RecordStore::create(&pool, t, &obj(json!({"done": false}))).await.unwrap();

    let ids = vec![a["id"].clone(), b["id"].clone(), json!(9999)];
    let count = RecordStore::update_many(&pool, t, &ids, &obj(json!({"done": true})))
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn deleting_a_missing_record_is_a_no_op() {
    let pool = pool().await;
    let schema = fresh_schema(
        &pool,
        r#"[{
            "id": 1,
            "name": "del_items",
            "fields": [{"id": 1, "name": "label", "type": "text"}]
        }]"#,
    )
    .await;
    let t = schema.table("del_items").unwrap();

    RecordStore::delete(&pool, t, &json!(42)).await.unwrap();

    let a = RecordStore::create(&pool, t, &obj(json!({"label": "x"}))).await.unwrap();
    let removed = RecordStore::delete_many(&pool, t, &[a["id"].clone(), json!(42)])
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let err = RecordStore::read(&pool, t, &a["id"]).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}
