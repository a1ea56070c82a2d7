//! Integration tests for database migrations and connection pooling.
//!
//! Each test gets its own tempdir-backed sqlite file via `fuel_test_utils::TestWorkspace`,
//! so tests are isolated without needing a shared server.

use fuel_db::pool;
use fuel_test_utils::TestWorkspace;

const EXPECTED_TABLES: &[&str] = &["agent_health", "epics", "reviews", "runs", "task_dependencies", "tasks"];

#[tokio::test]
async fn migrations_create_all_tables() {
    let ws = TestWorkspace::new().await;

    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlx_%' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name",
    )
    .fetch_all(&ws.pool)
    .await
    .expect("should list tables");

    let table_names: Vec<&str> = rows.iter().map(|(name,)| name.as_str()).collect();
    assert_eq!(table_names, EXPECTED_TABLES);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let ws = TestWorkspace::new().await;

    // Running migrations again against the same pool should be a no-op.
    pool::run_migrations(&ws.pool, pool::default_migrations_path())
        .await
        .expect("second migration run should succeed (idempotent)");

    for table in EXPECTED_TABLES {
        let query = format!("SELECT COUNT(*) as cnt FROM {table}");
        let row: (i64,) = sqlx::query_as(&query)
            .fetch_one(&ws.pool)
            .await
            .unwrap_or_else(|e| panic!("failed to count {table}: {e}"));
        assert_eq!(row.0, 0, "table {table} should be empty after migrations");
    }
}

#[tokio::test]
async fn table_counts_returns_expected_tables() {
    let ws = TestWorkspace::new().await;

    let counts = pool::table_counts(&ws.pool).await.expect("table_counts should succeed");
    let names: Vec<&str> = counts.iter().map(|(name, _)| name.as_str()).collect();

    assert_eq!(names.len(), EXPECTED_TABLES.len());
    for (_, count) in &counts {
        assert_eq!(*count, 0);
    }
}
