//! Shared test fixtures for `fuel-db` and `fuel-core`.
//!
//! Fuel's store is a single sqlite file per workspace, not a shared server, so test
//! isolation comes from a fresh [`tempfile::TempDir`] per test rather than from a
//! provisioned container.

use std::path::PathBuf;

use fuel_db::config::DbConfig;
use fuel_db::pool;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// A throwaway `.fuel`-shaped workspace, migrated and ready to use.
///
/// Holds the `TempDir` alive for the lifetime of the fixture; the directory (and the
/// sqlite file inside it) is removed when this value is dropped.
pub struct TestWorkspace {
    _dir: TempDir,
    pub root: PathBuf,
    pub db_path: PathBuf,
    pub pool: SqlitePool,
}

impl TestWorkspace {
    /// Create a new temporary workspace and run all migrations against a fresh database.
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let root = dir.path().to_path_buf();
        let fuel_dir = root.join(".fuel");
        std::fs::create_dir_all(&fuel_dir).expect("failed to create .fuel dir");
        let db_path = fuel_dir.join("agent.db");

        let config = DbConfig::new(&db_path);
        let db_pool = pool::create_pool(&config)
            .await
            .expect("failed to create pool");
        pool::run_migrations(&db_pool, pool::default_migrations_path())
            .await
            .expect("failed to run migrations");

        Self {
            _dir: dir,
            root,
            db_path,
            pool: db_pool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn workspace_is_migrated_and_usable() {
        let ws = TestWorkspace::new().await;
        assert!(ws.db_path.exists());

        let one: (i32,) = sqlx::query_as("SELECT 1")
            .fetch_one(&ws.pool)
            .await
            .expect("simple query should work");
        assert_eq!(one.0, 1);
    }

    #[tokio::test]
    async fn two_workspaces_are_isolated() {
        let a = TestWorkspace::new().await;
        let b = TestWorkspace::new().await;
        assert_ne!(a.root, b.root);
    }
}
