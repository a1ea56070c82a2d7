//! Database query functions for the `epics` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::{Epic, EpicStatus};

pub async fn insert_epic(
    pool: &SqlitePool,
    id: &str,
    title: &str,
    description: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Epic> {
    sqlx::query(
        "INSERT INTO epics (id, title, description, status, created_at, updated_at) \
         VALUES (?, ?, ?, 'planning', ?, ?)",
    )
    .bind(id)
    .bind(title)
    .bind(description)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("failed to insert epic")?;

    get_epic(pool, id)
        .await?
        .context("inserted epic vanished before re-read")
}

pub async fn get_epic(pool: &SqlitePool, id: &str) -> Result<Option<Epic>> {
    sqlx::query_as::<_, Epic>("SELECT * FROM epics WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch epic")
}

/// Linked-task status counts, used by `fuel-core::epic` to derive §3's status.
pub async fn linked_task_status_counts(pool: &SqlitePool, epic_id: &str) -> Result<Vec<(String, i64)>> {
    sqlx::query_as(
        "SELECT status, COUNT(*) FROM tasks WHERE epic_id = ? GROUP BY status",
    )
    .bind(epic_id)
    .fetch_all(pool)
    .await
    .context("failed to count epic task statuses")
}

/// Set the derived (or operator-overridden) status.
pub async fn set_status(pool: &SqlitePool, id: &str, status: EpicStatus, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("UPDATE epics SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update epic status")?;
    Ok(result.rows_affected())
}
