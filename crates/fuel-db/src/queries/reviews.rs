//! Database query functions for the `reviews` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::{Review, ReviewStatus};

pub async fn insert_review(
    pool: &SqlitePool,
    id: &str,
    task_id: &str,
    agent: &str,
    started_at: DateTime<Utc>,
) -> Result<Review> {
    sqlx::query(
        "INSERT INTO reviews (id, task_id, agent, status, started_at) \
         VALUES (?, ?, ?, 'pending', ?)",
    )
    .bind(id)
    .bind(task_id)
    .bind(agent)
    .bind(started_at)
    .execute(pool)
    .await
    .context("failed to insert review")?;

    get_review(pool, id)
        .await?
        .context("inserted review vanished before re-read")
}

pub async fn get_review(pool: &SqlitePool, id: &str) -> Result<Option<Review>> {
    sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch review")
}

pub async fn pending_for_task(pool: &SqlitePool, task_id: &str) -> Result<Option<Review>> {
    sqlx::query_as::<_, Review>(
        "SELECT * FROM reviews WHERE task_id = ? AND status = 'pending' \
         ORDER BY started_at DESC LIMIT 1",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch pending review")
}

pub async fn complete_review(
    pool: &SqlitePool,
    id: &str,
    status: ReviewStatus,
    issues_json: &str,
    followup_task_ids_json: &str,
    completed_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE reviews SET status = ?, issues = ?, followup_task_ids = ?, completed_at = ? \
         WHERE id = ?",
    )
    .bind(status)
    .bind(issues_json)
    .bind(followup_task_ids_json)
    .bind(completed_at)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to complete review")?;
    Ok(result.rows_affected())
}

pub async fn list_for_task(pool: &SqlitePool, task_id: &str) -> Result<Vec<Review>> {
    sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE task_id = ? ORDER BY started_at ASC")
        .bind(task_id)
        .fetch_all(pool)
        .await
        .context("failed to list reviews for task")
}
