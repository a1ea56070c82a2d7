//! Database query functions for the `runs` table (one row per agent spawn).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::Run;

#[allow(clippy::too_many_arguments)]
pub async fn insert_run(
    pool: &SqlitePool,
    id: &str,
    task_id: &str,
    agent: &str,
    model: Option<&str>,
    session_id: Option<&str>,
    started_at: DateTime<Utc>,
) -> Result<Run> {
    sqlx::query(
        "INSERT INTO runs (id, task_id, agent, model, session_id, started_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(task_id)
    .bind(agent)
    .bind(model)
    .bind(session_id)
    .bind(started_at)
    .execute(pool)
    .await
    .context("failed to insert run")?;

    get_run(pool, id).await?.context("inserted run vanished before re-read")
}

pub async fn get_run(pool: &SqlitePool, id: &str) -> Result<Option<Run>> {
    sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch run")
}

/// The run for a task that hasn't ended yet, if any (§8: "exactly one Run has
/// `ended_at = null` OR the task carries `consumed = true`").
pub async fn open_run_for_task(pool: &SqlitePool, task_id: &str) -> Result<Option<Run>> {
    sqlx::query_as::<_, Run>(
        "SELECT * FROM runs WHERE task_id = ? AND ended_at IS NULL ORDER BY started_at DESC LIMIT 1",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch open run")
}

pub async fn complete_run(
    pool: &SqlitePool,
    id: &str,
    exit_code: i32,
    output_tail: &str,
    ended_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE runs SET exit_code = ?, output = ?, ended_at = ? WHERE id = ?",
    )
    .bind(exit_code)
    .bind(output_tail)
    .bind(ended_at)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to complete run")?;
    Ok(result.rows_affected())
}

pub async fn list_for_task(pool: &SqlitePool, task_id: &str) -> Result<Vec<Run>> {
    sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE task_id = ? ORDER BY started_at ASC")
        .bind(task_id)
        .fetch_all(pool)
        .await
        .context("failed to list runs for task")
}
