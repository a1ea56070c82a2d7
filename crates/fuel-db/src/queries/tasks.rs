//! Database query functions for the `tasks` and `task_dependencies` tables.
//!
//! This module is intentionally thin: cycle detection, id generation, and prefix
//! resolution are business logic that belongs to `fuel-core::task`; these functions only
//! perform the SQL operations, using optimistic locking for status transitions the way a
//! single-writer loop needs (§5: "last-writer-wins at the row level, but invariants ...
//! are checked inside the transaction").

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::{Complexity, Size, Task, TaskStatus, TaskType};

#[allow(clippy::too_many_arguments)]
pub async fn insert_task(
    pool: &SqlitePool,
    id: &str,
    title: &str,
    description: Option<&str>,
    task_type: TaskType,
    priority: i32,
    complexity: Complexity,
    size: Option<Size>,
    labels_json: &str,
    epic_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Task> {
    sqlx::query(
        "INSERT INTO tasks \
         (id, title, description, task_type, priority, complexity, size, labels, status, \
          epic_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'open', ?, ?, ?)",
    )
    .bind(id)
    .bind(title)
    .bind(description)
    .bind(task_type)
    .bind(priority)
    .bind(complexity)
    .bind(size)
    .bind(labels_json)
    .bind(epic_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("failed to insert task")?;

    get_task(pool, id)
        .await?
        .context("inserted task vanished before re-read")
}

pub async fn get_task(pool: &SqlitePool, id: &str) -> Result<Option<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task")
}

/// All task ids, for the in-memory suffix index (§9: partial ID resolution).
pub async fn all_task_ids(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM tasks")
        .fetch_all(pool)
        .await
        .context("failed to list task ids")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks ORDER BY created_at ASC")
        .fetch_all(pool)
        .await
        .context("failed to list tasks")
}

/// `status = open` AND every blocker is closed, ordered `(priority desc, created_at asc)`.
pub async fn ready(pool: &SqlitePool) -> Result<Vec<Task>> {
    sqlx::query_as::<_, Task>(
        "SELECT t.* FROM tasks t \
         WHERE t.status = 'open' \
           AND NOT EXISTS ( \
               SELECT 1 FROM task_dependencies td \
               JOIN tasks dep ON dep.id = td.depends_on \
               WHERE td.task_id = t.id AND dep.status != 'closed' \
           ) \
         ORDER BY t.priority ASC, t.created_at ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to compute ready tasks")
}

/// `status = open` AND at least one non-closed blocker.
pub async fn blocked(pool: &SqlitePool) -> Result<Vec<Task>> {
    sqlx::query_as::<_, Task>(
        "SELECT DISTINCT t.* FROM tasks t \
         JOIN task_dependencies td ON td.task_id = t.id \
         JOIN tasks dep ON dep.id = td.depends_on \
         WHERE t.status = 'open' AND dep.status != 'closed' \
         ORDER BY t.priority ASC, t.created_at ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to compute blocked tasks")
}

pub async fn update_fields(
    pool: &SqlitePool,
    id: &str,
    title: Option<&str>,
    description: Option<Option<&str>>,
    priority: Option<i32>,
    complexity: Option<Complexity>,
    size: Option<Size>,
    labels_json: Option<&str>,
    now: DateTime<Utc>,
) -> Result<u64> {
    // Coalesce-against-self pattern: only overwrite a column when the caller supplied a
    // value for it. `description` is double-`Option` because "clear to null" (§8
    // boundaries: `--description ""`) must be distinguishable from "leave untouched".
    let result = sqlx::query(
        "UPDATE tasks SET \
            title = COALESCE(?, title), \
            description = CASE WHEN ? THEN ? ELSE description END, \
            priority = COALESCE(?, priority), \
            complexity = COALESCE(?, complexity), \
            size = COALESCE(?, size), \
            labels = COALESCE(?, labels), \
            updated_at = ? \
         WHERE id = ?",
    )
    .bind(title)
    .bind(description.is_some())
    .bind(description.flatten())
    .bind(priority)
    .bind(complexity)
    .bind(size)
    .bind(labels_json)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to update task")?;

    Ok(result.rows_affected())
}

pub async fn delete_task(pool: &SqlitePool, id: &str) -> Result<u64> {
    // ON DELETE CASCADE (migrations/0001_init.sql) removes task_dependencies, runs, and
    // reviews rows referencing this task; other tasks' `blocked_by` edges that pointed at
    // it are removed by the same cascade on `depends_on`.
    let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete task")?;
    Ok(result.rows_affected())
}

pub async fn insert_dependency(pool: &SqlitePool, task_id: &str, depends_on: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO task_dependencies (task_id, depends_on) VALUES (?, ?) \
         ON CONFLICT DO NOTHING",
    )
    .bind(task_id)
    .bind(depends_on)
    .execute(pool)
    .await
    .context("failed to insert task dependency")?;
    Ok(())
}

pub async fn remove_dependency(pool: &SqlitePool, task_id: &str, depends_on: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM task_dependencies WHERE task_id = ? AND depends_on = ?")
        .bind(task_id)
        .bind(depends_on)
        .execute(pool)
        .await
        .context("failed to remove task dependency")?;
    Ok(result.rows_affected())
}

pub async fn direct_dependencies(pool: &SqlitePool, task_id: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT depends_on FROM task_dependencies WHERE task_id = ?")
            .bind(task_id)
            .fetch_all(pool)
            .await
            .context("failed to fetch task dependencies")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// All `(task_id, depends_on)` edges, for in-memory cycle detection in `fuel-core::task`.
pub async fn all_dependency_edges(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    sqlx::query_as("SELECT task_id, depends_on FROM task_dependencies")
        .fetch_all(pool)
        .await
        .context("failed to list dependency edges")
}

/// Atomically transition a task's status. Optimistic locking: the WHERE clause includes
/// `status = from`, so a 0-row result means either the id does not exist or another
/// writer already moved it past `from`; the caller disambiguates with a follow-up read.
pub async fn transition_status(
    pool: &SqlitePool,
    id: &str,
    from: TaskStatus,
    to: TaskStatus,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(to)
        .bind(now)
        .bind(id)
        .bind(from)
        .execute(pool)
        .await
        .context("failed to transition task status")?;
    Ok(result.rows_affected())
}

/// `done`: any status -> closed, unconditionally (no optimistic lock on `from`, per §4.1
/// "any status -> closed").
pub async fn close_task(
    pool: &SqlitePool,
    id: &str,
    reason: Option<&str>,
    commit_hash: Option<&str>,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET status = 'closed', reason = ?, commit_hash = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(reason)
    .bind(commit_hash)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to close task")?;
    Ok(result.rows_affected())
}

/// `reopen`: clears `reason`, `commit_hash`, and all `consumed_*` fields, sets `open`.
pub async fn reopen_task(pool: &SqlitePool, id: &str, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET \
            status = 'open', \
            reason = NULL, \
            commit_hash = NULL, \
            consumed = 0, \
            consumed_at = NULL, \
            consumed_exit_code = NULL, \
            consumed_output = NULL, \
            consume_pid = NULL, \
            updated_at = ? \
         WHERE id = ?",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to reopen task")?;
    Ok(result.rows_affected())
}

/// `retry`: only if `in_progress` AND `consumed = true`; clears `consumed_*`, sets `open`.
pub async fn retry_task(pool: &SqlitePool, id: &str, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET \
            status = 'open', \
            consumed = 0, \
            consumed_at = NULL, \
            consumed_exit_code = NULL, \
            consumed_output = NULL, \
            consume_pid = NULL, \
            updated_at = ? \
         WHERE id = ? AND status = 'in_progress' AND consumed = 1",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to retry task")?;
    Ok(result.rows_affected())
}

/// Mark a task consumed (non-clean exit while it was still `in_progress`).
pub async fn mark_consumed(
    pool: &SqlitePool,
    id: &str,
    exit_code: i32,
    output_tail: &str,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET \
            consumed = 1, \
            consumed_at = ?, \
            consumed_exit_code = ?, \
            consumed_output = ?, \
            updated_at = ? \
         WHERE id = ? AND status = 'in_progress'",
    )
    .bind(now)
    .bind(exit_code)
    .bind(output_tail)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to mark task consumed")?;
    Ok(result.rows_affected())
}

pub async fn set_consume_pid(pool: &SqlitePool, id: &str, pid: i64) -> Result<()> {
    sqlx::query("UPDATE tasks SET consume_pid = ? WHERE id = ?")
        .bind(pid)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to set consume_pid")?;
    Ok(())
}

/// Tasks with `consumed = true` and a non-zero exit code (the `stuck` command, §4.8).
pub async fn stuck(pool: &SqlitePool) -> Result<Vec<Task>> {
    sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE consumed = 1 AND consumed_exit_code IS NOT NULL \
         AND consumed_exit_code != 0 ORDER BY consumed_at ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list stuck tasks")
}

/// Closed tasks whose `updated_at` is older than `older_than`, removed by `archive`.
pub async fn archive_closed(
    pool: &SqlitePool,
    older_than: Option<DateTime<Utc>>,
) -> Result<Vec<Task>> {
    let removed = match older_than {
        Some(cutoff) => {
            sqlx::query_as::<_, Task>(
                "DELETE FROM tasks WHERE status = 'closed' AND updated_at < ? RETURNING *",
            )
            .bind(cutoff)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, Task>("DELETE FROM tasks WHERE status = 'closed' RETURNING *")
                .fetch_all(pool)
                .await
        }
    }
    .context("failed to archive closed tasks")?;
    Ok(removed)
}
