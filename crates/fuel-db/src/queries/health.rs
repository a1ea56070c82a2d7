//! Database query functions for the `agent_health` table.
//!
//! This table is a periodic, best-effort flush target only (§4.4: "Health is in-memory;
//! optional periodic flush to the Task Store for observability, but authoritative source
//! is the live tracker"). `fuel-core::health` owns the authoritative in-memory state.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::{AgentHealthRow, HealthStatus};

#[allow(clippy::too_many_arguments)]
pub async fn upsert(
    pool: &SqlitePool,
    agent: &str,
    spawns: i64,
    successes: i64,
    failures: i64,
    consecutive_failures: i64,
    last_failure_at: Option<DateTime<Utc>>,
    health_status: HealthStatus,
    cooldown_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO agent_health \
            (agent, spawns, successes, failures, consecutive_failures, last_failure_at, \
             health_status, cooldown_until, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(agent) DO UPDATE SET \
            spawns = excluded.spawns, \
            successes = excluded.successes, \
            failures = excluded.failures, \
            consecutive_failures = excluded.consecutive_failures, \
            last_failure_at = excluded.last_failure_at, \
            health_status = excluded.health_status, \
            cooldown_until = excluded.cooldown_until, \
            updated_at = excluded.updated_at",
    )
    .bind(agent)
    .bind(spawns)
    .bind(successes)
    .bind(failures)
    .bind(consecutive_failures)
    .bind(last_failure_at)
    .bind(health_status)
    .bind(cooldown_until)
    .bind(now)
    .execute(pool)
    .await
    .context("failed to flush agent health")?;
    Ok(())
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<AgentHealthRow>> {
    sqlx::query_as::<_, AgentHealthRow>("SELECT * FROM agent_health ORDER BY agent ASC")
        .fetch_all(pool)
        .await
        .context("failed to list agent health")
}
