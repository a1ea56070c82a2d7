//! Snapshot Manager (§4.10): aggregates a cross-component view for display and `--json`
//! consumers. Plain aggregator over the other components' own read paths; owns no state.

use chrono::{DateTime, Utc};
use fuel_db::models::{Task, TaskStatus};
use fuel_db::queries::{reviews, tasks};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::health::AgentHealth;
use crate::process::ProcessManager;

const DONE_LIMIT: usize = 20;
const READY_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct InProgressEntry {
    pub task: Task,
    pub pid: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewEntry {
    pub task: Task,
    pub review_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HumanEntry {
    pub task: Task,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub ready: Vec<Task>,
    pub in_progress: Vec<InProgressEntry>,
    pub review: Vec<ReviewEntry>,
    pub blocked: Vec<Task>,
    pub human: Vec<HumanEntry>,
    pub done: Vec<Task>,
    pub health: Vec<AgentHealth>,
    pub instance_id: Uuid,
    pub uptime_seconds: i64,
}

pub async fn build(
    pool: &SqlitePool,
    process_manager: &ProcessManager,
    health: &[AgentHealth],
    instance_id: Uuid,
    started_at: DateTime<Utc>,
) -> anyhow::Result<Snapshot> {
    let mut ready = tasks::ready(pool).await?;
    ready.truncate(READY_LIMIT);

    let blocked = tasks::blocked(pool).await?;
    let all_tasks = tasks::list_all(pool).await?;

    let active_pids: std::collections::HashMap<u32, DateTime<Utc>> = process_manager
        .get_active_processes()
        .into_iter()
        .map(|c| (c.pid, c.started_at))
        .collect();

    let mut in_progress = Vec::new();
    let mut review = Vec::new();
    let mut human = Vec::new();
    let mut done: Vec<Task> = Vec::new();

    for task in all_tasks {
        let labels: Vec<String> = serde_json::from_str(&task.labels).unwrap_or_default();
        if labels.iter().any(|l| l == "needs-human") {
            human.push(HumanEntry {
                task: task.clone(),
                reason: task.reason.clone().unwrap_or_else(|| "blocked on human action".to_string()),
            });
        }

        match task.status {
            TaskStatus::InProgress => {
                let pid = task.consume_pid;
                let started_at = pid
                    .and_then(|p| active_pids.get(&(p as u32)).copied())
                    .or(Some(task.created_at));
                in_progress.push(InProgressEntry { task, pid, started_at });
            }
            TaskStatus::Review => {
                let review_id = reviews::pending_for_task(pool, &task.id).await?.map(|r| r.id);
                review.push(ReviewEntry { task, review_id });
            }
            TaskStatus::Closed => done.push(task),
            _ => {}
        }
    }

    done.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    done.truncate(DONE_LIMIT);

    Ok(Snapshot {
        ready,
        in_progress,
        review,
        blocked,
        human,
        done,
        health: health.to_vec(),
        instance_id,
        uptime_seconds: (Utc::now() - started_at).num_seconds().max(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_never_negative() {
        let started = Utc::now() + chrono::Duration::seconds(5);
        let uptime = (Utc::now() - started).num_seconds().max(0);
        assert_eq!(uptime, 0);
    }
}
