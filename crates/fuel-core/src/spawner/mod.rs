//! Task Spawner (§4.5): `tryLaunch` wires Config, Health Tracker, Process Manager, and the
//! Task Store together for a single ready task.

use chrono::Utc;
use fuel_db::models::TaskStatus;
use fuel_db::queries::{runs, tasks};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::ConfigFile;
use crate::health::HealthTracker;
use crate::process::ProcessManager;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Spawned { run_id: String, child_id: Uuid, agent: String },
    Rejected { reason: String },
}

/// Builds the agent prompt for a task (§4.5: "deterministic given (task, epic?,
/// reality-notes, agent-specific preamble)"). If the task carries an `epic_id`, the epic
/// block is injected verbatim before the per-task block.
pub fn build_prompt(
    task_title: &str,
    task_description: Option<&str>,
    epic_block: Option<&str>,
    reality_notes: Option<&str>,
) -> String {
    let mut sections = Vec::new();
    if let Some(epic) = epic_block {
        sections.push(epic.to_string());
    }
    if let Some(reality) = reality_notes {
        sections.push(reality.to_string());
    }
    sections.push(format!(
        "Task: {task_title}\n\n{}",
        task_description.unwrap_or("(no description)")
    ));
    sections.push("When you are done, run: fuel done".to_string());
    sections.join("\n\n")
}

#[allow(clippy::too_many_arguments)]
pub async fn try_launch(
    pool: &SqlitePool,
    process_manager: &mut ProcessManager,
    health: &HealthTracker,
    config: &ConfigFile,
    task_id: &str,
    task_title: &str,
    task_description: Option<&str>,
    complexity: &str,
    epic_block: Option<&str>,
    reality_notes: Option<&str>,
    cwd: &std::path::Path,
) -> anyhow::Result<LaunchOutcome> {
    // 1. Resolve (agent, model) from complexity, falling back to `primary`.
    let Some((agent, model)) = config.agent_for_complexity(complexity) else {
        return Ok(LaunchOutcome::Rejected { reason: "no_agent_configured".into() });
    };
    let Some(agent_config) = config.agent_config(&agent) else {
        return Ok(LaunchOutcome::Rejected { reason: "no_agent_configured".into() });
    };

    // 2. Health gate.
    if !health.can_spawn(&agent, Utc::now()) {
        return Ok(LaunchOutcome::Rejected { reason: "cooldown".into() });
    }

    // 3. Concurrency cap.
    if process_manager.get_agent_count(&agent) as u32 >= agent_config.max_concurrent() {
        return Ok(LaunchOutcome::Rejected { reason: "at_cap".into() });
    }

    // 4. Build prompt, record a Run, then atomically start the task.
    let prompt = build_prompt(task_title, task_description, epic_block, reality_notes);
    let run_id = format!("run-{:06x}", Uuid::new_v4().as_u128() as u32 & 0xffffff);
    runs::insert_run(pool, &run_id, task_id, &agent, model.as_deref(), None, Utc::now()).await?;

    let started = tasks::transition_status(pool, task_id, TaskStatus::Open, TaskStatus::InProgress, Utc::now())
        .await?;
    if started == 0 {
        return Ok(LaunchOutcome::Rejected { reason: "already_started".into() });
    }

    // 5. Hand off to the Process Manager.
    let handle = process_manager
        .spawn(&agent, &agent_config.command, &agent_config.args, &[], cwd, &prompt)
        .await?;
    tasks::set_consume_pid(pool, task_id, handle.pid as i64).await?;

    Ok(LaunchOutcome::Spawned { run_id, child_id: handle.child_id, agent })
}
