//! Completion Handler (§4.6): classifies a finished subprocess and drives the task state
//! machine. Classification order and patterns are bit-exact per §6.

use chrono::Utc;
use fuel_db::models::TaskStatus;
use fuel_db::queries::{runs, tasks};
use sqlx::SqlitePool;

use crate::health::HealthTracker;
use crate::process::CompletionRecord;

/// Scanned in this order; first match wins (§4.6, §6 "bit-exact").
const PERMISSION_BLOCK_PATTERNS: &[&str] = &[
    "commands are being rejected",
    "terminal commands are being rejected",
    "please manually complete",
];

const MAX_OUTPUT_TAIL_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    PermissionBlocked,
    Failure,
    Success,
}

pub fn classify(completion: &CompletionRecord) -> Classification {
    let combined = completion.combined_output().to_lowercase();
    if PERMISSION_BLOCK_PATTERNS.iter().any(|p| combined.contains(p)) {
        return Classification::PermissionBlocked;
    }
    if completion.exit_code != 0 {
        return Classification::Failure;
    }
    Classification::Success
}

/// Truncates to at most `max_bytes`, appending "..." if truncated (same idiom used
/// elsewhere in this codebase for bounding agent output before it is persisted).
fn truncate_snippet(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = s[..end].to_owned();
    truncated.push_str("...");
    truncated
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlingOutcome {
    /// A review should be triggered for this task.
    TriggerReview,
    /// The task was auto-closed (review disabled or unavailable).
    AutoClosed,
    /// The task was left `in_progress`/`consumed` (failure) or reopened behind a new
    /// human-needed task (permission-blocked).
    NoReviewNeeded,
}

/// Adds the `auto-closed` label (§4.6: "add label `auto-closed`, close the task...") ahead
/// of the status write, deduping against a task that already carries it.
pub(crate) async fn add_auto_closed_label(pool: &SqlitePool, task_id: &str, now: chrono::DateTime<Utc>) -> anyhow::Result<()> {
    let Some(task) = tasks::get_task(pool, task_id).await? else {
        return Ok(());
    };
    let mut labels: Vec<String> = serde_json::from_str(&task.labels).unwrap_or_default();
    if !labels.iter().any(|l| l == "auto-closed") {
        labels.push("auto-closed".to_string());
        let labels_json = serde_json::to_string(&labels).unwrap_or_else(|_| "[]".into());
        tasks::update_fields(pool, task_id, None, None, None, None, None, Some(&labels_json), now).await?;
    }
    Ok(())
}

/// Processes one completion, mutating the Task Store per §4.6, and reports whether the
/// Review Manager should be engaged next.
pub async fn handle(
    pool: &SqlitePool,
    health: &mut HealthTracker,
    run_id: &str,
    task_id: &str,
    completion: &CompletionRecord,
    review_enabled: bool,
) -> anyhow::Result<HandlingOutcome> {
    let now = Utc::now();
    let tail = truncate_snippet(&completion.combined_output(), MAX_OUTPUT_TAIL_BYTES);

    runs::complete_run(pool, run_id, completion.exit_code, &tail, now).await?;

    match classify(completion) {
        Classification::PermissionBlocked => {
            health.record_failure(&completion.agent, now);

            let existing = tasks::all_task_ids(pool).await?.into_iter().collect::<std::collections::HashSet<_>>();
            let human_task_id = crate::task::generate_id(
                &existing,
                &format!("Configure agent permissions for {}", completion.agent),
                0,
            );
            let labels = serde_json::to_string(&["needs-human"]).unwrap_or_else(|_| "[]".into());
            tasks::insert_task(
                pool,
                &human_task_id,
                &format!("Configure agent permissions for {}", completion.agent),
                Some(&format!(
                    "Agent {} was blocked from running commands:\n\n{tail}",
                    completion.agent
                )),
                fuel_db::models::TaskType::Task,
                1,
                fuel_db::models::Complexity::Simple,
                None,
                &labels,
                None,
                now,
            )
            .await?;
            tasks::insert_dependency(pool, task_id, &human_task_id).await?;
            tasks::reopen_task(pool, task_id, now).await?;

            Ok(HandlingOutcome::NoReviewNeeded)
        }
        Classification::Failure => {
            health.record_failure(&completion.agent, now);
            tasks::mark_consumed(pool, task_id, completion.exit_code, &tail, now).await?;
            Ok(HandlingOutcome::NoReviewNeeded)
        }
        Classification::Success => {
            health.record_success(&completion.agent);

            let task = tasks::get_task(pool, task_id).await?;
            let still_in_progress = matches!(task.map(|t| t.status), Some(TaskStatus::InProgress));
            if !still_in_progress {
                // The agent called `done` itself; nothing further to do.
                return Ok(HandlingOutcome::NoReviewNeeded);
            }

            if review_enabled {
                tasks::transition_status(pool, task_id, TaskStatus::InProgress, TaskStatus::Review, now).await?;
                Ok(HandlingOutcome::TriggerReview)
            } else {
                add_auto_closed_label(pool, task_id, now).await?;
                tasks::close_task(
                    pool,
                    task_id,
                    Some("Auto-completed by consume (agent exit 0)"),
                    None,
                    now,
                )
                .await?;
                Ok(HandlingOutcome::AutoClosed)
            }
        }
    }
}
