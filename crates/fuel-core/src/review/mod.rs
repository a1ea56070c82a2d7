//! Review Manager (§4.7): mirrors the Task Spawner for reviewer subprocesses, but parses a
//! verdict out of the completed process's output instead of classifying success/failure.

use chrono::Utc;
use fuel_db::models::ReviewStatus;
use fuel_db::queries::{reviews, tasks};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::ConfigFile;
use crate::process::{CompletionRecord, ProcessManager};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub issues: Vec<String>,
    pub followup_task_ids: Vec<String>,
}

/// Parses a reviewer's combined output for its verdict line. The expected shape is a
/// single JSON object somewhere in the output: `{"passed": bool, "issues": [...],
/// "followup_task_ids": [...]}` -- reviewers are expected to emit this as their last line.
pub fn parse_verdict(output: &str) -> Option<Verdict> {
    for line in output.lines().rev() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(passed) = value.get("passed").and_then(|v| v.as_bool()) {
                let issues = value
                    .get("issues")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
                    .unwrap_or_default();
                let followup_task_ids = value
                    .get("followup_task_ids")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
                    .unwrap_or_default();
                return Some(Verdict { passed, issues, followup_task_ids });
            }
        }
    }
    None
}

/// Spawns the review agent against a completed task (§4.7: "separate concurrency cap from
/// regular agents" -- enforced by the caller using the `review.agent` name as a distinct
/// key into `ProcessManager`'s per-agent counters).
pub async fn trigger_review(
    pool: &SqlitePool,
    process_manager: &mut ProcessManager,
    config: &ConfigFile,
    task_id: &str,
    task_title: &str,
    task_description: Option<&str>,
    cwd: &std::path::Path,
) -> anyhow::Result<Option<(String, Uuid)>> {
    let Some(agent_name) = config.review.agent.clone() else {
        return Ok(None);
    };
    let Some(agent_config) = config.agent_config(&agent_name) else {
        return Ok(None);
    };

    let review_id = format!("r-{:06x}", Uuid::new_v4().as_u128() as u32 & 0xffffff);
    reviews::insert_review(pool, &review_id, task_id, &agent_name, Utc::now()).await?;

    let prompt = format!(
        "Review the following completed task and report a verdict as the final line of \
         output, a JSON object: {{\"passed\": bool, \"issues\": [...], \
         \"followup_task_ids\": [...]}}.\n\nTask: {task_title}\n\n{}",
        task_description.unwrap_or("(no description)")
    );

    let handle = process_manager
        .spawn(&agent_name, &agent_config.command, &agent_config.args, &[], cwd, &prompt)
        .await?;

    Ok(Some((review_id, handle.child_id)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    Passed,
    FailedWithIssues(Vec<String>),
    FallbackAutoClosed,
}

/// Processes one completed reviewer subprocess (§4.7 `pollReviews`).
pub async fn handle_completion(
    pool: &SqlitePool,
    review_id: &str,
    task_id: &str,
    completion: &CompletionRecord,
) -> anyhow::Result<ReviewOutcome> {
    let now = Utc::now();

    if completion.exit_code != 0 {
        // Reviewer subprocess failure: fallback auto-close (§4.7).
        reviews::complete_review(pool, review_id, ReviewStatus::Failed, "[]", "[]", now).await?;
        auto_close_fallback(pool, task_id, now).await?;
        return Ok(ReviewOutcome::FallbackAutoClosed);
    }

    let Some(verdict) = parse_verdict(&completion.combined_output()) else {
        reviews::complete_review(pool, review_id, ReviewStatus::Failed, "[]", "[]", now).await?;
        auto_close_fallback(pool, task_id, now).await?;
        return Ok(ReviewOutcome::FallbackAutoClosed);
    };

    let issues_json = serde_json::to_string(&verdict.issues).unwrap_or_else(|_| "[]".into());
    let followups_json = serde_json::to_string(&verdict.followup_task_ids).unwrap_or_else(|_| "[]".into());

    if verdict.passed {
        reviews::complete_review(pool, review_id, ReviewStatus::Passed, &issues_json, &followups_json, now)
            .await?;
        tasks::close_task(pool, task_id, Some("Review passed"), None, now).await?;
        Ok(ReviewOutcome::Passed)
    } else {
        reviews::complete_review(pool, review_id, ReviewStatus::Failed, &issues_json, &followups_json, now)
            .await?;
        // Task stays in `review`; follow-up tasks (if any) already block it, created by
        // the reviewer itself through the public task interface during its run.
        Ok(ReviewOutcome::FailedWithIssues(verdict.issues))
    }
}

async fn auto_close_fallback(pool: &SqlitePool, task_id: &str, now: chrono::DateTime<Utc>) -> anyhow::Result<()> {
    crate::completion::add_auto_closed_label(pool, task_id, now).await?;
    tasks::close_task(pool, task_id, Some("Auto-completed (review failed to run)"), None, now).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verdict_on_final_line() {
        let output = "some chatter\nmore chatter\n{\"passed\": true, \"issues\": [], \"followup_task_ids\": []}";
        let verdict = parse_verdict(output).unwrap();
        assert!(verdict.passed);
        assert!(verdict.issues.is_empty());
    }

    #[test]
    fn parses_failing_verdict_with_issues() {
        let output = r#"{"passed": false, "issues": ["tests_failing"], "followup_task_ids": ["f-abc123"]}"#;
        let verdict = parse_verdict(output).unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.issues, vec!["tests_failing".to_string()]);
        assert_eq!(verdict.followup_task_ids, vec!["f-abc123".to_string()]);
    }

    #[test]
    fn missing_verdict_returns_none() {
        assert!(parse_verdict("just some regular output, no json here").is_none());
    }

    #[test]
    fn ignores_trailing_blank_lines() {
        let output = "{\"passed\": true}\n\n\n";
        assert!(parse_verdict(output).unwrap().passed);
    }
}
