//! End-to-end coverage of Task Spawner -> Process Manager -> Completion Handler, using fake
//! shell-script agents the same way `process::tests` fakes an LLM CLI.

use std::collections::HashMap;
use std::time::Duration;

use fuel_core::completion::{self, HandlingOutcome};
use fuel_core::config::{AgentConfig, ConfigFile};
use fuel_core::health::HealthTracker;
use fuel_core::process::ProcessManager;
use fuel_core::spawner::{self, LaunchOutcome};
use fuel_core::task;
use fuel_db::models::{Complexity, TaskType};
use fuel_db::queries::tasks;
use fuel_test_utils::TestWorkspace;

fn script(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

fn config_with_agent(command: &std::path::Path, max_concurrent: u32) -> ConfigFile {
    let mut agents = HashMap::new();
    agents.insert(
        "claude".to_string(),
        AgentConfig {
            command: command.to_str().unwrap().to_string(),
            args: vec![],
            max_concurrent: Some(max_concurrent),
            session_resume_flag: None,
        },
    );
    ConfigFile {
        agents,
        complexity: HashMap::new(),
        primary: Some("claude".to_string()),
        review: Default::default(),
        consume: Default::default(),
    }
}

async fn drain_one(pm: &mut ProcessManager) -> fuel_core::process::CompletionRecord {
    for _ in 0..100 {
        let completions = pm.poll().await;
        if let Some(c) = completions.into_iter().next() {
            return c;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("agent never completed");
}

#[tokio::test]
async fn success_without_review_auto_closes_task() {
    let ws = TestWorkspace::new().await;
    let bin = script(&ws.root, "agent.sh", "echo all good; exit 0");
    let config = config_with_agent(&bin, 2);
    let health = HealthTracker::new(3, 300);
    let mut pm = ProcessManager::new();

    let created = task::create(&ws.pool, "Do the thing", None, TaskType::Task, 2, Complexity::Simple, None, &[], None)
        .await
        .unwrap();

    let outcome = spawner::try_launch(
        &ws.pool, &mut pm, &health, &config, &created.id, &created.title, None, "simple", None, None, &ws.root,
    )
    .await
    .unwrap();
    let LaunchOutcome::Spawned { run_id, .. } = outcome else { panic!("expected spawn") };

    let completion = drain_one(&mut pm).await;
    let mut health = health;
    let result = completion::handle(&ws.pool, &mut health, &run_id, &created.id, &completion, false)
        .await
        .unwrap();
    assert_eq!(result, HandlingOutcome::AutoClosed);

    let task = tasks::get_task(&ws.pool, &created.id).await.unwrap().unwrap();
    assert_eq!(task.status, fuel_db::models::TaskStatus::Closed);
    let labels: Vec<String> = serde_json::from_str(&task.labels).unwrap();
    assert!(labels.contains(&"auto-closed".to_string()));
}

#[tokio::test]
async fn success_with_review_enabled_moves_to_review() {
    let ws = TestWorkspace::new().await;
    let bin = script(&ws.root, "agent.sh", "exit 0");
    let config = config_with_agent(&bin, 2);
    let mut health = HealthTracker::new(3, 300);
    let mut pm = ProcessManager::new();

    let created = task::create(&ws.pool, "Reviewed task", None, TaskType::Task, 2, Complexity::Simple, None, &[], None)
        .await
        .unwrap();

    let outcome = spawner::try_launch(
        &ws.pool, &mut pm, &health, &config, &created.id, &created.title, None, "simple", None, None, &ws.root,
    )
    .await
    .unwrap();
    let LaunchOutcome::Spawned { run_id, .. } = outcome else { panic!("expected spawn") };

    let completion = drain_one(&mut pm).await;
    let result = completion::handle(&ws.pool, &mut health, &run_id, &created.id, &completion, true)
        .await
        .unwrap();
    assert_eq!(result, HandlingOutcome::TriggerReview);

    let task = tasks::get_task(&ws.pool, &created.id).await.unwrap().unwrap();
    assert_eq!(task.status, fuel_db::models::TaskStatus::Review);
}

#[tokio::test]
async fn failure_marks_task_consumed_without_closing() {
    let ws = TestWorkspace::new().await;
    let bin = script(&ws.root, "agent.sh", "echo oops >&2; exit 1");
    let config = config_with_agent(&bin, 2);
    let mut health = HealthTracker::new(3, 300);
    let mut pm = ProcessManager::new();

    let created = task::create(&ws.pool, "Failing task", None, TaskType::Task, 2, Complexity::Simple, None, &[], None)
        .await
        .unwrap();

    let outcome = spawner::try_launch(
        &ws.pool, &mut pm, &health, &config, &created.id, &created.title, None, "simple", None, None, &ws.root,
    )
    .await
    .unwrap();
    let LaunchOutcome::Spawned { run_id, .. } = outcome else { panic!("expected spawn") };

    let completion = drain_one(&mut pm).await;
    let result = completion::handle(&ws.pool, &mut health, &run_id, &created.id, &completion, false)
        .await
        .unwrap();
    assert_eq!(result, HandlingOutcome::NoReviewNeeded);

    let task = tasks::get_task(&ws.pool, &created.id).await.unwrap().unwrap();
    assert_eq!(task.status, fuel_db::models::TaskStatus::InProgress);
    assert!(task.consumed);
}

#[tokio::test]
async fn permission_block_creates_human_task_and_reopens_original() {
    let ws = TestWorkspace::new().await;
    let bin = script(&ws.root, "agent.sh", "echo 'terminal commands are being rejected'; exit 1");
    let config = config_with_agent(&bin, 2);
    let mut health = HealthTracker::new(3, 300);
    let mut pm = ProcessManager::new();

    let created = task::create(&ws.pool, "Needs permissions", None, TaskType::Task, 2, Complexity::Simple, None, &[], None)
        .await
        .unwrap();

    let outcome = spawner::try_launch(
        &ws.pool, &mut pm, &health, &config, &created.id, &created.title, None, "simple", None, None, &ws.root,
    )
    .await
    .unwrap();
    let LaunchOutcome::Spawned { run_id, .. } = outcome else { panic!("expected spawn") };

    let completion = drain_one(&mut pm).await;
    let result = completion::handle(&ws.pool, &mut health, &run_id, &created.id, &completion, false)
        .await
        .unwrap();
    assert_eq!(result, HandlingOutcome::NoReviewNeeded);

    let task = tasks::get_task(&ws.pool, &created.id).await.unwrap().unwrap();
    assert_eq!(task.status, fuel_db::models::TaskStatus::Open);

    let all = tasks::list_all(&ws.pool).await.unwrap();
    let human_task = all
        .iter()
        .find(|t| t.title.contains("Configure agent permissions"))
        .expect("expected a human-needed follow-up task");
    let labels: Vec<String> = serde_json::from_str(&human_task.labels).unwrap();
    assert!(labels.contains(&"needs-human".to_string()));

    let deps = tasks::direct_dependencies(&ws.pool, &created.id).await.unwrap();
    assert_eq!(deps, vec![human_task.id.clone()]);
}

#[tokio::test]
async fn concurrency_cap_rejects_second_launch_for_same_agent() {
    let ws = TestWorkspace::new().await;
    let bin = script(&ws.root, "agent.sh", "sleep 5");
    let config = config_with_agent(&bin, 1);
    let health = HealthTracker::new(3, 300);
    let mut pm = ProcessManager::new();

    let first = task::create(&ws.pool, "First", None, TaskType::Task, 2, Complexity::Simple, None, &[], None)
        .await
        .unwrap();
    let second = task::create(&ws.pool, "Second", None, TaskType::Task, 2, Complexity::Simple, None, &[], None)
        .await
        .unwrap();

    let outcome = spawner::try_launch(
        &ws.pool, &mut pm, &health, &config, &first.id, &first.title, None, "simple", None, None, &ws.root,
    )
    .await
    .unwrap();
    assert!(matches!(outcome, LaunchOutcome::Spawned { .. }));

    let outcome = spawner::try_launch(
        &ws.pool, &mut pm, &health, &config, &second.id, &second.title, None, "simple", None, None, &ws.root,
    )
    .await
    .unwrap();
    assert_eq!(outcome, LaunchOutcome::Rejected { reason: "at_cap".to_string() });

    pm.shutdown(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn health_cooldown_blocks_relaunch_after_repeated_failures() {
    let ws = TestWorkspace::new().await;
    let bin = script(&ws.root, "agent.sh", "exit 1");
    let config = config_with_agent(&bin, 5);
    let mut health = HealthTracker::new(1, 300);
    let mut pm = ProcessManager::new();

    let first = task::create(&ws.pool, "First", None, TaskType::Task, 2, Complexity::Simple, None, &[], None)
        .await
        .unwrap();
    let outcome = spawner::try_launch(
        &ws.pool, &mut pm, &health, &config, &first.id, &first.title, None, "simple", None, None, &ws.root,
    )
    .await
    .unwrap();
    let LaunchOutcome::Spawned { run_id, .. } = outcome else { panic!("expected spawn") };
    let completion = drain_one(&mut pm).await;
    completion::handle(&ws.pool, &mut health, &run_id, &first.id, &completion, false)
        .await
        .unwrap();

    let second = task::create(&ws.pool, "Second", None, TaskType::Task, 2, Complexity::Simple, None, &[], None)
        .await
        .unwrap();
    let outcome = spawner::try_launch(
        &ws.pool, &mut pm, &health, &config, &second.id, &second.title, None, "simple", None, None, &ws.root,
    )
    .await
    .unwrap();
    assert_eq!(outcome, LaunchOutcome::Rejected { reason: "cooldown".to_string() });
}
