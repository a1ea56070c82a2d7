//! End-to-end coverage of epic status derivation (§3) against a real sqlite database.

use fuel_core::epic;
use fuel_core::task;
use fuel_db::models::{Complexity, EpicStatus, TaskType};
use fuel_test_utils::TestWorkspace;

#[tokio::test]
async fn no_linked_tasks_is_planning() {
    let ws = TestWorkspace::new().await;
    let created = epic::create(&ws.pool, "e-000001", "Empty epic", None).await.unwrap();
    assert_eq!(created.status, EpicStatus::Planning);

    let derived = epic::derive_status(&ws.pool, &created.id).await.unwrap();
    assert_eq!(derived, EpicStatus::Planning);
}

#[tokio::test]
async fn linked_tasks_all_open_is_in_progress_not_planning() {
    let ws = TestWorkspace::new().await;
    let created = epic::create(&ws.pool, "e-000002", "Fresh epic", None).await.unwrap();

    task::create(&ws.pool, "Untouched task", None, TaskType::Task, 2, Complexity::Simple, None, &[], Some(&created.id))
        .await
        .unwrap();

    // No task has started yet, but a non-empty link set that isn't all-closed is
    // `in_progress`, never `planning` (§3).
    let derived = epic::derive_status(&ws.pool, &created.id).await.unwrap();
    assert_eq!(derived, EpicStatus::InProgress);
}

#[tokio::test]
async fn all_linked_tasks_closed_is_review_pending() {
    let ws = TestWorkspace::new().await;
    let created = epic::create(&ws.pool, "e-000003", "Finishing epic", None).await.unwrap();

    let t = task::create(&ws.pool, "Only task", None, TaskType::Task, 2, Complexity::Simple, None, &[], Some(&created.id))
        .await
        .unwrap();
    task::done(&ws.pool, &t.id, Some("done"), None).await.unwrap();

    let derived = epic::derive_status(&ws.pool, &created.id).await.unwrap();
    assert_eq!(derived, EpicStatus::ReviewPending);
}

#[tokio::test]
async fn explicit_approval_is_sticky_across_refresh() {
    let ws = TestWorkspace::new().await;
    let created = epic::create(&ws.pool, "e-000004", "Approved epic", None).await.unwrap();
    let t = task::create(&ws.pool, "Only task", None, TaskType::Task, 2, Complexity::Simple, None, &[], Some(&created.id))
        .await
        .unwrap();
    task::done(&ws.pool, &t.id, Some("done"), None).await.unwrap();

    epic::set_status(&ws.pool, &created.id, EpicStatus::Approved).await.unwrap();
    let refreshed = epic::refresh(&ws.pool, &created.id).await.unwrap();
    assert_eq!(refreshed, EpicStatus::Approved);
}
