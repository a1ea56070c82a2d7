//! Epic status derivation (§4.1 glossary: "Epic: a grouping of tasks whose status is
//! derived from its members, plus an explicit review/approve/reject override").

use chrono::Utc;
use fuel_db::models::{Epic, EpicStatus};
use fuel_db::queries::epics;
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EpicError {
    #[error("no epic with id {0:?}")]
    NotFound(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

type Result<T> = std::result::Result<T, EpicError>;

pub async fn create(pool: &SqlitePool, id: &str, title: &str, description: Option<&str>) -> Result<Epic> {
    Ok(epics::insert_epic(pool, id, title, description, Utc::now()).await?)
}

/// Derives an epic's status from its linked tasks' statuses, unless it has already been
/// moved into an explicit reviewer-driven state (`review_pending`, `reviewed`, `approved`,
/// `rejected`), which only an explicit call to [`set_status`] changes.
pub async fn derive_status(pool: &SqlitePool, epic_id: &str) -> Result<EpicStatus> {
    let counts = epics::linked_task_status_counts(pool, epic_id).await?;
    if counts.is_empty() {
        return Ok(EpicStatus::Planning);
    }
    let total: i64 = counts.iter().map(|(_, n)| n).sum();
    let closed: i64 = counts
        .iter()
        .filter(|(status, _)| status == "closed")
        .map(|(_, n)| n)
        .sum();

    if closed == total {
        Ok(EpicStatus::ReviewPending)
    } else {
        // §3: any non-empty set of linked tasks that isn't all-closed is `in_progress`,
        // whether or not any individual task has started.
        Ok(EpicStatus::InProgress)
    }
}

/// Recomputes and persists the derived status. Called after any task transition that might
/// move the owning epic (§4.1: task status changes cascade to epic status).
pub async fn refresh(pool: &SqlitePool, epic_id: &str) -> Result<EpicStatus> {
    let epic = epics::get_epic(pool, epic_id)
        .await?
        .ok_or_else(|| EpicError::NotFound(epic_id.to_owned()))?;

    // An explicit human verdict (reviewed/approved/rejected) is sticky; only the derived
    // planning/in_progress/review_pending states are recomputed automatically.
    if matches!(
        epic.status,
        EpicStatus::Reviewed | EpicStatus::Approved | EpicStatus::Rejected
    ) {
        return Ok(epic.status);
    }

    let derived = derive_status(pool, epic_id).await?;
    epics::set_status(pool, epic_id, derived, Utc::now()).await?;
    Ok(derived)
}

/// Explicit override, for the reviewer-driven states derive_status never produces.
pub async fn set_status(pool: &SqlitePool, epic_id: &str, status: EpicStatus) -> Result<()> {
    let affected = epics::set_status(pool, epic_id, status, Utc::now()).await?;
    if affected == 0 {
        return Err(EpicError::NotFound(epic_id.to_owned()));
    }
    Ok(())
}
