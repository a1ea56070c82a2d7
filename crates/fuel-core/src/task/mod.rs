//! Task Store (§4.1): id generation, partial-id resolution, cycle detection, and the
//! lifecycle state machine layered on top of `fuel_db::queries::tasks`.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use fuel_db::models::{Complexity, Size, Task, TaskStatus, TaskType};
use fuel_db::queries::tasks;
use sqlx::SqlitePool;
use thiserror::Error;

/// Minimum query length accepted by [`resolve_id`], not counting a leading `f-` tag (§8
/// boundaries: a prefix of length 2 or less is rejected even when it happens to match a
/// single task, since it would stop disambiguating the moment a second task is created).
const MIN_PREFIX_LEN: usize = 3;

#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("no task matches id or prefix {0:?}")]
    NotFound(String),
    #[error("prefix {prefix:?} matches more than one task: {candidates:?}")]
    Ambiguous { prefix: String, candidates: Vec<String> },
    #[error("dependency would create a cycle: {0}")]
    CyclicDependency(String),
    #[error("task {task} does not depend on {depends_on}")]
    NoSuchDependency { task: String, depends_on: String },
    #[error("cannot move task {id} from {from} to {to}")]
    IllegalTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("priority {0} out of range 0..=4")]
    InvalidPriority(i32),
    #[error("update for task {0:?} touches no fields")]
    EmptyUpdate(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

type Result<T> = std::result::Result<T, TaskStoreError>;

const MAX_PRIORITY: i32 = 4;

fn check_priority(priority: i32) -> Result<()> {
    if (0..=MAX_PRIORITY).contains(&priority) {
        Ok(())
    } else {
        Err(TaskStoreError::InvalidPriority(priority))
    }
}

/// Generates short, collision-checked task ids (`f-xxxxxx`, §9: "hash title + a monotonic
/// counter, truncate to 6 hex chars, retry on collision").
pub fn generate_id(existing: &HashSet<String>, title: &str, attempt: u32) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    title.hash(&mut hasher);
    attempt.hash(&mut hasher);
    let digest = hasher.finish();
    let id = format!("f-{:06x}", digest & 0xffffff);
    if existing.contains(&id) {
        generate_id(existing, title, attempt + 1)
    } else {
        id
    }
}

/// Resolves a full id or unambiguous leading prefix (of the hex body, after the type tag)
/// against the known id set (§4.1: "resolves a prefix of ≥3 characters after the type tag").
/// `all_ids` need not be sorted; this is not performance-critical at the scale a single
/// workspace's task list reaches.
pub fn resolve_id<'a>(all_ids: &'a [String], query: &str) -> Result<&'a str> {
    if let Some(exact) = all_ids.iter().find(|id| id.as_str() == query) {
        return Ok(exact);
    }
    let bare = query.strip_prefix("f-").unwrap_or(query);
    let matches_query = |id: &str| id.strip_prefix("f-").unwrap_or(id).starts_with(bare);
    if bare.len() <= MIN_PREFIX_LEN - 1 {
        return Err(TaskStoreError::Ambiguous {
            prefix: query.to_owned(),
            candidates: all_ids
                .iter()
                .filter(|id| matches_query(id))
                .map(|s| s.to_string())
                .collect(),
        });
    }
    let matches: Vec<&String> = all_ids.iter().filter(|id| matches_query(id)).collect();
    match matches.as_slice() {
        [] => Err(TaskStoreError::NotFound(query.to_owned())),
        [single] => Ok(single.as_str()),
        many => Err(TaskStoreError::Ambiguous {
            prefix: query.to_owned(),
            candidates: many.iter().map(|s| s.to_string()).collect(),
        }),
    }
}

/// Would adding the edge `task_id -> depends_on` create a cycle in the dependency DAG?
/// Walks from `depends_on` along existing `depends_on` edges looking for `task_id`.
pub fn creates_cycle(edges: &[(String, String)], task_id: &str, depends_on: &str) -> bool {
    if task_id == depends_on {
        return true;
    }
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to) in edges {
        adjacency.entry(from.as_str()).or_default().push(to.as_str());
    }

    let mut stack = vec![depends_on];
    let mut seen = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == task_id {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(next) = adjacency.get(node) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

#[allow(clippy::too_many_arguments)]
pub async fn create(
    pool: &SqlitePool,
    title: &str,
    description: Option<&str>,
    task_type: TaskType,
    priority: i32,
    complexity: Complexity,
    size: Option<Size>,
    labels: &[String],
    epic_id: Option<&str>,
) -> Result<Task> {
    check_priority(priority)?;
    let existing: HashSet<String> = tasks::all_task_ids(pool).await?.into_iter().collect();
    let id = generate_id(&existing, title, 0);
    let labels_json = serde_json::to_string(labels).unwrap_or_else(|_| "[]".to_string());
    let task = tasks::insert_task(
        pool,
        &id,
        title,
        description,
        task_type,
        priority,
        complexity,
        size,
        &labels_json,
        epic_id,
        Utc::now(),
    )
    .await?;
    Ok(task)
}

pub async fn find(pool: &SqlitePool, query: &str) -> Result<Task> {
    let all_ids = tasks::all_task_ids(pool).await?;
    let id = resolve_id(&all_ids, query)?.to_owned();
    tasks::get_task(pool, &id)
        .await?
        .ok_or_else(|| TaskStoreError::NotFound(query.to_owned()))
}

pub async fn ready(pool: &SqlitePool) -> Result<Vec<Task>> {
    Ok(tasks::ready(pool).await?)
}

pub async fn blocked(pool: &SqlitePool) -> Result<Vec<Task>> {
    Ok(tasks::blocked(pool).await?)
}

/// In-memory filter for [`all`] (§4.1: "filter by status, type, priority, labels (any-match),
/// size"). Every populated field narrows the result; labels match if **any** supplied label
/// is present on the task.
#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
    pub priority: Option<i32>,
    pub labels: Vec<String>,
    pub size: Option<Size>,
}

pub async fn all(pool: &SqlitePool, filter: &TaskFilter) -> Result<Vec<Task>> {
    let tasks = tasks::list_all(pool).await?;
    Ok(tasks
        .into_iter()
        .filter(|t| filter.status.is_none_or(|s| t.status == s))
        .filter(|t| filter.task_type.is_none_or(|ty| t.task_type == ty))
        .filter(|t| filter.priority.is_none_or(|p| t.priority == p))
        .filter(|t| filter.size.is_none_or(|s| t.size == Some(s)))
        .filter(|t| {
            if filter.labels.is_empty() {
                return true;
            }
            let task_labels: Vec<String> = serde_json::from_str(&t.labels).unwrap_or_default();
            filter.labels.iter().any(|l| task_labels.contains(l))
        })
        .collect())
}

/// Patch for [`update`]. `description: Some(None)` clears the description to null (§8
/// boundaries: `--description ""` clears rather than leaving the field untouched, which is
/// why it is a nested `Option` rather than a plain one).
#[derive(Debug, Default, Clone)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<i32>,
    pub complexity: Option<Complexity>,
    pub size: Option<Size>,
    pub labels: Option<Vec<String>>,
}

impl TaskPatch {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.complexity.is_none()
            && self.size.is_none()
            && self.labels.is_none()
    }
}

/// `update(id, patch) -> Task` (§4.1): atomic, records `updated_at = now()`.
pub async fn update(pool: &SqlitePool, id: &str, patch: &TaskPatch) -> Result<Task> {
    if patch.is_empty() {
        return Err(TaskStoreError::EmptyUpdate(id.to_owned()));
    }
    if let Some(priority) = patch.priority {
        check_priority(priority)?;
    }
    let labels_json = patch
        .labels
        .as_ref()
        .map(|l| serde_json::to_string(l).unwrap_or_else(|_| "[]".to_string()));
    let affected = tasks::update_fields(
        pool,
        id,
        patch.title.as_deref(),
        patch.description.as_ref().map(|d| d.as_deref()),
        patch.priority,
        patch.complexity,
        patch.size,
        labels_json.as_deref(),
        Utc::now(),
    )
    .await?;
    if affected == 0 {
        return Err(TaskStoreError::NotFound(id.to_owned()));
    }
    tasks::get_task(pool, id)
        .await?
        .ok_or_else(|| TaskStoreError::NotFound(id.to_owned()))
}

/// `delete(id)` (§4.1): cascades into other tasks' `blocked_by` sets and this task's own
/// runs/reviews via `ON DELETE CASCADE` (see `fuel_db::queries::tasks::delete_task`).
pub async fn delete(pool: &SqlitePool, id: &str) -> Result<()> {
    let affected = tasks::delete_task(pool, id).await?;
    if affected == 0 {
        return Err(TaskStoreError::NotFound(id.to_owned()));
    }
    Ok(())
}

/// Adds a `task depends_on blocker` edge, rejecting anything that would close a cycle.
pub async fn add_dependency(pool: &SqlitePool, task_id: &str, depends_on: &str) -> Result<()> {
    let edges = tasks::all_dependency_edges(pool).await?;
    if creates_cycle(&edges, task_id, depends_on) {
        return Err(TaskStoreError::CyclicDependency(format!(
            "{task_id} -> {depends_on}"
        )));
    }
    tasks::insert_dependency(pool, task_id, depends_on).await?;
    Ok(())
}

pub async fn remove_dependency(pool: &SqlitePool, task_id: &str, depends_on: &str) -> Result<()> {
    let affected = tasks::remove_dependency(pool, task_id, depends_on).await?;
    if affected == 0 {
        return Err(TaskStoreError::NoSuchDependency {
            task: task_id.to_owned(),
            depends_on: depends_on.to_owned(),
        });
    }
    Ok(())
}

/// `task start`: `open -> in_progress` (§4.1). Optimistically locked; a 0-row result means
/// the task was no longer `open`.
pub async fn start(pool: &SqlitePool, id: &str) -> Result<()> {
    let affected =
        tasks::transition_status(pool, id, TaskStatus::Open, TaskStatus::InProgress, Utc::now())
            .await?;
    if affected == 0 {
        return Err(TaskStoreError::IllegalTransition {
            id: id.to_owned(),
            from: TaskStatus::Open,
            to: TaskStatus::InProgress,
        });
    }
    Ok(())
}

/// `task done`: any status -> closed (§4.1: "any status -> closed, unconditionally").
pub async fn done(
    pool: &SqlitePool,
    id: &str,
    reason: Option<&str>,
    commit_hash: Option<&str>,
) -> Result<()> {
    let affected = tasks::close_task(pool, id, reason, commit_hash, Utc::now()).await?;
    if affected == 0 {
        return Err(TaskStoreError::NotFound(id.to_owned()));
    }
    Ok(())
}

pub async fn reopen(pool: &SqlitePool, id: &str) -> Result<()> {
    let affected = tasks::reopen_task(pool, id, Utc::now()).await?;
    if affected == 0 {
        return Err(TaskStoreError::NotFound(id.to_owned()));
    }
    Ok(())
}

pub async fn retry(pool: &SqlitePool, id: &str) -> Result<()> {
    let affected = tasks::retry_task(pool, id, Utc::now()).await?;
    if affected == 0 {
        return Err(TaskStoreError::IllegalTransition {
            id: id.to_owned(),
            from: TaskStatus::InProgress,
            to: TaskStatus::Open,
        });
    }
    Ok(())
}

pub async fn archive(pool: &SqlitePool, older_than: Option<chrono::DateTime<Utc>>) -> Result<Vec<Task>> {
    Ok(tasks::archive_closed(pool, older_than).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_id_unambiguous_prefix() {
        let ids = vec!["f-a1b2c3".to_string(), "f-bbbbbb".to_string()];
        assert_eq!(resolve_id(&ids, "a1b").unwrap(), "f-a1b2c3");
        // The tail of the id must not match: prefix resolution, not suffix.
        assert!(matches!(resolve_id(&ids, "2c3"), Err(TaskStoreError::NotFound(_))));
    }

    #[test]
    fn resolve_id_ambiguous_prefix_errors() {
        let ids = vec!["f-aaa111".to_string(), "f-aaa222".to_string()];
        let err = resolve_id(&ids, "aaa").unwrap_err();
        assert!(matches!(err, TaskStoreError::Ambiguous { .. }));
    }

    #[test]
    fn resolve_id_no_match_errors() {
        let ids = vec!["f-aaaaaa".to_string()];
        assert!(matches!(
            resolve_id(&ids, "zzz"),
            Err(TaskStoreError::NotFound(_))
        ));
    }

    #[test]
    fn resolve_id_exact_match_wins_over_prefix_ambiguity() {
        let ids = vec!["f-aaaaaa".to_string(), "f-aaaaab".to_string()];
        assert_eq!(resolve_id(&ids, "f-aaaaaa").unwrap(), "f-aaaaaa");
    }

    #[test]
    fn generate_id_avoids_collisions() {
        let mut existing = HashSet::new();
        let first = generate_id(&existing, "Same title", 0);
        existing.insert(first.clone());
        let second = generate_id(&existing, "Same title", 0);
        assert_ne!(first, second);
    }

    #[test]
    fn direct_self_dependency_is_a_cycle() {
        assert!(creates_cycle(&[], "f-a", "f-a"));
    }

    #[test]
    fn transitive_dependency_is_a_cycle() {
        // f-b depends_on f-a already; adding f-a depends_on f-b would close the loop.
        let edges = vec![("f-b".to_string(), "f-a".to_string())];
        assert!(creates_cycle(&edges, "f-a", "f-b"));
    }

    #[test]
    fn unrelated_dependency_is_not_a_cycle() {
        let edges = vec![("f-b".to_string(), "f-a".to_string())];
        assert!(!creates_cycle(&edges, "f-c", "f-a"));
    }

    #[test]
    fn priority_boundaries() {
        assert!(check_priority(0).is_ok());
        assert!(check_priority(4).is_ok());
        assert!(matches!(check_priority(5), Err(TaskStoreError::InvalidPriority(5))));
        assert!(matches!(check_priority(-1), Err(TaskStoreError::InvalidPriority(-1))));
    }

    #[test]
    fn empty_patch_is_empty() {
        assert!(TaskPatch::default().is_empty());
        assert!(!TaskPatch { priority: Some(1), ..Default::default() }.is_empty());
    }
}
