use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Task,
    Bug,
    Feature,
    Chore,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Chore => "chore",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskType {
    type Err = TaskTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "chore" => Ok(Self::Chore),
            other => Err(TaskTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskType`] string.
#[derive(Debug, Clone)]
pub struct TaskTypeParseError(pub String);

impl fmt::Display for TaskTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task type: {:?}", self.0)
    }
}

impl std::error::Error for TaskTypeParseError {}

// ---------------------------------------------------------------------------

/// Complexity of a task; used to pick an agent+model pair (see Config).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Trivial,
    Simple,
    Moderate,
    Complex,
}

impl Default for Complexity {
    fn default() -> Self {
        Self::Simple
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trivial => "trivial",
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        };
        f.write_str(s)
    }
}

impl FromStr for Complexity {
    type Err = ComplexityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trivial" => Ok(Self::Trivial),
            "simple" => Ok(Self::Simple),
            "moderate" => Ok(Self::Moderate),
            "complex" => Ok(Self::Complex),
            other => Err(ComplexityParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Complexity`] string.
#[derive(Debug, Clone)]
pub struct ComplexityParseError(pub String);

impl fmt::Display for ComplexityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid complexity: {:?}", self.0)
    }
}

impl std::error::Error for ComplexityParseError {}

// ---------------------------------------------------------------------------

/// T-shirt size estimate of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Size {
    Xs,
    S,
    M,
    L,
    Xl,
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Xs => "xs",
            Self::S => "s",
            Self::M => "m",
            Self::L => "l",
            Self::Xl => "xl",
        };
        f.write_str(s)
    }
}

impl FromStr for Size {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xs" => Ok(Self::Xs),
            "s" => Ok(Self::S),
            "m" => Ok(Self::M),
            "l" => Ok(Self::L),
            "xl" => Ok(Self::Xl),
            other => Err(SizeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Size`] string.
#[derive(Debug, Clone)]
pub struct SizeParseError(pub String);

impl fmt::Display for SizeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid size: {:?}", self.0)
    }
}

impl std::error::Error for SizeParseError {}

// ---------------------------------------------------------------------------

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Review,
    Closed,
    Someday,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Closed => "closed",
            Self::Someday => "someday",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "closed" => Ok(Self::Closed),
            "someday" => Ok(Self::Someday),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ---------------------------------------------------------------------------

/// Derived status of an epic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EpicStatus {
    Planning,
    InProgress,
    ReviewPending,
    Reviewed,
    Approved,
    Rejected,
}

impl fmt::Display for EpicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planning => "planning",
            Self::InProgress => "in_progress",
            Self::ReviewPending => "review_pending",
            Self::Reviewed => "reviewed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

impl FromStr for EpicStatus {
    type Err = EpicStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planning" => Ok(Self::Planning),
            "in_progress" => Ok(Self::InProgress),
            "review_pending" => Ok(Self::ReviewPending),
            "reviewed" => Ok(Self::Reviewed),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(EpicStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`EpicStatus`] string.
#[derive(Debug, Clone)]
pub struct EpicStatusParseError(pub String);

impl fmt::Display for EpicStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid epic status: {:?}", self.0)
    }
}

impl std::error::Error for EpicStatusParseError {}

// ---------------------------------------------------------------------------

/// Status of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Passed,
    Failed,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for ReviewStatus {
    type Err = ReviewStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "passed" => Ok(Self::Passed),
            "failed" => Ok(Self::Failed),
            other => Err(ReviewStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ReviewStatus`] string.
#[derive(Debug, Clone)]
pub struct ReviewStatusParseError(pub String);

impl fmt::Display for ReviewStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid review status: {:?}", self.0)
    }
}

impl std::error::Error for ReviewStatusParseError {}

// ---------------------------------------------------------------------------

/// Derived health status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Cooldown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Cooldown => "cooldown",
        };
        f.write_str(s)
    }
}

impl FromStr for HealthStatus {
    type Err = HealthStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "cooldown" => Ok(Self::Cooldown),
            other => Err(HealthStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`HealthStatus`] string.
#[derive(Debug, Clone)]
pub struct HealthStatusParseError(pub String);

impl fmt::Display for HealthStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid health status: {:?}", self.0)
    }
}

impl std::error::Error for HealthStatusParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A task -- the unit of work the consume daemon schedules.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub task_type: TaskType,
    pub priority: i32,
    pub complexity: Complexity,
    pub size: Option<Size>,
    /// Stored as a JSON array of strings; see `fuel_db::queries::tasks` for (de)serialization.
    pub labels: String,
    pub status: TaskStatus,
    pub epic_id: Option<String>,
    pub reason: Option<String>,
    pub commit_hash: Option<String>,
    pub consumed: bool,
    pub consumed_at: Option<DateTime<Utc>>,
    pub consumed_exit_code: Option<i32>,
    pub consumed_output: Option<String>,
    pub consume_pid: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An edge in the task dependency DAG: `task_id` is blocked by `depends_on`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskDependency {
    pub task_id: String,
    pub depends_on: String,
}

/// An epic: a grouping of tasks whose status is derived from its members.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Epic {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: EpicStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single spawn of an agent against a task.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Run {
    pub id: String,
    pub task_id: String,
    pub agent: String,
    pub model: Option<String>,
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub output: Option<String>,
    pub cost_usd: Option<f64>,
}

/// A single spawn of a reviewer against a task.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: String,
    pub task_id: String,
    pub agent: String,
    pub status: ReviewStatus,
    /// Stored as a JSON array of strings.
    pub issues: String,
    /// Stored as a JSON array of task ids.
    pub followup_task_ids: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Periodic, best-effort flush of in-memory agent health, for observability only.
/// The live [`crate::health`]-tracking state in `fuel-core` is the authoritative source.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentHealthRow {
    pub agent: String,
    pub spawns: i64,
    pub successes: i64,
    pub failures: i64,
    pub consecutive_failures: i64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub health_status: HealthStatus,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_display_roundtrip() {
        let variants = [TaskType::Task, TaskType::Bug, TaskType::Feature, TaskType::Chore];
        for v in &variants {
            let s = v.to_string();
            let parsed: TaskType = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn task_type_invalid() {
        assert!("nonsense".parse::<TaskType>().is_err());
    }

    #[test]
    fn complexity_display_roundtrip() {
        let variants = [
            Complexity::Trivial,
            Complexity::Simple,
            Complexity::Moderate,
            Complexity::Complex,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: Complexity = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn complexity_default_is_simple() {
        assert_eq!(Complexity::default(), Complexity::Simple);
    }

    #[test]
    fn complexity_invalid() {
        assert!("extreme".parse::<Complexity>().is_err());
    }

    #[test]
    fn size_display_roundtrip() {
        let variants = [Size::Xs, Size::S, Size::M, Size::L, Size::Xl];
        for v in &variants {
            let s = v.to_string();
            let parsed: Size = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn size_invalid() {
        assert!("huge".parse::<Size>().is_err());
    }

    #[test]
    fn task_status_display_roundtrip() {
        let variants = [
            TaskStatus::Open,
            TaskStatus::InProgress,
            TaskStatus::Review,
            TaskStatus::Closed,
            TaskStatus::Someday,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: TaskStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn task_status_invalid() {
        assert!("pending".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn epic_status_display_roundtrip() {
        let variants = [
            EpicStatus::Planning,
            EpicStatus::InProgress,
            EpicStatus::ReviewPending,
            EpicStatus::Reviewed,
            EpicStatus::Approved,
            EpicStatus::Rejected,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: EpicStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn epic_status_invalid() {
        assert!("unknown".parse::<EpicStatus>().is_err());
    }

    #[test]
    fn review_status_display_roundtrip() {
        let variants = [ReviewStatus::Pending, ReviewStatus::Passed, ReviewStatus::Failed];
        for v in &variants {
            let s = v.to_string();
            let parsed: ReviewStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn review_status_invalid() {
        assert!("maybe".parse::<ReviewStatus>().is_err());
    }

    #[test]
    fn health_status_display_roundtrip() {
        let variants = [HealthStatus::Healthy, HealthStatus::Degraded, HealthStatus::Cooldown];
        for v in &variants {
            let s = v.to_string();
            let parsed: HealthStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn health_status_invalid() {
        assert!("sick".parse::<HealthStatus>().is_err());
    }
}
