//! Database schema definitions for SQLx.
//!
//! Every value handed out of the store is an owned snapshot; all durable
//! state lives in the database and is only changed through [`crate::Queue`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TaskState {
    /// Waiting to be leased once `next_run_at` has passed.
    Queued,
    /// Leased by a worker; the lease expires `visibility_timeout` seconds
    /// after `updated_at`.
    Running,
    /// Finished successfully. Terminal.
    Succeeded,
    /// Retry budget exhausted or hard-failed. Terminal.
    Failed,
    /// Canceled by an operator before it ran. Terminal.
    Canceled,
}

impl TaskState {
    /// Whether this state absorbs all further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// A durable unit of work.
#[derive(Debug, Clone, FromRow)]
pub struct Task {
    /// Stable opaque identifier (`tsk_` + UUID).
    pub id: String,
    /// Handler selector; dispatch picks the executor registered under this name.
    pub task_type: String,
    /// Opaque payload bytes; the engine never interprets them.
    pub payload: Vec<u8>,
    /// Higher is more urgent.
    pub priority: i64,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Completed execution attempts (success or failure).
    pub attempts: i64,
    /// Retry budget; reaching it on failure forces the `failed` state.
    pub max_attempts: i64,
    /// Earliest wall-clock time at which the task is eligible to run.
    pub next_run_at: DateTime<Utc>,
    /// Seconds a lease remains valid after the task transitions to running.
    pub visibility_timeout: i64,
    /// Caller-chosen key that collapses duplicate submissions.
    pub idempotency_key: Option<String>,
    /// Timestamp when the task was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last state change.
    pub updated_at: DateTime<Utc>,
}

/// A recurring source of tasks driven by a cron expression.
#[derive(Debug, Clone, FromRow)]
pub struct Schedule {
    /// Stable opaque identifier (`sch_` + UUID).
    pub id: String,
    /// Operator-facing display name.
    pub name: String,
    /// Standard 5-field cron expression.
    pub cron_expr: String,
    /// Task type enqueued on each firing.
    pub task_type: String,
    /// Payload template copied into each enqueued task.
    pub payload: Vec<u8>,
    /// Priority applied to enqueued tasks.
    pub priority: i64,
    /// Retry budget applied to enqueued tasks.
    pub max_attempts: i64,
    /// Disabled schedules never produce tasks regardless of `next_run`.
    pub enabled: bool,
    /// Last time the schedule fired, if it ever has.
    pub last_run: Option<DateTime<Utc>>,
    /// Next firing time; always strictly in the future after each firing.
    pub next_run: DateTime<Utc>,
    /// Timestamp when the schedule was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last modification.
    pub updated_at: DateTime<Utc>,
}

/// One recorded execution outcome. Append-only; observability only.
#[derive(Debug, Clone, FromRow)]
pub struct TaskAttempt {
    /// Monotonic row id.
    pub id: i64,
    /// The task this attempt belongs to.
    pub task_id: String,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt finished.
    pub finished_at: DateTime<Utc>,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Failure reason, when the attempt failed.
    pub error: Option<String>,
}
