use chrono::Utc;
use uuid::Uuid;

use crate::cronexpr;
use crate::errors::Error;
use crate::queue::{NewTask, Queue};
use crate::schema::{Schedule, Task};
use crate::storage;

const DEFAULT_SCHEDULE_PRIORITY: i64 = 5;
const DEFAULT_SCHEDULE_MAX_ATTEMPTS: i64 = 5;

/// A schedule draft handed to [`Admin::create_schedule`] and
/// [`Admin::update_schedule`].
#[derive(Debug, Clone)]
pub struct NewSchedule {
    /// Operator-facing display name.
    pub name: String,
    /// Standard 5-field cron expression; validated before persisting.
    pub cron_expr: String,
    /// Task type enqueued on each firing.
    pub task_type: String,
    /// Payload template copied into each enqueued task.
    pub payload: Vec<u8>,
    /// Priority for enqueued tasks; `None` or zero means the default.
    pub priority: Option<i64>,
    /// Retry budget for enqueued tasks; `None` or zero means the default.
    pub max_attempts: Option<i64>,
    /// Whether the schedule fires at all.
    pub enabled: bool,
}

/// Narrow read/write facade for out-of-band operators.
///
/// Everything here is a thin projection over the queue engine and the
/// schedule store; no state lives in the facade itself.
#[derive(Clone, Debug)]
pub struct Admin {
    queue: Queue,
}

impl Admin {
    /// Creates a facade over the queue engine.
    pub fn new(queue: Queue) -> Self {
        Self { queue }
    }

    /// Submits a task for execution and returns its id.
    pub async fn submit_task(&self, draft: NewTask) -> Result<String, Error> {
        self.queue.enqueue(draft).await
    }

    /// Fetches a task snapshot by id.
    pub async fn get_task(&self, id: &str) -> Result<Task, Error> {
        self.queue.get(id).await
    }

    /// The most recently created tasks, newest first.
    pub async fn list_recent_tasks(&self, limit: i64) -> Result<Vec<Task>, Error> {
        self.queue.list_recent(limit).await
    }

    /// Cancels a task that has not started running yet.
    pub async fn cancel_task(&self, id: &str) -> Result<(), Error> {
        self.queue.cancel(id).await
    }

    /// Creates a schedule after validating its cron expression and
    /// precomputing the first firing time.
    pub async fn create_schedule(&self, draft: NewSchedule) -> Result<String, Error> {
        if draft.task_type.is_empty() {
            return Err(Error::Validation("task type must not be empty".into()));
        }

        let now = Utc::now();
        let next_run = cronexpr::next_after(&draft.cron_expr, now)?;

        let schedule = Schedule {
            id: format!("sch_{}", Uuid::new_v4()),
            name: draft.name,
            cron_expr: draft.cron_expr,
            task_type: draft.task_type,
            payload: draft.payload,
            priority: or_default(draft.priority, DEFAULT_SCHEDULE_PRIORITY),
            max_attempts: or_default(draft.max_attempts, DEFAULT_SCHEDULE_MAX_ATTEMPTS),
            enabled: draft.enabled,
            last_run: None,
            next_run,
            created_at: now,
            updated_at: now,
        };

        storage::insert_schedule(self.queue.pool(), &schedule).await?;
        Ok(schedule.id)
    }

    /// Fetches a schedule by id.
    pub async fn get_schedule(&self, id: &str) -> Result<Schedule, Error> {
        storage::get_schedule(self.queue.pool(), id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("schedule {id}")))
    }

    /// All schedules, ordered by name.
    pub async fn list_schedules(&self) -> Result<Vec<Schedule>, Error> {
        Ok(storage::list_schedules(self.queue.pool()).await?)
    }

    /// Replaces a schedule's definition.
    ///
    /// The cron expression is re-validated and `next_run` recomputed, so an
    /// updated schedule never keeps a firing time from its old expression.
    pub async fn update_schedule(&self, id: &str, draft: NewSchedule) -> Result<(), Error> {
        if draft.task_type.is_empty() {
            return Err(Error::Validation("task type must not be empty".into()));
        }

        let existing = self.get_schedule(id).await?;
        let now = Utc::now();
        let next_run = cronexpr::next_after(&draft.cron_expr, now)?;

        let schedule = Schedule {
            id: existing.id,
            name: draft.name,
            cron_expr: draft.cron_expr,
            task_type: draft.task_type,
            payload: draft.payload,
            priority: or_default(draft.priority, DEFAULT_SCHEDULE_PRIORITY),
            max_attempts: or_default(draft.max_attempts, DEFAULT_SCHEDULE_MAX_ATTEMPTS),
            enabled: draft.enabled,
            last_run: existing.last_run,
            next_run,
            created_at: existing.created_at,
            updated_at: now,
        };

        storage::update_schedule(self.queue.pool(), &schedule).await?;
        Ok(())
    }

    /// Deletes a schedule.
    pub async fn delete_schedule(&self, id: &str) -> Result<(), Error> {
        if storage::delete_schedule(self.queue.pool(), id).await? == 0 {
            return Err(Error::NotFound(format!("schedule {id}")));
        }
        Ok(())
    }

    /// Task counts per state, for the debug stats endpoint.
    pub async fn task_stats(&self) -> Result<Vec<(String, i64)>, Error> {
        Ok(storage::task_state_counts(self.queue.pool()).await?)
    }
}

fn or_default(value: Option<i64>, default: i64) -> i64 {
    match value {
        Some(v) if v != 0 => v,
        _ => default,
    }
}
