use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::Error;
use crate::schema::{Task, TaskState};
use crate::storage;

const DEFAULT_PRIORITY: i64 = 5;
const DEFAULT_MAX_ATTEMPTS: i64 = 5;
const DEFAULT_VISIBILITY_TIMEOUT: i64 = 60;

/// A draft task handed to [`Queue::enqueue`].
///
/// Optional fields left as `None` (or zero) fall back to the engine
/// defaults: priority 5, 5 attempts, a 60 second visibility timeout.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Handler selector. Must be non-empty.
    pub task_type: String,
    /// Opaque payload bytes, possibly empty.
    pub payload: Vec<u8>,
    /// Higher is more urgent.
    pub priority: Option<i64>,
    /// Retry budget.
    pub max_attempts: Option<i64>,
    /// Lease duration in seconds.
    pub visibility_timeout: Option<i64>,
    /// Deduplication key; submissions sharing a key resolve to one task.
    pub idempotency_key: Option<String>,
}

/// A claimed task snapshot plus the deadline its lease is valid until.
#[derive(Debug, Clone)]
pub struct Lease {
    /// Owned snapshot of the task as claimed, with pre-transition `attempts`.
    pub task: Task,
    /// The worker owns the task until this instant.
    pub until: DateTime<Utc>,
}

/// The queue engine: enqueue, lease, ack, and stale-lease recovery over the
/// persistent store.
///
/// Cheap to clone; all clones share the same underlying pool.
#[derive(Clone, Debug)]
pub struct Queue {
    pool: SqlitePool,
}

impl Queue {
    /// Creates an engine over a migrated database pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persists a new task in the `queued` state and returns its id.
    ///
    /// If the draft carries an idempotency key that is already present, the
    /// existing task's id is returned and nothing is written.
    #[instrument(name = "queue.enqueue", skip_all, fields(task.task_type = %draft.task_type))]
    pub async fn enqueue(&self, draft: NewTask) -> Result<String, Error> {
        if draft.task_type.is_empty() {
            return Err(Error::Validation("task type must not be empty".into()));
        }

        let now = Utc::now();
        let task = Task {
            id: format!("tsk_{}", Uuid::new_v4()),
            task_type: draft.task_type,
            payload: draft.payload,
            priority: or_default(draft.priority, DEFAULT_PRIORITY),
            state: TaskState::Queued,
            attempts: 0,
            max_attempts: or_default(draft.max_attempts, DEFAULT_MAX_ATTEMPTS),
            next_run_at: now,
            visibility_timeout: or_default(draft.visibility_timeout, DEFAULT_VISIBILITY_TIMEOUT),
            idempotency_key: draft.idempotency_key,
            created_at: now,
            updated_at: now,
        };

        if storage::insert_task(&self.pool, &task).await? {
            return Ok(task.id);
        }

        // The insert was a no-op, so the idempotency key already belongs to
        // an earlier submission.
        let key = task.idempotency_key.as_deref().unwrap_or_default();
        match storage::find_task_id_by_idempotency_key(&self.pool, key).await? {
            Some(existing) => Ok(existing),
            None => Err(Error::NotFound(format!(
                "task with idempotency key {key:?}"
            ))),
        }
    }

    /// Claims the next ready task, if any.
    ///
    /// Selection is deterministic: highest priority first, oldest creation
    /// time as the tiebreaker. The claimed task transitions to `running` and
    /// its lease runs out `visibility_timeout` seconds after `now`.
    pub async fn lease_next(&self, now: DateTime<Utc>) -> Result<Option<Lease>, Error> {
        let Some(task) = storage::claim_oldest_ready(&self.pool, now).await? else {
            return Ok(None);
        };

        let until = now + chrono::Duration::seconds(task.visibility_timeout);
        Ok(Some(Lease { task, until }))
    }

    /// Acks a task as successfully completed. No-op if the task is already
    /// in a terminal state.
    pub async fn succeed(&self, id: &str) -> Result<(), Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        if storage::update_task_succeeded(&mut tx, id, now).await? > 0 {
            storage::insert_attempt(&mut tx, id, true, None, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Acks a task as softly failed.
    ///
    /// The attempt counter goes up and a failure attempt is logged. The task
    /// returns to the queue after `delay` unless the budget is now spent, in
    /// which case it is terminally failed. No-op on terminal tasks.
    pub async fn retry(&self, id: &str, error: &str, delay: Duration) -> Result<(), Error> {
        let now = Utc::now();
        let next_run_at =
            now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let mut tx = self.pool.begin().await?;
        if storage::update_task_retried(&mut tx, id, next_run_at, now).await? > 0 {
            storage::insert_attempt(&mut tx, id, false, Some(error), now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Acks a task as hard-failed, spending the remaining retry budget.
    /// No-op on terminal tasks.
    pub async fn fail(&self, id: &str, error: &str) -> Result<(), Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        if storage::update_task_failed(&mut tx, id, now).await? > 0 {
            storage::insert_attempt(&mut tx, id, false, Some(error), now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Returns every expired-lease task to the queue and reports how many
    /// were recovered. Interrupted attempts do not count against the budget.
    pub async fn recover_stale(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        Ok(storage::recover_stale(&self.pool, now).await?)
    }

    /// Fetches a task snapshot by id.
    pub async fn get(&self, id: &str) -> Result<Task, Error> {
        storage::get_task(&self.pool, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))
    }

    /// The most recently created tasks, newest first.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<Task>, Error> {
        Ok(storage::list_recent_tasks(&self.pool, limit.clamp(1, 500)).await?)
    }

    /// Cancels a queued task. Running tasks cannot be canceled; terminal
    /// tasks are already settled.
    pub async fn cancel(&self, id: &str) -> Result<(), Error> {
        if storage::cancel_task(&self.pool, id, Utc::now()).await? > 0 {
            return Ok(());
        }

        match storage::get_task(&self.pool, id).await? {
            None => Err(Error::NotFound(format!("task {id}"))),
            Some(task) => Err(Error::Validation(format!(
                "only queued tasks can be canceled; task {id} is {:?}",
                task.state
            ))),
        }
    }
}

fn or_default(value: Option<i64>, default: i64) -> i64 {
    match value {
        Some(v) if v != 0 => v,
        _ => default,
    }
}
