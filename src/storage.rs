use crate::errors::Error;
use crate::schema::{Schedule, Task};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

const TASK_COLUMNS: &str = "id, task_type, payload, priority, state, attempts, max_attempts, \
     next_run_at, visibility_timeout, idempotency_key, created_at, updated_at";

const SCHEDULE_COLUMNS: &str = "id, name, cron_expr, task_type, payload, priority, max_attempts, \
     enabled, last_run, next_run, created_at, updated_at";

/// Applies the database migrations.
///
/// Migrations are additive; running this against an existing database never
/// destroys data.
pub async fn setup_database(pool: &SqlitePool) -> Result<(), Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Inserts a new task row.
///
/// Returns `false` without touching anything when the task's idempotency key
/// is already present; the caller resolves the existing row separately.
pub(crate) async fn insert_task(pool: &SqlitePool, task: &Task) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r"
        INSERT INTO tasks (id, task_type, payload, priority, state, attempts, max_attempts,
                           next_run_at, visibility_timeout, idempotency_key, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'queued', 0, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (idempotency_key) WHERE idempotency_key IS NOT NULL DO NOTHING
        ",
    )
    .bind(&task.id)
    .bind(&task.task_type)
    .bind(&task.payload)
    .bind(task.priority)
    .bind(task.max_attempts)
    .bind(task.next_run_at)
    .bind(task.visibility_timeout)
    .bind(&task.idempotency_key)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Finds the id of the task holding the given idempotency key.
pub(crate) async fn find_task_id_by_idempotency_key(
    pool: &SqlitePool,
    key: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT id FROM tasks WHERE idempotency_key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
}

/// Claims the next ready task: the oldest-created task of the highest
/// priority among those queued and due, atomically flipped to running.
///
/// The conditional update selects and transitions the row in one statement,
/// so concurrent claims never return the same task.
pub(crate) async fn claim_oldest_ready(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        r"
        UPDATE tasks
        SET state = 'running', updated_at = ?1
        WHERE id = (
            SELECT id FROM tasks
            WHERE state = 'queued' AND next_run_at <= ?1
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
        )
        RETURNING {TASK_COLUMNS}
        ",
    ))
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Marks a running task as succeeded.
///
/// Returns the number of rows changed; zero means the task was missing or
/// already terminal, in which case the caller must not append an attempt.
pub(crate) async fn update_task_succeeded(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE tasks
        SET state = 'succeeded', attempts = attempts + 1, updated_at = ?
        WHERE id = ? AND state NOT IN ('succeeded', 'failed', 'canceled')
        ",
    )
    .bind(now)
    .bind(id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

/// Records a soft failure: the attempt counter goes up, and the task either
/// returns to the queue at `next_run_at` or, once the budget is spent,
/// becomes terminally failed. A failed task keeps its previous `next_run_at`.
pub(crate) async fn update_task_retried(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
    next_run_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE tasks
        SET attempts = attempts + 1,
            state = CASE WHEN attempts + 1 >= max_attempts THEN 'failed' ELSE 'queued' END,
            next_run_at = CASE WHEN attempts + 1 >= max_attempts THEN next_run_at ELSE ?1 END,
            updated_at = ?2
        WHERE id = ?3 AND state NOT IN ('succeeded', 'failed', 'canceled')
        ",
    )
    .bind(next_run_at)
    .bind(now)
    .bind(id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

/// Hard-fails a task regardless of its remaining retry budget.
pub(crate) async fn update_task_failed(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE tasks
        SET state = 'failed', attempts = attempts + 1, updated_at = ?
        WHERE id = ? AND state NOT IN ('succeeded', 'failed', 'canceled')
        ",
    )
    .bind(now)
    .bind(id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

/// Appends one row to the append-only attempt log.
pub(crate) async fn insert_attempt(
    tx: &mut Transaction<'_, Sqlite>,
    task_id: &str,
    success: bool,
    error: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO task_attempts (task_id, started_at, finished_at, success, error)
        VALUES (?1, ?2, ?2, ?3, ?4)
        ",
    )
    .bind(task_id)
    .bind(now)
    .bind(success)
    .bind(error)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Re-queues every running task whose lease has expired. The attempt counter
/// is left alone; the interrupted attempt is treated as never having happened.
pub(crate) async fn recover_stale(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE tasks
        SET state = 'queued', next_run_at = ?1, updated_at = ?1
        WHERE state = 'running'
          AND strftime('%s', ?1) - strftime('%s', updated_at) > visibility_timeout
        ",
    )
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn get_task(pool: &SqlitePool, id: &str) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_recent_tasks(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Cancels a task that has not started running yet.
pub(crate) async fn cancel_task(
    pool: &SqlitePool,
    id: &str,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("UPDATE tasks SET state = 'canceled', updated_at = ? WHERE id = ? AND state = 'queued'")
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;

    Ok(result.rows_affected())
}

/// Task counts per state, for the debug stats endpoint.
pub(crate) async fn task_state_counts(
    pool: &SqlitePool,
) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (String, i64)>(
        "SELECT state, COUNT(*) FROM tasks GROUP BY state ORDER BY state",
    )
    .fetch_all(pool)
    .await
}

pub(crate) async fn insert_schedule(
    pool: &SqlitePool,
    schedule: &Schedule,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO schedules (id, name, cron_expr, task_type, payload, priority, max_attempts,
                               enabled, last_run, next_run, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&schedule.id)
    .bind(&schedule.name)
    .bind(&schedule.cron_expr)
    .bind(&schedule.task_type)
    .bind(&schedule.payload)
    .bind(schedule.priority)
    .bind(schedule.max_attempts)
    .bind(schedule.enabled)
    .bind(schedule.last_run)
    .bind(schedule.next_run)
    .bind(schedule.created_at)
    .bind(schedule.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn get_schedule(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<Schedule>, sqlx::Error> {
    sqlx::query_as::<_, Schedule>(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_schedules(pool: &SqlitePool) -> Result<Vec<Schedule>, sqlx::Error> {
    sqlx::query_as::<_, Schedule>(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY name"
    ))
    .fetch_all(pool)
    .await
}

pub(crate) async fn update_schedule(
    pool: &SqlitePool,
    schedule: &Schedule,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE schedules
        SET name = ?, cron_expr = ?, task_type = ?, payload = ?, priority = ?,
            max_attempts = ?, enabled = ?, next_run = ?, updated_at = ?
        WHERE id = ?
        ",
    )
    .bind(&schedule.name)
    .bind(&schedule.cron_expr)
    .bind(&schedule.task_type)
    .bind(&schedule.payload)
    .bind(schedule.priority)
    .bind(schedule.max_attempts)
    .bind(schedule.enabled)
    .bind(schedule.next_run)
    .bind(schedule.updated_at)
    .bind(&schedule.id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn delete_schedule(pool: &SqlitePool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Enabled schedules that are due at `now`, oldest `next_run` first.
pub(crate) async fn due_schedules(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<Vec<Schedule>, sqlx::Error> {
    sqlx::query_as::<_, Schedule>(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE enabled = 1 AND next_run <= ? ORDER BY next_run"
    ))
    .bind(now)
    .fetch_all(pool)
    .await
}

/// Advances a schedule's bookkeeping after a firing.
pub(crate) async fn update_schedule_run(
    pool: &SqlitePool,
    id: &str,
    last_run: DateTime<Utc>,
    next_run: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE schedules SET last_run = ?, next_run = ?, updated_at = ? WHERE id = ?")
        .bind(last_run)
        .bind(next_run)
        .bind(last_run)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}
