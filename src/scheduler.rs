use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cronexpr;
use crate::errors::Error;
use crate::queue::{NewTask, Queue};
use crate::schema::Schedule;
use crate::storage;

/// The schedule activator: materializes due cron schedules into queued tasks.
///
/// At-least-once per firing window: a missed tick produces a single task per
/// overdue schedule on the next tick, never a backlog of skipped firings.
#[derive(Debug)]
pub struct Scheduler {
    queue: Queue,
    tick_interval: Duration,
}

impl Scheduler {
    /// Creates an activator ticking at `tick_interval`.
    pub fn new(queue: Queue, tick_interval: Duration) -> Self {
        Self {
            queue,
            tick_interval,
        }
    }

    /// Spawns the tick loop. It stops when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        info!(interval = ?self.tick_interval, "Schedule activator started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.process_due(Utc::now()).await,
            }
        }
    }

    /// Runs one activation tick: every enabled schedule with `next_run <=
    /// now` fires exactly once, in ascending `next_run` order.
    ///
    /// A failing schedule is logged and skipped; its siblings still fire.
    pub async fn process_due(&self, now: DateTime<Utc>) {
        let schedules = match storage::due_schedules(self.queue.pool(), now).await {
            Ok(schedules) => schedules,
            Err(error) => {
                error!(%error, "Failed to fetch due schedules");
                return;
            }
        };

        for schedule in schedules {
            if let Err(error) = self.activate(&schedule, now).await {
                error!(%error, schedule.id = %schedule.id, "Failed to activate schedule");
            }
        }
    }

    async fn activate(&self, schedule: &Schedule, now: DateTime<Utc>) -> Result<(), Error> {
        // Parse before enqueueing so a bad expression leaves no orphan task.
        let next_run = cronexpr::next_after(&schedule.cron_expr, now)?;

        let task_id = self
            .queue
            .enqueue(NewTask {
                task_type: schedule.task_type.clone(),
                payload: schedule.payload.clone(),
                priority: Some(schedule.priority),
                max_attempts: Some(schedule.max_attempts),
                ..Default::default()
            })
            .await?;

        storage::update_schedule_run(self.queue.pool(), &schedule.id, now, next_run).await?;

        info!(
            schedule.id = %schedule.id,
            schedule.name = %schedule.name,
            task.id = %task_id,
            next_run = %next_run,
            "Scheduled task enqueued"
        );

        Ok(())
    }
}
