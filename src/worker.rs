use crate::queue::Queue;
use crate::registry::HandlerRegistry;
use crate::util::{try_to_extract_panic_info, with_sentry_transaction};
use anyhow::anyhow;
use chrono::Utc;
use futures_util::FutureExt;
use rand::Rng;
use sentry_core::{Hub, SentryFutureExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, trace, warn};

pub(crate) struct Worker {
    pub(crate) queue: Queue,
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) poll_interval: Duration,
    pub(crate) jitter: Duration,
    pub(crate) shutdown_when_queue_empty: bool,
    pub(crate) shutdown: CancellationToken,
}

impl Worker {
    /// Calculate the sleep duration with random jitter applied.
    fn sleep_duration_with_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.poll_interval;
        }

        let jitter_millis = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let random_jitter = rand::thread_rng().gen_range(0..=jitter_millis);
        self.poll_interval + Duration::from_millis(random_jitter)
    }

    /// Run tasks until shut down, or until the queue is empty if
    /// `shutdown_when_queue_empty` is set.
    #[allow(clippy::cognitive_complexity)]
    pub(crate) async fn run(&self) {
        loop {
            if self.shutdown.is_cancelled() {
                debug!("Shutdown requested. Stopping the worker…");
                break;
            }

            match self.run_next_task().await {
                Ok(Some(_)) => {}
                Ok(None) if self.shutdown_when_queue_empty => {
                    debug!("No ready tasks found. Shutting down the worker…");
                    break;
                }
                Ok(None) => {
                    let sleep_duration = self.sleep_duration_with_jitter();
                    trace!("No ready tasks found. Polling again in {sleep_duration:?}…");
                    if self.sleep_or_shutdown(sleep_duration).await {
                        break;
                    }
                }
                Err(error) => {
                    error!("Failed to run task: {error}");
                    if self.sleep_or_shutdown(self.sleep_duration_with_jitter()).await {
                        break;
                    }
                }
            }
        }
    }

    /// Sleeps for `duration`, returning `true` if shutdown was requested in
    /// the meantime.
    async fn sleep_or_shutdown(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => true,
            _ = sleep(duration) => false,
        }
    }

    /// Lease and run the next ready task, if there is one.
    ///
    /// Returns:
    /// - `Ok(Some(task_id))` if a task was run
    /// - `Ok(None)` if no tasks were ready
    /// - `Err(...)` if there was an error leasing the task
    #[allow(clippy::cognitive_complexity)]
    async fn run_next_task(&self) -> anyhow::Result<Option<String>> {
        trace!("Looking for the next ready task…");

        let Some(lease) = self.queue.lease_next(Utc::now()).await? else {
            return Ok(None);
        };
        let task = lease.task;
        let task_id = task.id.clone();

        let span = info_span!("task", task.id = %task_id, task.task_type = %task.task_type);
        debug!(task.id = %task_id, "Running task…");

        let Some(handler) = self.registry.get(&task.task_type).cloned() else {
            let _enter = span.enter();
            warn!("No handler registered for this task type. Failing the task…");
            if let Err(error) = self.queue.fail(&task_id, "no handler").await {
                warn!(%error, "Failed to ack task; the stale sweep will reclaim it");
            }
            return Ok(Some(task_id));
        };

        // The lease is only valid for the visibility timeout, so execution
        // gets exactly that long before it is treated as failed.
        let deadline = Duration::from_secs(task.visibility_timeout.max(0) as u64);
        let payload = task.payload;

        let future = with_sentry_transaction(&task.task_type, async || {
            AssertUnwindSafe(handler.execute(&payload))
                .catch_unwind()
                .await
                .map_err(|e| try_to_extract_panic_info(&*e))
                // TODO: Replace with flatten() once that stabilizes
                .and_then(std::convert::identity)
        });

        let result = match timeout(
            deadline,
            future.instrument(span.clone()).bind_hub(Hub::current()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "deadline exceeded after {}s",
                task.visibility_timeout
            )),
        };

        let _enter = span.enter();
        match result {
            Ok(()) => {
                debug!("Task succeeded");
                if let Err(error) = self.queue.succeed(&task_id).await {
                    warn!(%error, "Failed to ack task; the stale sweep will reclaim it");
                }
            }
            Err(error) => {
                warn!("Task failed: {error}");
                let delay = backoff(task.attempts + 1);
                if let Err(error) = self
                    .queue
                    .retry(&task_id, &error.to_string(), delay)
                    .await
                {
                    warn!(%error, "Failed to ack task; the stale sweep will reclaim it");
                }
            }
        }

        Ok(Some(task_id))
    }
}

/// Exponential backoff with a one minute cap.
///
/// `attempt` is the 1-indexed ordinal of the attempt that just failed, so the
/// first retry waits 1s, the second 2s, doubling up to the cap.
pub(crate) fn backoff(attempt: i64) -> Duration {
    if attempt <= 0 {
        return Duration::from_secs(1);
    }

    let exp = u32::try_from(attempt - 1).unwrap_or(u32::MAX).min(6);
    Duration::from_secs((1u64 << exp).min(60))
}
