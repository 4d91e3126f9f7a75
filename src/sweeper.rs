use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::queue::Queue;

/// Periodically returns expired-lease tasks to the queue.
///
/// Startup runs one recovery pass before any work is accepted; this sweeper
/// keeps doing the same on an interval so a crashed worker's tasks do not
/// wait for the next process restart.
#[derive(Debug)]
pub struct StaleSweeper {
    queue: Queue,
    every: Duration,
}

impl StaleSweeper {
    /// Creates a sweeper that runs every `every`.
    pub fn new(queue: Queue, every: Duration) -> Self {
        Self { queue, every }
    }

    /// Spawns the sweep loop. It stops when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.every);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => match self.queue.recover_stale(Utc::now()).await {
                    Ok(0) => {}
                    Ok(recovered) => info!(recovered, "Recovered stale running tasks"),
                    Err(error) => error!(%error, "Stale lease sweep failed"),
                },
            }
        }
    }
}
