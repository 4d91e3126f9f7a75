use crate::handler::TaskHandler;
use crate::queue::Queue;
use crate::registry::HandlerRegistry;
use crate::worker::Worker;
use futures_util::future::join_all;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

const DEFAULT_NUM_WORKERS: usize = 8;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_JITTER: Duration = Duration::from_millis(50);

/// Marker type for a runner with at least one registered handler
#[derive(Debug)]
#[allow(missing_copy_implementations)]
pub struct Configured;
/// Marker type for a runner without registered handlers
#[derive(Debug)]
#[allow(missing_copy_implementations)]
pub struct Unconfigured;

/// The worker pool: a bounded set of concurrent executors polling the queue.
///
/// Built with the builder methods and started with [`Runner::start`]; the
/// typestate parameter ensures a pool cannot start without any handlers.
pub struct Runner<State = Unconfigured> {
    queue: Queue,
    registry: HandlerRegistry,
    num_workers: usize,
    poll_interval: Duration,
    jitter: Duration,
    shutdown_when_queue_empty: bool,
    _state: PhantomData<State>,
}

impl<State> std::fmt::Debug for Runner<State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("registry", &self.registry)
            .field("num_workers", &self.num_workers)
            .field("poll_interval", &self.poll_interval)
            .field("shutdown_when_queue_empty", &self.shutdown_when_queue_empty)
            .finish()
    }
}

impl Runner {
    /// Create a new runner over the given queue.
    pub fn new(queue: Queue) -> Self {
        Self {
            queue,
            registry: HandlerRegistry::new(),
            num_workers: DEFAULT_NUM_WORKERS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            jitter: DEFAULT_JITTER,
            shutdown_when_queue_empty: false,
            _state: PhantomData,
        }
    }
}

impl<State> Runner<State> {
    /// Set the number of concurrent workers.
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Set how often idle workers poll for new tasks.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the maximum random jitter added to poll intervals.
    ///
    /// Jitter helps reduce thundering herd effects when multiple workers
    /// are polling for tasks simultaneously. The actual jitter applied will
    /// be a random value between 0 and the specified duration.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the runner to shut down once no ready tasks remain.
    pub fn shutdown_when_queue_empty(mut self) -> Self {
        self.shutdown_when_queue_empty = true;
        self
    }

    /// Register an executor for a task type.
    pub fn register(
        mut self,
        task_type: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Runner<Configured> {
        self.registry.register(task_type, handler);

        Runner {
            queue: self.queue,
            registry: self.registry,
            num_workers: self.num_workers,
            poll_interval: self.poll_interval,
            jitter: self.jitter,
            shutdown_when_queue_empty: self.shutdown_when_queue_empty,
            _state: PhantomData,
        }
    }
}

impl Runner<Configured> {
    /// Start the worker pool.
    ///
    /// This returns a [`RunHandle`] which can be used to stop the pool and
    /// wait for the workers to shut down.
    pub fn start(&self) -> RunHandle {
        let shutdown = CancellationToken::new();
        let registry = Arc::new(self.registry.clone());

        let mut handles = Vec::new();
        for i in 1..=self.num_workers {
            let name = format!("worker-{i}");
            info!(worker.name = %name, "Starting worker…");

            let worker = Worker {
                queue: self.queue.clone(),
                registry: registry.clone(),
                poll_interval: self.poll_interval,
                jitter: self.jitter,
                shutdown_when_queue_empty: self.shutdown_when_queue_empty,
                shutdown: shutdown.clone(),
            };

            let span = info_span!("worker", worker.name = %name);
            let handle = tokio::spawn(async move { worker.run().instrument(span).await });

            handles.push(handle);
        }

        RunHandle { handles, shutdown }
    }
}

/// Handle to a running worker pool
#[derive(Debug)]
pub struct RunHandle {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl RunHandle {
    /// Ask every worker to stop. In-flight tasks keep running until their
    /// deadline; unacked tasks are reclaimed by the stale sweep.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for all workers to shut down.
    pub async fn wait_for_shutdown(self) {
        join_all(self.handles).await.into_iter().for_each(|result| {
            if let Err(error) = result {
                warn!(%error, "Worker task panicked");
            }
        });
    }
}
