use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use taskmill::executors::{HttpExecutor, ShellExecutor};
use taskmill::{Admin, Config, Queue, Runner, Scheduler, StaleSweeper, api, setup_database};

const STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();

    let options = SqliteConnectOptions::new()
        .filename(&config.db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    // SQLite has a single writer; the pool must not hand out more.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .context("failed to open the task database")?;
    setup_database(&pool).await?;

    let queue = Queue::new(pool);

    // Tasks left running by a previous process must be re-queued before any
    // worker starts leasing.
    let recovered = queue.recover_stale(Utc::now()).await?;
    info!(recovered, "Recovered stale running tasks");

    let shutdown = CancellationToken::new();

    let runner = Runner::new(queue.clone())
        .num_workers(config.num_workers)
        .poll_interval(config.poll_interval)
        .register("shell", Arc::new(ShellExecutor))
        .register("http", Arc::new(HttpExecutor::default()));
    let workers = runner.start();

    let scheduler_handle =
        Scheduler::new(queue.clone(), config.tick_interval).spawn(shutdown.clone());
    let sweeper_handle =
        StaleSweeper::new(queue.clone(), STALE_SWEEP_INTERVAL).spawn(shutdown.clone());

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {:?}", config.bind_addr))?;
    let admin = Admin::new(queue);
    let api_handle = tokio::spawn(api::serve(addr, admin, config.debug, shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for the shutdown signal")?;
    info!("Shutting down…");

    shutdown.cancel();
    workers.shutdown();

    if tokio::time::timeout(SHUTDOWN_GRACE, workers.wait_for_shutdown())
        .await
        .is_err()
    {
        warn!("Workers did not drain in time; unacked tasks will be recovered on restart");
    }

    let _ = scheduler_handle.await;
    let _ = sweeper_handle.await;
    if let Ok(Err(error)) = api_handle.await {
        error!(%error, "Admin API terminated with an error");
    }

    Ok(())
}
