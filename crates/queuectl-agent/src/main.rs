//! `queuectl-agent` — the worker process entry point. Spawned by the
//! Worker Manager as a child OS process (design doc §4.5); runs exactly
//! one `Worker` main loop until it receives SIGTERM/SIGINT.
//!
//! Usage: `queuectl-agent --worker-id <id> --db <path> --lock-dir <path>`

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use queuectl_core::Queue;
use queuectl_store_sqlite::SqliteStore;
use queuectl_worker::Worker;

struct Args {
    worker_id: String,
    db: String,
    lock_dir: PathBuf,
}

fn parse_args() -> Result<Args> {
    let mut worker_id = None;
    let mut db = None;
    let mut lock_dir = None;

    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .with_context(|| format!("missing value for {flag}"))?;
        match flag.as_str() {
            "--worker-id" => worker_id = Some(value),
            "--db" => db = Some(value),
            "--lock-dir" => lock_dir = Some(PathBuf::from(value)),
            other => bail!("unrecognized argument: {other}"),
        }
    }

    Ok(Args {
        worker_id: worker_id.context("--worker-id is required")?,
        db: db.context("--db is required")?,
        lock_dir: lock_dir.context("--lock-dir is required")?,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = parse_args()?;
    std::fs::create_dir_all(&args.lock_dir)
        .with_context(|| format!("creating lock dir {}", args.lock_dir.display()))?;

    let store = SqliteStore::connect(&args.db)
        .await
        .with_context(|| format!("connecting to store at {}", args.db))?;
    let queue = Queue::new(Arc::new(store));
    queue.seed_config_defaults().await?;

    let worker = Worker::new(args.worker_id.clone(), queue, args.lock_dir.clone());

    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_signal = Arc::clone(&stop);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received, stopping after the in-flight job");
        stop_for_signal.store(true, Ordering::Relaxed);
    });

    worker.run(stop).await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
