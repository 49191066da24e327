//! The Worker Manager: supervises a pool of `queuectl-agent` OS processes
//! (design doc §4.5). Each worker runs in its own process so a runaway
//! command (or a worker crash) cannot take down the others or the
//! supervising process itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use uuid::Uuid;

use crate::lock::{reap_stale_locks, remove_all_locks};

/// Grace period between SIGTERM and a forced SIGKILL on `stop_all` (§4.5).
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

struct SupervisedWorker {
    worker_id: String,
    child: Child,
}

/// Owns the pool of spawned agent processes and the shared lock directory.
pub struct WorkerManager {
    agent_path: PathBuf,
    db_path: PathBuf,
    lock_dir: PathBuf,
    workers: HashMap<String, SupervisedWorker>,
}

impl WorkerManager {
    pub fn new(agent_path: impl Into<PathBuf>, db_path: impl Into<PathBuf>, lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            agent_path: agent_path.into(),
            db_path: db_path.into(),
            lock_dir: lock_dir.into(),
            workers: HashMap::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.workers.len()
    }

    pub fn worker_ids(&self) -> Vec<String> {
        self.workers.keys().cloned().collect()
    }

    /// Spawn `count` agent processes, reaping any execution locks left
    /// behind by a prior manager instance first — after a restart there is
    /// no in-memory pid table to consult, so every lock's own embedded pid
    /// is the only source of truth (design doc §9 open question).
    pub async fn start(&mut self, count: usize) -> Result<()> {
        std::fs::create_dir_all(&self.lock_dir)
            .with_context(|| format!("creating lock dir {}", self.lock_dir.display()))?;
        let reaped = reap_stale_locks(&self.lock_dir).unwrap_or(0);
        if reaped > 0 {
            tracing::info!(reaped, "reaped stale execution locks on startup");
        }

        for _ in 0..count {
            self.spawn_one().await?;
        }
        Ok(())
    }

    async fn spawn_one(&mut self) -> Result<String> {
        let worker_id = format!("worker-{}", Uuid::new_v4());
        let child = Command::new(&self.agent_path)
            .arg("--worker-id")
            .arg(&worker_id)
            .arg("--db")
            .arg(&self.db_path)
            .arg("--lock-dir")
            .arg(&self.lock_dir)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("spawning agent process for {worker_id}"))?;

        tracing::info!(worker_id = %worker_id, pid = ?child.id(), "spawned worker process");
        self.workers.insert(
            worker_id.clone(),
            SupervisedWorker {
                worker_id: worker_id.clone(),
                child,
            },
        );
        Ok(worker_id)
    }

    /// Poll once for workers that have exited on their own (crash or
    /// external kill) and remove them from the supervised set. Callers
    /// that want self-healing can re-`spawn_one` afterward; QueueCTL's
    /// manager currently just reports the loss (§4.5, §9).
    pub async fn reap_exited(&mut self) -> Vec<String> {
        let mut gone = Vec::new();
        for (worker_id, sup) in self.workers.iter_mut() {
            if let Ok(Some(status)) = sup.child.try_wait() {
                tracing::warn!(worker_id = %worker_id, status = %status, "worker process exited unexpectedly");
                gone.push(worker_id.clone());
            }
        }
        for worker_id in &gone {
            self.workers.remove(worker_id);
        }
        gone
    }

    /// Stop every supervised worker: SIGTERM, wait up to [`SHUTDOWN_GRACE`],
    /// SIGKILL any survivors, then clear the lock directory (§4.5, §5).
    pub async fn stop_all(&mut self) -> Result<()> {
        for sup in self.workers.values() {
            if let Some(pid) = sup.child.id() {
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        let mut pending: Vec<String> = self.workers.keys().cloned().collect();
        while !pending.is_empty() && Instant::now() < deadline {
            pending.retain(|worker_id| {
                let Some(sup) = self.workers.get_mut(worker_id) else {
                    return false;
                };
                !matches!(sup.child.try_wait(), Ok(Some(_)))
            });
            if !pending.is_empty() {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }

        for worker_id in &pending {
            if let Some(sup) = self.workers.get_mut(worker_id) {
                tracing::warn!(worker_id = %worker_id, "worker did not exit in time, force killing");
                let _ = sup.child.start_kill();
                let _ = sup.child.wait().await;
            }
        }

        self.workers.clear();
        remove_all_locks(&self.lock_dir).ok();
        tracing::info!("worker manager stopped all workers");
        Ok(())
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }
}
