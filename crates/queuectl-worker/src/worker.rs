//! The Worker main loop (design doc §4.4): claim, lock, execute, record.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use queuectl_core::{
    backoff_delay_seconds, next_promotion_backoff, EventType, JobState, Queue, Result, StateUpdate,
    KEY_BACKOFF_BASE,
};

use crate::exec::run_command;
use crate::lock::ExecutionLock;

/// Idle ticks shorter than this poll at the flat 1s interval; beyond it,
/// the worker switches to the proportional promotion-backoff bands so it
/// does not hammer the store while nothing is due (§4.4 step 1,
/// SPEC_FULL.md §B.1).
const IDLE_BACKOFF_THRESHOLD: StdDuration = StdDuration::from_secs(5);

/// On an unexpected error around a single job, log it and back off before
/// retrying the loop (§7).
const ERROR_BACKOFF: StdDuration = StdDuration::from_secs(5);

pub struct Worker {
    pub worker_id: String,
    queue: Queue,
    lock_dir: PathBuf,
}

impl Worker {
    pub fn new(worker_id: impl Into<String>, queue: Queue, lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            worker_id: worker_id.into(),
            queue,
            lock_dir: lock_dir.into(),
        }
    }

    /// Run until `stop` is set. Checked between jobs only — an in-flight
    /// command is not preempted by a cooperative stop (§5).
    pub async fn run(&self, stop: Arc<AtomicBool>) {
        tracing::info!(worker_id = %self.worker_id, "worker started");
        let mut idle_since: Option<std::time::Instant> = None;

        while !stop.load(Ordering::Relaxed) {
            match self.tick().await {
                Ok(true) => {
                    idle_since = None;
                }
                Ok(false) => {
                    let now_instant = std::time::Instant::now();
                    let since = *idle_since.get_or_insert(now_instant);
                    let elapsed = now_instant.duration_since(since);
                    let sleep_for = if elapsed < IDLE_BACKOFF_THRESHOLD {
                        StdDuration::from_secs(1)
                    } else {
                        match self.nearest_scheduled_run_at().await {
                            Ok(nearest) => next_promotion_backoff(nearest, Utc::now())
                                .to_std()
                                .unwrap_or(StdDuration::from_secs(300)),
                            Err(_) => StdDuration::from_secs(1),
                        }
                    };
                    tokio::time::sleep(sleep_for).await;
                }
                Err(err) => {
                    tracing::error!(worker_id = %self.worker_id, error = %err, "error in worker loop");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
        tracing::info!(worker_id = %self.worker_id, "worker stopped");
    }

    async fn nearest_scheduled_run_at(&self) -> Result<Option<chrono::DateTime<Utc>>> {
        let scheduled = self.queue.list(Some(JobState::Scheduled)).await?;
        Ok(scheduled.into_iter().filter_map(|j| j.run_at).min())
    }

    /// One iteration: claim, lock, execute, record. Returns `Ok(true)` if a
    /// job was (attempted to be) processed, `Ok(false)` if the queue was
    /// idle or the claimed job's lock was already held elsewhere.
    async fn tick(&self) -> Result<bool> {
        let now = Utc::now();
        let Some(job) = self.queue.store().claim_next(now).await? else {
            return Ok(false);
        };

        let lock = match ExecutionLock::acquire(&self.lock_dir, &job.id, &self.worker_id) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                // Another worker already owns this job; relinquish with no
                // state change and retry the loop (§4.4 step 2).
                return Ok(false);
            }
            Err(err) => {
                tracing::warn!(job_id = %job.id, error = %err, "failed to acquire execution lock");
                return Ok(false);
            }
        };

        self.queue
            .store()
            .update_state(
                &job.id,
                JobState::Processing,
                StateUpdate::new()
                    .started_at(Some(now))
                    .worker_id(Some(self.worker_id.clone())),
            )
            .await?;
        self.queue
            .store()
            .log_event(
                &job.id,
                EventType::Started,
                Some(serde_json::json!({
                    "worker_id": self.worker_id,
                    "timeout_seconds": job.timeout_seconds,
                })),
            )
            .await;

        tracing::info!(
            job_id = %job.id,
            worker_id = %self.worker_id,
            command = %job.command,
            timeout_seconds = job.timeout_seconds,
            "processing job"
        );

        let timeout = StdDuration::from_secs(job.timeout_seconds.max(1) as u64);
        let outcome = run_command(&job.command, timeout).await;

        if outcome.success {
            self.queue
                .store()
                .update_state(
                    &job.id,
                    JobState::Completed,
                    StateUpdate::new()
                        .output(Some(outcome.output.clone()))
                        .completed_at(Some(Utc::now()))
                        .execution_time_ms(outcome.execution_time_ms),
                )
                .await?;
            self.queue
                .store()
                .log_event(
                    &job.id,
                    EventType::Completed,
                    Some(serde_json::json!({
                        "execution_time_ms": outcome.execution_time_ms,
                        "output_length": outcome.output.len(),
                    })),
                )
                .await;
            tracing::info!(job_id = %job.id, ms = outcome.execution_time_ms, "job completed");
        } else {
            let error = outcome.error.unwrap_or_else(|| "unknown failure".to_string());
            self.handle_failure(&job, error, outcome.execution_time_ms).await?;
        }

        // Release after recording the outcome, matching §4.4 step 7.
        drop(lock);
        Ok(true)
    }

    async fn handle_failure(
        &self,
        job: &queuectl_core::Job,
        error: String,
        execution_time_ms: i64,
    ) -> Result<()> {
        let new_attempts = job.attempts + 1;

        if new_attempts >= job.max_retries {
            self.queue
                .store()
                .update_state(
                    &job.id,
                    JobState::Dead,
                    StateUpdate::new()
                        .attempts(new_attempts)
                        .error(Some(error.clone()))
                        .completed_at(Some(Utc::now()))
                        .execution_time_ms(execution_time_ms),
                )
                .await?;
            self.queue
                .store()
                .log_event(
                    &job.id,
                    EventType::MovedToDlq,
                    Some(serde_json::json!({
                        "final_attempts": new_attempts,
                        "error": Queue::truncate_error(&error),
                    })),
                )
                .await;
            tracing::warn!(job_id = %job.id, attempts = new_attempts, "job moved to dead letter queue");
        } else {
            let backoff_base = self
                .queue
                .config_get_float(KEY_BACKOFF_BASE, queuectl_core::DEFAULT_BACKOFF_BASE)
                .await?;
            let delay_seconds = backoff_delay_seconds(backoff_base, new_attempts);
            let next_retry_at = Utc::now() + chrono::Duration::seconds(delay_seconds);

            self.queue
                .store()
                .update_state(
                    &job.id,
                    JobState::Failed,
                    StateUpdate::new()
                        .attempts(new_attempts)
                        .next_retry_at(Some(next_retry_at))
                        .error(Some(error.clone()))
                        .execution_time_ms(execution_time_ms),
                )
                .await?;
            self.queue
                .store()
                .log_event(
                    &job.id,
                    EventType::RetryScheduled,
                    Some(serde_json::json!({
                        "attempt": new_attempts,
                        "delay_seconds": delay_seconds,
                        "error": Queue::truncate_error(&error),
                    })),
                )
                .await;
            tracing::info!(
                job_id = %job.id,
                attempt = new_attempts,
                max_retries = job.max_retries,
                delay_seconds,
                "job scheduled for retry"
            );
        }
        Ok(())
    }
}
