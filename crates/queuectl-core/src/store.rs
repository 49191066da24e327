//! The `Store` trait: durable, atomic, multi-reader/multi-writer
//! persistence of jobs, the event log, and configuration (design doc §4.1).
//!
//! `Queue` (see [`crate::queue`]) is a thin semantic layer over this trait;
//! `Store` implementations own no policy beyond the atomicity and ordering
//! guarantees spelled out per-method below.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::ConfigEntry;
use crate::error::Result;
use crate::job::{EventType, Job, JobEvent, JobState};
use crate::metrics::SystemMetrics;

/// A partial update to a job row. Every field is `Option`; fields left as
/// `None` are left untouched. `next_retry_at`, `output`, `error`,
/// `started_at`, `completed_at`, and `worker_id` additionally nest an
/// `Option` so that a transition can explicitly *clear* a column (`Some(None)`)
/// as opposed to leaving it alone (`None`).
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub attempts: Option<i64>,
    pub next_retry_at: Option<Option<DateTime<Utc>>>,
    pub output: Option<Option<String>>,
    pub error: Option<Option<String>>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub worker_id: Option<Option<String>>,
    pub execution_time_ms: Option<i64>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(mut self, v: i64) -> Self {
        self.attempts = Some(v);
        self
    }

    pub fn next_retry_at(mut self, v: Option<DateTime<Utc>>) -> Self {
        self.next_retry_at = Some(v);
        self
    }

    pub fn output(mut self, v: Option<String>) -> Self {
        self.output = Some(v);
        self
    }

    pub fn error(mut self, v: Option<String>) -> Self {
        self.error = Some(v);
        self
    }

    pub fn started_at(mut self, v: Option<DateTime<Utc>>) -> Self {
        self.started_at = Some(v);
        self
    }

    pub fn completed_at(mut self, v: Option<DateTime<Utc>>) -> Self {
        self.completed_at = Some(v);
        self
    }

    pub fn worker_id(mut self, v: Option<String>) -> Self {
        self.worker_id = Some(v);
        self
    }

    pub fn execution_time_ms(mut self, v: i64) -> Self {
        self.execution_time_ms = Some(v);
        self
    }
}

/// Durable persistence for jobs, the event log, and config. Every write is
/// a transaction; `claim_next` holds a write lock for the duration of
/// promotion + selection so two concurrent callers are serialized and never
/// observe the same "best" candidate twice (design doc §5).
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new row. If `replace` is true and `job.id` already exists,
    /// overwrite all mutable fields and reset execution-cycle fields;
    /// otherwise fail with `AlreadyExists`.
    async fn enqueue(&self, job: Job, replace: bool) -> Result<Job>;

    /// Atomically: promote all `scheduled` rows with `run_at <= now` to
    /// `pending`, then select the single highest-priority eligible row
    /// (`priority DESC, created_at ASC`) and return its snapshot. Does NOT
    /// transition the row to `processing` — that happens under the
    /// execution lock, as a separate `update_state` call (§4.1, §4.4).
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>>;

    /// Conditional write of the given fields plus `state`; always bumps
    /// `updated_at`. Fails with `NotFound` if the row is missing.
    async fn update_state(&self, id: &str, new_state: JobState, update: StateUpdate) -> Result<Job>;

    /// Ordered snapshot (`created_at DESC`), optionally filtered by state.
    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>>;

    /// Reset a `dead` job to `pending`, zeroing `attempts` and clearing
    /// `error`/`next_retry_at`. Fails `NotFound`/`InvalidState`.
    async fn retry_from_dlq(&self, id: &str) -> Result<Job>;

    async fn get(&self, id: &str) -> Result<Option<Job>>;

    async fn delete(&self, id: &str) -> Result<bool>;

    /// Append a `JobEvent`. Best-effort: failures here must never abort the
    /// enclosing job operation, so implementations swallow their own
    /// errors and log them rather than propagate.
    async fn log_event(&self, job_id: &str, event_type: EventType, data: Option<serde_json::Value>);

    /// Read back a job's event log, oldest first. Used by tests and the
    /// dashboard's per-job drill-down.
    async fn list_events(&self, job_id: &str) -> Result<Vec<JobEvent>>;

    async fn system_metrics(&self, window_hours: i64) -> Result<SystemMetrics>;

    async fn config_set(&self, key: &str, value: &str) -> Result<()>;

    async fn config_get(&self, key: &str) -> Result<Option<String>>;

    async fn config_delete(&self, key: &str) -> Result<bool>;

    async fn config_list(&self) -> Result<Vec<ConfigEntry>>;
}
