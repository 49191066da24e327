//! `Queue` — the semantic layer over `Store` (design doc §4.2).
//!
//! Centralizes default-field population on enqueue, `run_at` parsing and
//! the `scheduled` vs `pending` decision, JobEvent emission, config
//! validation at the boundary, and the read queries consumed by the CLI /
//! dashboard (§6).

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{self, ConfigEntry, DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES};
use crate::error::{QueueError, Result};
use crate::job::{truncate_for_event, EventType, Job, JobEvent, JobState};
use crate::metrics::SystemMetrics;
use crate::store::Store;
use crate::time::parse_run_at;

/// The default per-execution wall-clock timeout when an enqueue payload
/// does not specify one (design doc §4.2).
pub const DEFAULT_TIMEOUT_SECONDS: i64 = 300;

/// The enqueue payload accepted at the external boundary (design doc §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueuePayload {
    pub command: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub max_retries: Option<i64>,
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
    #[serde(default)]
    pub run_at: Option<String>,
}

/// The semantic layer over a `Store`. Cheap to clone: holds only an `Arc`.
#[derive(Clone)]
pub struct Queue {
    store: Arc<dyn Store>,
}

impl Queue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Validate and default-fill an [`EnqueuePayload`], then insert it.
    ///
    /// `max_retries` defaults from `config.max-retries`; `priority`
    /// defaults to 0; `timeout_seconds` defaults to 300; `attempts` starts
    /// at 0. A `run_at` strictly in the future at resolution time yields
    /// initial state `scheduled`, otherwise `pending` (§4.3).
    pub async fn enqueue(&self, payload: EnqueuePayload, replace: bool) -> Result<Job> {
        if payload.command.trim().is_empty() {
            return Err(QueueError::InvalidPayload("command must not be empty".into()));
        }
        if let Some(p) = payload.priority {
            if p == i32::MIN {
                // Reserve i32::MIN so priority arithmetic never overflows
                // when negated or compared (design doc §9 open question).
                return Err(QueueError::InvalidPayload("priority out of range".into()));
            }
        }
        if let Some(t) = payload.timeout_seconds {
            if t <= 0 {
                return Err(QueueError::InvalidPayload(
                    "timeout_seconds must be > 0".into(),
                ));
            }
        }
        if let Some(m) = payload.max_retries {
            if m < 0 {
                return Err(QueueError::InvalidPayload("max_retries must be >= 0".into()));
            }
        }

        let now = Utc::now();
        let id = payload.id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let run_at = match payload.run_at {
            Some(raw) => Some(parse_run_at(&raw, now)?),
            None => None,
        };
        let state = match run_at {
            Some(at) if at > now => JobState::Scheduled,
            _ => JobState::Pending,
        };

        let max_retries = match payload.max_retries {
            Some(m) => m,
            None => self.config_get_int(config::KEY_MAX_RETRIES, DEFAULT_MAX_RETRIES).await?,
        };

        let job = Job {
            id: id.clone(),
            command: payload.command,
            state,
            attempts: 0,
            max_retries,
            priority: payload.priority.unwrap_or(0),
            timeout_seconds: payload.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
            run_at,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            worker_id: None,
            output: None,
            error: None,
            execution_time_ms: 0,
        };

        let existed = self.store.get(&id).await?.is_some();
        let inserted = self.store.enqueue(job, replace).await?;

        let event_type = if existed { EventType::Replaced } else { EventType::Created };
        self.store
            .log_event(
                &id,
                event_type,
                Some(serde_json::json!({
                    "priority": inserted.priority,
                    "scheduled": inserted.state == JobState::Scheduled,
                })),
            )
            .await;

        Ok(inserted)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Job>> {
        self.store.get(id).await
    }

    pub async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        self.store.list(state).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.store.delete(id).await
    }

    pub async fn events(&self, job_id: &str) -> Result<Vec<JobEvent>> {
        self.store.list_events(job_id).await
    }

    /// Counts by state (the `status` operation, §6).
    pub async fn status(&self) -> Result<std::collections::HashMap<String, i64>> {
        let jobs = self.store.list(None).await?;
        let mut counts = std::collections::HashMap::new();
        for state in [
            JobState::Pending,
            JobState::Scheduled,
            JobState::Processing,
            JobState::Failed,
            JobState::Completed,
            JobState::Dead,
        ] {
            counts.insert(state.as_str().to_string(), 0i64);
        }
        for job in jobs {
            *counts.entry(job.state.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    pub async fn metrics(&self, window_hours: i64) -> Result<SystemMetrics> {
        self.store.system_metrics(window_hours).await
    }

    /// `dlq_list`: jobs filtered to the terminal `dead` state.
    pub async fn dlq_list(&self) -> Result<Vec<Job>> {
        self.store.list(Some(JobState::Dead)).await
    }

    /// `dlq_retry`: move a `dead` job back to `pending`.
    pub async fn dlq_retry(&self, id: &str) -> Result<Job> {
        let job = self.store.retry_from_dlq(id).await?;
        self.store
            .log_event(id, EventType::Created, Some(serde_json::json!({"source": "dlq_retry"})))
            .await;
        Ok(job)
    }

    // ---- Config façade (design doc §4.6) ----

    /// `config_set`: rejects unknown keys / invalid values at this
    /// boundary (the Store itself accepts arbitrary string values).
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        config::validate_value(key, value)?;
        self.store.config_set(key, value).await
    }

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        if !config::is_known_key(key) {
            return Err(QueueError::UnknownKey(key.to_string()));
        }
        self.store.config_get(key).await
    }

    pub async fn config_delete(&self, key: &str) -> Result<bool> {
        self.store.config_delete(key).await
    }

    pub async fn config_list(&self) -> Result<Vec<ConfigEntry>> {
        self.store.config_list().await
    }

    async fn config_get_int(&self, key: &str, default: i64) -> Result<i64> {
        match self.store.config_get(key).await? {
            Some(v) => Ok(v.parse().unwrap_or(default)),
            None => Ok(default),
        }
    }

    pub async fn config_get_float(&self, key: &str, default: f64) -> Result<f64> {
        match self.store.config_get(key).await? {
            Some(v) => Ok(v.parse().unwrap_or(default)),
            None => Ok(default),
        }
    }

    /// Seed the two recognized config keys, idempotently, on first run
    /// (design doc §4.6, §9 B.4).
    pub async fn seed_config_defaults(&self) -> Result<()> {
        if self.store.config_get(config::KEY_MAX_RETRIES).await?.is_none() {
            self.store
                .config_set(config::KEY_MAX_RETRIES, &DEFAULT_MAX_RETRIES.to_string())
                .await?;
        }
        if self.store.config_get(config::KEY_BACKOFF_BASE).await?.is_none() {
            self.store
                .config_set(config::KEY_BACKOFF_BASE, &DEFAULT_BACKOFF_BASE.to_string())
                .await?;
        }
        Ok(())
    }

    /// Truncate an error message the way it is embedded into a JobEvent's
    /// `data` blob (§B.3 of the expanded spec).
    pub fn truncate_error(error: &str) -> String {
        truncate_for_event(error)
    }
}
