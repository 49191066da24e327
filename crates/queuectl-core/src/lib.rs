//! # QueueCTL core
//!
//! Durable job-queue data model, the `Store` persistence trait, and the
//! `Queue` semantic layer: default population on enqueue, `run_at`
//! parsing, the `scheduled -> pending` promotion rule, retry backoff math,
//! and the error taxonomy. Concrete persistence lives in
//! `queuectl-store-sqlite`; process execution and supervision live in
//! `queuectl-worker`.
//!
//! ## Key invariants (design doc §3)
//!
//! - Exactly one row per job id.
//! - `processing` implies `started_at` and `worker_id` are set.
//! - `completed`/`dead` are terminal and imply `completed_at` is set.
//! - `attempts <= max_retries + 1`; the transition to `dead` happens
//!   exactly when `attempts >= max_retries` on failure.

mod config;
mod error;
mod job;
mod metrics;
mod queue;
mod store;
mod time;

pub use config::{
    is_known_key, validate_value, ConfigEntry, DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES,
    KEY_BACKOFF_BASE, KEY_MAX_RETRIES,
};
pub use error::{QueueError, Result};
pub use job::{truncate_for_event, EventType, Job, JobEvent, JobState, EVENT_ERROR_TRUNCATE_LEN};
pub use metrics::SystemMetrics;
pub use queue::{EnqueuePayload, Queue, DEFAULT_TIMEOUT_SECONDS};
pub use store::{StateUpdate, Store};
pub use time::{backoff_delay_seconds, next_promotion_backoff, parse_run_at};

pub use async_trait::async_trait;
