//! SQLite implementation of the QueueCTL `Store` trait.
//!
//! # Database schema
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id TEXT PRIMARY KEY,
//!     command TEXT NOT NULL,
//!     state TEXT NOT NULL DEFAULT 'pending',
//!     attempts INTEGER NOT NULL DEFAULT 0,
//!     max_retries INTEGER NOT NULL DEFAULT 3,
//!     priority INTEGER NOT NULL DEFAULT 0,
//!     timeout_seconds INTEGER NOT NULL DEFAULT 300,
//!     run_at TEXT,
//!     next_retry_at TEXT,
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     started_at TEXT,
//!     completed_at TEXT,
//!     worker_id TEXT,
//!     output TEXT,
//!     error TEXT,
//!     execution_time_ms INTEGER NOT NULL DEFAULT 0
//! );
//!
//! CREATE TABLE job_metrics (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     job_id TEXT NOT NULL,
//!     event_type TEXT NOT NULL,
//!     timestamp TEXT NOT NULL,
//!     data TEXT
//! );
//!
//! CREATE TABLE config (
//!     key TEXT PRIMARY KEY,
//!     value TEXT NOT NULL,
//!     updated_at TEXT NOT NULL
//! );
//!
//! CREATE INDEX idx_state_priority ON jobs(state, priority DESC, created_at);
//! CREATE INDEX idx_run_at ON jobs(run_at);
//! CREATE INDEX idx_next_retry ON jobs(next_retry_at);
//! ```
//!
//! # Concurrency
//!
//! Every write opens a `BEGIN IMMEDIATE` transaction, which takes SQLite's
//! reserved write lock up front rather than on first write, so two
//! processes racing the same operation serialize instead of one hitting
//! `SQLITE_BUSY` mid-transaction. WAL mode lets readers proceed
//! uncontended. `claim_next` holds that lock across promotion and
//! selection, satisfying design doc §4.1/§5.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use queuectl_core::{
    ConfigEntry, EventType, Job, JobEvent, JobState, QueueError, Result, StateUpdate, Store,
    SystemMetrics,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

/// PostgreSQL-flavored stores might size their pool to core count; a
/// single-file SQLite database serializes writers regardless; a handful
/// of connections keeps concurrent reads (list/get/metrics) from queuing
/// behind a long-running reader.
const DEFAULT_MAX_CONNECTIONS: u32 = 8;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path`, running the
    /// idempotent schema migration before returning.
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// An in-memory database, for tests. Must use a single connection —
    /// SQLite's `:memory:` database is private per-connection.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                command TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                data TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        self.add_missing_columns().await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_state_priority ON jobs(state, priority DESC, created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_run_at ON jobs(run_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_next_retry ON jobs(next_retry_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_metrics_job ON job_metrics(job_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON job_metrics(timestamp)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Add columns that a later schema revision introduced, without
    /// touching rows already on disk — the same additive migration the
    /// original implementation performs on every startup.
    async fn add_missing_columns(&self) -> anyhow::Result<()> {
        let existing: Vec<String> = sqlx::query("PRAGMA table_info(jobs)")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        let wanted: &[(&str, &str)] = &[
            ("priority", "INTEGER NOT NULL DEFAULT 0"),
            ("timeout_seconds", "INTEGER NOT NULL DEFAULT 300"),
            ("run_at", "TEXT"),
            ("next_retry_at", "TEXT"),
            ("started_at", "TEXT"),
            ("completed_at", "TEXT"),
            ("worker_id", "TEXT"),
            ("output", "TEXT"),
            ("error", "TEXT"),
            ("execution_time_ms", "INTEGER NOT NULL DEFAULT 0"),
        ];

        for (name, def) in wanted {
            if !existing.iter().any(|c| c == name) {
                let sql = format!("ALTER TABLE jobs ADD COLUMN {name} {def}");
                sqlx::query(&sql).execute(&self.pool).await?;
            }
        }
        Ok(())
    }
}

fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QueueError::StoreError(sqlx::Error::Decode(Box::new(e))))
}

fn parse_ts_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(&s)).transpose()
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job> {
    let state_str: String = row.get("state");
    let state = JobState::parse(&state_str).ok_or_else(|| {
        QueueError::InvalidPayload(format!("unknown job state in store: {state_str}"))
    })?;

    Ok(Job {
        id: row.get("id"),
        command: row.get("command"),
        state,
        attempts: row.get("attempts"),
        max_retries: row.get("max_retries"),
        priority: row.get("priority"),
        timeout_seconds: row.get("timeout_seconds"),
        run_at: parse_ts_opt(row.get("run_at"))?,
        next_retry_at: parse_ts_opt(row.get("next_retry_at"))?,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
        started_at: parse_ts_opt(row.get("started_at"))?,
        completed_at: parse_ts_opt(row.get("completed_at"))?,
        worker_id: row.get("worker_id"),
        output: row.get("output"),
        error: row.get("error"),
        execution_time_ms: row.get("execution_time_ms"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn enqueue(&self, job: Job, replace: bool) -> Result<Job> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT id FROM jobs WHERE id = ?")
            .bind(&job.id)
            .fetch_optional(&mut *tx)
            .await?;

        if existing.is_some() && !replace {
            return Err(QueueError::AlreadyExists(job.id));
        }

        if existing.is_some() {
            sqlx::query(
                r#"
                UPDATE jobs SET
                    command = ?, state = ?, attempts = 0, max_retries = ?,
                    priority = ?, timeout_seconds = ?, run_at = ?, updated_at = ?,
                    started_at = NULL, completed_at = NULL, next_retry_at = NULL,
                    output = NULL, error = NULL, execution_time_ms = 0, worker_id = NULL
                WHERE id = ?
                "#,
            )
            .bind(&job.command)
            .bind(job.state.as_str())
            .bind(job.max_retries)
            .bind(job.priority)
            .bind(job.timeout_seconds)
            .bind(job.run_at.map(fmt_ts))
            .bind(fmt_ts(job.updated_at))
            .bind(&job.id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO jobs (
                    id, command, state, attempts, max_retries, priority,
                    timeout_seconds, run_at, created_at, updated_at, started_at,
                    completed_at, next_retry_at, output, error, execution_time_ms, worker_id
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&job.id)
            .bind(&job.command)
            .bind(job.state.as_str())
            .bind(job.attempts)
            .bind(job.max_retries)
            .bind(job.priority)
            .bind(job.timeout_seconds)
            .bind(job.run_at.map(fmt_ts))
            .bind(fmt_ts(job.created_at))
            .bind(fmt_ts(job.updated_at))
            .bind(job.started_at.map(fmt_ts))
            .bind(job.completed_at.map(fmt_ts))
            .bind(job.next_retry_at.map(fmt_ts))
            .bind(&job.output)
            .bind(&job.error)
            .bind(job.execution_time_ms)
            .bind(&job.worker_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get(&job.id)
            .await?
            .ok_or_else(|| QueueError::NotFound(job.id.clone()))
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await?;
        let now_str = fmt_ts(now);

        sqlx::query("UPDATE jobs SET state = 'pending', updated_at = ? WHERE state = 'scheduled' AND run_at <= ?")
            .bind(&now_str)
            .bind(&now_str)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            r#"
            SELECT * FROM jobs
            WHERE state = 'pending'
               OR (state = 'failed' AND (next_retry_at IS NULL OR next_retry_at <= ?))
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(&now_str)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        row.map(|r| row_to_job(&r)).transpose()
    }

    async fn update_state(&self, id: &str, new_state: JobState, update: StateUpdate) -> Result<Job> {
        let mut tx = self.pool.begin().await?;
        let now = fmt_ts(Utc::now());

        let mut sets = vec!["state = ?".to_string(), "updated_at = ?".to_string()];
        macro_rules! push {
            ($name:literal) => {
                sets.push(concat!($name, " = ?").to_string());
            };
        }
        if update.attempts.is_some() {
            push!("attempts");
        }
        if update.next_retry_at.is_some() {
            push!("next_retry_at");
        }
        if update.output.is_some() {
            push!("output");
        }
        if update.error.is_some() {
            push!("error");
        }
        if update.started_at.is_some() {
            push!("started_at");
        }
        if update.completed_at.is_some() {
            push!("completed_at");
        }
        if update.worker_id.is_some() {
            push!("worker_id");
        }
        if update.execution_time_ms.is_some() {
            push!("execution_time_ms");
        }

        let sql = format!("UPDATE jobs SET {} WHERE id = ?", sets.join(", "));
        let mut q = sqlx::query(&sql).bind(new_state.as_str()).bind(&now);

        if let Some(v) = update.attempts {
            q = q.bind(v);
        }
        if let Some(v) = update.next_retry_at {
            q = q.bind(v.map(fmt_ts));
        }
        if let Some(v) = update.output {
            q = q.bind(v);
        }
        if let Some(v) = update.error {
            q = q.bind(v);
        }
        if let Some(v) = update.started_at {
            q = q.bind(v.map(fmt_ts));
        }
        if let Some(v) = update.completed_at {
            q = q.bind(v.map(fmt_ts));
        }
        if let Some(v) = update.worker_id {
            q = q.bind(v);
        }
        if let Some(v) = update.execution_time_ms {
            q = q.bind(v);
        }
        q = q.bind(id);

        let result = q.execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(id.to_string()));
        }

        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        row_to_job(&row)
    }

    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        let rows = match state {
            Some(s) => {
                sqlx::query("SELECT * FROM jobs WHERE state = ? ORDER BY created_at DESC")
                    .bind(s.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => sqlx::query("SELECT * FROM jobs ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?,
        };
        rows.iter().map(row_to_job).collect()
    }

    async fn retry_from_dlq(&self, id: &str) -> Result<Job> {
        let mut tx = self.pool.begin().await?;

        let state: Option<String> = sqlx::query_scalar("SELECT state FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        match state.as_deref() {
            None => return Err(QueueError::NotFound(id.to_string())),
            Some("dead") => {}
            Some(other) => {
                return Err(QueueError::InvalidState(
                    id.to_string(),
                    format!("cannot retry from dlq: job is '{other}', not 'dead'"),
                ))
            }
        }

        let now = fmt_ts(Utc::now());
        sqlx::query(
            r#"
            UPDATE jobs SET state = 'pending', attempts = 0, next_retry_at = NULL,
                            error = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        row_to_job(&row)
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_job(&r)).transpose()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn log_event(&self, job_id: &str, event_type: EventType, data: Option<serde_json::Value>) {
        let result = sqlx::query(
            "INSERT INTO job_metrics (job_id, event_type, timestamp, data) VALUES (?, ?, ?, ?)",
        )
        .bind(job_id)
        .bind(event_type.as_str())
        .bind(fmt_ts(Utc::now()))
        .bind(data.map(|v| v.to_string()))
        .execute(&self.pool)
        .await;

        // Best-effort: a failure to log must never abort the enclosing
        // job operation (design doc §4.1, §7).
        if let Err(err) = result {
            tracing::warn!(job_id, error = %err, "failed to append job event");
        }
    }

    async fn list_events(&self, job_id: &str) -> Result<Vec<JobEvent>> {
        let rows = sqlx::query("SELECT * FROM job_metrics WHERE job_id = ? ORDER BY timestamp ASC")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| JobEvent {
                id: row.get("id"),
                job_id: row.get("job_id"),
                event_type: row.get("event_type"),
                timestamp: parse_ts(&row.get::<String, _>("timestamp")).unwrap_or_else(|_| Utc::now()),
                data: row.get("data"),
            })
            .collect())
    }

    async fn system_metrics(&self, window_hours: i64) -> Result<SystemMetrics> {
        let since = fmt_ts(Utc::now() - chrono::Duration::hours(window_hours.max(1)));

        let rows = sqlx::query("SELECT state, COUNT(*) as count FROM jobs WHERE created_at >= ? GROUP BY state")
            .bind(&since)
            .fetch_all(&self.pool)
            .await?;
        let mut counts_by_state = std::collections::HashMap::new();
        for row in &rows {
            let state: String = row.get("state");
            let count: i64 = row.get("count");
            counts_by_state.insert(state, count);
        }

        let avg_exec_ms: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(execution_time_ms) FROM jobs WHERE state = 'completed' AND created_at >= ?",
        )
        .bind(&since)
        .fetch_one(&self.pool)
        .await?;

        let total_jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE created_at >= ?")
            .bind(&since)
            .fetch_one(&self.pool)
            .await?;

        let (completed, terminal_total): (i64, i64) = {
            let row = sqlx::query(
                r#"
                SELECT
                    SUM(CASE WHEN state = 'completed' THEN 1 ELSE 0 END) as completed,
                    COUNT(*) as total
                FROM jobs
                WHERE created_at >= ? AND state IN ('completed', 'dead')
                "#,
            )
            .bind(&since)
            .fetch_one(&self.pool)
            .await?;
            (row.get::<Option<i64>, _>("completed").unwrap_or(0), row.get("total"))
        };

        let success_percent = if terminal_total > 0 {
            completed as f64 / terminal_total as f64 * 100.0
        } else {
            0.0
        };

        Ok(SystemMetrics {
            counts_by_state,
            avg_exec_ms: avg_exec_ms.unwrap_or(0.0),
            rate_per_hour: total_jobs as f64 / window_hours.max(1) as f64,
            success_percent,
            window_hours,
        })
    }

    async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO config (key, value, updated_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(value)
            .bind(fmt_ts(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn config_delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM config WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn config_list(&self) -> Result<Vec<ConfigEntry>> {
        let rows = sqlx::query("SELECT key, value, updated_at FROM config ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(ConfigEntry {
                    key: row.get("key"),
                    value: row.get("value"),
                    updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuectl_core::{EnqueuePayload, Queue};
    use std::sync::Arc;

    async fn store() -> SqliteStore {
        SqliteStore::in_memory().await.expect("in-memory store")
    }

    #[tokio::test]
    async fn enqueue_then_get_round_trips() {
        let s = store().await;
        let queue = Queue::new(Arc::new(s));
        let job = queue
            .enqueue(
                EnqueuePayload {
                    command: "/bin/true".into(),
                    id: Some("j1".into()),
                    priority: None,
                    max_retries: None,
                    timeout_seconds: None,
                    run_at: None,
                },
                false,
            )
            .await
            .unwrap();
        assert_eq!(job.state, JobState::Pending);

        let fetched = queue.get("j1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "j1");
        assert_eq!(fetched.command, "/bin/true");
        assert_eq!(fetched.attempts, 0);
    }

    #[tokio::test]
    async fn enqueue_without_replace_rejects_duplicate_id() {
        let s = Arc::new(store().await);
        let queue = Queue::new(s);
        let payload = || EnqueuePayload {
            command: "/bin/true".into(),
            id: Some("dup".into()),
            priority: None,
            max_retries: None,
            timeout_seconds: None,
            run_at: None,
        };
        queue.enqueue(payload(), false).await.unwrap();
        let err = queue.enqueue(payload(), false).await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn future_run_at_is_scheduled_then_promotes() {
        let s = Arc::new(store().await);
        let queue = Queue::new(s.clone());
        queue
            .enqueue(
                EnqueuePayload {
                    command: "/bin/true".into(),
                    id: Some("s1".into()),
                    priority: None,
                    max_retries: None,
                    timeout_seconds: None,
                    run_at: Some("+1s".into()),
                },
                false,
            )
            .await
            .unwrap();
        let job = queue.get("s1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Scheduled);

        // claim_next before run_at elapses: nothing eligible yet.
        assert!(s.claim_next(Utc::now()).await.unwrap().is_none());

        // claim_next after run_at elapses: promotes and returns it.
        let later = Utc::now() + chrono::Duration::seconds(2);
        let claimed = s.claim_next(later).await.unwrap().unwrap();
        assert_eq!(claimed.id, "s1");
        assert_eq!(claimed.state, JobState::Pending);
    }

    #[tokio::test]
    async fn priority_then_fifo_ordering() {
        let s = Arc::new(store().await);
        let queue = Queue::new(s.clone());
        for (id, priority) in [("lo", 0), ("hi", 10), ("lo2", 0)] {
            queue
                .enqueue(
                    EnqueuePayload {
                        command: "/bin/true".into(),
                        id: Some(id.into()),
                        priority: Some(priority),
                        max_retries: None,
                        timeout_seconds: None,
                        run_at: None,
                    },
                    false,
                )
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let mut order = vec![];
        for _ in 0..3 {
            let job = s.claim_next(Utc::now()).await.unwrap().unwrap();
            // Simulate the worker moving it out of contention.
            s.update_state(
                &job.id,
                JobState::Processing,
                StateUpdate::new().started_at(Some(Utc::now())).worker_id(Some("w".into())),
            )
            .await
            .unwrap();
            order.push(job.id);
        }
        assert_eq!(order, vec!["hi", "lo", "lo2"]);
    }

    #[tokio::test]
    async fn retry_from_dlq_resets_job() {
        let s = Arc::new(store().await);
        let queue = Queue::new(s.clone());
        queue
            .enqueue(
                EnqueuePayload {
                    command: "false".into(),
                    id: Some("j2".into()),
                    priority: None,
                    max_retries: Some(1),
                    timeout_seconds: None,
                    run_at: None,
                },
                false,
            )
            .await
            .unwrap();
        s.update_state(
            "j2",
            JobState::Dead,
            StateUpdate::new()
                .attempts(1)
                .error(Some("boom".into()))
                .completed_at(Some(Utc::now())),
        )
        .await
        .unwrap();

        let retried = queue.dlq_retry("j2").await.unwrap();
        assert_eq!(retried.state, JobState::Pending);
        assert_eq!(retried.attempts, 0);
        assert!(retried.error.is_none());
    }

    #[tokio::test]
    async fn retry_from_dlq_rejects_non_dead_job() {
        let s = Arc::new(store().await);
        let queue = Queue::new(s.clone());
        queue
            .enqueue(
                EnqueuePayload {
                    command: "/bin/true".into(),
                    id: Some("j3".into()),
                    priority: None,
                    max_retries: None,
                    timeout_seconds: None,
                    run_at: None,
                },
                false,
            )
            .await
            .unwrap();
        let err = queue.dlq_retry("j3").await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidState(_, _)));
    }

    #[tokio::test]
    async fn config_seeds_defaults_once() {
        let s = Arc::new(store().await);
        let queue = Queue::new(s);
        queue.seed_config_defaults().await.unwrap();
        assert_eq!(queue.config_get("max-retries").await.unwrap().as_deref(), Some("3"));
        assert_eq!(queue.config_get("backoff-base").await.unwrap().as_deref(), Some("2"));

        queue.config_set("max-retries", "7").await.unwrap();
        queue.seed_config_defaults().await.unwrap();
        assert_eq!(queue.config_get("max-retries").await.unwrap().as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn list_filters_by_state() {
        let s = Arc::new(store().await);
        let queue = Queue::new(s.clone());
        queue
            .enqueue(
                EnqueuePayload {
                    command: "/bin/true".into(),
                    id: Some("a".into()),
                    priority: None,
                    max_retries: None,
                    timeout_seconds: None,
                    run_at: None,
                },
                false,
            )
            .await
            .unwrap();
        let pending = queue.list(Some(JobState::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        let completed = queue.list(Some(JobState::Completed)).await.unwrap();
        assert!(completed.is_empty());
    }
}
