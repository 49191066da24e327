//! The `Job` and `JobEvent` data model (design doc §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job's position in the state machine (design doc §4.3).
///
/// `Pending`/`Scheduled` are the initial states, `Completed`/`Dead` are
/// terminal. `Dead` transitions back to `Pending` only via the explicit
/// `retry_from_dlq` operation — never as part of normal processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Scheduled,
    Processing,
    Failed,
    Completed,
    Dead,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Scheduled => "scheduled",
            JobState::Processing => "processing",
            JobState::Failed => "failed",
            JobState::Completed => "completed",
            JobState::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<JobState> {
        Some(match s {
            "pending" => JobState::Pending,
            "scheduled" => JobState::Scheduled,
            "processing" => JobState::Processing,
            "failed" => JobState::Failed,
            "completed" => JobState::Completed,
            "dead" => JobState::Dead,
            _ => return None,
        })
    }

    /// `completed` and `dead` are terminal: normal processing never leaves
    /// them (§3 invariants).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable job row. See design doc §3 for field semantics and invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub attempts: i64,
    pub max_retries: i64,
    pub priority: i32,
    pub timeout_seconds: i64,
    pub run_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub execution_time_ms: i64,
}

impl Job {
    /// A job is eligible for claim when it is `pending`, or `failed` with a
    /// `next_retry_at` that has already elapsed (or unset — see §4.1).
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Pending => true,
            JobState::Failed => self
                .next_retry_at
                .map(|at| at <= now)
                .unwrap_or(true),
            _ => false,
        }
    }
}

/// The kind of a [`JobEvent`] (design doc §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Replaced,
    Started,
    Completed,
    RetryScheduled,
    MovedToDlq,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Replaced => "replaced",
            EventType::Started => "started",
            EventType::Completed => "completed",
            EventType::RetryScheduled => "retry_scheduled",
            EventType::MovedToDlq => "moved_to_dlq",
        }
    }
}

/// An append-only entry in a job's event log. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: i64,
    pub job_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: Option<String>,
}

/// Truncate an error message before it is embedded in an event's `data`
/// blob, so one pathological stderr does not balloon the append-only log.
pub const EVENT_ERROR_TRUNCATE_LEN: usize = 200;

pub fn truncate_for_event(s: &str) -> String {
    if s.len() <= EVENT_ERROR_TRUNCATE_LEN {
        s.to_string()
    } else {
        let mut truncated = s
            .char_indices()
            .take_while(|(idx, _)| *idx < EVENT_ERROR_TRUNCATE_LEN)
            .map(|(_, c)| c)
            .collect::<String>();
        truncated.push('…');
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligible_pending_always() {
        let mut job = sample_job();
        job.state = JobState::Pending;
        assert!(job.is_eligible(Utc::now()));
    }

    #[test]
    fn eligible_failed_depends_on_next_retry_at() {
        let mut job = sample_job();
        job.state = JobState::Failed;
        let now = Utc::now();
        job.next_retry_at = Some(now + chrono::Duration::seconds(10));
        assert!(!job.is_eligible(now));
        job.next_retry_at = Some(now - chrono::Duration::seconds(10));
        assert!(job.is_eligible(now));
        job.next_retry_at = None;
        assert!(job.is_eligible(now));
    }

    #[test]
    fn processing_and_scheduled_never_eligible() {
        let mut job = sample_job();
        job.state = JobState::Processing;
        assert!(!job.is_eligible(Utc::now()));
        job.state = JobState::Scheduled;
        assert!(!job.is_eligible(Utc::now()));
    }

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate_for_event("short"), "short");
    }

    #[test]
    fn truncate_clips_long_strings() {
        let long = "x".repeat(500);
        let truncated = truncate_for_event(&long);
        assert!(truncated.chars().count() <= EVENT_ERROR_TRUNCATE_LEN + 1);
        assert!(truncated.ends_with('…'));
    }

    fn sample_job() -> Job {
        let now = Utc::now();
        Job {
            id: "j1".into(),
            command: "/bin/true".into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries: 3,
            priority: 0,
            timeout_seconds: 300,
            run_at: None,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            worker_id: None,
            output: None,
            error: None,
            execution_time_ms: 0,
        }
    }
}
