//! Time math shared by the Queue and the Worker: `run_at` parsing, retry
//! backoff, and the idle-poll backoff bands used when no job is claimable.

use chrono::{DateTime, Duration, Utc};

use crate::error::QueueError;

/// Parse a `run_at` value accepted by the enqueue payload (design doc §4.2,
/// §6): either an absolute ISO-8601 timestamp, or a relative form
/// `+<N>{s|m|h|d}` resolved against `now`.
pub fn parse_run_at(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, QueueError> {
    if let Some(rest) = raw.strip_prefix('+') {
        let unit = rest
            .chars()
            .last()
            .ok_or_else(|| QueueError::InvalidPayload(format!("invalid run_at: {raw}")))?;
        let amount_str = &rest[..rest.len() - 1];
        let amount: i64 = amount_str
            .parse()
            .map_err(|_| QueueError::InvalidPayload(format!("invalid run_at: {raw}")))?;
        let seconds = match unit {
            's' => amount,
            'm' => amount * 60,
            'h' => amount * 3600,
            'd' => amount * 86_400,
            _ => return Err(QueueError::InvalidPayload(format!("invalid run_at: {raw}"))),
        };
        Ok(now + Duration::seconds(seconds))
    } else {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| QueueError::InvalidPayload(format!("invalid run_at: {raw}")))
    }
}

/// `delay = floor(base ^ attempts)` seconds — a deterministic geometric
/// schedule with no jitter (design doc §9).
pub fn backoff_delay_seconds(backoff_base: f64, attempts: i64) -> i64 {
    backoff_base.powi(attempts as i32).floor() as i64
}

/// The idle-poll backoff band used by the Worker's main loop and the
/// standalone scheduler tick when no job is claimable: 1s if the nearest
/// `scheduled.run_at` is within 5 minutes, 60s if within an hour, otherwise
/// 300s (design doc §4.4 step 1 / SPEC_FULL.md §B.1).
pub fn next_promotion_backoff(nearest_due: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    match nearest_due {
        None => Duration::seconds(300),
        Some(due) => {
            let delta = due - now;
            if delta <= Duration::minutes(5) {
                Duration::seconds(1)
            } else if delta <= Duration::hours(1) {
                Duration::seconds(60)
            } else {
                Duration::seconds(300)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_relative_seconds() {
        let now = Utc::now();
        let parsed = parse_run_at("+30s", now).unwrap();
        assert_eq!((parsed - now).num_seconds(), 30);
    }

    #[test]
    fn parse_relative_units() {
        let now = Utc::now();
        assert_eq!((parse_run_at("+5m", now).unwrap() - now).num_seconds(), 300);
        assert_eq!((parse_run_at("+2h", now).unwrap() - now).num_seconds(), 7200);
        assert_eq!(
            (parse_run_at("+1d", now).unwrap() - now).num_seconds(),
            86_400
        );
    }

    #[test]
    fn parse_absolute_iso8601() {
        let now = Utc::now();
        let absolute = (now + Duration::seconds(60)).to_rfc3339();
        let parsed = parse_run_at(&absolute, now).unwrap();
        assert_eq!(parsed.timestamp(), (now + Duration::seconds(60)).timestamp());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_run_at("not-a-time", Utc::now()).is_err());
        assert!(parse_run_at("+5x", Utc::now()).is_err());
    }

    #[test]
    fn backoff_matches_spec_example() {
        // max_retries=3, backoff_base=2: deltas 2, 4, 8 after attempts 1, 2, 3.
        assert_eq!(backoff_delay_seconds(2.0, 1), 2);
        assert_eq!(backoff_delay_seconds(2.0, 2), 4);
        assert_eq!(backoff_delay_seconds(2.0, 3), 8);
    }

    #[test]
    fn promotion_backoff_bands() {
        let now = Utc::now();
        assert_eq!(
            next_promotion_backoff(Some(now + Duration::minutes(2)), now),
            Duration::seconds(1)
        );
        assert_eq!(
            next_promotion_backoff(Some(now + Duration::minutes(30)), now),
            Duration::seconds(60)
        );
        assert_eq!(
            next_promotion_backoff(Some(now + Duration::hours(3)), now),
            Duration::seconds(300)
        );
        assert_eq!(next_promotion_backoff(None, now), Duration::seconds(300));
    }
}
