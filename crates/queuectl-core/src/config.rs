//! Config entries and the two recognized keys (design doc §3, §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

/// `{key, value, updated_at}` as persisted by the `Store`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

pub const KEY_MAX_RETRIES: &str = "max-retries";
pub const KEY_BACKOFF_BASE: &str = "backoff-base";

pub const DEFAULT_MAX_RETRIES: i64 = 3;
pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;

/// The set of config keys recognized at the configuration API boundary.
/// `Config` itself (the Store-level façade) accepts arbitrary string
/// values; only the boundary (CLI / `config_set`) rejects unknown keys.
pub fn is_known_key(key: &str) -> bool {
    matches!(key, KEY_MAX_RETRIES | KEY_BACKOFF_BASE)
}

/// Validate a value for a recognized key, per §3: `max-retries` is a
/// non-negative integer, `backoff-base` is a real > 1.
pub fn validate_value(key: &str, value: &str) -> Result<()> {
    match key {
        KEY_MAX_RETRIES => {
            let parsed: i64 = value
                .parse()
                .map_err(|_| QueueError::InvalidValue(key.to_string(), value.to_string()))?;
            if parsed < 0 {
                return Err(QueueError::InvalidValue(key.to_string(), value.to_string()));
            }
            Ok(())
        }
        KEY_BACKOFF_BASE => {
            let parsed: f64 = value
                .parse()
                .map_err(|_| QueueError::InvalidValue(key.to_string(), value.to_string()))?;
            if !(parsed > 1.0) {
                return Err(QueueError::InvalidValue(key.to_string(), value.to_string()));
            }
            Ok(())
        }
        other => Err(QueueError::UnknownKey(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys() {
        assert!(is_known_key(KEY_MAX_RETRIES));
        assert!(is_known_key(KEY_BACKOFF_BASE));
        assert!(!is_known_key("max-workers"));
    }

    #[test]
    fn validate_max_retries_rejects_negative() {
        assert!(validate_value(KEY_MAX_RETRIES, "3").is_ok());
        assert!(validate_value(KEY_MAX_RETRIES, "-1").is_err());
        assert!(validate_value(KEY_MAX_RETRIES, "not-a-number").is_err());
    }

    #[test]
    fn validate_backoff_base_requires_greater_than_one() {
        assert!(validate_value(KEY_BACKOFF_BASE, "2").is_ok());
        assert!(validate_value(KEY_BACKOFF_BASE, "1").is_err());
        assert!(validate_value(KEY_BACKOFF_BASE, "0.5").is_err());
    }

    #[test]
    fn validate_unknown_key() {
        assert!(matches!(
            validate_value("other", "x"),
            Err(QueueError::UnknownKey(_))
        ));
    }
}
