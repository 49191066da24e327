//! Rollup types returned by `Store::system_metrics` (design doc §4.1, §6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SystemMetrics {
    pub counts_by_state: HashMap<String, i64>,
    pub avg_exec_ms: f64,
    pub rate_per_hour: f64,
    pub success_percent: f64,
    pub window_hours: i64,
}
