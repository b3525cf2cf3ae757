//! Job queue and reconciler configuration.

use serde::{Deserialize, Serialize};

/// Job admission and background reconciler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the background reconciler is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of concurrently processing jobs.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: i64,
    /// Default attempt budget for new jobs.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    /// Interval in seconds between reconciler ticks.
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// Delay in seconds before the first reconciler tick, letting the
    /// application finish starting up.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> i64 {
    3
}

fn default_max_attempts() -> i32 {
    3
}

fn default_check_interval() -> u64 {
    10
}

fn default_initial_delay() -> u64 {
    5
}
