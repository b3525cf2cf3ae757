//! Remote GPU endpoint configuration.

use serde::{Deserialize, Serialize};

/// Preferred execution mode for avatar generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModePreference {
    /// Always run the local CLI pipeline.
    Cli,
    /// Prefer the remote API, falling back to CLI when no capacity.
    Api,
    /// Probe remote capacity and pick automatically.
    Auto,
}

impl Default for ModePreference {
    fn default() -> Self {
        Self::Auto
    }
}

/// Settings for the remote serverless GPU endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Preferred execution mode.
    #[serde(default)]
    pub mode: ModePreference,
    /// Endpoint base URL (e.g. `https://api.example.com/v2/<endpoint-id>`).
    #[serde(default)]
    pub base_url: String,
    /// Bearer token for the endpoint API.
    #[serde(default)]
    pub api_key: String,
    /// Timeout for a synchronous generation run, in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,
    /// Timeout for the capacity probe, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
}

impl RemoteConfig {
    /// Whether the endpoint has usable credentials.
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty()
    }
}

fn default_run_timeout() -> u64 {
    300
}

fn default_probe_timeout() -> u64 {
    10
}
