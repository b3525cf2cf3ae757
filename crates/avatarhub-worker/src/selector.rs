//! Execution mode selection.
//!
//! Decides per attempt whether a job runs on the local CLI pipeline or the
//! remote GPU endpoint. The probe is advisory: any failure to answer, or an
//! answer of "no capacity", falls back to CLI so jobs keep moving.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use avatarhub_core::config::remote::{ModePreference, RemoteConfig};

/// The backend chosen for one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Local detached pipeline subprocess.
    Cli,
    /// Remote serverless GPU endpoint.
    Api,
}

impl ExecutionMode {
    /// Lowercase tag recorded on the avatar.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Api => "api",
        }
    }
}

/// Answers whether the remote endpoint currently has worker capacity.
///
/// Implemented by the remote client's health check; tests substitute a
/// stub.
#[async_trait]
pub trait CapacityProbe: Send + Sync + 'static {
    /// True when at least one remote worker is ready or idle. Must return
    /// `false` rather than erroring when the answer is unknown.
    async fn has_capacity(&self) -> bool;
}

/// Chooses the execution mode for each attempt.
pub struct ModeSelector {
    preference: ModePreference,
    probe: Arc<dyn CapacityProbe>,
}

impl ModeSelector {
    /// Create a selector from the remote configuration.
    pub fn new(config: &RemoteConfig, probe: Arc<dyn CapacityProbe>) -> Self {
        Self {
            preference: config.mode,
            probe,
        }
    }

    /// Pick the backend for the next attempt.
    pub async fn select(&self) -> ExecutionMode {
        match self.preference {
            ModePreference::Cli => ExecutionMode::Cli,
            ModePreference::Api | ModePreference::Auto => {
                if self.probe.has_capacity().await {
                    info!("Remote GPU capacity available, using API mode");
                    ExecutionMode::Api
                } else {
                    info!("No remote GPU capacity, falling back to CLI mode");
                    ExecutionMode::Cli
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe(bool);

    #[async_trait]
    impl CapacityProbe for FixedProbe {
        async fn has_capacity(&self) -> bool {
            self.0
        }
    }

    fn config(mode: ModePreference) -> RemoteConfig {
        RemoteConfig {
            mode,
            base_url: "https://gpu.example.test/v2/abc".to_string(),
            api_key: "key".to_string(),
            run_timeout_seconds: 300,
            probe_timeout_seconds: 10,
        }
    }

    #[tokio::test]
    async fn cli_preference_never_probes() {
        let selector = ModeSelector::new(&config(ModePreference::Cli), Arc::new(FixedProbe(true)));
        assert_eq!(selector.select().await, ExecutionMode::Cli);
    }

    #[tokio::test]
    async fn auto_uses_api_when_capacity_available() {
        let selector = ModeSelector::new(&config(ModePreference::Auto), Arc::new(FixedProbe(true)));
        assert_eq!(selector.select().await, ExecutionMode::Api);
    }

    #[tokio::test]
    async fn auto_falls_back_to_cli_without_capacity() {
        let selector =
            ModeSelector::new(&config(ModePreference::Auto), Arc::new(FixedProbe(false)));
        assert_eq!(selector.select().await, ExecutionMode::Cli);
    }

    #[tokio::test]
    async fn api_preference_still_falls_back() {
        let selector = ModeSelector::new(&config(ModePreference::Api), Arc::new(FixedProbe(false)));
        assert_eq!(selector.select().await, ExecutionMode::Cli);
    }
}
