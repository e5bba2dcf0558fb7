use std::future::Future;
use std::time::Duration;

use sparcflow_config::{Config, DEFAULT_NODE_TIMEOUT_SECS, MIN_NODE_TIMEOUT_SECS};
use sparcflow_utils::error::NodeExecutionError;
use sparcflow_utils::types::PhaseId;

/// Upper bound on a single node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeTimeout {
    pub duration: Duration,
}

impl NodeTimeout {
    pub const DEFAULT_SECS: u64 = DEFAULT_NODE_TIMEOUT_SECS;
    pub const MIN_SECS: u64 = MIN_NODE_TIMEOUT_SECS;

    /// Timeout of `secs` seconds, raised to [`Self::MIN_SECS`] if lower.
    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        Self {
            duration: Duration::from_secs(secs.max(Self::MIN_SECS)),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::from_secs(config.node_timeout_secs)
    }

    /// Await `fut`, mapping expiry to [`NodeExecutionError::Timeout`] and a
    /// node error to [`NodeExecutionError::Failed`].
    pub async fn run<F, T>(&self, phase: PhaseId, fut: F) -> Result<T, NodeExecutionError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.duration, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(NodeExecutionError::Failed {
                phase,
                reason: format!("{e:#}"),
            }),
            Err(_) => Err(NodeExecutionError::Timeout {
                phase,
                timeout_seconds: self.duration.as_secs(),
            }),
        }
    }
}

impl Default for NodeTimeout {
    fn default() -> Self {
        Self::from_secs(Self::DEFAULT_SECS)
    }
}
