//! Operator configuration for StatefulSet rollouts
//!
//! Loaded from YAML before every reconciliation pass and never mutated by the
//! engine. Failure actions are closed enums: an unknown action string is a
//! load error, so a typo can never reach the reconcile loop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;

/// Default time to wait for a StatefulSet to reach its target generation
pub const DEFAULT_CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default time between StatefulSet status polls
pub const DEFAULT_CONVERGENCE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default time before the waiter starts logging rollout progress
pub const DEFAULT_STATUS_LOG_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// What to do with a StatefulSet that was created but never converged
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CreateFailureAction {
    /// Leave the StatefulSet in place and fail the host
    Abort,
    /// Delete the failed StatefulSet so the next pass recreates it
    #[default]
    Delete,
}

impl std::fmt::Display for CreateFailureAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// What to do with a StatefulSet whose update never converged
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpdateFailureAction {
    /// Leave the new spec in place and fail the host
    Abort,
    /// Restore the pre-update spec and recycle the pod
    #[default]
    Rollback,
}

impl std::fmt::Display for UpdateFailureAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Rollout and failure-handling configuration
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ReconcileConfig {
    /// Action when a created StatefulSet does not converge
    pub on_create_failure_action: CreateFailureAction,

    /// Action when an updated StatefulSet does not converge
    pub on_update_failure_action: UpdateFailureAction,

    /// Whether the pass moves on to the next host after a remediation
    pub continue_on_failure: bool,

    /// Seconds to wait for a StatefulSet to reach its target generation
    pub convergence_timeout_seconds: u64,

    /// Seconds between status polls while waiting
    pub convergence_poll_interval_seconds: u64,

    /// Seconds of waiting before progress is logged
    pub status_log_grace_period_seconds: u64,

    /// Upper bound on hosts reconciled in parallel within one pass
    pub max_concurrent_hosts: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            on_create_failure_action: CreateFailureAction::default(),
            on_update_failure_action: UpdateFailureAction::default(),
            continue_on_failure: false,
            convergence_timeout_seconds: DEFAULT_CONVERGENCE_TIMEOUT.as_secs(),
            convergence_poll_interval_seconds: DEFAULT_CONVERGENCE_POLL_INTERVAL.as_secs(),
            status_log_grace_period_seconds: DEFAULT_STATUS_LOG_GRACE_PERIOD.as_secs(),
            max_concurrent_hosts: 1,
        }
    }
}

impl ReconcileConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config_at(&display, format!("failed to read: {e}")))?;
        Self::from_yaml(&content).map_err(|e| match e {
            Error::Config { message, .. } => Error::config_at(display, message),
            other => other,
        })
    }

    /// Check the values that serde cannot check on its own
    pub fn validate(&self) -> Result<(), Error> {
        if self.convergence_poll_interval_seconds == 0 {
            return Err(Error::config(
                "convergencePollIntervalSeconds must be at least 1",
            ));
        }
        if self.convergence_poll_interval_seconds > self.convergence_timeout_seconds {
            return Err(Error::config(format!(
                "convergencePollIntervalSeconds ({}) must not exceed convergenceTimeoutSeconds ({})",
                self.convergence_poll_interval_seconds, self.convergence_timeout_seconds
            )));
        }
        if self.max_concurrent_hosts == 0 {
            return Err(Error::config("maxConcurrentHosts must be at least 1"));
        }
        Ok(())
    }

    /// Convergence timeout as a Duration
    pub fn convergence_timeout(&self) -> Duration {
        Duration::from_secs(self.convergence_timeout_seconds)
    }

    /// Poll interval as a Duration
    pub fn convergence_poll_interval(&self) -> Duration {
        Duration::from_secs(self.convergence_poll_interval_seconds)
    }

    /// Logging grace period as a Duration
    pub fn status_log_grace_period(&self) -> Duration {
        Duration::from_secs(self.status_log_grace_period_seconds)
    }
}

/// Source of configuration, consulted before each reconciliation pass
pub trait ConfigSource: Send + Sync {
    /// Load the configuration to use for the next pass
    fn load(&self) -> Result<ReconcileConfig, Error>;
}

/// Configuration re-read from a YAML file on every load
///
/// With no path, the built-in defaults are used.
#[derive(Clone, Debug, Default)]
pub struct FileConfigSource {
    path: Option<PathBuf>,
}

impl FileConfigSource {
    /// Create a source for the given optional file path
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<ReconcileConfig, Error> {
        match &self.path {
            Some(path) => {
                let config = ReconcileConfig::from_file(path)?;
                debug!(path = %path.display(), ?config, "loaded reconcile configuration");
                Ok(config)
            }
            None => Ok(ReconcileConfig::default()),
        }
    }
}
