//! Error types for the convergence engine
//!
//! Errors are structured with fields to aid debugging in production.
//! Every variant that concerns a single workload carries the `namespace/name`
//! of the resource and, for rollout failures, the phase that failed.

use thiserror::Error;

use crate::host::ResourceRef;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Phase of host reconciliation in which a rollout failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RolloutPhase {
    /// A new StatefulSet was created
    Create,
    /// An existing StatefulSet was updated
    Update,
}

impl std::fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// Main error type for reconciliation operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A desired object failed a precondition check
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Resource the check was run against
        resource: String,
        /// Description of what's invalid
        message: String,
    },

    /// Operator configuration could not be loaded or is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's wrong
        message: String,
        /// Path of the configuration file (if known)
        path: Option<String>,
    },

    /// Rollout did not converge and the failure policy aborted
    #[error("{phase} failed on {resource}: {message}")]
    RolloutFailed {
        /// Phase that failed
        phase: RolloutPhase,
        /// The StatefulSet that did not converge
        resource: ResourceRef,
        /// Why the rollout was considered failed
        message: String,
    },

    /// Remediation ran and the pass must not continue to the next host
    #[error("{phase} stopped due to previous errors on {resource}")]
    Halted {
        /// Phase that failed
        phase: RolloutPhase,
        /// The StatefulSet that was remediated
        resource: ResourceRef,
    },

    /// The reconciliation pass was cancelled while waiting on a rollout
    #[error("reconciliation of {resource} cancelled")]
    Cancelled {
        /// The StatefulSet being waited on
        resource: ResourceRef,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "waiter", "status", "pass")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error for a specific resource
    pub fn validation_for(resource: impl std::fmt::Display, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.to_string(),
            message: msg.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            path: None,
        }
    }

    /// Create a configuration error tied to a file path
    pub fn config_at(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            path: Some(path.into()),
        }
    }

    /// Create a rollout failure for the given phase and resource
    pub fn rollout_failed(
        phase: RolloutPhase,
        resource: ResourceRef,
        msg: impl Into<String>,
    ) -> Self {
        Self::RolloutFailed {
            phase,
            resource,
            message: msg.into(),
        }
    }

    /// Create the "do not continue" verdict after a remediation
    pub fn halted(phase: RolloutPhase, resource: ResourceRef) -> Self {
        Self::Halted { phase, resource }
    }

    /// Create a cancellation error for the given resource
    pub fn cancelled(resource: ResourceRef) -> Self {
        Self::Cancelled { resource }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Check if this error is a Kubernetes 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 404)
    }

    /// Check if this error is a Kubernetes 409 (already exists or stale update)
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }

    /// Check if the caller's reconcile loop should retry the host on its next pass
    ///
    /// Validation and configuration errors need a human to fix something.
    /// Rollout failures are retried: the next pass compares specs again and
    /// either re-attempts the update or finds the rollback in place.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // Conflicts are retryable (re-fetch and resubmit), other 4xx are not
                match source {
                    kube::Error::Api(ae) => ae.code == 409 || !(400..500).contains(&ae.code),
                    _ => true,
                }
            }
            Error::Validation { .. } => false,
            Error::Config { .. } => false,
            Error::RolloutFailed { .. } => true,
            Error::Halted { .. } => true,
            Error::Cancelled { .. } => true,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the workload this error is associated with, if any
    pub fn resource(&self) -> Option<&ResourceRef> {
        match self {
            Error::RolloutFailed { resource, .. } => Some(resource),
            Error::Halted { resource, .. } => Some(resource),
            Error::Cancelled { resource } => Some(resource),
            _ => None,
        }
    }

    /// Get the rollout phase if this error came out of the failure policy
    pub fn phase(&self) -> Option<RolloutPhase> {
        match self {
            Error::RolloutFailed { phase, .. } => Some(*phase),
            Error::Halted { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}
