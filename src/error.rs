//! Error types for LINSTOR attachment and capacity accounting
//!
//! Two layers: [`ControlPlaneError`] describes a single failed remote call,
//! [`Error`] is what the public operations return and tags remote failures
//! with the step that issued them.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Control Plane Errors
// =============================================================================

/// Failure of a single call against the LINSTOR control plane
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("control plane rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ControlPlaneError {
    /// Network-level failures that may succeed when repeated
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ControlPlaneError::Transport(_) | ControlPlaneError::DeadlineExceeded
        )
    }
}

/// Result alias for raw control plane calls
pub type ControlPlaneResult<T> = std::result::Result<T, ControlPlaneError>;

// =============================================================================
// Attach Steps
// =============================================================================

/// The step of an attach operation that issued a failing call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachStep {
    Inspection,
    Deactivation,
    Activation,
    Creation,
    Verification,
}

impl fmt::Display for AttachStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachStep::Inspection => write!(f, "inspection"),
            AttachStep::Deactivation => write!(f, "deactivation"),
            AttachStep::Activation => write!(f, "activation"),
            AttachStep::Creation => write!(f, "creation"),
            AttachStep::Verification => write!(f, "verification"),
        }
    }
}

// =============================================================================
// Crate Error
// =============================================================================

/// Unified error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("invalid parameter {key}='{value}': {reason}")]
    InvalidParameter {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Attach Errors
    // =========================================================================
    #[error("{step} failed for volume {volume} on node {node}: {source}")]
    Attach {
        step: AttachStep,
        volume: String,
        node: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("inconsistent resource view for volume {volume}: {reason}")]
    InconsistentSnapshot { volume: String, reason: String },

    // =========================================================================
    // Capacity Errors
    // =========================================================================
    #[error("allocation of {allocated_bytes} bytes for request of {requested_bytes} bytes exceeds limit of {limit_bytes} bytes")]
    CapacityLimit {
        requested_bytes: u64,
        allocated_bytes: u64,
        limit_bytes: u64,
    },

    #[error("storage pool capacity query failed: {0}")]
    CapacityQuery(#[source] ControlPlaneError),

    // =========================================================================
    // Topology Errors
    // =========================================================================
    #[error("node query failed for segments {segments}: {source}")]
    NodeQuery {
        segments: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("resource view query failed for volume {volume}: {source}")]
    ResourceQuery {
        volume: String,
        #[source]
        source: ControlPlaneError,
    },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Retry hint for the caller; nothing in this crate retries on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry with exponential backoff
    RequeueWithBackoff,
    /// Retry after a specific duration
    RequeueAfter(Duration),
    /// Don't retry, the request itself is wrong
    NoRequeue,
}

impl Error {
    /// Tag a failed control plane call with the attach step that issued it
    pub fn attach(
        step: AttachStep,
        volume: impl Into<String>,
        node: impl Into<String>,
        source: ControlPlaneError,
    ) -> Self {
        Error::Attach {
            step,
            volume: volume.into(),
            node: node.into(),
            source,
        }
    }

    /// The control plane failure behind this error, if any
    pub fn control_plane_error(&self) -> Option<&ControlPlaneError> {
        match self {
            Error::Attach { source, .. }
            | Error::NodeQuery { source, .. }
            | Error::ResourceQuery { source, .. }
            | Error::CapacityQuery(source) => Some(source),
            _ => None,
        }
    }

    /// Determine what the caller should do with this error
    pub fn action(&self) -> ErrorAction {
        match self {
            Error::InvalidName { .. }
            | Error::InvalidParameter { .. }
            | Error::Configuration(_)
            | Error::Serialization(_)
            | Error::CapacityLimit { .. } => ErrorAction::NoRequeue,

            // The view changes under us; give the control plane a moment
            Error::InconsistentSnapshot { .. } => ErrorAction::RequeueAfter(Duration::from_secs(5)),
            Error::Attach {
                step: AttachStep::Verification,
                ..
            } => ErrorAction::RequeueAfter(Duration::from_secs(10)),

            _ => match self.control_plane_error() {
                Some(ControlPlaneError::Cancelled) => ErrorAction::NoRequeue,
                _ => ErrorAction::RequeueWithBackoff,
            },
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        self.control_plane_error()
            .map(ControlPlaneError::is_transient)
            .unwrap_or(false)
    }

    /// The control plane accepted a mutation but its outcome is not observable
    pub fn is_consistency(&self) -> bool {
        matches!(
            self,
            Error::InconsistentSnapshot { .. }
                | Error::Attach {
                    step: AttachStep::Verification,
                    ..
                }
        )
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::CapacityLimit {
            requested_bytes: 4097,
            allocated_bytes: 5120,
            limit_bytes: 4096,
        };
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::attach(
            AttachStep::Verification,
            "rsc1",
            "node-3",
            ControlPlaneError::NotFound("rsc1/node-3".into()),
        );
        assert_eq!(err.action(), ErrorAction::RequeueAfter(Duration::from_secs(10)));
        assert!(err.is_consistency());

        let err = Error::attach(
            AttachStep::Activation,
            "rsc1",
            "node-2",
            ControlPlaneError::Cancelled,
        );
        assert_eq!(err.action(), ErrorAction::NoRequeue);
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::attach(
            AttachStep::Creation,
            "rsc1",
            "node-3",
            ControlPlaneError::DeadlineExceeded,
        );
        assert!(transient.is_retryable());
        assert!(transient.is_transient());

        let rejected = Error::CapacityQuery(ControlPlaneError::Rejected {
            status: 500,
            message: "boom".into(),
        });
        assert!(rejected.is_retryable());
        assert!(!rejected.is_transient());

        let invalid = Error::Configuration("invalid".into());
        assert!(!invalid.is_retryable());
        assert!(!invalid.is_transient());
    }

    #[test]
    fn test_step_in_message() {
        let err = Error::attach(
            AttachStep::Deactivation,
            "rsc1",
            "node-0",
            ControlPlaneError::Rejected {
                status: 500,
                message: "device busy".into(),
            },
        );
        let msg = err.to_string();
        assert!(msg.starts_with("deactivation failed for volume rsc1 on node node-0"));
        assert!(msg.contains("device busy"));
    }
}
