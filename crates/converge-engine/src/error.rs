//! Engine error types
//!
//! Every failure the engine reports falls into one of a small closed set of
//! kinds (see [`ErrorKind`]). Callers branch on the kind, never on the
//! message text.

use std::time::Duration;
use thiserror::Error;

/// Error returned by a provider API client.
///
/// The client is opaque to the engine; the only things the engine needs to
/// know about a failed call are whether the target did not exist and whether
/// the provider considers the failure transient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ApiError {
    /// HTTP status, when the transport exposes one
    pub status: Option<u16>,

    /// Provider error code (e.g. "LoadBalancerNotFound", "Throttling")
    pub code: String,

    /// Human readable message from the provider
    pub message: String,
}

impl ApiError {
    pub fn new(status: Option<u16>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Some(404), code, message)
    }

    /// Whether the targeted remote resource does not exist
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404) || self.code.contains("NotFound")
    }

    /// Whether the provider reported a transient condition (throttling,
    /// capacity, server side failure)
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, Some(429) | Some(500..=599))
            || matches!(
                self.code.as_str(),
                "Throttling" | "ThrottlingException" | "RequestLimitExceeded" | "InsufficientCapacity"
            )
    }
}

/// The closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Upstream,
    Timeout,
    UnexpectedStatus,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Upstream => write!(f, "upstream"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::UnexpectedStatus => write!(f, "unexpected-status"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("invalid configuration at '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("{operation} failed for '{resource_id}': {source}")]
    Upstream {
        operation: String,
        resource_id: String,
        #[source]
        source: ApiError,
    },

    #[error("timed out after {elapsed:?} during {operation}")]
    Timeout {
        operation: String,
        /// Resource the wait concerned; set once the resource exists
        resource_id: Option<String>,
        elapsed: Duration,
    },

    #[error("'{resource_id}' reached unexpected status '{status}' (expected one of: {expected})")]
    UnexpectedStatus {
        resource_id: String,
        status: String,
        expected: String,
    },

    #[error("{operation} was cancelled")]
    Cancelled {
        operation: String,
        resource_id: Option<String>,
    },
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap an API client error from `verb` on a resource of type `kind`.
    ///
    /// A not-found API error becomes [`EngineError::NotFound`] so that read and
    /// delete paths can recognise it by kind.
    pub fn from_api(
        kind: &str,
        verb: &str,
        resource_id: impl Into<String>,
        source: ApiError,
    ) -> Self {
        let resource_id = resource_id.into();
        if source.is_not_found() {
            return EngineError::NotFound {
                resource: kind.to_string(),
                id: resource_id,
            };
        }
        EngineError::Upstream {
            operation: format!("{} {}", verb, kind),
            resource_id,
            source,
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        EngineError::Timeout {
            operation: operation.into(),
            resource_id: None,
            elapsed,
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        EngineError::Cancelled {
            operation: operation.into(),
            resource_id: None,
        }
    }

    /// Attach the resource a timeout or cancellation interrupted.
    /// An id that is already set wins; other kinds are returned unchanged.
    pub fn for_resource(self, id: impl Into<String>) -> Self {
        match self {
            EngineError::Timeout {
                operation,
                resource_id,
                elapsed,
            } => EngineError::Timeout {
                operation,
                resource_id: resource_id.or_else(|| Some(id.into())),
                elapsed,
            },
            EngineError::Cancelled {
                operation,
                resource_id,
            } => EngineError::Cancelled {
                operation,
                resource_id: resource_id.or_else(|| Some(id.into())),
            },
            other => other,
        }
    }

    /// Provider id of the resource the error concerns, when known.
    ///
    /// After a create this is how the host recovers the id of a resource
    /// that exists remotely but never converged.
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            EngineError::NotFound { id, .. } => Some(id),
            EngineError::Upstream { resource_id, .. }
            | EngineError::UnexpectedStatus { resource_id, .. } => Some(resource_id),
            EngineError::Timeout { resource_id, .. }
            | EngineError::Cancelled { resource_id, .. } => resource_id.as_deref(),
            EngineError::Validation { .. } => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Validation { .. } => ErrorKind::Validation,
            EngineError::Upstream { .. } => ErrorKind::Upstream,
            EngineError::Timeout { .. } => ErrorKind::Timeout,
            EngineError::UnexpectedStatus { .. } => ErrorKind::UnexpectedStatus,
            EngineError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether retrying the failed operation may succeed.
    ///
    /// The engine itself never retries; this is the classification handed to
    /// the host.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Upstream { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Collapse a NotFound into `None`; every other error propagates.
pub fn ignore_not_found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
