//! Warehouse error types.
//!
//! Every failure reported by a warehouse engine is surfaced through
//! [`WarehouseError`]. Callers above the client layer treat it as an opaque
//! upstream rejection and never retry it automatically.

use std::fmt;

/// Errors that can occur while talking to a warehouse engine.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// The job referenced by a handle does not exist (or belongs to another project).
    #[error("Job not found: {project_id}:{location}.{job_id}")]
    JobNotFound {
        /// Project the handle points at.
        project_id: String,
        /// Job identifier from the handle.
        job_id: String,
        /// Location from the handle.
        location: String,
    },

    /// The engine rejected the statement before running it.
    #[error("Invalid query: {message}")]
    InvalidQuery {
        /// Engine diagnostics.
        message: String,
    },

    /// The job ran and failed.
    #[error("Job {job_id} failed: {message}")]
    JobFailed {
        /// Job identifier.
        job_id: String,
        /// Engine diagnostics.
        message: String,
    },

    /// The engine answered with a non-success HTTP status.
    #[error("Warehouse returned HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the body, if any.
        message: String,
    },

    /// The engine could not be reached.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the transport failure.
        message: String,
    },

    /// A response from the engine could not be decoded.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },

    /// An internal client error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl WarehouseError {
    /// Creates a new `JobNotFound` error.
    #[must_use]
    pub fn job_not_found(
        project_id: impl Into<String>,
        job_id: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self::JobNotFound {
            project_id: project_id.into(),
            job_id: job_id.into(),
            location: location.into(),
        }
    }

    /// Creates a new `InvalidQuery` error.
    #[must_use]
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a new `JobFailed` error.
    #[must_use]
    pub fn job_failed(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JobFailed {
            job_id: job_id.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Http` error.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Decode` error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the job could not be found.
    #[must_use]
    pub fn is_job_not_found(&self) -> bool {
        matches!(self, Self::JobNotFound { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::JobNotFound { .. } => ErrorCategory::NotFound,
            Self::InvalidQuery { .. } => ErrorCategory::Rejected,
            Self::JobFailed { .. } => ErrorCategory::Execution,
            Self::Http { .. } | Self::Connection { .. } => ErrorCategory::Infrastructure,
            Self::Decode { .. } | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of warehouse errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Job not found.
    NotFound,
    /// Statement rejected by the engine.
    Rejected,
    /// Statement failed while executing.
    Execution,
    /// Transport or HTTP failure.
    Infrastructure,
    /// Client-side internal failure.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Rejected => write!(f, "rejected"),
            Self::Execution => write!(f, "execution"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WarehouseError::job_not_found("proj", "job_1", "US");
        assert_eq!(err.to_string(), "Job not found: proj:US.job_1");

        let err = WarehouseError::invalid_query("Query parameter 'dob' not found");
        assert_eq!(
            err.to_string(),
            "Invalid query: Query parameter 'dob' not found"
        );

        let err = WarehouseError::http(403, "Access Denied");
        assert_eq!(err.to_string(), "Warehouse returned HTTP 403: Access Denied");
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            WarehouseError::job_not_found("p", "j", "US").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            WarehouseError::job_failed("j", "boom").category(),
            ErrorCategory::Execution
        );
        assert_eq!(
            WarehouseError::connection("refused").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::Rejected.to_string(), "rejected");
        assert!(WarehouseError::job_not_found("p", "j", "US").is_job_not_found());
        assert!(!WarehouseError::internal("x").is_job_not_found());
    }
}
