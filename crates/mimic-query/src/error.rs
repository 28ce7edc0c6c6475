//! Query layer errors.

use mimic_warehouse::{ScalarType, StatementShape, WarehouseError};

use crate::template::Operation;

/// Errors produced while binding, submitting or redeeming a query.
///
/// Binding errors are raised before any warehouse interaction. Warehouse
/// errors are passed through untouched and never retried.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A required field is absent or null.
    #[error("Missing required field '{field}'")]
    MissingField { field: String },

    /// A field value cannot be coerced to its declared type.
    #[error("Field '{field}' must be {expected}: {message}")]
    TypeMismatch {
        field: String,
        expected: ScalarType,
        message: String,
    },

    /// The payload tries to set an identity field.
    #[error("Field '{field}' cannot be changed")]
    ImmutableField { field: String },

    /// The request body is not a JSON object.
    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    /// No template serves the resource/verb pair.
    #[error("Unsupported route: {verb} {resource}")]
    UnsupportedRoute { resource: String, verb: String },

    /// The warehouse rejected or failed the job.
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    /// The handle refers to a job that produces no rows.
    #[error("Job {job_id} is a {shape} job and has no results to redeem")]
    InvalidHandleUse {
        job_id: String,
        shape: StatementShape,
    },

    /// A template failed its self-check.
    #[error("Invalid template {operation}: {message}")]
    InvalidTemplate { operation: Operation, message: String },
}

impl QueryError {
    #[must_use]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    #[must_use]
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: ScalarType,
        message: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn immutable_field(field: impl Into<String>) -> Self {
        Self::ImmutableField {
            field: field.into(),
        }
    }

    #[must_use]
    pub fn malformed_payload(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unsupported_route(resource: impl Into<String>, verb: impl Into<String>) -> Self {
        Self::UnsupportedRoute {
            resource: resource.into(),
            verb: verb.into(),
        }
    }

    #[must_use]
    pub fn invalid_template(operation: Operation, message: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            operation,
            message: message.into(),
        }
    }

    /// Returns `true` if the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. }
                | Self::TypeMismatch { .. }
                | Self::ImmutableField { .. }
                | Self::MalformedPayload { .. }
                | Self::UnsupportedRoute { .. }
                | Self::InvalidHandleUse { .. }
        )
    }

    /// Stable machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::ImmutableField { .. } => "immutable_field",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::UnsupportedRoute { .. } => "unsupported_route",
            Self::Warehouse(_) => "warehouse_error",
            Self::InvalidHandleUse { .. } => "invalid_handle_use",
            Self::InvalidTemplate { .. } => "invalid_template",
        }
    }
}
