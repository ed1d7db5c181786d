//! Shared primitives for all pipeline audit crates.

#![forbid(unsafe_code)]

/// Identifiers shared across crates.
pub mod ids;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use ids::{AuditId, CorrelationId};

/// Result type used across pipeline audit crates.
pub type AppResult<T> = Result<T, AppError>;

/// Suggested retry-after hint attached to service-unavailable failures.
pub const RETRY_AFTER_SECONDS: u64 = 30;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// A details payload could not be converted to its storage text form.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing audit store rejected or failed an operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid runtime configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Correlation scope misuse, such as binding outside a scope.
    #[error("correlation error: {0}")]
    Correlation(String),

    /// A retried operation gave up after its attempt budget.
    #[error(
        "retry exhausted for '{operation}' after {attempts}/{max_attempts} attempts in {elapsed_ms}ms: {last_error}"
    )]
    RetryExhausted {
        /// Diagnostic operation name.
        operation: String,
        /// Attempts actually made.
        attempts: u32,
        /// Configured attempt budget.
        max_attempts: u32,
        /// Wall time spent across all attempts, in milliseconds.
        elapsed_ms: u64,
        /// Display text of the last underlying failure.
        last_error: String,
    },

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error family, one per error variant group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller supplied invalid data.
    Validation,
    /// Payload encoding or store access failed.
    Persistence,
    /// Runtime configuration is invalid.
    Configuration,
    /// Correlation scope was misused.
    Correlation,
    /// Retry budget was spent.
    RetryExhausted,
    /// Anything unexpected.
    Internal,
}

/// Outward-facing failure class used by callers at the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCategory {
    /// The caller can fix the request and try again.
    ClientCorrectable,
    /// The store is unavailable; retry later.
    ServiceUnavailable {
        /// Suggested wait before retrying.
        retry_after_seconds: u64,
    },
    /// Unexpected internal failure.
    Internal,
}

impl AppError {
    /// Returns a stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "AUDIT_VALIDATION_ERROR",
            Self::Serialization(_) => "AUDIT_SERIALIZATION_ERROR",
            Self::Storage(_) => "AUDIT_PERSISTENCE_ERROR",
            Self::Configuration(_) => "AUDIT_CONFIGURATION_ERROR",
            Self::Correlation(_) => "CORRELATION_ERROR",
            Self::RetryExhausted { .. } => "AUDIT_RETRY_EXHAUSTED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the error family.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Serialization(_) | Self::Storage(_) => ErrorCategory::Persistence,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Correlation(_) => ErrorCategory::Correlation,
            Self::RetryExhausted { .. } => ErrorCategory::RetryExhausted,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Returns whether this variant may ever be retried.
    ///
    /// Only storage failures are candidates; whether a particular storage
    /// failure is transient is decided by the retry policy's classifier.
    #[must_use]
    pub fn is_retry_candidate(&self) -> bool {
        match self {
            Self::Storage(_) => true,
            Self::Validation(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Correlation(_)
            | Self::RetryExhausted { .. }
            | Self::Internal(_) => false,
        }
    }

    /// Maps the error to the failure class surfaced by outer layers.
    #[must_use]
    pub fn failure_category(&self) -> FailureCategory {
        match self {
            Self::Validation(_) | Self::Serialization(_) => FailureCategory::ClientCorrectable,
            Self::RetryExhausted { .. } => FailureCategory::ServiceUnavailable {
                retry_after_seconds: RETRY_AFTER_SECONDS,
            },
            Self::Storage(_)
            | Self::Configuration(_)
            | Self::Correlation(_)
            | Self::Internal(_) => FailureCategory::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, ErrorCategory, FailureCategory, NonEmptyString};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn serialization_and_storage_share_persistence_category() {
        assert_eq!(
            AppError::Serialization("bad".to_owned()).category(),
            ErrorCategory::Persistence
        );
        assert_eq!(
            AppError::Storage("down".to_owned()).category(),
            ErrorCategory::Persistence
        );
        assert_ne!(
            AppError::Serialization("bad".to_owned()).code(),
            AppError::Storage("down".to_owned()).code()
        );
    }

    #[test]
    fn retry_exhausted_is_terminal_and_maps_to_unavailable() {
        let error = AppError::RetryExhausted {
            operation: "append_audit_event".to_owned(),
            attempts: 3,
            max_attempts: 3,
            elapsed_ms: 3_000,
            last_error: "connection timeout".to_owned(),
        };

        assert!(!error.is_retry_candidate());
        assert_eq!(
            error.failure_category(),
            FailureCategory::ServiceUnavailable {
                retry_after_seconds: 30
            }
        );
        assert!(error.to_string().contains("3/3 attempts"));
    }

    #[test]
    fn client_errors_are_correctable() {
        assert_eq!(
            AppError::Validation("missing".to_owned()).failure_category(),
            FailureCategory::ClientCorrectable
        );
        assert_eq!(
            AppError::Serialization("bad".to_owned()).failure_category(),
            FailureCategory::ClientCorrectable
        );
        assert_eq!(
            AppError::Storage("constraint violated".to_owned()).failure_category(),
            FailureCategory::Internal
        );
    }
}
