use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppError, AppResult};

/// Identifier grouping every audit event of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Creates a random (version 4) correlation identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a correlation identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Parses a transport value, rejecting blank or malformed input.
    pub fn parse(value: &str) -> AppResult<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "correlation id must not be empty".to_owned(),
            ));
        }

        Uuid::parse_str(trimmed).map(Self).map_err(|error| {
            AppError::Validation(format!("malformed correlation id '{trimmed}': {error}"))
        })
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CorrelationId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// Unique identifier of one persisted audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(Uuid);

impl AuditId {
    /// Creates a random audit identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an audit identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AuditId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for AuditId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditId, CorrelationId};

    #[test]
    fn correlation_id_formats_as_uuid() {
        let correlation_id = CorrelationId::new();
        assert_eq!(correlation_id.to_string().len(), 36);
    }

    #[test]
    fn correlation_id_parse_roundtrips_display() {
        let correlation_id = CorrelationId::new();
        let parsed = CorrelationId::parse(correlation_id.to_string().as_str());
        assert!(parsed.is_ok());
        assert_eq!(
            parsed.unwrap_or_else(|_| unreachable!()),
            correlation_id
        );
    }

    #[test]
    fn malformed_correlation_id_is_rejected() {
        assert!(CorrelationId::parse("   ").is_err());
        assert!(CorrelationId::parse("run-42").is_err());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let audit_id = AuditId::new();
        let encoded = serde_json::to_string(&audit_id).unwrap_or_default();
        assert_eq!(encoded, format!("\"{audit_id}\""));
    }
}
