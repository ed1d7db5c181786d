use std::str::FromStr;

use chrono::{DateTime, Utc};
use pipeaudit_core::{AppError, AppResult, AuditId, CorrelationId, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointStage;
use crate::details::{DetailsPayload, decode_details};

/// Outcome recorded for one checkpoint observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    /// The stage completed as expected.
    Success,
    /// The stage failed.
    Failure,
    /// The stage completed with caveats.
    Warning,
}

impl AuditStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Warning => "WARNING",
        }
    }

    /// Returns all statuses.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[AuditStatus] = &[
            AuditStatus::Success,
            AuditStatus::Failure,
            AuditStatus::Warning,
        ];

        ALL
    }
}

impl FromStr for AuditStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            "WARNING" => Ok(Self::Warning),
            _ => Err(AppError::Validation(format!(
                "unknown audit status '{value}'"
            ))),
        }
    }
}

/// Fully-populated input used to construct a persisted audit event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuditEventInput {
    /// Unique event identifier.
    pub audit_id: AuditId,
    /// Pipeline run the event belongs to.
    pub correlation_id: CorrelationId,
    /// Originating system.
    pub source_system: String,
    /// Emitting module.
    pub module_name: Option<String>,
    /// Emitting process.
    pub process_name: Option<String>,
    /// Lineage source entity.
    pub source_entity: Option<String>,
    /// Lineage destination entity.
    pub destination_entity: Option<String>,
    /// Business key such as a file or table name.
    pub key_identifier: Option<String>,
    /// Checkpoint the event was observed at.
    pub checkpoint_stage: Option<CheckpointStage>,
    /// Observation time.
    pub event_timestamp: DateTime<Utc>,
    /// Outcome.
    pub status: AuditStatus,
    /// Human-readable summary.
    pub message: Option<String>,
    /// Encoded details payload.
    pub details_payload: Option<String>,
}

/// One observation at one checkpoint for one pipeline run.
///
/// Deserialization goes through [`AuditEvent::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AuditEventInput")]
pub struct AuditEvent {
    audit_id: AuditId,
    correlation_id: CorrelationId,
    source_system: NonEmptyString,
    module_name: Option<String>,
    process_name: Option<String>,
    source_entity: Option<String>,
    destination_entity: Option<String>,
    key_identifier: Option<String>,
    checkpoint_stage: Option<CheckpointStage>,
    event_timestamp: DateTime<Utc>,
    status: AuditStatus,
    message: Option<String>,
    details_payload: Option<String>,
}

impl TryFrom<AuditEventInput> for AuditEvent {
    type Error = AppError;

    fn try_from(input: AuditEventInput) -> Result<Self, Self::Error> {
        Self::new(input)
    }
}

impl AuditEvent {
    /// Creates a validated audit event.
    pub fn new(input: AuditEventInput) -> AppResult<Self> {
        let AuditEventInput {
            audit_id,
            correlation_id,
            source_system,
            module_name,
            process_name,
            source_entity,
            destination_entity,
            key_identifier,
            checkpoint_stage,
            event_timestamp,
            status,
            message,
            details_payload,
        } = input;

        let source_system = NonEmptyString::new(source_system.trim()).map_err(|_| {
            AppError::Validation("source_system must not be empty".to_owned())
        })?;

        Ok(Self {
            audit_id,
            correlation_id,
            source_system,
            module_name: normalize_optional(module_name),
            process_name: normalize_optional(process_name),
            source_entity: normalize_optional(source_entity),
            destination_entity: normalize_optional(destination_entity),
            key_identifier: normalize_optional(key_identifier),
            checkpoint_stage,
            event_timestamp,
            status,
            message: normalize_optional(message),
            details_payload: normalize_optional(details_payload),
        })
    }

    /// Returns the event identifier.
    #[must_use]
    pub fn audit_id(&self) -> AuditId {
        self.audit_id
    }

    /// Returns the pipeline run identifier.
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Returns the originating system.
    #[must_use]
    pub fn source_system(&self) -> &str {
        self.source_system.as_str()
    }

    /// Returns the emitting module.
    #[must_use]
    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    /// Returns the emitting process.
    #[must_use]
    pub fn process_name(&self) -> Option<&str> {
        self.process_name.as_deref()
    }

    /// Returns the lineage source entity.
    #[must_use]
    pub fn source_entity(&self) -> Option<&str> {
        self.source_entity.as_deref()
    }

    /// Returns the lineage destination entity.
    #[must_use]
    pub fn destination_entity(&self) -> Option<&str> {
        self.destination_entity.as_deref()
    }

    /// Returns the business key.
    #[must_use]
    pub fn key_identifier(&self) -> Option<&str> {
        self.key_identifier.as_deref()
    }

    /// Returns the checkpoint stage, if the event was recorded at one.
    #[must_use]
    pub fn checkpoint_stage(&self) -> Option<CheckpointStage> {
        self.checkpoint_stage
    }

    /// Returns the observation time.
    #[must_use]
    pub fn event_timestamp(&self) -> DateTime<Utc> {
        self.event_timestamp
    }

    /// Returns the outcome.
    #[must_use]
    pub fn status(&self) -> AuditStatus {
        self.status
    }

    /// Returns the summary message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the encoded details payload.
    #[must_use]
    pub fn details_payload(&self) -> Option<&str> {
        self.details_payload.as_deref()
    }

    /// Decodes the details payload.
    pub fn details(&self) -> AppResult<Option<DetailsPayload>> {
        self.details_payload
            .as_deref()
            .map(decode_details)
            .transpose()
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    })
}
