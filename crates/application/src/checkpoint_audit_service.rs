//! Validated write path into the audit store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pipeaudit_core::{AppError, AppResult, AuditId, CorrelationId};
use pipeaudit_domain::details::{encode_details, negative_metric_fields};
use pipeaudit_domain::{AuditEvent, AuditEventInput, AuditStatus, CheckpointStage, DetailsPayload};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{AuditEventRepository, CorrelationContext, RetryPolicy};

mod details;
mod messages;


pub use details::{
    BusinessRuleDetails, FileGenerationDetails, FileTransferDetails, LoaderOperationDetails,
    LoaderPhase,
};

/// Default payload size above which a warning is logged.
pub const DEFAULT_PAYLOAD_WARN_BYTES: usize = 10 * 1024;

/// Recorder tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Encoded payload size that triggers a warning. Payloads are never rejected for size.
    pub payload_warn_bytes: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            payload_warn_bytes: DEFAULT_PAYLOAD_WARN_BYTES,
        }
    }
}

/// Caller-supplied draft of an audit event; absent fields are validated or filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewAuditEvent {
    /// Generated when absent.
    pub audit_id: Option<AuditId>,
    /// Required.
    pub correlation_id: Option<CorrelationId>,
    /// Required and non-blank.
    pub source_system: Option<String>,
    /// Emitting module.
    pub module_name: Option<String>,
    /// Emitting process.
    pub process_name: Option<String>,
    /// Lineage source entity.
    pub source_entity: Option<String>,
    /// Lineage destination entity.
    pub destination_entity: Option<String>,
    /// Business key.
    pub key_identifier: Option<String>,
    /// Checkpoint reached.
    pub checkpoint_stage: Option<CheckpointStage>,
    /// Defaults to the current time.
    pub event_timestamp: Option<DateTime<Utc>>,
    /// Required.
    pub status: Option<AuditStatus>,
    /// Synthesized from stage, key and status when absent.
    pub message: Option<String>,
    /// Structured details.
    pub details: Option<DetailsPayload>,
}

/// Fields shared by the checkpoint-specific helpers.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointContext {
    /// Falls back to the task's bound correlation id when absent.
    pub correlation_id: Option<CorrelationId>,
    /// Originating system.
    pub source_system: String,
    /// Emitting module.
    pub module_name: Option<String>,
    /// Emitting process; also selects the loader phase.
    pub process_name: Option<String>,
    /// Lineage source entity.
    pub source_entity: Option<String>,
    /// Lineage destination entity.
    pub destination_entity: Option<String>,
    /// Overrides the key derived from the details.
    pub key_identifier: Option<String>,
    /// Outcome.
    pub status: AuditStatus,
    /// Overrides the synthesized message.
    pub message: Option<String>,
    /// Overrides the recording time.
    pub event_timestamp: Option<DateTime<Utc>>,
}

impl CheckpointContext {
    /// Creates a context with only the required fields set.
    #[must_use]
    pub fn new(source_system: impl Into<String>, status: AuditStatus) -> Self {
        Self {
            correlation_id: None,
            source_system: source_system.into(),
            module_name: None,
            process_name: None,
            source_entity: None,
            destination_entity: None,
            key_identifier: None,
            status,
            message: None,
            event_timestamp: None,
        }
    }
}

/// Sole write path for audit events.
#[derive(Clone)]
pub struct CheckpointAuditService {
    repository: Arc<dyn AuditEventRepository>,
    retry_policy: RetryPolicy,
    config: RecorderConfig,
}

impl CheckpointAuditService {
    /// Creates a recorder using the default retry tier.
    #[must_use]
    pub fn new(repository: Arc<dyn AuditEventRepository>) -> Self {
        Self {
            repository,
            retry_policy: RetryPolicy::default_tier(),
            config: RecorderConfig::default(),
        }
    }

    /// Replaces the retry policy used for writes.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Replaces the recorder configuration.
    #[must_use]
    pub fn with_config(mut self, config: RecorderConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates, completes and persists one audit event.
    pub async fn record(&self, draft: NewAuditEvent) -> AppResult<AuditEvent> {
        let correlation_id = draft.correlation_id.ok_or_else(|| {
            AppError::Validation("audit event correlation_id is required".to_owned())
        })?;
        let source_system = draft
            .source_system
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                AppError::Validation("audit event source_system is required".to_owned())
            })?;
        let status = draft
            .status
            .ok_or_else(|| AppError::Validation("audit event status is required".to_owned()))?;

        let details_payload = match draft.details.as_ref() {
            Some(details) => Some(self.encode_payload(correlation_id, details)?),
            None => None,
        };

        let message = draft.message.filter(|value| !value.trim().is_empty()).unwrap_or_else(|| {
            messages::default_message(
                draft.checkpoint_stage,
                draft.key_identifier.as_deref(),
                status,
            )
        });

        let event = AuditEvent::new(AuditEventInput {
            audit_id: draft.audit_id.unwrap_or_else(AuditId::new),
            correlation_id,
            source_system,
            module_name: draft.module_name,
            process_name: draft.process_name,
            source_entity: draft.source_entity,
            destination_entity: draft.destination_entity,
            key_identifier: draft.key_identifier,
            checkpoint_stage: draft.checkpoint_stage,
            event_timestamp: draft.event_timestamp.unwrap_or_else(Utc::now),
            status,
            message: Some(message),
            details_payload,
        })?;

        self.persist(&event).await?;

        info!(
            correlation_id = %event.correlation_id(),
            audit_id = %event.audit_id(),
            checkpoint_stage = event.checkpoint_stage().map(|stage| stage.as_str()),
            status = event.status().as_str(),
            "audit event recorded"
        );

        Ok(event)
    }

    /// Records a landed source file at `RHEL_LANDING`.
    pub async fn record_file_transfer(
        &self,
        context: CheckpointContext,
        details: &FileTransferDetails,
    ) -> AppResult<AuditEvent> {
        details.validate()?;
        let key = non_blank(&details.file_name);
        self.record_checkpoint(CheckpointStage::RhelLanding, context, key, details)
            .await
    }

    /// Records a loader start or completion, chosen from the process name.
    pub async fn record_loader_operation(
        &self,
        context: CheckpointContext,
        details: &LoaderOperationDetails,
    ) -> AppResult<AuditEvent> {
        details.validate()?;
        let stage = LoaderPhase::from_process_name(context.process_name.as_deref()).stage();
        let key = non_blank(&details.table_name);
        self.record_checkpoint(stage, context, key, details).await
    }

    /// Records a business-rule application at `LOGIC_APPLIED`.
    pub async fn record_business_rule(
        &self,
        context: CheckpointContext,
        details: &BusinessRuleDetails,
    ) -> AppResult<AuditEvent> {
        details.validate()?;
        let key = details
            .entity_id
            .as_deref()
            .and_then(non_blank)
            .or_else(|| non_blank(&details.rule_name));
        self.record_checkpoint(CheckpointStage::LogicApplied, context, key, details)
            .await
    }

    /// Records output file production at `FILE_GENERATED`.
    pub async fn record_file_generation(
        &self,
        context: CheckpointContext,
        details: &FileGenerationDetails,
    ) -> AppResult<AuditEvent> {
        details.validate()?;
        let key = non_blank(&details.file_name);
        self.record_checkpoint(CheckpointStage::FileGenerated, context, key, details)
            .await
    }

    /// Serializes `details` into a payload and records it at `stage`.
    ///
    /// `default_key` is used when the context carries no key identifier.
    pub async fn record_checkpoint<T>(
        &self,
        stage: CheckpointStage,
        context: CheckpointContext,
        default_key: Option<&str>,
        details: &T,
    ) -> AppResult<AuditEvent>
    where
        T: Serialize + ?Sized,
    {
        let payload = details::to_payload(details)?;

        let draft = NewAuditEvent {
            audit_id: None,
            correlation_id: context.correlation_id.or_else(CorrelationContext::current),
            source_system: Some(context.source_system),
            module_name: context.module_name,
            process_name: context.process_name,
            source_entity: context.source_entity,
            destination_entity: context.destination_entity,
            key_identifier: context
                .key_identifier
                .or_else(|| default_key.map(str::to_owned)),
            checkpoint_stage: Some(stage),
            event_timestamp: context.event_timestamp,
            status: Some(context.status),
            message: context.message,
            details: Some(payload),
        };

        self.record(draft).await
    }

    fn encode_payload(
        &self,
        correlation_id: CorrelationId,
        details: &DetailsPayload,
    ) -> AppResult<String> {
        let negative = negative_metric_fields(details);
        if !negative.is_empty() {
            return Err(AppError::Validation(format!(
                "details payload metrics must not be negative: {}",
                negative.join(", ")
            )));
        }

        let encoded = encode_details(details)?;
        if encoded.len() > self.config.payload_warn_bytes {
            warn!(
                correlation_id = %correlation_id,
                payload_bytes = encoded.len(),
                threshold_bytes = self.config.payload_warn_bytes,
                "audit details payload exceeds size threshold"
            );
        }

        Ok(encoded)
    }

    async fn persist(&self, event: &AuditEvent) -> AppResult<()> {
        let repository = Arc::clone(&self.repository);

        self.retry_policy
            .execute("append_audit_event", || {
                let repository = Arc::clone(&repository);
                let event = event.clone();
                async move { repository.append(event).await }
            })
            .await
            .map_err(|error| {
                debug!(
                    correlation_id = %event.correlation_id(),
                    error_code = error.code(),
                    "audit event could not be persisted"
                );
                into_persistence_error(error)
            })
    }
}

fn into_persistence_error(error: AppError) -> AppError {
    match error {
        AppError::Storage(_) | AppError::RetryExhausted { .. } => error,
        AppError::Validation(_)
        | AppError::Serialization(_)
        | AppError::Configuration(_)
        | AppError::Correlation(_)
        | AppError::Internal(_) => {
            AppError::Storage(format!("audit event append failed: {error}"))
        }
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
