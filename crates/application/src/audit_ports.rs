use async_trait::async_trait;
use pipeaudit_core::{AppResult, CorrelationId};
use pipeaudit_domain::{AuditEvent, AuditStatus, CheckpointStage};

/// Port for the append-only, ordered audit event store.
///
/// Appends are not idempotent: a write retried after an ambiguous failure may
/// leave a duplicate event behind.
#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    /// Durably persists one audit event.
    async fn append(&self, event: AuditEvent) -> AppResult<()>;

    /// Lists every event of one run ordered by event timestamp ascending.
    async fn list_by_correlation_id(
        &self,
        correlation_id: CorrelationId,
    ) -> AppResult<Vec<AuditEvent>>;

    /// Lists events emitted by one source system at one checkpoint.
    async fn list_by_source_system_and_checkpoint(
        &self,
        source_system: &str,
        stage: CheckpointStage,
    ) -> AppResult<Vec<AuditEvent>>;

    /// Lists events emitted by one module with one status.
    async fn list_by_module_and_status(
        &self,
        module_name: &str,
        status: AuditStatus,
    ) -> AppResult<Vec<AuditEvent>>;

    /// Counts events of one run with one status.
    async fn count_by_correlation_id_and_status(
        &self,
        correlation_id: CorrelationId,
        status: AuditStatus,
    ) -> AppResult<u64>;
}
