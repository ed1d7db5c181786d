use async_trait::async_trait;
use pipeaudit_application::AuditEventRepository;
use pipeaudit_core::{AppError, AppResult, CorrelationId};
use pipeaudit_domain::{AuditEvent, AuditStatus, CheckpointStage};
use tokio::sync::RwLock;

/// In-memory audit event repository for local runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditEventRepository {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditEventRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }

    async fn select(&self, predicate: impl Fn(&AuditEvent) -> bool) -> Vec<AuditEvent> {
        let mut values: Vec<AuditEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|event| predicate(event))
            .cloned()
            .collect();
        values.sort_by(|left, right| {
            left.event_timestamp()
                .cmp(&right.event_timestamp())
                .then_with(|| left.audit_id().cmp(&right.audit_id()))
        });
        values
    }
}

#[async_trait]
impl AuditEventRepository for InMemoryAuditEventRepository {
    async fn append(&self, event: AuditEvent) -> AppResult<()> {
        let mut events = self.events.write().await;

        if events
            .iter()
            .any(|stored| stored.audit_id() == event.audit_id())
        {
            return Err(AppError::Storage(format!(
                "audit event '{}' violates unique audit_id constraint",
                event.audit_id()
            )));
        }

        events.push(event);
        Ok(())
    }

    async fn list_by_correlation_id(
        &self,
        correlation_id: CorrelationId,
    ) -> AppResult<Vec<AuditEvent>> {
        Ok(self
            .select(|event| event.correlation_id() == correlation_id)
            .await)
    }

    async fn list_by_source_system_and_checkpoint(
        &self,
        source_system: &str,
        stage: CheckpointStage,
    ) -> AppResult<Vec<AuditEvent>> {
        Ok(self
            .select(|event| {
                event.source_system() == source_system && event.checkpoint_stage() == Some(stage)
            })
            .await)
    }

    async fn list_by_module_and_status(
        &self,
        module_name: &str,
        status: AuditStatus,
    ) -> AppResult<Vec<AuditEvent>> {
        Ok(self
            .select(|event| event.module_name() == Some(module_name) && event.status() == status)
            .await)
    }

    async fn count_by_correlation_id_and_status(
        &self,
        correlation_id: CorrelationId,
        status: AuditStatus,
    ) -> AppResult<u64> {
        let events = self.events.read().await;
        let count = events
            .iter()
            .filter(|event| event.correlation_id() == correlation_id && event.status() == status)
            .count();

        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}
