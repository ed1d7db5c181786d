use std::collections::BTreeMap;
use std::sync::Arc;

use pipeaudit_core::{AppResult, CorrelationId};
use pipeaudit_domain::{AuditEvent, AuditStatus, CheckpointStage};
use serde::{Deserialize, Serialize};

use crate::{AuditEventRepository, RetryPolicy};

/// Per-status event counts for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStatusBreakdown {
    /// Run counted.
    pub correlation_id: CorrelationId,
    /// Events per status; every status is present.
    pub counts: BTreeMap<AuditStatus, u64>,
    /// Sum over all statuses.
    pub total: u64,
}

/// Read-side queries over the audit trail.
#[derive(Clone)]
pub struct AuditTrailService {
    repository: Arc<dyn AuditEventRepository>,
    retry_policy: RetryPolicy,
}

impl AuditTrailService {
    /// Creates a query service reading through the quick retry tier.
    #[must_use]
    pub fn new(repository: Arc<dyn AuditEventRepository>) -> Self {
        Self {
            repository,
            retry_policy: RetryPolicy::quick(),
        }
    }

    /// Returns every event of one run ordered by timestamp.
    pub async fn trail(&self, correlation_id: CorrelationId) -> AppResult<Vec<AuditEvent>> {
        let repository = Arc::clone(&self.repository);
        self.retry_policy
            .execute("list_audit_trail", || {
                let repository = Arc::clone(&repository);
                async move { repository.list_by_correlation_id(correlation_id).await }
            })
            .await
    }

    /// Returns events from one source system at one checkpoint.
    pub async fn events_for_checkpoint(
        &self,
        source_system: &str,
        stage: CheckpointStage,
    ) -> AppResult<Vec<AuditEvent>> {
        let repository = Arc::clone(&self.repository);
        self.retry_policy
            .execute("list_checkpoint_events", || {
                let repository = Arc::clone(&repository);
                async move {
                    repository
                        .list_by_source_system_and_checkpoint(source_system, stage)
                        .await
                }
            })
            .await
    }

    /// Returns events from one module with one status.
    pub async fn events_for_module(
        &self,
        module_name: &str,
        status: AuditStatus,
    ) -> AppResult<Vec<AuditEvent>> {
        let repository = Arc::clone(&self.repository);
        self.retry_policy
            .execute("list_module_events", || {
                let repository = Arc::clone(&repository);
                async move { repository.list_by_module_and_status(module_name, status).await }
            })
            .await
    }

    /// Counts events of one run with one status.
    pub async fn count_by_status(
        &self,
        correlation_id: CorrelationId,
        status: AuditStatus,
    ) -> AppResult<u64> {
        let repository = Arc::clone(&self.repository);
        self.retry_policy
            .execute("count_audit_events", || {
                let repository = Arc::clone(&repository);
                async move {
                    repository
                        .count_by_correlation_id_and_status(correlation_id, status)
                        .await
                }
            })
            .await
    }

    /// Counts events of one run for every status.
    pub async fn status_breakdown(
        &self,
        correlation_id: CorrelationId,
    ) -> AppResult<AuditStatusBreakdown> {
        let mut counts = BTreeMap::new();
        for status in AuditStatus::all() {
            counts.insert(*status, self.count_by_status(correlation_id, *status).await?);
        }
        let total = counts.values().sum();

        Ok(AuditStatusBreakdown {
            correlation_id,
            counts,
            total,
        })
    }
}
