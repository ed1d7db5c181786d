//! On-demand reconciliation of one pipeline run's audit trail.

use std::sync::Arc;

use pipeaudit_core::{AppError, AppResult, CorrelationId};
use pipeaudit_domain::{AuditEvent, ReconciliationReport, ReconciliationView, ReportDetailLevel};
use tracing::info;

use crate::{AuditEventRepository, CorrelationContext, RetryPolicy};

mod aggregation;
mod detection;


/// Default tolerance when comparing control totals.
pub const DEFAULT_CONTROL_TOTAL_EPSILON: f64 = 0.01;

/// Reconciliation tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconciliationConfig {
    control_total_epsilon: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            control_total_epsilon: DEFAULT_CONTROL_TOTAL_EPSILON,
        }
    }
}

impl ReconciliationConfig {
    /// Creates a validated configuration.
    pub fn new(control_total_epsilon: f64) -> AppResult<Self> {
        if !control_total_epsilon.is_finite() || control_total_epsilon < 0.0 {
            return Err(AppError::Configuration(format!(
                "control total epsilon must be a finite non-negative number, got {control_total_epsilon}"
            )));
        }

        Ok(Self {
            control_total_epsilon,
        })
    }

    /// Returns the control total tolerance.
    #[must_use]
    pub fn control_total_epsilon(&self) -> f64 {
        self.control_total_epsilon
    }
}

/// Cross-checks counts and totals between checkpoints of one run.
#[derive(Clone)]
pub struct ReconciliationService {
    repository: Arc<dyn AuditEventRepository>,
    retry_policy: RetryPolicy,
    config: ReconciliationConfig,
}

impl ReconciliationService {
    /// Creates a reconciliation service reading through the quick retry tier.
    #[must_use]
    pub fn new(repository: Arc<dyn AuditEventRepository>) -> Self {
        Self {
            repository,
            retry_policy: RetryPolicy::quick(),
            config: ReconciliationConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconciliationConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the retry policy used for reads.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Reconciles the trail of `correlation_id`. An empty trail yields an `UNKNOWN` report.
    pub async fn reconcile(&self, correlation_id: CorrelationId) -> AppResult<ReconciliationReport> {
        let repository = Arc::clone(&self.repository);
        let events = self
            .retry_policy
            .execute("list_audit_trail", || {
                let repository = Arc::clone(&repository);
                async move { repository.list_by_correlation_id(correlation_id).await }
            })
            .await?;

        let report = self.analyze(correlation_id, events);

        info!(
            correlation_id = %correlation_id,
            overall_status = report.overall_status.as_str(),
            total_events = report.total_events,
            discrepancy_count = report.discrepancies.len(),
            "reconciliation completed"
        );

        Ok(report)
    }

    /// Parses a transport identifier and reconciles its trail.
    pub async fn reconcile_transport(&self, correlation_id: &str) -> AppResult<ReconciliationReport> {
        let correlation_id = CorrelationId::parse(correlation_id)?;
        self.reconcile(correlation_id).await
    }

    /// Reconciles the run bound to the calling task.
    pub async fn reconcile_current(&self) -> AppResult<ReconciliationReport> {
        let correlation_id = CorrelationContext::current().ok_or_else(|| {
            AppError::Validation("no correlation id is bound to the running task".to_owned())
        })?;
        self.reconcile(correlation_id).await
    }

    /// Reconciles and projects the report at `level`.
    pub async fn reconcile_view(
        &self,
        correlation_id: CorrelationId,
        level: ReportDetailLevel,
    ) -> AppResult<ReconciliationView> {
        Ok(self.reconcile(correlation_id).await?.project(level))
    }

    /// Builds a report from an already loaded trail without touching the store.
    #[must_use]
    pub fn analyze(
        &self,
        correlation_id: CorrelationId,
        mut events: Vec<AuditEvent>,
    ) -> ReconciliationReport {
        events.sort_by(|left, right| {
            left.event_timestamp()
                .cmp(&right.event_timestamp())
                .then_with(|| left.audit_id().cmp(&right.audit_id()))
        });

        let aggregation = aggregation::aggregate(&events);
        let discrepancies =
            detection::detect(correlation_id, &aggregation, self.config.control_total_epsilon);
        let highest_severity = detection::rolled_up_severity(&discrepancies);
        let overall_status =
            detection::overall_status(&aggregation, &discrepancies, highest_severity);

        ReconciliationReport {
            correlation_id,
            overall_status,
            total_events: aggregation.total_events,
            checkpoints: aggregation.checkpoints,
            discrepancies,
            highest_severity,
        }
    }
}
