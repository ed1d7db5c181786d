//! Application services and ports for the pipeline audit trail.

#![forbid(unsafe_code)]

mod audit_ports;
mod audit_trail_service;
mod checkpoint_audit_service;
mod correlation_context;
mod reconciliation_service;
mod retry_policy;

#[cfg(test)]
mod test_support;

pub use audit_ports::AuditEventRepository;
pub use audit_trail_service::{AuditStatusBreakdown, AuditTrailService};
pub use checkpoint_audit_service::{
    BusinessRuleDetails, CheckpointAuditService, CheckpointContext, DEFAULT_PAYLOAD_WARN_BYTES,
    FileGenerationDetails, FileTransferDetails, LoaderOperationDetails, LoaderPhase,
    NewAuditEvent, RecorderConfig,
};
pub use correlation_context::CorrelationContext;
pub use reconciliation_service::{
    DEFAULT_CONTROL_TOTAL_EPSILON, ReconciliationConfig, ReconciliationService,
};
pub use retry_policy::{RetryPolicy, RetryTier};
