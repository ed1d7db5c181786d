//! Domain entities and invariants for the pipeline audit trail.

#![forbid(unsafe_code)]

mod audit_event;
mod checkpoint;
pub mod details;
mod discrepancy;
mod report;

pub use audit_event::{AuditEvent, AuditEventInput, AuditStatus};
pub use checkpoint::CheckpointStage;
pub use details::DetailsPayload;
pub use discrepancy::{
    DataDiscrepancy, DataDiscrepancyInput, DiscrepancySeverity, DiscrepancyStatus,
    DiscrepancyType, MEDIUM_SEVERITY_MAX_DIFFERENCE,
};
pub use report::{
    CheckpointSummary, CheckpointTiming, PerformanceMetrics, ReconciliationDetail,
    ReconciliationReport, ReconciliationStandard, ReconciliationStatus, ReconciliationSummary,
    ReconciliationView, ReportDetailLevel,
};
