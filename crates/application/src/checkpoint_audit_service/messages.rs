use pipeaudit_domain::{AuditStatus, CheckpointStage};

/// Synthesizes the summary stored when the caller supplies none.
pub(super) fn default_message(
    stage: Option<CheckpointStage>,
    subject: Option<&str>,
    status: AuditStatus,
) -> String {
    let subject = subject.unwrap_or("unknown");

    match stage {
        Some(CheckpointStage::RhelLanding) => match status {
            AuditStatus::Success => format!("File {subject} landed successfully"),
            AuditStatus::Warning => format!("File {subject} landed with warnings"),
            AuditStatus::Failure => format!("File {subject} failed to land"),
        },
        Some(CheckpointStage::SqlloaderStart) => match status {
            AuditStatus::Success => format!("Load into {subject} started"),
            AuditStatus::Warning => format!("Load into {subject} started with warnings"),
            AuditStatus::Failure => format!("Load into {subject} failed to start"),
        },
        Some(CheckpointStage::SqlloaderComplete) => match status {
            AuditStatus::Success => format!("Load into {subject} completed successfully"),
            AuditStatus::Warning => format!("Load into {subject} completed with warnings"),
            AuditStatus::Failure => format!("Load into {subject} failed"),
        },
        Some(CheckpointStage::LogicApplied) => match status {
            AuditStatus::Success => format!("Business rules applied to {subject}"),
            AuditStatus::Warning => format!("Business rules applied to {subject} with warnings"),
            AuditStatus::Failure => format!("Business rules failed for {subject}"),
        },
        Some(CheckpointStage::FileGenerated) => match status {
            AuditStatus::Success => format!("Output file {subject} generated successfully"),
            AuditStatus::Warning => format!("Output file {subject} generated with warnings"),
            AuditStatus::Failure => format!("Output file {subject} generation failed"),
        },
        None => match status {
            AuditStatus::Success => format!("Audit event for {subject} succeeded"),
            AuditStatus::Warning => format!("Audit event for {subject} raised warnings"),
            AuditStatus::Failure => format!("Audit event for {subject} failed"),
        },
    }
}
