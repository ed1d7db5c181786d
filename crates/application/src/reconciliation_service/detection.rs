use std::cmp::Ordering;
use std::collections::BTreeMap;

use pipeaudit_core::CorrelationId;
use pipeaudit_domain::{
    AuditStatus, CheckpointStage, CheckpointSummary, DataDiscrepancy, DataDiscrepancyInput,
    DiscrepancySeverity, DiscrepancyType, ReconciliationStatus,
};

use super::aggregation::Aggregation;

/// Runs every check over an aggregated trail and returns discrepancies in canonical order.
pub(super) fn detect(
    correlation_id: CorrelationId,
    aggregation: &Aggregation,
    control_total_epsilon: f64,
) -> Vec<DataDiscrepancy> {
    let mut discrepancies = Vec::new();

    let reached: Vec<&CheckpointSummary> = CheckpointStage::reconciled()
        .iter()
        .filter_map(|stage| aggregation.checkpoint(*stage))
        .filter(|checkpoint| checkpoint.has_events())
        .collect();

    // Stages that carry no count or total are skipped, not treated as a break in the chain.
    let mut last_counted: Option<(&CheckpointSummary, u64)> = None;
    let mut last_totalled: Option<(&CheckpointSummary, f64)> = None;

    for downstream in reached {
        if let Some(actual) = downstream.record_count {
            if let Some((upstream, expected)) = last_counted
                && expected != actual
            {
                discrepancies.push(DataDiscrepancy::new(DataDiscrepancyInput {
                    correlation_id,
                    discrepancy_type: DiscrepancyType::RecordCountMismatch,
                    source_checkpoint: Some(upstream.stage),
                    target_checkpoint: downstream.stage,
                    key_identifier: None,
                    expected_value: expected.to_string(),
                    actual_value: actual.to_string(),
                    description: format!(
                        "{} reported {expected} records but {} reported {actual}",
                        upstream.stage.as_str(),
                        downstream.stage.as_str()
                    ),
                }));
            }
            last_counted = Some((downstream, actual));
        }

        if let Some(actual) = downstream.control_total {
            if let Some((upstream, expected)) = last_totalled
                && (expected - actual).abs() > control_total_epsilon
            {
                discrepancies.push(DataDiscrepancy::new(DataDiscrepancyInput {
                    correlation_id,
                    discrepancy_type: DiscrepancyType::ControlTotalMismatch,
                    source_checkpoint: Some(upstream.stage),
                    target_checkpoint: downstream.stage,
                    key_identifier: None,
                    expected_value: expected.to_string(),
                    actual_value: actual.to_string(),
                    description: format!(
                        "control total moved from {expected} at {} to {actual} at {}",
                        upstream.stage.as_str(),
                        downstream.stage.as_str()
                    ),
                }));
            }
            last_totalled = Some((downstream, actual));
        }
    }

    discrepancies.extend(missing_stages(correlation_id, aggregation));

    for failed in &aggregation.failed_events {
        let subject = failed.key_identifier.as_deref().unwrap_or("unidentified input");
        discrepancies.push(DataDiscrepancy::new(DataDiscrepancyInput {
            correlation_id,
            discrepancy_type: DiscrepancyType::DataIntegrityViolation,
            source_checkpoint: None,
            target_checkpoint: failed.stage,
            key_identifier: failed.key_identifier.clone(),
            expected_value: AuditStatus::Success.as_str().to_owned(),
            actual_value: AuditStatus::Failure.as_str().to_owned(),
            description: match failed.message.as_deref() {
                Some(message) => format!(
                    "{} failed for {subject}: {message}",
                    failed.stage.as_str()
                ),
                None => format!("{} failed for {subject}", failed.stage.as_str()),
            },
        }));
    }

    for unreadable in &aggregation.unreadable_payloads {
        discrepancies.push(DataDiscrepancy::new(DataDiscrepancyInput {
            correlation_id,
            discrepancy_type: DiscrepancyType::DataFormatError,
            source_checkpoint: None,
            target_checkpoint: unreadable.stage,
            key_identifier: unreadable.key_identifier.clone(),
            expected_value: "decodable details payload".to_owned(),
            actual_value: "undecodable details payload".to_owned(),
            description: format!(
                "details payload at {} could not be read: {}",
                unreadable.stage.as_str(),
                unreadable.reason
            ),
        }));
    }

    discrepancies.sort_by(canonical_order);
    discrepancies
}

/// Reconciled stages without events that sit between two stages with events.
fn missing_stages(
    correlation_id: CorrelationId,
    aggregation: &Aggregation,
) -> Vec<DataDiscrepancy> {
    let stages = CheckpointStage::reconciled();
    let mut missing = Vec::new();

    for (index, stage) in stages.iter().enumerate() {
        if aggregation.has_events(*stage) {
            continue;
        }

        let previous = stages[..index]
            .iter()
            .rev()
            .find(|candidate| aggregation.has_events(**candidate));
        let reached_later = stages[index + 1..]
            .iter()
            .any(|candidate| aggregation.has_events(*candidate));

        if let Some(previous) = previous
            && reached_later
        {
            missing.push(DataDiscrepancy::new(DataDiscrepancyInput {
                correlation_id,
                discrepancy_type: DiscrepancyType::MissingAuditEvents,
                source_checkpoint: Some(*previous),
                target_checkpoint: *stage,
                key_identifier: None,
                expected_value: "at least one event".to_owned(),
                actual_value: "no events".to_owned(),
                description: format!(
                    "no audit events at {} although {} and later stages recorded events",
                    stage.as_str(),
                    previous.as_str()
                ),
            }));
        }
    }

    missing
}

fn canonical_order(left: &DataDiscrepancy, right: &DataDiscrepancy) -> Ordering {
    left.discrepancy_type()
        .cmp(&right.discrepancy_type())
        .then_with(|| left.source_checkpoint().cmp(&right.source_checkpoint()))
        .then_with(|| left.target_checkpoint().cmp(&right.target_checkpoint()))
        .then_with(|| left.key_identifier().cmp(&right.key_identifier()))
        .then_with(|| left.expected_value().cmp(right.expected_value()))
        .then_with(|| left.actual_value().cmp(right.actual_value()))
        .then_with(|| left.description().cmp(right.description()))
}

/// Ranks two discrepancies of one group; the greater one wins the roll-up.
///
/// Larger numeric difference first, non-numeric lowest, then severity, then
/// key identifier.
fn roll_up_rank(left: &DataDiscrepancy, right: &DataDiscrepancy) -> Ordering {
    let by_difference = match (left.difference(), right.difference()) {
        (Some(left), Some(right)) => left.total_cmp(&right),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    };

    by_difference
        .then_with(|| left.severity().cmp(&right.severity()))
        .then_with(|| right.key_identifier().cmp(&left.key_identifier()))
}

/// Picks one winner per (type, source, target) group and returns the worst winner severity.
pub(super) fn rolled_up_severity(discrepancies: &[DataDiscrepancy]) -> Option<DiscrepancySeverity> {
    type GroupKey = (DiscrepancyType, Option<CheckpointStage>, CheckpointStage);

    let mut winners: BTreeMap<GroupKey, &DataDiscrepancy> = BTreeMap::new();
    for discrepancy in discrepancies {
        let key = (
            discrepancy.discrepancy_type(),
            discrepancy.source_checkpoint(),
            discrepancy.target_checkpoint(),
        );
        winners
            .entry(key)
            .and_modify(|current| {
                if roll_up_rank(discrepancy, *current) == Ordering::Greater {
                    *current = discrepancy;
                }
            })
            .or_insert(discrepancy);
    }

    winners.values().map(|winner| winner.severity()).max()
}

/// Derives the run verdict from the aggregation and rolled-up severity.
pub(super) fn overall_status(
    aggregation: &Aggregation,
    discrepancies: &[DataDiscrepancy],
    highest_severity: Option<DiscrepancySeverity>,
) -> ReconciliationStatus {
    if aggregation.total_events == 0 {
        return ReconciliationStatus::Unknown;
    }

    if highest_severity == Some(DiscrepancySeverity::High) {
        return ReconciliationStatus::Failure;
    }

    if !discrepancies.is_empty() {
        return ReconciliationStatus::Warning;
    }

    let loader_pending = aggregation.has_events(CheckpointStage::SqlloaderStart)
        && !aggregation.has_events(CheckpointStage::SqlloaderComplete)
        && !aggregation.has_events(CheckpointStage::LogicApplied)
        && !aggregation.has_events(CheckpointStage::FileGenerated);
    if loader_pending {
        return ReconciliationStatus::InProgress;
    }

    let any_count = aggregation
        .checkpoints
        .iter()
        .any(|checkpoint| checkpoint.record_count.is_some());
    if !any_count {
        return ReconciliationStatus::Unknown;
    }

    ReconciliationStatus::Success
}
