use std::collections::BTreeMap;

use pipeaudit_domain::details::{control_total, record_count};
use pipeaudit_domain::{AuditEvent, AuditStatus, CheckpointStage, CheckpointSummary};

/// Event whose status was `FAILURE`.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct FailedEvent {
    pub stage: CheckpointStage,
    pub key_identifier: Option<String>,
    pub message: Option<String>,
}

/// Event whose details payload could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct UnreadablePayload {
    pub stage: CheckpointStage,
    pub key_identifier: Option<String>,
    pub reason: String,
}

/// Per-stage roll-up of a trail.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Aggregation {
    pub total_events: u64,
    pub checkpoints: Vec<CheckpointSummary>,
    pub failed_events: Vec<FailedEvent>,
    pub unreadable_payloads: Vec<UnreadablePayload>,
}

impl Aggregation {
    pub fn checkpoint(&self, stage: CheckpointStage) -> Option<&CheckpointSummary> {
        self.checkpoints
            .iter()
            .find(|checkpoint| checkpoint.stage == stage)
    }

    pub fn has_events(&self, stage: CheckpointStage) -> bool {
        self.checkpoint(stage)
            .is_some_and(CheckpointSummary::has_events)
    }
}

/// Count and total observations at one stage.
///
/// Events sharing a key identifier re-observe the same unit of work, so the
/// latest value per key wins. Distinct keys and unkeyed events are summed.
#[derive(Debug, Default)]
struct StageMetrics {
    keyed_counts: BTreeMap<String, u64>,
    unkeyed_count: Option<u64>,
    keyed_totals: BTreeMap<String, f64>,
    unkeyed_total: Option<f64>,
}

impl StageMetrics {
    fn observe(&mut self, key_identifier: Option<&str>, count: Option<u64>, total: Option<f64>) {
        match key_identifier {
            Some(key) => {
                if let Some(count) = count {
                    self.keyed_counts.insert(key.to_owned(), count);
                }
                if let Some(total) = total {
                    self.keyed_totals.insert(key.to_owned(), total);
                }
            }
            None => {
                if let Some(count) = count {
                    self.unkeyed_count = Some(self.unkeyed_count.unwrap_or(0).saturating_add(count));
                }
                if let Some(total) = total {
                    self.unkeyed_total = Some(self.unkeyed_total.unwrap_or(0.0) + total);
                }
            }
        }
    }

    fn record_count(&self) -> Option<u64> {
        if self.keyed_counts.is_empty() && self.unkeyed_count.is_none() {
            return None;
        }
        Some(
            self.keyed_counts
                .values()
                .fold(self.unkeyed_count.unwrap_or(0), |sum, count| {
                    sum.saturating_add(*count)
                }),
        )
    }

    fn control_total(&self) -> Option<f64> {
        if self.keyed_totals.is_empty() && self.unkeyed_total.is_none() {
            return None;
        }
        Some(self.keyed_totals.values().sum::<f64>() + self.unkeyed_total.unwrap_or(0.0))
    }
}

/// Groups `events` by stage. Events must already be in canonical order.
pub(super) fn aggregate(events: &[AuditEvent]) -> Aggregation {
    let mut summaries: BTreeMap<CheckpointStage, CheckpointSummary> = CheckpointStage::all()
        .iter()
        .map(|stage| (*stage, CheckpointSummary::empty(*stage)))
        .collect();
    let mut metrics: BTreeMap<CheckpointStage, StageMetrics> = BTreeMap::new();
    let mut failed_events = Vec::new();
    let mut unreadable_payloads = Vec::new();

    for event in events {
        let Some(stage) = event.checkpoint_stage() else {
            continue;
        };
        let summary = summaries
            .entry(stage)
            .or_insert_with(|| CheckpointSummary::empty(stage));

        summary.event_count += 1;
        match event.status() {
            AuditStatus::Success => summary.success_count += 1,
            AuditStatus::Warning => summary.warning_count += 1,
            AuditStatus::Failure => {
                summary.failure_count += 1;
                failed_events.push(FailedEvent {
                    stage,
                    key_identifier: event.key_identifier().map(str::to_owned),
                    message: event.message().map(str::to_owned),
                });
            }
        }

        let timestamp = event.event_timestamp();
        summary.first_event_at = Some(
            summary
                .first_event_at
                .map_or(timestamp, |first| first.min(timestamp)),
        );
        summary.last_event_at = Some(
            summary
                .last_event_at
                .map_or(timestamp, |last| last.max(timestamp)),
        );

        match event.details() {
            Ok(Some(details)) => metrics.entry(stage).or_default().observe(
                event.key_identifier(),
                record_count(&details),
                control_total(&details),
            ),
            Ok(None) => {}
            Err(error) => unreadable_payloads.push(UnreadablePayload {
                stage,
                key_identifier: event.key_identifier().map(str::to_owned),
                reason: error.to_string(),
            }),
        }
    }

    for (stage, observed) in &metrics {
        if let Some(summary) = summaries.get_mut(stage) {
            summary.record_count = observed.record_count();
            summary.control_total = observed.control_total();
        }
    }

    Aggregation {
        total_events: u64::try_from(events.len()).unwrap_or(u64::MAX),
        checkpoints: summaries.into_values().collect(),
        failed_events,
        unreadable_payloads,
    }
}
