use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use pipeaudit_core::{AppError, CorrelationId};
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointStage;
use crate::discrepancy::{DataDiscrepancy, DiscrepancySeverity};

/// Overall verdict for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    /// No discrepancies.
    Success,
    /// Only low or medium discrepancies.
    Warning,
    /// At least one high discrepancy.
    Failure,
    /// The loader started and nothing downstream has been recorded yet.
    InProgress,
    /// Trail is empty or carries no comparable data.
    Unknown,
}

impl ReconciliationStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Failure => "FAILURE",
            Self::InProgress => "IN_PROGRESS",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Presentation variant of a reconciliation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportDetailLevel {
    /// Top-line metrics only.
    Summary,
    /// Counts, totals and discrepancy count.
    #[default]
    Standard,
    /// Everything, including timing and performance metrics.
    Detailed,
}

impl FromStr for ReportDetailLevel {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "summary" => Ok(Self::Summary),
            "standard" => Ok(Self::Standard),
            "detailed" => Ok(Self::Detailed),
            other => Err(AppError::Validation(format!(
                "unknown report detail level '{other}'"
            ))),
        }
    }
}

/// Aggregated observations for one checkpoint stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    /// Stage summarised.
    pub stage: CheckpointStage,
    /// Events recorded at this stage.
    pub event_count: u64,
    /// Events with status SUCCESS.
    pub success_count: u64,
    /// Events with status WARNING.
    pub warning_count: u64,
    /// Events with status FAILURE.
    pub failure_count: u64,
    /// Record count, absent when no event carried one.
    ///
    /// Events with distinct key identifiers are additive partitions and are
    /// summed; repeated events for one key contribute only their latest value.
    pub record_count: Option<u64>,
    /// Control total, aggregated per key identifier like `record_count`.
    pub control_total: Option<f64>,
    /// Earliest event timestamp at this stage.
    pub first_event_at: Option<DateTime<Utc>>,
    /// Latest event timestamp at this stage.
    pub last_event_at: Option<DateTime<Utc>>,
}

impl CheckpointSummary {
    /// Creates a summary for a stage with no events.
    #[must_use]
    pub fn empty(stage: CheckpointStage) -> Self {
        Self {
            stage,
            event_count: 0,
            success_count: 0,
            warning_count: 0,
            failure_count: 0,
            record_count: None,
            control_total: None,
            first_event_at: None,
            last_event_at: None,
        }
    }

    /// Returns whether any event was recorded at this stage.
    #[must_use]
    pub fn has_events(&self) -> bool {
        self.event_count > 0
    }
}

/// Output of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Run reconciled.
    pub correlation_id: CorrelationId,
    /// Overall verdict.
    pub overall_status: ReconciliationStatus,
    /// Events in the trail, including those without a checkpoint stage.
    pub total_events: u64,
    /// One summary per stage, in pipeline order.
    pub checkpoints: Vec<CheckpointSummary>,
    /// Detected discrepancies in deterministic order.
    pub discrepancies: Vec<DataDiscrepancy>,
    /// Worst severity after roll-up, absent without discrepancies.
    pub highest_severity: Option<DiscrepancySeverity>,
}

/// Top-line projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    /// Run reconciled.
    pub correlation_id: CorrelationId,
    /// Overall verdict.
    pub overall_status: ReconciliationStatus,
    /// Events in the trail.
    pub total_events: u64,
    /// Stages with at least one event.
    pub checkpoints_reached: usize,
    /// Number of discrepancies.
    pub discrepancy_count: usize,
    /// Worst severity after roll-up.
    pub highest_severity: Option<DiscrepancySeverity>,
}

/// Counts-and-totals projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationStandard {
    /// Run reconciled.
    pub correlation_id: CorrelationId,
    /// Overall verdict.
    pub overall_status: ReconciliationStatus,
    /// Events in the trail.
    pub total_events: u64,
    /// Record count per stage; zero when absent.
    pub record_counts: BTreeMap<CheckpointStage, u64>,
    /// Control total per stage; null when absent.
    pub control_totals: BTreeMap<CheckpointStage, Option<f64>>,
    /// Number of discrepancies.
    pub discrepancy_count: usize,
    /// Discrepancy count per severity.
    pub discrepancies_by_severity: BTreeMap<DiscrepancySeverity, usize>,
}

/// Timing observed at one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointTiming {
    /// Stage timed.
    pub stage: CheckpointStage,
    /// Earliest event.
    pub first_event_at: Option<DateTime<Utc>>,
    /// Latest event.
    pub last_event_at: Option<DateTime<Utc>>,
    /// Milliseconds between first and last event at this stage.
    pub span_ms: Option<i64>,
    /// Milliseconds since the last event of the previous stage that has events.
    pub since_previous_ms: Option<i64>,
}

/// Metrics derived from the aggregated trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Milliseconds from the first to the last staged event.
    pub total_duration_ms: Option<i64>,
    /// Milliseconds from loader start to loader completion.
    pub loader_duration_ms: Option<i64>,
    /// Record count at the furthest reconciled stage that carries one.
    pub final_record_count: Option<u64>,
    /// Final record count per second of total duration.
    pub throughput_records_per_second: Option<f64>,
    /// Share of staged events with status SUCCESS.
    pub success_rate: f64,
    /// Staged events with status FAILURE.
    pub failure_count: u64,
}

/// Full projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationDetail {
    /// Counts and totals.
    #[serde(flatten)]
    pub standard: ReconciliationStandard,
    /// Every discrepancy.
    pub discrepancies: Vec<DataDiscrepancy>,
    /// Per-stage timing.
    pub checkpoint_timings: Vec<CheckpointTiming>,
    /// Derived performance metrics.
    pub performance: PerformanceMetrics,
}

/// One projection of a report, tagged with its detail level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "detail_level", rename_all = "snake_case")]
pub enum ReconciliationView {
    /// Summary projection.
    Summary(ReconciliationSummary),
    /// Standard projection.
    Standard(ReconciliationStandard),
    /// Detailed projection.
    Detailed(ReconciliationDetail),
}

impl ReconciliationReport {
    /// Returns the projection for the requested detail level.
    #[must_use]
    pub fn project(&self, level: ReportDetailLevel) -> ReconciliationView {
        match level {
            ReportDetailLevel::Summary => ReconciliationView::Summary(self.summary()),
            ReportDetailLevel::Standard => ReconciliationView::Standard(self.standard()),
            ReportDetailLevel::Detailed => ReconciliationView::Detailed(self.detailed()),
        }
    }

    /// Returns the summary projection.
    #[must_use]
    pub fn summary(&self) -> ReconciliationSummary {
        ReconciliationSummary {
            correlation_id: self.correlation_id,
            overall_status: self.overall_status,
            total_events: self.total_events,
            checkpoints_reached: self
                .checkpoints
                .iter()
                .filter(|checkpoint| checkpoint.has_events())
                .count(),
            discrepancy_count: self.discrepancies.len(),
            highest_severity: self.highest_severity,
        }
    }

    /// Returns the standard projection.
    #[must_use]
    pub fn standard(&self) -> ReconciliationStandard {
        let mut discrepancies_by_severity = BTreeMap::new();
        for discrepancy in &self.discrepancies {
            *discrepancies_by_severity
                .entry(discrepancy.severity())
                .or_insert(0_usize) += 1;
        }

        ReconciliationStandard {
            correlation_id: self.correlation_id,
            overall_status: self.overall_status,
            total_events: self.total_events,
            record_counts: self
                .checkpoints
                .iter()
                .map(|checkpoint| (checkpoint.stage, checkpoint.record_count.unwrap_or(0)))
                .collect(),
            control_totals: self
                .checkpoints
                .iter()
                .map(|checkpoint| (checkpoint.stage, checkpoint.control_total))
                .collect(),
            discrepancy_count: self.discrepancies.len(),
            discrepancies_by_severity,
        }
    }

    /// Returns the detailed projection.
    #[must_use]
    pub fn detailed(&self) -> ReconciliationDetail {
        ReconciliationDetail {
            standard: self.standard(),
            discrepancies: self.discrepancies.clone(),
            checkpoint_timings: self.checkpoint_timings(),
            performance: self.performance_metrics(),
        }
    }

    fn checkpoint(&self, stage: CheckpointStage) -> Option<&CheckpointSummary> {
        self.checkpoints
            .iter()
            .find(|checkpoint| checkpoint.stage == stage)
    }

    fn checkpoint_timings(&self) -> Vec<CheckpointTiming> {
        let mut previous_last: Option<DateTime<Utc>> = None;
        let mut timings = Vec::with_capacity(self.checkpoints.len());

        for checkpoint in &self.checkpoints {
            let span_ms = checkpoint
                .first_event_at
                .zip(checkpoint.last_event_at)
                .map(|(first, last)| (last - first).num_milliseconds());
            let since_previous_ms = previous_last
                .zip(checkpoint.first_event_at)
                .map(|(previous, first)| (first - previous).num_milliseconds());

            timings.push(CheckpointTiming {
                stage: checkpoint.stage,
                first_event_at: checkpoint.first_event_at,
                last_event_at: checkpoint.last_event_at,
                span_ms,
                since_previous_ms,
            });

            if checkpoint.last_event_at.is_some() {
                previous_last = checkpoint.last_event_at;
            }
        }

        timings
    }

    fn performance_metrics(&self) -> PerformanceMetrics {
        let first = self
            .checkpoints
            .iter()
            .filter_map(|checkpoint| checkpoint.first_event_at)
            .min();
        let last = self
            .checkpoints
            .iter()
            .filter_map(|checkpoint| checkpoint.last_event_at)
            .max();
        let total_duration_ms = first
            .zip(last)
            .map(|(first, last)| (last - first).num_milliseconds());

        let loader_duration_ms = self
            .checkpoint(CheckpointStage::SqlloaderStart)
            .and_then(|start| start.first_event_at)
            .zip(
                self.checkpoint(CheckpointStage::SqlloaderComplete)
                    .and_then(|complete| complete.last_event_at),
            )
            .map(|(start, complete)| (complete - start).num_milliseconds());

        let final_record_count = CheckpointStage::reconciled()
            .iter()
            .rev()
            .find_map(|stage| self.checkpoint(*stage).and_then(|c| c.record_count));

        let throughput_records_per_second = final_record_count
            .zip(total_duration_ms.filter(|duration| *duration > 0))
            .map(|(count, duration)| count as f64 / (duration as f64 / 1000.0));

        let staged_events: u64 = self.checkpoints.iter().map(|c| c.event_count).sum();
        let success_events: u64 = self.checkpoints.iter().map(|c| c.success_count).sum();
        let failure_count: u64 = self.checkpoints.iter().map(|c| c.failure_count).sum();
        let success_rate = if staged_events == 0 {
            0.0
        } else {
            success_events as f64 / staged_events as f64
        };

        PerformanceMetrics {
            total_duration_ms,
            loader_duration_ms,
            final_record_count,
            throughput_records_per_second,
            success_rate,
            failure_count,
        }
    }
}
