use pipeaudit_core::{AppError, AppResult, CorrelationId};
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointStage;

/// Kind of inconsistency detected between checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyType {
    /// Record counts differ between adjacent stages.
    RecordCountMismatch,
    /// Control totals differ beyond tolerance.
    ControlTotalMismatch,
    /// A stage has no events while its neighbours do.
    MissingAuditEvents,
    /// A stage reported a failure.
    DataIntegrityViolation,
    /// A stage exceeded its processing window.
    ProcessingTimeout,
    /// Payload data could not be interpreted.
    DataFormatError,
    /// Anything else.
    Other,
}

impl DiscrepancyType {
    /// Returns a stable storage value for this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecordCountMismatch => "RECORD_COUNT_MISMATCH",
            Self::ControlTotalMismatch => "CONTROL_TOTAL_MISMATCH",
            Self::MissingAuditEvents => "MISSING_AUDIT_EVENTS",
            Self::DataIntegrityViolation => "DATA_INTEGRITY_VIOLATION",
            Self::ProcessingTimeout => "PROCESSING_TIMEOUT",
            Self::DataFormatError => "DATA_FORMAT_ERROR",
            Self::Other => "OTHER",
        }
    }
}

/// Severity derived from the magnitude of a discrepancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancySeverity {
    /// No numeric difference.
    Low,
    /// Difference of at most ten, or a non-numeric comparison.
    Medium,
    /// Difference above ten.
    High,
}

/// Largest difference still classified as medium severity.
pub const MEDIUM_SEVERITY_MAX_DIFFERENCE: f64 = 10.0;

impl DiscrepancySeverity {
    /// Classifies a numeric difference; `None` means the values were not comparable.
    #[must_use]
    pub fn from_difference(difference: Option<f64>) -> Self {
        match difference.map(f64::abs) {
            None => Self::Medium,
            Some(value) if value == 0.0 => Self::Low,
            Some(value) if value <= MEDIUM_SEVERITY_MAX_DIFFERENCE => Self::Medium,
            Some(_) => Self::High,
        }
    }

    /// Returns a stable storage value for this severity.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

/// Resolution lifecycle of one discrepancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyStatus {
    /// Newly detected.
    Open,
    /// Someone is looking at it.
    Investigating,
    /// Root cause fixed.
    Resolved,
    /// Not a real problem.
    FalsePositive,
    /// Known and accepted.
    Acknowledged,
}

impl DiscrepancyStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Investigating => "INVESTIGATING",
            Self::Resolved => "RESOLVED",
            Self::FalsePositive => "FALSE_POSITIVE",
            Self::Acknowledged => "ACKNOWLEDGED",
        }
    }

    /// Returns whether no further transition is allowed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::FalsePositive)
    }

    /// Returns whether moving to `next` is a valid lifecycle step.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Open => !matches!(next, Self::Open),
            Self::Investigating => matches!(
                next,
                Self::Resolved | Self::FalsePositive | Self::Acknowledged
            ),
            Self::Acknowledged => matches!(next, Self::Investigating | Self::Resolved),
            Self::Resolved | Self::FalsePositive => false,
        }
    }
}

/// Input for constructing one detected discrepancy.
#[derive(Debug, Clone, PartialEq)]
pub struct DataDiscrepancyInput {
    /// Run the discrepancy belongs to.
    pub correlation_id: CorrelationId,
    /// Discrepancy kind.
    pub discrepancy_type: DiscrepancyType,
    /// Upstream checkpoint of the compared pair.
    pub source_checkpoint: Option<CheckpointStage>,
    /// Downstream checkpoint of the compared pair.
    pub target_checkpoint: CheckpointStage,
    /// Business key of the offending event, when one applies.
    pub key_identifier: Option<String>,
    /// Value expected at the target checkpoint.
    pub expected_value: String,
    /// Value observed at the target checkpoint.
    pub actual_value: String,
    /// Human-readable description.
    pub description: String,
}

/// A detected inconsistency between two checkpoints of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDiscrepancy {
    correlation_id: CorrelationId,
    discrepancy_type: DiscrepancyType,
    source_checkpoint: Option<CheckpointStage>,
    target_checkpoint: CheckpointStage,
    key_identifier: Option<String>,
    expected_value: String,
    actual_value: String,
    difference: Option<f64>,
    severity: DiscrepancySeverity,
    status: DiscrepancyStatus,
    description: String,
}

impl DataDiscrepancy {
    /// Creates an open discrepancy, deriving difference and severity.
    #[must_use]
    pub fn new(input: DataDiscrepancyInput) -> Self {
        let difference = numeric_difference(&input.expected_value, &input.actual_value);

        Self {
            correlation_id: input.correlation_id,
            discrepancy_type: input.discrepancy_type,
            source_checkpoint: input.source_checkpoint,
            target_checkpoint: input.target_checkpoint,
            key_identifier: input.key_identifier,
            expected_value: input.expected_value,
            actual_value: input.actual_value,
            difference,
            severity: DiscrepancySeverity::from_difference(difference),
            status: DiscrepancyStatus::Open,
            description: input.description,
        }
    }

    /// Returns the owning run.
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Returns the discrepancy kind.
    #[must_use]
    pub fn discrepancy_type(&self) -> DiscrepancyType {
        self.discrepancy_type
    }

    /// Returns the upstream checkpoint.
    #[must_use]
    pub fn source_checkpoint(&self) -> Option<CheckpointStage> {
        self.source_checkpoint
    }

    /// Returns the downstream checkpoint.
    #[must_use]
    pub fn target_checkpoint(&self) -> CheckpointStage {
        self.target_checkpoint
    }

    /// Returns the offending business key.
    #[must_use]
    pub fn key_identifier(&self) -> Option<&str> {
        self.key_identifier.as_deref()
    }

    /// Returns the expected value.
    #[must_use]
    pub fn expected_value(&self) -> &str {
        self.expected_value.as_str()
    }

    /// Returns the observed value.
    #[must_use]
    pub fn actual_value(&self) -> &str {
        self.actual_value.as_str()
    }

    /// Returns the absolute numeric difference when both values are numbers.
    #[must_use]
    pub fn difference(&self) -> Option<f64> {
        self.difference
    }

    /// Returns the derived severity.
    #[must_use]
    pub fn severity(&self) -> DiscrepancySeverity {
        self.severity
    }

    /// Returns the resolution status.
    #[must_use]
    pub fn status(&self) -> DiscrepancyStatus {
        self.status
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        self.description.as_str()
    }

    /// Moves the discrepancy along its resolution lifecycle.
    pub fn transition_to(&mut self, next: DiscrepancyStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::Validation(format!(
                "discrepancy cannot move from {} to {}",
                self.status.as_str(),
                next.as_str()
            )));
        }

        self.status = next;
        Ok(())
    }
}

fn numeric_difference(expected: &str, actual: &str) -> Option<f64> {
    let expected = expected.trim().parse::<f64>().ok()?;
    let actual = actual.trim().parse::<f64>().ok()?;
    let difference = (expected - actual).abs();
    difference.is_finite().then_some(difference)
}

#[cfg(test)]
mod tests {
    use pipeaudit_core::CorrelationId;
    use proptest::prelude::*;

    use super::{
        DataDiscrepancy, DataDiscrepancyInput, DiscrepancySeverity, DiscrepancyStatus,
        DiscrepancyType,
    };
    use crate::CheckpointStage;

    fn count_mismatch(expected: &str, actual: &str) -> DataDiscrepancy {
        DataDiscrepancy::new(DataDiscrepancyInput {
            correlation_id: CorrelationId::new(),
            discrepancy_type: DiscrepancyType::RecordCountMismatch,
            source_checkpoint: Some(CheckpointStage::SqlloaderComplete),
            target_checkpoint: CheckpointStage::LogicApplied,
            key_identifier: None,
            expected_value: expected.to_owned(),
            actual_value: actual.to_owned(),
            description: "count mismatch".to_owned(),
        })
    }

    #[test]
    fn numeric_values_produce_absolute_difference() {
        let discrepancy = count_mismatch("1000", "995");
        assert_eq!(discrepancy.difference(), Some(5.0));
        assert_eq!(discrepancy.severity(), DiscrepancySeverity::Medium);
        assert_eq!(discrepancy.status(), DiscrepancyStatus::Open);

        let reversed = count_mismatch("995", "1000");
        assert_eq!(reversed.difference(), Some(5.0));
    }

    #[test]
    fn non_numeric_values_default_to_medium() {
        let discrepancy = count_mismatch("SUCCESS", "FAILURE");
        assert_eq!(discrepancy.difference(), None);
        assert_eq!(discrepancy.severity(), DiscrepancySeverity::Medium);
    }

    #[test]
    fn severity_boundaries() {
        assert_eq!(
            DiscrepancySeverity::from_difference(Some(0.0)),
            DiscrepancySeverity::Low
        );
        assert_eq!(
            DiscrepancySeverity::from_difference(Some(10.0)),
            DiscrepancySeverity::Medium
        );
        assert_eq!(
            DiscrepancySeverity::from_difference(Some(10.5)),
            DiscrepancySeverity::High
        );
        assert_eq!(
            DiscrepancySeverity::from_difference(None),
            DiscrepancySeverity::Medium
        );
    }

    #[test]
    fn lifecycle_rejects_leaving_terminal_states() {
        let mut discrepancy = count_mismatch("10", "9");
        assert!(discrepancy.transition_to(DiscrepancyStatus::Investigating).is_ok());
        assert!(discrepancy.transition_to(DiscrepancyStatus::Resolved).is_ok());
        assert!(discrepancy.status().is_terminal());
        assert!(discrepancy.transition_to(DiscrepancyStatus::Open).is_err());
        assert_eq!(discrepancy.status(), DiscrepancyStatus::Resolved);
    }

    #[test]
    fn open_cannot_transition_to_itself() {
        let mut discrepancy = count_mismatch("10", "9");
        assert!(discrepancy.transition_to(DiscrepancyStatus::Open).is_err());
        assert!(discrepancy.transition_to(DiscrepancyStatus::FalsePositive).is_ok());
    }

    proptest! {
        #[test]
        fn severity_matches_thresholds_for_integer_pairs(
            expected in 0_u32..100_000,
            actual in 0_u32..100_000,
        ) {
            let discrepancy = count_mismatch(&expected.to_string(), &actual.to_string());
            let difference = expected.abs_diff(actual);
            let wanted = match difference {
                0 => DiscrepancySeverity::Low,
                1..=10 => DiscrepancySeverity::Medium,
                _ => DiscrepancySeverity::High,
            };
            prop_assert_eq!(discrepancy.severity(), wanted);
            prop_assert_eq!(discrepancy.difference(), Some(f64::from(difference)));
        }
    }
}
