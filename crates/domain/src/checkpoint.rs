use std::str::FromStr;

use pipeaudit_core::AppError;
use serde::{Deserialize, Serialize};

/// Fixed pipeline transition points, declared in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckpointStage {
    /// Source file landed on the RHEL host.
    RhelLanding,
    /// SQL*Loader job started.
    SqlloaderStart,
    /// SQL*Loader job completed.
    SqlloaderComplete,
    /// Business rules applied to the loaded data.
    LogicApplied,
    /// Final output file generated.
    FileGenerated,
}

impl CheckpointStage {
    /// Returns a stable storage value for this stage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RhelLanding => "RHEL_LANDING",
            Self::SqlloaderStart => "SQLLOADER_START",
            Self::SqlloaderComplete => "SQLLOADER_COMPLETE",
            Self::LogicApplied => "LOGIC_APPLIED",
            Self::FileGenerated => "FILE_GENERATED",
        }
    }

    /// Returns all stages in pipeline order.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[CheckpointStage] = &[
            CheckpointStage::RhelLanding,
            CheckpointStage::SqlloaderStart,
            CheckpointStage::SqlloaderComplete,
            CheckpointStage::LogicApplied,
            CheckpointStage::FileGenerated,
        ];

        ALL
    }

    /// Returns the stages whose counts and totals are cross-checked, in order.
    ///
    /// `SQLLOADER_START` only marks the beginning of a load and carries no
    /// counts of its own.
    #[must_use]
    pub fn reconciled() -> &'static [Self] {
        const RECONCILED: &[CheckpointStage] = &[
            CheckpointStage::RhelLanding,
            CheckpointStage::SqlloaderComplete,
            CheckpointStage::LogicApplied,
            CheckpointStage::FileGenerated,
        ];

        RECONCILED
    }

    /// Returns whether this stage takes part in count/total reconciliation.
    #[must_use]
    pub fn is_reconciled(&self) -> bool {
        !matches!(self, Self::SqlloaderStart)
    }

    /// Parses a transport value into a stage.
    pub fn from_transport(value: &str) -> Result<Self, AppError> {
        Self::from_str(value)
    }
}

impl FromStr for CheckpointStage {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "RHEL_LANDING" => Ok(Self::RhelLanding),
            "SQLLOADER_START" => Ok(Self::SqlloaderStart),
            "SQLLOADER_COMPLETE" => Ok(Self::SqlloaderComplete),
            "LOGIC_APPLIED" => Ok(Self::LogicApplied),
            "FILE_GENERATED" => Ok(Self::FileGenerated),
            _ => Err(AppError::Validation(format!(
                "unknown checkpoint stage '{value}'"
            ))),
        }
    }
}
