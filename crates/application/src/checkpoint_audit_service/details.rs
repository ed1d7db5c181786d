use pipeaudit_core::{AppError, AppResult};
use pipeaudit_domain::{CheckpointStage, DetailsPayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Details recorded when a source file lands on the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileTransferDetails {
    /// Landed file name.
    pub file_name: String,
    /// Size of the landed file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    /// Records in the landed file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
    /// Control total declared by the file trailer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_total: Option<f64>,
    /// File checksum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Transfer origin path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    /// Transfer destination path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_path: Option<String>,
    /// Additional caller-defined fields.
    #[serde(flatten)]
    pub extra: DetailsPayload,
}

/// Details recorded for a loader start or completion.
///
/// Row counts are signed so that invalid negative values reported by a loader
/// can be rejected instead of silently wrapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoaderOperationDetails {
    /// Target table.
    pub table_name: String,
    /// Loader control file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_file: Option<String>,
    /// Rows read from the data file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_read: Option<i64>,
    /// Rows loaded into the table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_loaded: Option<i64>,
    /// Rows rejected by the loader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_rejected: Option<i64>,
    /// Rows skipped by the loader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_skipped: Option<i64>,
    /// Control total computed over loaded rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_total: Option<f64>,
    /// Additional caller-defined fields.
    #[serde(flatten)]
    pub extra: DetailsPayload,
}

impl LoaderOperationDetails {
    pub(super) fn validate(&self) -> AppResult<()> {
        let negative: Vec<&str> = [
            ("rows_read", self.rows_read),
            ("rows_loaded", self.rows_loaded),
            ("rows_rejected", self.rows_rejected),
            ("rows_skipped", self.rows_skipped),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_some_and(|value| value < 0))
        .map(|(name, _)| name)
        .collect();

        if !negative.is_empty() {
            return Err(AppError::Validation(format!(
                "loader row counts must not be negative: {}",
                negative.join(", ")
            )));
        }

        ensure_finite_control_total(self.control_total)
    }
}

impl FileTransferDetails {
    pub(super) fn validate(&self) -> AppResult<()> {
        ensure_finite_control_total(self.control_total)
    }
}

impl BusinessRuleDetails {
    pub(super) fn validate(&self) -> AppResult<()> {
        ensure_finite_control_total(self.control_total)
    }
}

impl FileGenerationDetails {
    pub(super) fn validate(&self) -> AppResult<()> {
        ensure_finite_control_total(self.control_total)
    }
}

/// JSON has no NaN or infinity; encoding would turn them into `null`.
fn ensure_finite_control_total(control_total: Option<f64>) -> AppResult<()> {
    match control_total {
        Some(value) if !value.is_finite() => Err(AppError::Validation(format!(
            "control_total must be a finite number, got {value}"
        ))),
        Some(_) | None => Ok(()),
    }
}

/// Details recorded when business rules are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessRuleDetails {
    /// Applied rule.
    pub rule_name: String,
    /// Entity the rule ran against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Records fed into the rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_record_count: Option<u64>,
    /// Records produced by the rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_record_count: Option<u64>,
    /// Control total after the rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_total: Option<f64>,
    /// Rule input snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_input: Option<Value>,
    /// Rule output snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_output: Option<Value>,
    /// Additional caller-defined fields.
    #[serde(flatten)]
    pub extra: DetailsPayload,
}

/// Details recorded when the output file is produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileGenerationDetails {
    /// Generated file name.
    pub file_name: String,
    /// Records written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_record_count: Option<u64>,
    /// Control total written to the trailer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_total: Option<f64>,
    /// Size of the generated file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    /// File checksum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Additional caller-defined fields.
    #[serde(flatten)]
    pub extra: DetailsPayload,
}

/// Loader checkpoint selected from the caller's process name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderPhase {
    /// The load is starting.
    Start,
    /// The load has finished.
    Complete,
}

impl LoaderPhase {
    /// Process names containing "start" denote a start; anything else a completion.
    #[must_use]
    pub fn from_process_name(process_name: Option<&str>) -> Self {
        match process_name {
            Some(name) if name.to_lowercase().contains("start") => Self::Start,
            Some(_) | None => Self::Complete,
        }
    }

    /// Returns the checkpoint recorded for this phase.
    #[must_use]
    pub fn stage(self) -> CheckpointStage {
        match self {
            Self::Start => CheckpointStage::SqlloaderStart,
            Self::Complete => CheckpointStage::SqlloaderComplete,
        }
    }
}

pub(super) fn to_payload<T>(details: &T) -> AppResult<DetailsPayload>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(details).map_err(|error| {
        AppError::Serialization(format!("failed to serialize checkpoint details: {error}"))
    })?;

    match value {
        Value::Object(payload) => Ok(payload),
        Value::Null => Ok(DetailsPayload::new()),
        other => Err(AppError::Serialization(format!(
            "checkpoint details must serialize to an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
