use std::str::FromStr;

use pipeaudit_application::{
    AuditTrailService, CheckpointAuditService, CheckpointContext, CorrelationContext,
    ReconciliationService,
};
use pipeaudit_core::{AppError, AppResult, CorrelationId};
use pipeaudit_domain::{AuditStatus, CheckpointStage, ReportDetailLevel};
use serde_json::{Value, json};
use tracing::info;

pub const USAGE: &str = "usage:
  reconciler migrate
  reconciler reconcile <correlation-id> [summary|standard|detailed]
  reconciler trail <correlation-id>
  reconciler record <correlation-id|-> <STAGE> <STATUS> <source-system> [details-json]";

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Migrate,
    Reconcile {
        correlation_id: CorrelationId,
        level: ReportDetailLevel,
    },
    Trail {
        correlation_id: CorrelationId,
    },
    Record(RecordCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordCommand {
    /// `None` when the caller asked for a fresh id with `-`.
    pub correlation_id: Option<CorrelationId>,
    pub stage: CheckpointStage,
    pub status: AuditStatus,
    pub source_system: String,
    pub details: Value,
}

impl Command {
    /// Parses arguments after the program name.
    pub fn parse(args: &[String]) -> AppResult<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        match args.as_slice() {
            ["migrate"] => Ok(Self::Migrate),
            ["reconcile", correlation_id] => Ok(Self::Reconcile {
                correlation_id: CorrelationId::parse(correlation_id)?,
                level: ReportDetailLevel::default(),
            }),
            ["reconcile", correlation_id, level] => Ok(Self::Reconcile {
                correlation_id: CorrelationId::parse(correlation_id)?,
                level: ReportDetailLevel::from_str(level)?,
            }),
            ["trail", correlation_id] => Ok(Self::Trail {
                correlation_id: CorrelationId::parse(correlation_id)?,
            }),
            ["record", correlation_id, stage, status, source_system, rest @ ..]
                if rest.len() <= 1 =>
            {
                let correlation_id = match *correlation_id {
                    "-" => None,
                    value => Some(CorrelationId::parse(value)?),
                };
                let details = match rest.first() {
                    Some(raw) => serde_json::from_str::<Value>(raw).map_err(|error| {
                        AppError::Validation(format!("details must be valid JSON: {error}"))
                    })?,
                    None => Value::Null,
                };

                Ok(Self::Record(RecordCommand {
                    correlation_id,
                    stage: CheckpointStage::from_transport(stage)?,
                    status: AuditStatus::from_str(status)?,
                    source_system: (*source_system).to_owned(),
                    details,
                }))
            }
            _ => Err(AppError::Validation(format!(
                "unrecognized arguments\n{USAGE}"
            ))),
        }
    }
}

/// Services a command runs against.
pub struct CommandServices {
    pub recorder: CheckpointAuditService,
    pub reconciler: ReconciliationService,
    pub trail: AuditTrailService,
}

impl RecordCommand {
    /// Records inside a correlation scope, generating the id when none was given.
    pub async fn run(self, recorder: &CheckpointAuditService) -> AppResult<Value> {
        let Self {
            correlation_id,
            stage,
            status,
            source_system,
            details,
        } = self;

        let event = CorrelationContext::run_scoped(correlation_id, async move {
            if CorrelationContext::current().is_none() {
                let generated = CorrelationContext::generate()?;
                info!(correlation_id = %generated, "generated correlation id");
            }

            recorder
                .record_checkpoint(
                    stage,
                    CheckpointContext::new(source_system, status),
                    None,
                    &details,
                )
                .await
        })
        .await?;

        serde_json::to_value(&event)
            .map_err(|error| AppError::Internal(format!("failed to encode audit event: {error}")))
    }
}

/// Runs a read or write command and returns its JSON result.
pub async fn run_with_services(command: Command, services: &CommandServices) -> AppResult<Value> {
    match command {
        Command::Migrate => Err(AppError::Internal(
            "migrate is handled before services are built".to_owned(),
        )),
        Command::Reconcile {
            correlation_id,
            level,
        } => {
            let view = services.reconciler.reconcile_view(correlation_id, level).await?;
            encode(&view)
        }
        Command::Trail { correlation_id } => {
            let events = services.trail.trail(correlation_id).await?;
            let breakdown = services.trail.status_breakdown(correlation_id).await?;
            Ok(json!({
                "correlation_id": correlation_id,
                "events": encode(&events)?,
                "status_breakdown": encode(&breakdown)?,
            }))
        }
        Command::Record(record) => record.run(&services.recorder).await,
    }
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value)
        .map_err(|error| AppError::Internal(format!("failed to encode output: {error}")))
}
