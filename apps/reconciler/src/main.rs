//! Pipeline audit reconciler command-line runtime.

#![forbid(unsafe_code)]

mod command;
mod reconciler_config;

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use pipeaudit_application::{
    AuditEventRepository, AuditTrailService, CheckpointAuditService, ReconciliationService,
    RetryPolicy,
};
use pipeaudit_core::{AppError, AppResult, FailureCategory};
use pipeaudit_infrastructure::{
    InMemoryAuditEventRepository, PostgresAuditEventRepository, connect_pool, run_migrations,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::command::{Command, CommandServices, run_with_services};
use crate::reconciler_config::{AuditStoreConfig, ReconcilerConfig, init_tracing};

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    message: String,
    failure: FailureCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<&'a str>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();

    match run(&args).await {
        Ok(output) => {
            println!("{output:#}");
            ExitCode::SUCCESS
        }
        Err(app_error) => {
            error!(code = app_error.code(), error = %app_error, "reconciler command failed");

            let failure = app_error.failure_category();
            let body = ErrorBody {
                code: app_error.code(),
                message: app_error.to_string(),
                failure,
                usage: matches!(app_error, AppError::Validation(_)).then_some(command::USAGE),
            };
            match serde_json::to_string_pretty(&body) {
                Ok(encoded) => eprintln!("{encoded}"),
                Err(_) => eprintln!("{app_error}"),
            }

            exit_code(failure)
        }
    }
}

async fn run(args: &[String]) -> AppResult<Value> {
    let command = Command::parse(args)?;
    let config = ReconcilerConfig::load()?;

    let repository: Arc<dyn AuditEventRepository> = match &config.store {
        AuditStoreConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let pool = connect_pool(database_url.as_str(), *max_connections).await?;
            if command == Command::Migrate {
                run_migrations(&pool).await?;
                info!("audit store migrations applied");
                return Ok(json!({ "migrated": true }));
            }
            Arc::new(PostgresAuditEventRepository::new(pool))
        }
        AuditStoreConfig::Memory => {
            if command == Command::Migrate {
                return Ok(json!({ "migrated": false, "store": "memory" }));
            }
            Arc::new(InMemoryAuditEventRepository::new())
        }
    };

    run_with_services(command, &build_services(repository, &config)).await
}

fn build_services(
    repository: Arc<dyn AuditEventRepository>,
    config: &ReconcilerConfig,
) -> CommandServices {
    CommandServices {
        recorder: CheckpointAuditService::new(Arc::clone(&repository))
            .with_config(config.recorder)
            .with_retry_policy(RetryPolicy::for_tier(config.write_retry_tier)),
        reconciler: ReconciliationService::new(Arc::clone(&repository))
            .with_config(config.reconciliation),
        trail: AuditTrailService::new(repository),
    }
}

fn exit_code(failure: FailureCategory) -> ExitCode {
    match failure {
        FailureCategory::ClientCorrectable => ExitCode::from(2),
        FailureCategory::ServiceUnavailable { .. } => ExitCode::from(3),
        FailureCategory::Internal => ExitCode::FAILURE,
    }
}
