use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use pipeaudit_application::AuditEventRepository;
use pipeaudit_core::{AppError, AppResult, AuditId, CorrelationId};
use pipeaudit_domain::{AuditEvent, AuditEventInput, AuditStatus, CheckpointStage};

#[cfg(test)]
mod tests;

/// PostgreSQL-backed append-only audit event repository.
#[derive(Clone)]
pub struct PostgresAuditEventRepository {
    pool: PgPool,
}

impl PostgresAuditEventRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditEventRow {
    audit_id: Uuid,
    correlation_id: Uuid,
    source_system: String,
    module_name: Option<String>,
    process_name: Option<String>,
    source_entity: Option<String>,
    destination_entity: Option<String>,
    key_identifier: Option<String>,
    checkpoint_stage: Option<String>,
    event_timestamp: DateTime<Utc>,
    status: String,
    message: Option<String>,
    details_payload: Option<String>,
}

impl TryFrom<AuditEventRow> for AuditEvent {
    type Error = AppError;

    fn try_from(row: AuditEventRow) -> Result<Self, Self::Error> {
        let audit_id = row.audit_id;
        let checkpoint_stage = row
            .checkpoint_stage
            .as_deref()
            .map(CheckpointStage::from_str)
            .transpose()
            .map_err(|error| stored_value_error(audit_id, error))?;
        let status = AuditStatus::from_str(row.status.as_str())
            .map_err(|error| stored_value_error(audit_id, error))?;

        AuditEvent::new(AuditEventInput {
            audit_id: AuditId::from_uuid(audit_id),
            correlation_id: CorrelationId::from_uuid(row.correlation_id),
            source_system: row.source_system,
            module_name: row.module_name,
            process_name: row.process_name,
            source_entity: row.source_entity,
            destination_entity: row.destination_entity,
            key_identifier: row.key_identifier,
            checkpoint_stage,
            event_timestamp: row.event_timestamp,
            status,
            message: row.message,
            details_payload: row.details_payload,
        })
        .map_err(|error| stored_value_error(audit_id, error))
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        audit_id,
        correlation_id,
        source_system,
        module_name,
        process_name,
        source_entity,
        destination_entity,
        key_identifier,
        checkpoint_stage,
        event_timestamp,
        status,
        message,
        details_payload
    FROM pipeline_audit_events
"#;

#[async_trait]
impl AuditEventRepository for PostgresAuditEventRepository {
    async fn append(&self, event: AuditEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_audit_events (
                audit_id,
                correlation_id,
                source_system,
                module_name,
                process_name,
                source_entity,
                destination_entity,
                key_identifier,
                checkpoint_stage,
                event_timestamp,
                status,
                message,
                details_payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(event.audit_id().as_uuid())
        .bind(event.correlation_id().as_uuid())
        .bind(event.source_system())
        .bind(event.module_name())
        .bind(event.process_name())
        .bind(event.source_entity())
        .bind(event.destination_entity())
        .bind(event.key_identifier())
        .bind(event.checkpoint_stage().map(|stage| stage.as_str()))
        .bind(event.event_timestamp())
        .bind(event.status().as_str())
        .bind(event.message())
        .bind(event.details_payload())
        .execute(&self.pool)
        .await
        .map_err(|error| storage_error("failed to append audit event", &error))?;

        debug!(
            audit_id = %event.audit_id(),
            correlation_id = %event.correlation_id(),
            "audit event row inserted"
        );

        Ok(())
    }

    async fn list_by_correlation_id(
        &self,
        correlation_id: CorrelationId,
    ) -> AppResult<Vec<AuditEvent>> {
        let rows = sqlx::query_as::<_, AuditEventRow>(&format!(
            "{SELECT_COLUMNS} WHERE correlation_id = $1 ORDER BY event_timestamp ASC, audit_id ASC"
        ))
        .bind(correlation_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("failed to list audit events by correlation id", &error))?;

        rows.into_iter().map(AuditEvent::try_from).collect()
    }

    async fn list_by_source_system_and_checkpoint(
        &self,
        source_system: &str,
        stage: CheckpointStage,
    ) -> AppResult<Vec<AuditEvent>> {
        let rows = sqlx::query_as::<_, AuditEventRow>(&format!(
            "{SELECT_COLUMNS} WHERE source_system = $1 AND checkpoint_stage = $2 \
             ORDER BY event_timestamp ASC, audit_id ASC"
        ))
        .bind(source_system)
        .bind(stage.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("failed to list audit events by checkpoint", &error))?;

        rows.into_iter().map(AuditEvent::try_from).collect()
    }

    async fn list_by_module_and_status(
        &self,
        module_name: &str,
        status: AuditStatus,
    ) -> AppResult<Vec<AuditEvent>> {
        let rows = sqlx::query_as::<_, AuditEventRow>(&format!(
            "{SELECT_COLUMNS} WHERE module_name = $1 AND status = $2 \
             ORDER BY event_timestamp ASC, audit_id ASC"
        ))
        .bind(module_name)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("failed to list audit events by module", &error))?;

        rows.into_iter().map(AuditEvent::try_from).collect()
    }

    async fn count_by_correlation_id_and_status(
        &self,
        correlation_id: CorrelationId,
        status: AuditStatus,
    ) -> AppResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM pipeline_audit_events
            WHERE correlation_id = $1 AND status = $2
            "#,
        )
        .bind(correlation_id.as_uuid())
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| storage_error("failed to count audit events", &error))?;

        u64::try_from(count).map_err(|_| {
            AppError::Internal(format!("audit event count must not be negative, got {count}"))
        })
    }
}

/// Maps a driver error to a storage error, keeping the SQLSTATE for retry classification.
fn storage_error(context: &str, error: &sqlx::Error) -> AppError {
    let sqlstate = error
        .as_database_error()
        .and_then(|database_error| database_error.code())
        .map(|code| code.to_ascii_lowercase());

    match sqlstate {
        Some(code) => AppError::Storage(format!("{context} (sqlstate {code}): {error}")),
        None => AppError::Storage(format!("{context}: {error}")),
    }
}

fn stored_value_error(audit_id: Uuid, error: AppError) -> AppError {
    AppError::Storage(format!("stored audit event '{audit_id}' is invalid: {error}"))
}
