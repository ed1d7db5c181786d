use chrono::{DateTime, Duration, TimeZone, Utc};
use pipeaudit_application::AuditEventRepository;
use pipeaudit_core::{AppError, AuditId, CorrelationId};
use pipeaudit_domain::{AuditEvent, AuditEventInput, AuditStatus, CheckpointStage};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::PostgresAuditEventRepository;
use crate::MIGRATOR;

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres audit event tests: {error}");
    }

    Some(pool)
}

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0)
        .single()
        .unwrap_or_default()
        + Duration::minutes(minutes)
}

fn event(
    correlation_id: CorrelationId,
    stage: Option<CheckpointStage>,
    status: AuditStatus,
    minutes: i64,
    details_payload: Option<&str>,
) -> AuditEvent {
    AuditEvent::new(AuditEventInput {
        audit_id: AuditId::new(),
        correlation_id,
        source_system: "BILLING".to_owned(),
        module_name: Some(format!("module-{correlation_id}")),
        process_name: Some("nightly".to_owned()),
        source_entity: Some("sftp://landing".to_owned()),
        destination_entity: Some("STG_ACCOUNTS".to_owned()),
        key_identifier: Some("accounts.dat".to_owned()),
        checkpoint_stage: stage,
        event_timestamp: at(minutes),
        status,
        message: Some("recorded by test".to_owned()),
        details_payload: details_payload.map(str::to_owned),
    })
    .unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn appended_events_round_trip_in_timestamp_order() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAuditEventRepository::new(pool);
    let correlation_id = CorrelationId::new();
    let payload = r#"{"zeta":1,"record_count":1000,"alpha":{"b":2,"a":1}}"#;

    let later = event(
        correlation_id,
        Some(CheckpointStage::SqlloaderComplete),
        AuditStatus::Warning,
        10,
        None,
    );
    let earlier = event(
        correlation_id,
        Some(CheckpointStage::RhelLanding),
        AuditStatus::Success,
        0,
        Some(payload),
    );
    let unstaged = event(correlation_id, None, AuditStatus::Success, 5, None);

    for appended in [later.clone(), earlier.clone(), unstaged.clone()] {
        assert!(repository.append(appended).await.is_ok());
    }

    let listed = repository
        .list_by_correlation_id(correlation_id)
        .await
        .unwrap_or_default();

    assert_eq!(listed, vec![earlier, unstaged, later]);
    assert_eq!(listed[0].details_payload(), Some(payload));
}

#[tokio::test]
async fn filtered_queries_and_counts_match_stored_rows() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAuditEventRepository::new(pool);
    let correlation_id = CorrelationId::new();
    let module_name = format!("module-{correlation_id}");

    for appended in [
        event(
            correlation_id,
            Some(CheckpointStage::LogicApplied),
            AuditStatus::Failure,
            0,
            None,
        ),
        event(
            correlation_id,
            Some(CheckpointStage::LogicApplied),
            AuditStatus::Failure,
            1,
            None,
        ),
        event(
            correlation_id,
            Some(CheckpointStage::FileGenerated),
            AuditStatus::Success,
            2,
            None,
        ),
    ] {
        assert!(repository.append(appended).await.is_ok());
    }

    let failures = repository
        .list_by_module_and_status(module_name.as_str(), AuditStatus::Failure)
        .await
        .unwrap_or_default();
    assert_eq!(failures.len(), 2);

    let generated = repository
        .list_by_source_system_and_checkpoint("BILLING", CheckpointStage::FileGenerated)
        .await
        .unwrap_or_default();
    assert!(
        generated
            .iter()
            .any(|stored| stored.correlation_id() == correlation_id)
    );

    let failure_count = repository
        .count_by_correlation_id_and_status(correlation_id, AuditStatus::Failure)
        .await;
    assert_eq!(failure_count.ok(), Some(2));

    let warning_count = repository
        .count_by_correlation_id_and_status(correlation_id, AuditStatus::Warning)
        .await;
    assert_eq!(warning_count.ok(), Some(0));
}

#[tokio::test]
async fn duplicate_audit_id_is_a_fatal_storage_error() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAuditEventRepository::new(pool);
    let stored = event(
        CorrelationId::new(),
        Some(CheckpointStage::RhelLanding),
        AuditStatus::Success,
        0,
        None,
    );

    assert!(repository.append(stored.clone()).await.is_ok());
    let duplicate = repository.append(stored).await;

    match duplicate {
        Err(AppError::Storage(message)) => assert!(message.contains("sqlstate 23505")),
        other => panic!("expected storage error, got {other:?}"),
    }
}
