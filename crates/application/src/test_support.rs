use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use pipeaudit_core::{AppError, AppResult, AuditId, CorrelationId};
use pipeaudit_domain::{AuditEvent, AuditEventInput, AuditStatus, CheckpointStage};
use serde_json::Value;

use crate::AuditEventRepository;

/// Scripted store fake shared by the service tests.
#[derive(Default)]
pub(crate) struct FakeAuditRepository {
    events: Mutex<Vec<AuditEvent>>,
    append_failures: Mutex<VecDeque<AppError>>,
    always_fail_with: Mutex<Option<String>>,
    list_failures: Mutex<VecDeque<AppError>>,
    append_calls: AtomicU32,
    list_calls: AtomicU32,
}

impl FakeAuditRepository {
    pub(crate) fn with_events(events: Vec<AuditEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Self::default()
        }
    }

    pub(crate) fn fail_next_append(&self, error: AppError) {
        if let Ok(mut failures) = self.append_failures.lock() {
            failures.push_back(error);
        }
    }

    pub(crate) fn fail_every_append(&self, message: &str) {
        if let Ok(mut always) = self.always_fail_with.lock() {
            *always = Some(message.to_owned());
        }
    }

    pub(crate) fn fail_next_list(&self, error: AppError) {
        if let Ok(mut failures) = self.list_failures.lock() {
            failures.push_back(error);
        }
    }

    pub(crate) fn append_calls(&self) -> u32 {
        self.append_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn stored(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    fn lock_error(error: impl std::fmt::Display) -> AppError {
        AppError::Internal(format!("failed to lock fake repository state: {error}"))
    }

    fn take_list_failure(&self) -> AppResult<()> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .list_failures
            .lock()
            .map_err(Self::lock_error)?
            .pop_front();
        failure.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl AuditEventRepository for FakeAuditRepository {
    async fn append(&self, event: AuditEvent) -> AppResult<()> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.always_fail_with.lock().map_err(Self::lock_error)?.clone() {
            return Err(AppError::Storage(message));
        }

        if let Some(error) = self
            .append_failures
            .lock()
            .map_err(Self::lock_error)?
            .pop_front()
        {
            return Err(error);
        }

        self.events.lock().map_err(Self::lock_error)?.push(event);
        Ok(())
    }

    async fn list_by_correlation_id(
        &self,
        correlation_id: CorrelationId,
    ) -> AppResult<Vec<AuditEvent>> {
        self.take_list_failure()?;
        let mut events: Vec<AuditEvent> = self
            .events
            .lock()
            .map_err(Self::lock_error)?
            .iter()
            .filter(|event| event.correlation_id() == correlation_id)
            .cloned()
            .collect();
        events.sort_by_key(AuditEvent::event_timestamp);
        Ok(events)
    }

    async fn list_by_source_system_and_checkpoint(
        &self,
        source_system: &str,
        stage: CheckpointStage,
    ) -> AppResult<Vec<AuditEvent>> {
        self.take_list_failure()?;
        Ok(self
            .events
            .lock()
            .map_err(Self::lock_error)?
            .iter()
            .filter(|event| {
                event.source_system() == source_system && event.checkpoint_stage() == Some(stage)
            })
            .cloned()
            .collect())
    }

    async fn list_by_module_and_status(
        &self,
        module_name: &str,
        status: AuditStatus,
    ) -> AppResult<Vec<AuditEvent>> {
        self.take_list_failure()?;
        Ok(self
            .events
            .lock()
            .map_err(Self::lock_error)?
            .iter()
            .filter(|event| event.module_name() == Some(module_name) && event.status() == status)
            .cloned()
            .collect())
    }

    async fn count_by_correlation_id_and_status(
        &self,
        correlation_id: CorrelationId,
        status: AuditStatus,
    ) -> AppResult<u64> {
        self.take_list_failure()?;
        let count = self
            .events
            .lock()
            .map_err(Self::lock_error)?
            .iter()
            .filter(|event| event.correlation_id() == correlation_id && event.status() == status)
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}

pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Builds a stored event at `base_time() + offset_minutes` with a JSON details payload.
pub(crate) fn staged_event(
    correlation_id: CorrelationId,
    stage: CheckpointStage,
    status: AuditStatus,
    offset_minutes: i64,
    details: Option<Value>,
) -> AuditEvent {
    AuditEvent::new(AuditEventInput {
        audit_id: AuditId::new(),
        correlation_id,
        source_system: "BILLING".to_owned(),
        module_name: Some("daily_accounts".to_owned()),
        process_name: None,
        source_entity: None,
        destination_entity: None,
        key_identifier: Some(format!("{}_key", stage.as_str().to_lowercase())),
        checkpoint_stage: Some(stage),
        event_timestamp: base_time() + Duration::minutes(offset_minutes),
        status,
        message: None,
        details_payload: details.map(|value| value.to_string()),
    })
    .unwrap_or_else(|_| unreachable!())
}
