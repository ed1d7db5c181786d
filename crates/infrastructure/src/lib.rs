//! Infrastructure adapters for the audit store port.

#![forbid(unsafe_code)]

mod in_memory_audit_event_repository;
mod postgres_audit_event_repository;

use pipeaudit_core::{AppError, AppResult};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

pub use in_memory_audit_event_repository::InMemoryAuditEventRepository;
pub use postgres_audit_event_repository::PostgresAuditEventRepository;

/// Embedded schema migrations for the Postgres audit store.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Opens a Postgres pool for the audit store.
pub async fn connect_pool(database_url: &str, max_connections: u32) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Storage(format!("failed to connect to database: {error}")))
}

/// Applies pending schema migrations.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|error| AppError::Storage(format!("failed to run database migrations: {error}")))
}
