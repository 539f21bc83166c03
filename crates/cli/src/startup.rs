//! Service wiring
//!
//! Builds the engine once per invocation: control-plane pool, schema
//! bootstrap, repositories, the connection cache, and the orchestrator.

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tenantshift_application::{AuditService, MigrationService, MigrationSettings};
use tenantshift_domain::shared_kernel::{DomainError, Result};
use tenantshift_infrastructure::persistence::postgres::{
    run_migrations, PostgresAuditRepository, PostgresDatastoreCache,
    PostgresMigrationAttemptRepository, PostgresOrganizationRepository,
};
use tracing::info;

use crate::config::CliConfig;

pub struct Services {
    pub migrations: MigrationService,
}

pub async fn build_services(cfg: &CliConfig) -> Result<Services> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&cfg.database_url)
        .await
        .map_err(|e| {
            DomainError::connectivity(format!("control-plane database: {}", e))
        })?;
    info!("Connected to control-plane database");

    run_migrations(&pool).await?;

    let attempts = Arc::new(PostgresMigrationAttemptRepository::new(pool.clone()));
    let orgs = Arc::new(PostgresOrganizationRepository::new(pool.clone()));
    let audit = AuditService::new(Arc::new(PostgresAuditRepository::new(pool)));
    let datastores = Arc::new(PostgresDatastoreCache::new());

    let mut settings = MigrationSettings::new(cfg.shared_location());
    settings.dedicated_db_prefix = cfg.dedicated_db_prefix.clone();

    Ok(Services {
        migrations: MigrationService::new(attempts, orgs, datastores, audit, settings),
    })
}
