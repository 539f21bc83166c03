//! Control-plane schema bootstrap
//!
//! Embedded, idempotent DDL for the engine's own tables. Tenant
//! collections are not created here; they appear on demand through
//! `PostgresTenantDatastore`.

use sqlx::postgres::PgPool;
use tenantshift_domain::shared_kernel::{DomainError, Result};
use tracing::info;

const BOOTSTRAP_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tenant_migrations (
        id UUID PRIMARY KEY,
        org_id TEXT NOT NULL,
        direction TEXT NOT NULL,
        status TEXT NOT NULL,
        dry_run BOOLEAN NOT NULL DEFAULT FALSE,
        resume_requested BOOLEAN NOT NULL DEFAULT FALSE,
        allow_legal_hold_override BOOLEAN NOT NULL DEFAULT FALSE,
        actor_user_id TEXT,
        actor_role TEXT,
        target_uri TEXT NOT NULL,
        target_db_name TEXT,
        chunk_size BIGINT NOT NULL,
        progress JSONB NOT NULL DEFAULT '{}'::jsonb,
        error TEXT,
        started_at TIMESTAMPTZ NOT NULL,
        last_progress_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tenant_migrations_org_started \
     ON tenant_migrations (org_id, started_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS organizations (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        archived_at TIMESTAMPTZ,
        legal_hold BOOLEAN NOT NULL DEFAULT FALSE,
        use_dedicated_db BOOLEAN NOT NULL DEFAULT FALSE,
        database_uri TEXT,
        database_name TEXT,
        data_residency TEXT NOT NULL DEFAULT 'shared',
        last_migrated_at TIMESTAMPTZ,
        datastore_history JSONB NOT NULL DEFAULT '[]'::jsonb
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_logs (
        id UUID PRIMARY KEY,
        event_type TEXT NOT NULL,
        org_id TEXT,
        actor TEXT,
        payload JSONB NOT NULL DEFAULT '{}'::jsonb,
        occurred_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_org ON audit_logs (org_id, occurred_at DESC)",
];

/// Run the embedded bootstrap against the control-plane database.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for statement in BOOTSTRAP_STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DomainError::InfrastructureError {
                message: format!("Schema bootstrap failed: {}", e),
            })?;
    }
    info!("Control-plane schema bootstrap complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_covers_all_control_plane_tables() {
        let ddl = BOOTSTRAP_STATEMENTS.join("\n");
        for table in ["tenant_migrations", "organizations", "audit_logs"] {
            assert!(ddl.contains(table), "missing DDL for {}", table);
        }
    }
}
