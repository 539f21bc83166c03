//! PostgreSQL Audit Repository
//!
//! Audit log persistence using PostgreSQL

use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tenantshift_domain::audit::{AuditLog, AuditRepository};
use tenantshift_domain::shared_kernel::{DomainError, OrgId, Result};
use uuid::Uuid;

#[derive(Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_audit_log(row: &PgRow) -> AuditLog {
        AuditLog {
            id: row.get::<Uuid, _>("id"),
            event_type: row.get("event_type"),
            org_id: row.get::<Option<String>, _>("org_id").map(OrgId::new),
            actor: row.get("actor"),
            payload: row.get("payload"),
            occurred_at: row.get("occurred_at"),
        }
    }
}

#[async_trait::async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn save(&self, log: &AuditLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, event_type, org_id, actor, payload, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(log.id)
        .bind(log.event_type.as_str())
        .bind(log.org_id.as_ref().map(|o| o.as_str()))
        .bind(log.actor.as_deref())
        .bind(&log.payload)
        .bind(log.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to save audit log: {}", e),
        })?;

        Ok(())
    }

    async fn find_by_org(&self, org_id: &OrgId, limit: i64) -> Result<Vec<AuditLog>> {
        let rows = sqlx::query(
            "SELECT id, event_type, org_id, actor, payload, occurred_at \
             FROM audit_logs WHERE org_id = $1 ORDER BY occurred_at DESC LIMIT $2",
        )
        .bind(org_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to query audit logs: {}", e),
        })?;

        Ok(rows.iter().map(Self::row_to_audit_log).collect())
    }
}
