//! PostgreSQL Migration Attempt Repository
//!
//! Durable attempt store backing resumption and dashboards. Attempts
//! are never deleted; progress checkpoints land as single `jsonb_set`
//! updates so one chunk costs one write.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::collections::BTreeMap;
use tenantshift_domain::datastore::DatastoreLocation;
use tenantshift_domain::migrations::{
    CollectionProgress, MigrationAttempt, MigrationAttemptRepository, MigrationDirection,
    MigrationStatus,
};
use tenantshift_domain::shared_kernel::{ActorRole, DomainError, MigrationId, OrgId, Result};
use uuid::Uuid;

const ATTEMPT_COLUMNS: &str = "id, org_id, direction, status, dry_run, resume_requested, \
     allow_legal_hold_override, actor_user_id, actor_role, target_uri, target_db_name, \
     chunk_size, progress, error, started_at, last_progress_at, completed_at";

#[derive(Clone)]
pub struct PostgresMigrationAttemptRepository {
    pool: PgPool,
}

impl PostgresMigrationAttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_attempt(row: &PgRow) -> Result<MigrationAttempt> {
        let direction_raw: String = row.get("direction");
        let direction = MigrationDirection::from_str(&direction_raw).ok_or_else(|| {
            DomainError::infrastructure(format!("Unknown migration direction '{}'", direction_raw))
        })?;
        let status_raw: String = row.get("status");
        let status = MigrationStatus::from_str(&status_raw).ok_or_else(|| {
            DomainError::infrastructure(format!("Unknown migration status '{}'", status_raw))
        })?;
        let progress: BTreeMap<String, CollectionProgress> = row
            .get::<Option<serde_json::Value>, _>("progress")
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| {
                DomainError::infrastructure(format!("Malformed progress payload: {}", e))
            })?
            .unwrap_or_default();

        Ok(MigrationAttempt {
            id: MigrationId(row.get::<Uuid, _>("id")),
            org_id: OrgId::new(row.get::<String, _>("org_id")),
            direction,
            status,
            dry_run: row.get("dry_run"),
            resume_requested: row.get("resume_requested"),
            allow_legal_hold_override: row.get("allow_legal_hold_override"),
            actor_user_id: row.get("actor_user_id"),
            actor_role: row
                .get::<Option<String>, _>("actor_role")
                .and_then(|r| ActorRole::from_str(&r)),
            target: DatastoreLocation::new(
                row.get::<String, _>("target_uri"),
                row.get::<Option<String>, _>("target_db_name"),
            ),
            chunk_size: row.get::<i64, _>("chunk_size") as u32,
            progress,
            error: row.get("error"),
            started_at: row.get::<DateTime<Utc>, _>("started_at"),
            last_progress_at: row.get::<Option<DateTime<Utc>>, _>("last_progress_at"),
            completed_at: row.get::<Option<DateTime<Utc>>, _>("completed_at"),
        })
    }

    fn progress_value(progress: &BTreeMap<String, CollectionProgress>) -> Result<serde_json::Value> {
        serde_json::to_value(progress)
            .map_err(|e| DomainError::infrastructure(format!("Failed to encode progress: {}", e)))
    }
}

#[async_trait::async_trait]
impl MigrationAttemptRepository for PostgresMigrationAttemptRepository {
    async fn create(&self, attempt: &MigrationAttempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenant_migrations
                (id, org_id, direction, status, dry_run, resume_requested,
                 allow_legal_hold_override, actor_user_id, actor_role, target_uri,
                 target_db_name, chunk_size, progress, error, started_at,
                 last_progress_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(attempt.id.0)
        .bind(attempt.org_id.as_str())
        .bind(attempt.direction.as_str())
        .bind(attempt.status.as_str())
        .bind(attempt.dry_run)
        .bind(attempt.resume_requested)
        .bind(attempt.allow_legal_hold_override)
        .bind(attempt.actor_user_id.as_deref())
        .bind(attempt.actor_role.map(|r| r.as_str()))
        .bind(attempt.target.uri.as_str())
        .bind(attempt.target.db_name.as_deref())
        .bind(attempt.chunk_size as i64)
        .bind(Self::progress_value(&attempt.progress)?)
        .bind(attempt.error.as_deref())
        .bind(attempt.started_at)
        .bind(attempt.last_progress_at)
        .bind(attempt.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to create migration attempt: {}", e),
        })?;

        Ok(())
    }

    async fn update(&self, attempt: &MigrationAttempt) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tenant_migrations
            SET status = $2,
                dry_run = $3,
                resume_requested = $4,
                allow_legal_hold_override = $5,
                actor_user_id = $6,
                actor_role = $7,
                target_uri = $8,
                target_db_name = $9,
                chunk_size = $10,
                progress = $11,
                error = $12,
                last_progress_at = $13,
                completed_at = $14
            WHERE id = $1
            "#,
        )
        .bind(attempt.id.0)
        .bind(attempt.status.as_str())
        .bind(attempt.dry_run)
        .bind(attempt.resume_requested)
        .bind(attempt.allow_legal_hold_override)
        .bind(attempt.actor_user_id.as_deref())
        .bind(attempt.actor_role.map(|r| r.as_str()))
        .bind(attempt.target.uri.as_str())
        .bind(attempt.target.db_name.as_deref())
        .bind(attempt.chunk_size as i64)
        .bind(Self::progress_value(&attempt.progress)?)
        .bind(attempt.error.as_deref())
        .bind(attempt.last_progress_at)
        .bind(attempt.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to update migration attempt: {}", e),
        })?;

        Ok(())
    }

    async fn find_by_id_for_org(
        &self,
        migration_id: &MigrationId,
        org_id: &OrgId,
    ) -> Result<Option<MigrationAttempt>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tenant_migrations WHERE id = $1 AND org_id = $2",
            ATTEMPT_COLUMNS
        ))
        .bind(migration_id.0)
        .bind(org_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to load migration attempt: {}", e),
        })?;

        row.as_ref().map(Self::row_to_attempt).transpose()
    }

    async fn find_latest_for_org(&self, org_id: &OrgId) -> Result<Option<MigrationAttempt>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tenant_migrations WHERE org_id = $1 \
             ORDER BY started_at DESC LIMIT 1",
            ATTEMPT_COLUMNS
        ))
        .bind(org_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to load latest migration attempt: {}", e),
        })?;

        row.as_ref().map(Self::row_to_attempt).transpose()
    }

    async fn find_resumable(
        &self,
        org_id: &OrgId,
        direction: MigrationDirection,
    ) -> Result<Option<MigrationAttempt>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tenant_migrations \
             WHERE org_id = $1 AND direction = $2 \
               AND status IN ('in_progress', 'failed', 'ready_for_cutover') \
             ORDER BY started_at DESC LIMIT 1",
            ATTEMPT_COLUMNS
        ))
        .bind(org_id.as_str())
        .bind(direction.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to look up resumable attempt: {}", e),
        })?;

        row.as_ref().map(Self::row_to_attempt).transpose()
    }

    async fn find_started_since(
        &self,
        org_id: &OrgId,
        since: DateTime<Utc>,
    ) -> Result<Option<MigrationAttempt>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tenant_migrations WHERE org_id = $1 AND started_at >= $2 \
             ORDER BY started_at DESC LIMIT 1",
            ATTEMPT_COLUMNS
        ))
        .bind(org_id.as_str())
        .bind(since)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to look up recent attempts: {}", e),
        })?;

        row.as_ref().map(Self::row_to_attempt).transpose()
    }

    async fn record_progress(
        &self,
        migration_id: &MigrationId,
        entity_key: &str,
        progress: &CollectionProgress,
    ) -> Result<()> {
        let value = serde_json::to_value(progress)
            .map_err(|e| DomainError::infrastructure(format!("Failed to encode progress: {}", e)))?;
        sqlx::query(
            r#"
            UPDATE tenant_migrations
            SET progress = jsonb_set(COALESCE(progress, '{}'::jsonb), $2, $3, true),
                last_progress_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(migration_id.0)
        .bind(vec![entity_key.to_string()])
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to checkpoint progress: {}", e),
        })?;

        Ok(())
    }
}
