//! PostgreSQL Organization Repository
//!
//! Read-mostly view of the organization registry. The engine writes an
//! organization exactly once per migration, at finalize.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tenantshift_domain::organizations::{
    DataResidency, DatastoreSwitch, Organization, OrganizationRepository,
};
use tenantshift_domain::shared_kernel::{DomainError, OrgId, Result};

#[derive(Clone)]
pub struct PostgresOrganizationRepository {
    pool: PgPool,
}

impl PostgresOrganizationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_org(row: &PgRow) -> Result<Organization> {
        let residency_raw: String = row.get("data_residency");
        let data_residency = DataResidency::from_str(&residency_raw).ok_or_else(|| {
            DomainError::infrastructure(format!("Unknown data residency '{}'", residency_raw))
        })?;
        let datastore_history: Vec<DatastoreSwitch> = row
            .get::<Option<serde_json::Value>, _>("datastore_history")
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| {
                DomainError::infrastructure(format!("Malformed datastore history: {}", e))
            })?
            .unwrap_or_default();

        Ok(Organization {
            id: OrgId::new(row.get::<String, _>("id")),
            name: row.get("name"),
            archived_at: row.get::<Option<DateTime<Utc>>, _>("archived_at"),
            legal_hold: row.get("legal_hold"),
            use_dedicated_db: row.get("use_dedicated_db"),
            database_uri: row.get("database_uri"),
            database_name: row.get("database_name"),
            data_residency,
            last_migrated_at: row.get::<Option<DateTime<Utc>>, _>("last_migrated_at"),
            datastore_history,
        })
    }
}

#[async_trait::async_trait]
impl OrganizationRepository for PostgresOrganizationRepository {
    async fn find_by_id(&self, org_id: &OrgId) -> Result<Option<Organization>> {
        let row = sqlx::query(
            "SELECT id, name, archived_at, legal_hold, use_dedicated_db, database_uri, \
             database_name, data_residency, last_migrated_at, datastore_history \
             FROM organizations WHERE id = $1",
        )
        .bind(org_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to load organization: {}", e),
        })?;

        row.as_ref().map(Self::row_to_org).transpose()
    }

    async fn save(&self, org: &Organization) -> Result<()> {
        let history = serde_json::to_value(&org.datastore_history).map_err(|e| {
            DomainError::infrastructure(format!("Failed to encode datastore history: {}", e))
        })?;
        sqlx::query(
            r#"
            INSERT INTO organizations
                (id, name, archived_at, legal_hold, use_dedicated_db, database_uri,
                 database_name, data_residency, last_migrated_at, datastore_history)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                archived_at = EXCLUDED.archived_at,
                legal_hold = EXCLUDED.legal_hold,
                use_dedicated_db = EXCLUDED.use_dedicated_db,
                database_uri = EXCLUDED.database_uri,
                database_name = EXCLUDED.database_name,
                data_residency = EXCLUDED.data_residency,
                last_migrated_at = EXCLUDED.last_migrated_at,
                datastore_history = EXCLUDED.datastore_history
            "#,
        )
        .bind(org.id.as_str())
        .bind(org.name.as_str())
        .bind(org.archived_at)
        .bind(org.legal_hold)
        .bind(org.use_dedicated_db)
        .bind(org.database_uri.as_deref())
        .bind(org.database_name.as_deref())
        .bind(org.data_residency.as_str())
        .bind(org.last_migrated_at)
        .bind(history)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to save organization: {}", e),
        })?;

        Ok(())
    }
}
