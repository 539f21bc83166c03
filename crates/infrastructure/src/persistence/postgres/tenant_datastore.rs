//! PostgreSQL tenant datastore adapter
//!
//! Tenant documents are stored one table per collection as
//! `(id TEXT PRIMARY KEY, body JSONB)`, scoped to their organization by
//! fields inside the body. Collections are created on demand — a
//! dedicated target starts out empty, the way the shared store's
//! collections appeared implicitly on first write.

use futures::future::try_join_all;
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::collections::HashSet;
use std::sync::RwLock;
use tenantshift_domain::datastore::{Datastore, Document, EntityConfig};
use tenantshift_domain::shared_kernel::{DocumentId, DomainError, OrgId, Result};

pub struct PostgresTenantDatastore {
    pool: PgPool,
    ensured: RwLock<HashSet<&'static str>>,
}

impl PostgresTenantDatastore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ensured: RwLock::new(HashSet::new()),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// WHERE predicate matching the entity's org-scope fields against
    /// `$1`. Field names come from the static entity configs, never from
    /// callers.
    fn scope_predicate(entity: &EntityConfig) -> String {
        let clauses: Vec<String> = entity
            .scope
            .fields()
            .iter()
            .map(|field| format!("body->>'{}' = $1", field))
            .collect();
        if clauses.len() == 1 {
            clauses.into_iter().next().unwrap_or_default()
        } else {
            format!("({})", clauses.join(" OR "))
        }
    }

    async fn ensure_collection(&self, entity: &EntityConfig) -> Result<()> {
        {
            let ensured = self
                .ensured
                .read()
                .map_err(|_| DomainError::infrastructure("collection registry poisoned"))?;
            if ensured.contains(entity.collection) {
                return Ok(());
            }
        }

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, body JSONB NOT NULL)",
            entity.collection
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to ensure collection '{}': {}", entity.collection, e),
        })?;

        for field in entity.scope.fields() {
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {} ((body->>'{}'))",
                entity.collection,
                field.to_lowercase(),
                entity.collection,
                field
            ))
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::InfrastructureError {
                message: format!("Failed to index collection '{}': {}", entity.collection, e),
            })?;
        }

        let mut ensured = self
            .ensured
            .write()
            .map_err(|_| DomainError::infrastructure("collection registry poisoned"))?;
        ensured.insert(entity.collection);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Datastore for PostgresTenantDatastore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::connectivity(e.to_string()))?;
        Ok(())
    }

    async fn count(&self, entity: &EntityConfig, org_id: &OrgId) -> Result<u64> {
        self.ensure_collection(entity).await?;
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS total FROM {} WHERE {}",
            entity.collection,
            Self::scope_predicate(entity)
        ))
        .bind(org_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to count '{}': {}", entity.collection, e),
        })?;
        let total: i64 = row.get("total");
        Ok(total as u64)
    }

    async fn fetch_chunk(
        &self,
        entity: &EntityConfig,
        org_id: &OrgId,
        after: Option<&DocumentId>,
        limit: u32,
    ) -> Result<Vec<Document>> {
        self.ensure_collection(entity).await?;
        let rows = sqlx::query(&format!(
            "SELECT id, body FROM {} WHERE {} AND ($2::text IS NULL OR id > $2) \
             ORDER BY id ASC LIMIT $3",
            entity.collection,
            Self::scope_predicate(entity)
        ))
        .bind(org_id.as_str())
        .bind(after.map(|id| id.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to fetch chunk from '{}': {}", entity.collection, e),
        })?;

        Ok(rows
            .iter()
            .map(|row| Document {
                id: DocumentId::new(row.get::<String, _>("id")),
                body: row.get::<serde_json::Value, _>("body"),
            })
            .collect())
    }

    async fn upsert_many(&self, entity: &EntityConfig, docs: &[Document]) -> Result<()> {
        self.ensure_collection(entity).await?;
        let sql = format!(
            "INSERT INTO {} (id, body) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET body = EXCLUDED.body",
            entity.collection
        );
        // The writes of one chunk are issued together and awaited as a
        // batch; each one is an idempotent replace keyed by the source
        // primary key.
        let writes = docs.iter().map(|doc| {
            sqlx::query(&sql)
                .bind(doc.id.as_str())
                .bind(&doc.body)
                .execute(&self.pool)
        });
        try_join_all(writes)
            .await
            .map_err(|e| DomainError::InfrastructureError {
                message: format!("Failed to upsert into '{}': {}", entity.collection, e),
            })?;
        Ok(())
    }

    async fn delete_org_scoped(&self, entity: &EntityConfig, org_id: &OrgId) -> Result<u64> {
        self.ensure_collection(entity).await?;
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE {}",
            entity.collection,
            Self::scope_predicate(entity)
        ))
        .bind(org_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::InfrastructureError {
            message: format!("Failed to delete from '{}': {}", entity.collection, e),
        })?;
        Ok(result.rows_affected())
    }
}
