//! Datastore connection cache
//!
//! Memoizes live tenant-datastore handles keyed by `(uri, db_name)`.
//! Pools are built lazily and kept small: a handful of connections per
//! external datastore is plenty for a sequential copy pass. An entry
//! whose liveness probe fails is evicted so the next `open` reconnects
//! instead of reusing a broken pool.
//!
//! The cache is shared, process-wide state: unrelated migrations
//! targeting the same location receive the same handle.

use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tenantshift_domain::datastore::{Datastore, DatastoreLocation, DatastoreProvider};
use tenantshift_domain::shared_kernel::{DomainError, Result};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::tenant_datastore::PostgresTenantDatastore;

const TENANT_POOL_MAX_CONNECTIONS: u32 = 5;
const TENANT_POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct PostgresDatastoreCache {
    handles: RwLock<HashMap<String, Arc<PostgresTenantDatastore>>>,
}

impl PostgresDatastoreCache {
    pub fn new() -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Server-level URIs get the database name appended as their path.
    fn connection_url(location: &DatastoreLocation) -> String {
        match &location.db_name {
            Some(db_name) => format!("{}/{}", location.uri.trim_end_matches('/'), db_name),
            None => location.uri.clone(),
        }
    }

    async fn handle_for(&self, location: &DatastoreLocation) -> Result<Arc<PostgresTenantDatastore>> {
        let key = location.cache_key();
        {
            let handles = self.handles.read().await;
            if let Some(handle) = handles.get(&key) {
                return Ok(handle.clone());
            }
        }

        let pool = PgPoolOptions::new()
            .max_connections(TENANT_POOL_MAX_CONNECTIONS)
            .acquire_timeout(TENANT_POOL_ACQUIRE_TIMEOUT)
            .connect_lazy(&Self::connection_url(location))
            .map_err(|e| DomainError::connectivity(format!("{}: {}", location, e)))?;
        let handle = Arc::new(PostgresTenantDatastore::new(pool));

        let mut handles = self.handles.write().await;
        // A racing open may have won; keep the first handle so callers
        // share one pool per location.
        let handle = handles.entry(key).or_insert(handle).clone();
        debug!("Datastore handle cached for {}", location);
        Ok(handle)
    }

    async fn evict(&self, location: &DatastoreLocation) {
        let mut handles = self.handles.write().await;
        if handles.remove(&location.cache_key()).is_some() {
            warn!("Evicted unreachable datastore handle for {}", location);
        }
    }
}

impl Default for PostgresDatastoreCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DatastoreProvider for PostgresDatastoreCache {
    async fn open(&self, location: &DatastoreLocation) -> Result<Arc<dyn Datastore>> {
        let handle = self.handle_for(location).await?;
        // Pools connect lazily, so the probe is what actually reaches
        // the server. Evict on failure rather than caching a dud.
        if let Err(err) = handle.ping().await {
            self.evict(location).await;
            return Err(DomainError::connectivity(format!("{}: {}", location, err)));
        }
        Ok(handle)
    }
}
