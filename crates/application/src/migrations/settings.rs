//! Engine settings
//!
//! Built once by the composition root from configuration and threaded
//! through the service; nothing here is global mutable state.

use chrono::Duration;
use tenantshift_domain::datastore::DatastoreLocation;

pub const DEFAULT_CHUNK_SIZE: u32 = 100;
pub const MAX_CHUNK_SIZE: u32 = 5000;
pub const START_COOLDOWN_SECS: i64 = 30;

#[derive(Debug, Clone)]
pub struct MigrationSettings {
    /// Location of the shared multi-tenant datastore.
    pub shared: DatastoreLocation,
    /// Prefix for derived dedicated database names (`<prefix><org id>`).
    pub dedicated_db_prefix: String,
    pub default_chunk_size: u32,
    pub max_chunk_size: u32,
    /// Cool-down between brand-new starts for the same org.
    pub start_cooldown: Duration,
}

impl MigrationSettings {
    pub fn new(shared: DatastoreLocation) -> Self {
        Self {
            shared,
            dedicated_db_prefix: "tenant_".to_string(),
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunk_size: MAX_CHUNK_SIZE,
            start_cooldown: Duration::seconds(START_COOLDOWN_SECS),
        }
    }

    /// Clamp a requested chunk size into [1, max], falling back to the
    /// default when absent or nonsensical.
    pub fn clamp_chunk_size(&self, requested: Option<u32>) -> u32 {
        match requested {
            None => self.default_chunk_size,
            Some(0) => self.default_chunk_size,
            Some(n) if n > self.max_chunk_size => self.max_chunk_size,
            Some(n) => n,
        }
    }

    /// Default database name for a brand-new dedicated datastore.
    pub fn derived_db_name(&self, org_id: &tenantshift_domain::shared_kernel::OrgId) -> String {
        format!("{}{}", self.dedicated_db_prefix, org_id)
    }
}
