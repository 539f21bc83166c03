//! Operator commands
//!
//! The thin operator surface hands these to `MigrationService`; routing,
//! validation of the transport payload and session handling live outside
//! this crate.

use serde::{Deserialize, Serialize};
use tenantshift_domain::migrations::MigrationDirection;
use tenantshift_domain::shared_kernel::{MigrationId, OrgId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMigration {
    pub org_id: OrgId,
    pub direction: MigrationDirection,
    /// Explicit target connection URI; defaults are derived from the org
    /// record (shared→dedicated) or the configured shared location
    /// (dedicated→shared).
    pub target_uri: Option<String>,
    pub target_db_name: Option<String>,
    pub dry_run: bool,
    /// Required when a resumable attempt already exists for the
    /// org+direction pair.
    pub resume: bool,
    pub override_legal_hold: bool,
    /// Clamped into [1, max]; engine default when absent.
    pub chunk_size: Option<u32>,
}

impl StartMigration {
    pub fn new(org_id: OrgId, direction: MigrationDirection) -> Self {
        Self {
            org_id,
            direction,
            target_uri: None,
            target_db_name: None,
            dry_run: false,
            resume: true,
            override_legal_hold: false,
            chunk_size: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortMigration {
    pub migration_id: MigrationId,
    pub org_id: OrgId,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeMigration {
    pub migration_id: MigrationId,
    pub org_id: OrgId,
    /// Cutover flips the org's datastore pointer; it must be confirmed
    /// explicitly.
    pub confirm_cutover: bool,
}
