//! Attempt-store port

use super::attempt::{CollectionProgress, MigrationAttempt, MigrationDirection};
use crate::shared_kernel::{MigrationId, OrgId, Result};
use chrono::{DateTime, Utc};

/// Durable store for migration attempts.
///
/// Attempts are never deleted; terminal records remain queryable as an
/// audit trail.
#[async_trait::async_trait]
pub trait MigrationAttemptRepository: Send + Sync {
    /// Persist a brand-new attempt.
    async fn create(&self, attempt: &MigrationAttempt) -> Result<()>;

    /// Persist the current state of an existing attempt.
    async fn update(&self, attempt: &MigrationAttempt) -> Result<()>;

    /// Fetch one attempt, scoped to its organization.
    async fn find_by_id_for_org(
        &self,
        migration_id: &MigrationId,
        org_id: &OrgId,
    ) -> Result<Option<MigrationAttempt>>;

    /// Most recent attempt for the organization by start time, any
    /// direction, any status.
    async fn find_latest_for_org(&self, org_id: &OrgId) -> Result<Option<MigrationAttempt>>;

    /// Most recent attempt for the org+direction pair still in a
    /// resumable state (`in_progress`, `failed`, `ready_for_cutover`).
    async fn find_resumable(
        &self,
        org_id: &OrgId,
        direction: MigrationDirection,
    ) -> Result<Option<MigrationAttempt>>;

    /// Most recent attempt for the organization started at or after
    /// `since`. Drives the new-attempt cool-down.
    async fn find_started_since(
        &self,
        org_id: &OrgId,
        since: DateTime<Utc>,
    ) -> Result<Option<MigrationAttempt>>;

    /// Write one per-entity checkpoint and stamp `last_progress_at`.
    /// This is the crash-safe persistence point of the copier: it is
    /// called once per copied chunk.
    async fn record_progress(
        &self,
        migration_id: &MigrationId,
        entity_key: &str,
        progress: &CollectionProgress,
    ) -> Result<()>;
}
