//! Migration Orchestrator
//!
//! Drives start/resume/status/abort/finalize for tenant data
//! relocations. One `start` call runs a full copy pass: it validates the
//! operator and the organization, resolves source and target through the
//! connection provider, then copies every entity config in fixed order
//! through the `CollectionCopier`, checkpointing after every chunk.
//! There is no distributed transaction anywhere in this flow; the engine
//! relies on idempotent upserts plus the persisted cursor, and assumes
//! the source is operationally quiesced for the duration of a pass.
//!
//! Known race, documented rather than closed: `abort`/`finalize` against
//! a concurrently resuming `start` on the same attempt is not serialized
//! by the engine; operators must sequence calls per organization.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use tenantshift_domain::datastore::{
    Datastore, DatastoreLocation, DatastoreProvider, ENTITY_CONFIGS,
};
use tenantshift_domain::migrations::{
    CollectionProgress, MigrationAttempt, MigrationAttemptRepository, MigrationDirection,
    MigrationStatus,
};
use tenantshift_domain::organizations::{Organization, OrganizationRepository};
use tenantshift_domain::shared_kernel::{Actor, DomainError, OrgId, Result};

use crate::audit::AuditService;

use super::commands::{AbortMigration, FinalizeMigration, StartMigration};
use super::copier::CollectionCopier;
use super::settings::MigrationSettings;

#[derive(Clone)]
pub struct MigrationService {
    attempts: Arc<dyn MigrationAttemptRepository>,
    orgs: Arc<dyn OrganizationRepository>,
    datastores: Arc<dyn DatastoreProvider>,
    audit: AuditService,
    settings: MigrationSettings,
}

impl MigrationService {
    pub fn new(
        attempts: Arc<dyn MigrationAttemptRepository>,
        orgs: Arc<dyn OrganizationRepository>,
        datastores: Arc<dyn DatastoreProvider>,
        audit: AuditService,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            attempts,
            orgs,
            datastores,
            audit,
            settings,
        }
    }

    /// Start a new copy pass or resume an interrupted one.
    ///
    /// Every precondition rejects before any record is created or
    /// touched; the first mutation is the attempt create/update, and the
    /// first datastore write happens only after the target has answered
    /// the liveness probe.
    pub async fn start(&self, cmd: StartMigration, actor: &Actor) -> Result<MigrationAttempt> {
        self.ensure_platform_operator(actor)?;
        let org = self.require_org(&cmd.org_id).await?;
        if org.is_archived() {
            return Err(DomainError::validation(
                "Cannot migrate an archived organization",
            ));
        }
        self.ensure_legal_hold(&org, cmd.override_legal_hold)?;
        if cmd.direction == MigrationDirection::DedicatedToShared
            && (!org.use_dedicated_db || org.database_uri.is_none())
        {
            return Err(DomainError::validation(
                "Organization is not using a dedicated datastore",
            ));
        }
        let chunk_size = self.settings.clamp_chunk_size(cmd.chunk_size);

        let existing = self.attempts.find_resumable(&cmd.org_id, cmd.direction).await?;
        if existing.is_some() && !cmd.resume {
            return Err(DomainError::validation(
                "Migration already exists for this organization; enable resume to continue",
            ));
        }
        if existing.is_none() {
            self.ensure_cooldown_elapsed(&cmd.org_id).await?;
        }

        let target = match &existing {
            Some(attempt) => merge_resume_target(attempt, &cmd),
            None => self.resolve_initial_target(&org, &cmd)?,
        };
        if cmd.direction == MigrationDirection::SharedToDedicated && target == self.settings.shared
        {
            return Err(DomainError::validation(
                "Target datastore matches the shared datastore; aborting",
            ));
        }

        let mut attempt = match existing {
            Some(mut resumed) => {
                resumed.resume(
                    cmd.dry_run,
                    cmd.override_legal_hold,
                    chunk_size,
                    Some(target),
                    actor,
                )?;
                self.attempts.update(&resumed).await?;
                info!(
                    "Resuming migration {} for org {} ({})",
                    resumed.id, resumed.org_id, resumed.direction
                );
                resumed
            }
            None => {
                let created = MigrationAttempt::new(
                    cmd.org_id.clone(),
                    cmd.direction,
                    target,
                    cmd.dry_run,
                    cmd.override_legal_hold,
                    chunk_size,
                    actor,
                    Utc::now(),
                );
                self.attempts.create(&created).await?;
                info!(
                    "Starting migration {} for org {} ({})",
                    created.id, created.org_id, created.direction
                );
                created
            }
        };

        self.audit
            .record(
                "migration.start",
                Some(attempt.org_id.clone()),
                actor.user_id.clone(),
                json!({
                    "direction": attempt.direction.as_str(),
                    "dry_run": attempt.dry_run,
                    "chunk_size": attempt.chunk_size,
                    "target_db_name": attempt.target.db_name,
                    "resume": cmd.resume,
                }),
            )
            .await;

        match self.run_copy_pass(&mut attempt, &org).await {
            Ok(()) => Ok(attempt),
            Err(err) => {
                let message = err.to_string();
                error!("Migration failed for org {}: {}", attempt.org_id, message);
                // Reload the stored record first: the copier's checkpoints
                // live there and must survive the failure write.
                if let Ok(Some(stored)) = self
                    .attempts
                    .find_by_id_for_org(&attempt.id, &attempt.org_id)
                    .await
                {
                    attempt = stored;
                }
                if attempt.mark_failed(message.clone(), Utc::now()).is_ok() {
                    if let Err(save_err) = self.attempts.update(&attempt).await {
                        warn!(
                            "Could not persist failed status for migration {}: {}",
                            attempt.id, save_err
                        );
                    }
                }
                self.audit
                    .record(
                        "migration.failed",
                        Some(attempt.org_id.clone()),
                        actor.user_id.clone(),
                        json!({
                            "direction": attempt.direction.as_str(),
                            "error": message,
                        }),
                    )
                    .await;
                Err(err)
            }
        }
    }

    /// Most recent attempt for the organization, any direction.
    pub async fn status(&self, org_id: &OrgId, actor: &Actor) -> Result<MigrationAttempt> {
        self.ensure_platform_operator(actor)?;
        self.attempts
            .find_latest_for_org(org_id)
            .await?
            .ok_or_else(|| DomainError::NoMigrationForOrg {
                org_id: org_id.clone(),
            })
    }

    /// Abort a non-completed attempt: best-effort delete of everything
    /// already written to the target, then mark the record `aborted`.
    pub async fn abort(&self, cmd: AbortMigration, actor: &Actor) -> Result<MigrationAttempt> {
        self.ensure_platform_operator(actor)?;
        let mut attempt = self
            .attempts
            .find_by_id_for_org(&cmd.migration_id, &cmd.org_id)
            .await?
            .ok_or_else(|| DomainError::MigrationNotFound {
                migration_id: cmd.migration_id.clone(),
            })?;
        if attempt.status == MigrationStatus::Completed {
            return Err(DomainError::validation(
                "Completed migrations cannot be aborted",
            ));
        }

        // Dry-runs never wrote anything; nothing to clean up. A cleanup
        // failure is logged and the abort proceeds: the record must not
        // stay stuck because the target became unreachable.
        if !attempt.dry_run {
            if let Err(err) = self.cleanup_target_data(&attempt).await {
                warn!(
                    "Rollback cleanup failed for org {}: {}",
                    attempt.org_id, err
                );
            }
        }

        let reason = cmd
            .reason
            .clone()
            .unwrap_or_else(|| "Aborted by operator".to_string());
        attempt.mark_aborted(reason.clone(), Utc::now())?;
        self.attempts.update(&attempt).await?;

        self.audit
            .record(
                "migration.aborted",
                Some(attempt.org_id.clone()),
                actor.user_id.clone(),
                json!({
                    "reason": reason,
                    "migration_id": attempt.id.to_string(),
                }),
            )
            .await;

        Ok(attempt)
    }

    /// Cutover: flip the organization's datastore pointer to the copied
    /// target. Only valid from `ready_for_cutover`, never for dry-runs,
    /// and only with explicit confirmation.
    pub async fn finalize(&self, cmd: FinalizeMigration, actor: &Actor) -> Result<MigrationAttempt> {
        self.ensure_platform_operator(actor)?;
        if !cmd.confirm_cutover {
            return Err(DomainError::validation(
                "Cutover must be explicitly confirmed",
            ));
        }
        let mut attempt = self
            .attempts
            .find_by_id_for_org(&cmd.migration_id, &cmd.org_id)
            .await?
            .ok_or_else(|| DomainError::MigrationNotFound {
                migration_id: cmd.migration_id.clone(),
            })?;
        if attempt.dry_run {
            return Err(DomainError::validation(
                "Cannot finalize a dry-run migration",
            ));
        }
        if attempt.status != MigrationStatus::ReadyForCutover {
            return Err(DomainError::validation("Migration is not ready for cutover"));
        }

        let mut org = self.require_org(&cmd.org_id).await?;
        if org.is_archived() {
            return Err(DomainError::validation(
                "Cannot migrate an archived organization",
            ));
        }

        let now = Utc::now();
        match attempt.direction {
            MigrationDirection::SharedToDedicated => {
                org.switch_to_dedicated(&attempt.target, actor.user_id.clone(), now)
            }
            MigrationDirection::DedicatedToShared => {
                org.switch_to_shared(actor.user_id.clone(), now)
            }
        }
        self.orgs.save(&org).await?;

        attempt.mark_finalized(now)?;
        self.attempts.update(&attempt).await?;

        info!(
            "Cutover completed for org {} ({})",
            attempt.org_id, attempt.direction
        );
        self.audit
            .record(
                "migration.finalized",
                Some(attempt.org_id.clone()),
                actor.user_id.clone(),
                json!({
                    "direction": attempt.direction.as_str(),
                    "target_db_name": attempt.target.db_name,
                }),
            )
            .await;

        Ok(attempt)
    }

    /// One full pass over the entity configs, strictly sequential.
    async fn run_copy_pass(
        &self,
        attempt: &mut MigrationAttempt,
        org: &Organization,
    ) -> Result<()> {
        // Pre-flight: an unreachable target must surface here, before
        // any writes, not mid-copy.
        let target_store: Arc<dyn Datastore> = self.datastores.open(&attempt.target).await?;
        target_store.ping().await?;

        let source_location = self.source_location(attempt.direction, org)?;
        let source_store = self.datastores.open(&source_location).await?;

        self.attempts.update(attempt).await?;

        let copier = CollectionCopier::new(self.attempts.clone(), attempt.chunk_size);
        for entity in ENTITY_CONFIGS {
            if attempt.dry_run {
                // Simulated pass: no writes, progress records the source
                // snapshot as if it had been copied. Overwrites whatever
                // an earlier real pass checkpointed.
                let total = source_store.count(entity, &attempt.org_id).await?;
                let progress = CollectionProgress {
                    total,
                    copied: total,
                    last_id: None,
                };
                self.attempts
                    .record_progress(&attempt.id, entity.key, &progress)
                    .await?;
                attempt.progress.insert(entity.key.to_string(), progress);
                attempt.last_progress_at = Some(Utc::now());
            } else {
                let prior = attempt.progress_for(entity.key).cloned();
                let progress = copier
                    .copy(
                        &attempt.id,
                        entity,
                        &attempt.org_id,
                        source_store.as_ref(),
                        target_store.as_ref(),
                        prior,
                    )
                    .await?;
                attempt.progress.insert(entity.key.to_string(), progress);
                attempt.last_progress_at = Some(Utc::now());
            }
            self.audit
                .record(
                    "migration.progress",
                    Some(attempt.org_id.clone()),
                    attempt.actor_user_id.clone(),
                    json!({ "entity": entity.key }),
                )
                .await;
        }

        if attempt.dry_run {
            attempt.mark_dry_run_completed(Utc::now())?;
        } else {
            attempt.mark_ready_for_cutover(Utc::now())?;
        }
        self.attempts.update(attempt).await?;

        let event = if attempt.dry_run {
            "migration.dry_run.completed"
        } else {
            "migration.ready_for_cutover"
        };
        self.audit
            .record(
                event,
                Some(attempt.org_id.clone()),
                attempt.actor_user_id.clone(),
                json!({
                    "direction": attempt.direction.as_str(),
                    "dry_run": attempt.dry_run,
                    "target_db_name": attempt.target.db_name,
                }),
            )
            .await;

        Ok(())
    }

    async fn cleanup_target_data(&self, attempt: &MigrationAttempt) -> Result<u64> {
        let target = self.datastores.open(&attempt.target).await?;
        let mut removed = 0u64;
        for entity in ENTITY_CONFIGS {
            removed += target.delete_org_scoped(entity, &attempt.org_id).await?;
        }
        info!(
            "Abort cleanup removed {} documents for org {}",
            removed, attempt.org_id
        );
        Ok(removed)
    }

    fn source_location(
        &self,
        direction: MigrationDirection,
        org: &Organization,
    ) -> Result<DatastoreLocation> {
        match direction {
            MigrationDirection::SharedToDedicated => Ok(self.settings.shared.clone()),
            MigrationDirection::DedicatedToShared => org.dedicated_location().ok_or_else(|| {
                DomainError::validation("Organization is not using a dedicated datastore")
            }),
        }
    }

    fn resolve_initial_target(
        &self,
        org: &Organization,
        cmd: &StartMigration,
    ) -> Result<DatastoreLocation> {
        match cmd.direction {
            MigrationDirection::SharedToDedicated => {
                let uri = cmd
                    .target_uri
                    .clone()
                    .or_else(|| org.database_uri.clone())
                    .ok_or_else(|| {
                        DomainError::validation("Target URI is required for migration")
                    })?;
                let db_name = cmd
                    .target_db_name
                    .clone()
                    .or_else(|| org.database_name.clone())
                    .unwrap_or_else(|| self.settings.derived_db_name(&org.id));
                Ok(DatastoreLocation::new(uri, Some(db_name)))
            }
            MigrationDirection::DedicatedToShared => Ok(DatastoreLocation {
                uri: cmd
                    .target_uri
                    .clone()
                    .unwrap_or_else(|| self.settings.shared.uri.clone()),
                db_name: cmd
                    .target_db_name
                    .clone()
                    .or_else(|| self.settings.shared.db_name.clone()),
            }),
        }
    }

    async fn ensure_cooldown_elapsed(&self, org_id: &OrgId) -> Result<()> {
        let since = Utc::now() - self.settings.start_cooldown;
        if let Some(recent) = self.attempts.find_started_since(org_id, since).await? {
            if matches!(
                recent.status,
                MigrationStatus::InProgress | MigrationStatus::ReadyForCutover
            ) {
                return Err(DomainError::validation(
                    "Migration recently started; please wait before retrying",
                ));
            }
        }
        Ok(())
    }

    fn ensure_platform_operator(&self, actor: &Actor) -> Result<()> {
        if !actor.is_platform_operator() {
            return Err(DomainError::forbidden(
                "Migration tooling is restricted to platform operators",
            ));
        }
        Ok(())
    }

    fn ensure_legal_hold(&self, org: &Organization, override_hold: bool) -> Result<()> {
        if org.legal_hold && !override_hold {
            return Err(DomainError::forbidden(
                "Organization is under legal hold; migration blocked without override",
            ));
        }
        Ok(())
    }

    async fn require_org(&self, org_id: &OrgId) -> Result<Organization> {
        self.orgs
            .find_by_id(org_id)
            .await?
            .ok_or_else(|| DomainError::OrganizationNotFound {
                org_id: org_id.clone(),
            })
    }
}

/// On resume an explicit target overrides the stored one field-by-field;
/// otherwise the attempt keeps copying where it was already pointed.
fn merge_resume_target(attempt: &MigrationAttempt, cmd: &StartMigration) -> DatastoreLocation {
    DatastoreLocation {
        uri: cmd
            .target_uri
            .clone()
            .unwrap_or_else(|| attempt.target.uri.clone()),
        db_name: cmd
            .target_db_name
            .clone()
            .or_else(|| attempt.target.db_name.clone()),
    }
}
