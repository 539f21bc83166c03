//! MigrationAttempt aggregate
//!
//! A migration attempt is the durable record of one relocation of an
//! organization's data between the shared and a dedicated datastore. It
//! is the externally-readable contract for dashboards and resumption
//! tooling, and it is never hard-deleted: terminal attempts stay behind
//! as an audit trail.

use crate::datastore::DatastoreLocation;
use crate::shared_kernel::{Actor, ActorRole, DocumentId, DomainError, MigrationId, OrgId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which way tenant data moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDirection {
    SharedToDedicated,
    DedicatedToShared,
}

impl MigrationDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationDirection::SharedToDedicated => "shared_to_dedicated",
            MigrationDirection::DedicatedToShared => "dedicated_to_shared",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "shared_to_dedicated" => Some(MigrationDirection::SharedToDedicated),
            "dedicated_to_shared" => Some(MigrationDirection::DedicatedToShared),
            _ => None,
        }
    }
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State machine for the migration lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// A copy pass is running (or was running when the process died).
    InProgress,
    /// Pre-copy finished; waiting for an explicit finalize.
    ReadyForCutover,
    /// Terminal: finalized, or a dry-run that finished its pass.
    Completed,
    /// A copy pass stopped on an error; resumable.
    Failed,
    /// Terminal: operator aborted, target cleaned up best-effort.
    Aborted,
}

impl MigrationStatus {
    /// Valid transitions:
    /// - InProgress → ReadyForCutover | Completed (dry-run) | Failed | Aborted
    /// - ReadyForCutover → Completed (finalize) | InProgress (resume) | Aborted
    /// - Failed → InProgress (resume) | Aborted
    #[inline]
    pub fn can_transition_to(&self, target: &MigrationStatus) -> bool {
        match self {
            MigrationStatus::InProgress => matches!(
                target,
                MigrationStatus::ReadyForCutover
                    | MigrationStatus::Completed
                    | MigrationStatus::Failed
                    | MigrationStatus::Aborted
            ),
            MigrationStatus::ReadyForCutover => matches!(
                target,
                MigrationStatus::Completed | MigrationStatus::InProgress | MigrationStatus::Aborted
            ),
            MigrationStatus::Failed => {
                matches!(target, MigrationStatus::InProgress | MigrationStatus::Aborted)
            }
            MigrationStatus::Completed | MigrationStatus::Aborted => false,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationStatus::Completed | MigrationStatus::Aborted)
    }

    /// States a later `start(resume=true)` may pick up from. InProgress
    /// counts: a crash leaves the record there and resumption is the
    /// only way out.
    #[inline]
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            MigrationStatus::InProgress | MigrationStatus::Failed | MigrationStatus::ReadyForCutover
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::InProgress => "in_progress",
            MigrationStatus::ReadyForCutover => "ready_for_cutover",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
            MigrationStatus::Aborted => "aborted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(MigrationStatus::InProgress),
            "ready_for_cutover" => Some(MigrationStatus::ReadyForCutover),
            "completed" => Some(MigrationStatus::Completed),
            "failed" => Some(MigrationStatus::Failed),
            "aborted" => Some(MigrationStatus::Aborted),
            _ => None,
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-entity checkpoint: `{total, copied, last_id}`.
///
/// `total` is a snapshot count taken at pass start, displayed but never
/// trusted for completion under concurrent source writes. `last_id` is
/// the resume cursor: the highest primary key whose document has
/// verifiably landed on the target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionProgress {
    pub total: u64,
    pub copied: u64,
    pub last_id: Option<DocumentId>,
}

impl CollectionProgress {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            copied: 0,
            last_id: None,
        }
    }

    /// Advance past one copied chunk. `copied` never decreases and the
    /// cursor only moves forward.
    pub fn advance(&mut self, page_len: u64, last_id: DocumentId) {
        self.copied += page_len;
        debug_assert!(
            self.last_id.as_ref().map(|prev| *prev < last_id).unwrap_or(true),
            "resume cursor must advance"
        );
        self.last_id = Some(last_id);
    }
}

/// Durable record of one migration's state, target, flags and per-entity
/// progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationAttempt {
    pub id: MigrationId,
    pub org_id: OrgId,
    pub direction: MigrationDirection,
    pub status: MigrationStatus,
    pub dry_run: bool,
    pub resume_requested: bool,
    pub allow_legal_hold_override: bool,
    pub actor_user_id: Option<String>,
    pub actor_role: Option<ActorRole>,
    pub target: DatastoreLocation,
    pub chunk_size: u32,
    pub progress: BTreeMap<String, CollectionProgress>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_progress_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MigrationAttempt {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        org_id: OrgId,
        direction: MigrationDirection,
        target: DatastoreLocation,
        dry_run: bool,
        allow_legal_hold_override: bool,
        chunk_size: u32,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MigrationId::new(),
            org_id,
            direction,
            status: MigrationStatus::InProgress,
            dry_run,
            resume_requested: false,
            allow_legal_hold_override,
            actor_user_id: actor.user_id.clone(),
            actor_role: actor.role,
            target,
            chunk_size,
            progress: BTreeMap::new(),
            error: None,
            started_at: now,
            last_progress_at: None,
            completed_at: None,
        }
    }

    /// Move to `target` if the state machine allows it.
    pub fn transition(&mut self, target: MigrationStatus) -> Result<()> {
        if !self.status.can_transition_to(&target) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }

    /// Re-enter `in_progress` for a resumed pass, refreshing the run
    /// parameters while keeping checkpointed progress intact.
    pub fn resume(
        &mut self,
        dry_run: bool,
        allow_legal_hold_override: bool,
        chunk_size: u32,
        target: Option<DatastoreLocation>,
        actor: &Actor,
    ) -> Result<()> {
        if !self.status.is_resumable() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: MigrationStatus::InProgress.to_string(),
            });
        }
        self.status = MigrationStatus::InProgress;
        self.dry_run = dry_run;
        self.resume_requested = true;
        self.allow_legal_hold_override = allow_legal_hold_override;
        self.chunk_size = chunk_size;
        self.actor_user_id = actor.user_id.clone();
        self.actor_role = actor.role;
        if let Some(target) = target {
            self.target = target;
        }
        self.error = None;
        self.completed_at = None;
        Ok(())
    }

    pub fn mark_ready_for_cutover(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(MigrationStatus::ReadyForCutover)?;
        self.error = None;
        self.last_progress_at = Some(now);
        Ok(())
    }

    pub fn mark_dry_run_completed(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(MigrationStatus::Completed)?;
        self.error = None;
        self.last_progress_at = Some(now);
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn mark_failed(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition(MigrationStatus::Failed)?;
        self.error = Some(message.into());
        self.last_progress_at = Some(now);
        Ok(())
    }

    pub fn mark_aborted(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition(MigrationStatus::Aborted)?;
        self.error = Some(reason.into());
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn mark_finalized(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(MigrationStatus::Completed)?;
        self.completed_at = Some(now);
        self.last_progress_at = Some(now);
        Ok(())
    }

    /// Record a per-entity checkpoint, enforcing monotonicity: `copied`
    /// never decreases and the cursor only advances.
    pub fn record_progress(
        &mut self,
        entity_key: &str,
        progress: CollectionProgress,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(existing) = self.progress.get(entity_key) {
            if progress.copied < existing.copied {
                return Err(DomainError::validation(format!(
                    "progress for '{}' would regress: copied {} -> {}",
                    entity_key, existing.copied, progress.copied
                )));
            }
            if let (Some(prev), Some(next)) = (&existing.last_id, &progress.last_id) {
                if next < prev {
                    return Err(DomainError::validation(format!(
                        "resume cursor for '{}' would move backwards: {} -> {}",
                        entity_key, prev, next
                    )));
                }
            }
        }
        self.progress.insert(entity_key.to_string(), progress);
        self.last_progress_at = Some(now);
        Ok(())
    }

    pub fn progress_for(&self, entity_key: &str) -> Option<&CollectionProgress> {
        self.progress.get(entity_key)
    }
}
