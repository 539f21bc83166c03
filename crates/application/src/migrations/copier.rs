//! Collection Copier
//!
//! Transfers all org-scoped documents of one entity from a source to a
//! target datastore in bounded chunks, without a distributed
//! transaction. The resume cursor is the ascending primary key: ids are
//! immutable and assigned in increasing order, so `id > last_id` paging
//! visits every document exactly once across interruptions. Upserts are
//! idempotent, which keeps resume-after-crash correct even when the
//! checkpoint write for the final chunk never landed — at most one chunk
//! is re-applied.

use std::sync::Arc;
use tenantshift_domain::datastore::{Datastore, EntityConfig};
use tenantshift_domain::migrations::{CollectionProgress, MigrationAttemptRepository};
use tenantshift_domain::shared_kernel::{MigrationId, OrgId, Result};
use tracing::{debug, info};

pub struct CollectionCopier {
    attempts: Arc<dyn MigrationAttemptRepository>,
    chunk_size: u32,
}

impl CollectionCopier {
    pub fn new(attempts: Arc<dyn MigrationAttemptRepository>, chunk_size: u32) -> Self {
        Self {
            attempts,
            chunk_size,
        }
    }

    /// Copy one entity's org-scoped documents, checkpointing after every
    /// chunk. `prior` is the checkpoint of an interrupted pass; the loop
    /// restarts from its cursor.
    ///
    /// Any failure propagates immediately — there is no per-chunk retry.
    /// Chunk-to-chunk progression is strictly sequential; a checkpoint is
    /// only written once the chunk's writes have landed.
    pub async fn copy(
        &self,
        migration_id: &MigrationId,
        entity: &EntityConfig,
        org_id: &OrgId,
        source: &dyn Datastore,
        target: &dyn Datastore,
        prior: Option<CollectionProgress>,
    ) -> Result<CollectionProgress> {
        // Snapshot count, display only: it may be stale under concurrent
        // source writes and is never used to decide completion.
        let total = source.count(entity, org_id).await?;

        let had_checkpoint = prior.is_some();
        let mut progress = match prior {
            Some(p) => CollectionProgress {
                total,
                copied: p.copied,
                last_id: p.last_id,
            },
            None => CollectionProgress::new(total),
        };

        let mut wrote_checkpoint = false;
        loop {
            let page = source
                .fetch_chunk(entity, org_id, progress.last_id.as_ref(), self.chunk_size)
                .await?;
            let Some(last_doc) = page.last() else {
                // Empty page: the entity is fully copied.
                break;
            };
            let last_id = last_doc.id.clone();

            target.upsert_many(entity, &page).await?;

            progress.advance(page.len() as u64, last_id);
            self.attempts
                .record_progress(migration_id, entity.key, &progress)
                .await?;
            wrote_checkpoint = true;

            debug!(
                entity = entity.key,
                copied = progress.copied,
                total = progress.total,
                "chunk checkpointed"
            );
        }

        // An empty source still gets its record so the entity shows up
        // as already complete; a resumed, already-finished entity keeps
        // its existing checkpoint untouched.
        if !wrote_checkpoint && !had_checkpoint {
            self.attempts
                .record_progress(migration_id, entity.key, &progress)
                .await?;
        }

        info!(
            entity = entity.key,
            copied = progress.copied,
            total = progress.total,
            "collection copied"
        );
        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tenantshift_domain::datastore::{Document, ENTITY_CONFIGS};
    use tenantshift_domain::migrations::{MigrationAttempt, MigrationDirection};
    use tenantshift_domain::shared_kernel::{DocumentId, DomainError};

    struct CheckpointLog {
        entries: Mutex<Vec<(String, CollectionProgress)>>,
    }

    impl CheckpointLog {
        fn new() -> Self {
            Self {
                entries: Mutex::new(Vec::new()),
            }
        }

        fn count(&self) -> usize {
            self.entries.lock().unwrap().len()
        }

        fn last(&self) -> Option<CollectionProgress> {
            self.entries.lock().unwrap().last().map(|(_, p)| p.clone())
        }
    }

    #[async_trait::async_trait]
    impl MigrationAttemptRepository for CheckpointLog {
        async fn create(&self, _attempt: &MigrationAttempt) -> Result<()> {
            Ok(())
        }

        async fn update(&self, _attempt: &MigrationAttempt) -> Result<()> {
            Ok(())
        }

        async fn find_by_id_for_org(
            &self,
            _migration_id: &MigrationId,
            _org_id: &OrgId,
        ) -> Result<Option<MigrationAttempt>> {
            Ok(None)
        }

        async fn find_latest_for_org(&self, _org_id: &OrgId) -> Result<Option<MigrationAttempt>> {
            Ok(None)
        }

        async fn find_resumable(
            &self,
            _org_id: &OrgId,
            _direction: MigrationDirection,
        ) -> Result<Option<MigrationAttempt>> {
            Ok(None)
        }

        async fn find_started_since(
            &self,
            _org_id: &OrgId,
            _since: chrono::DateTime<chrono::Utc>,
        ) -> Result<Option<MigrationAttempt>> {
            Ok(None)
        }

        async fn record_progress(
            &self,
            _migration_id: &MigrationId,
            entity_key: &str,
            progress: &CollectionProgress,
        ) -> Result<()> {
            self.entries
                .lock()
                .unwrap()
                .push((entity_key.to_string(), progress.clone()));
            Ok(())
        }
    }

    /// Minimal single-collection store for copier tests; the full
    /// multi-collection double lives in the infrastructure crate.
    struct FakeStore {
        docs: Mutex<BTreeMap<DocumentId, Document>>,
        fail_upserts_after: Mutex<Option<usize>>,
        upsert_calls: Mutex<usize>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                docs: Mutex::new(BTreeMap::new()),
                fail_upserts_after: Mutex::new(None),
                upsert_calls: Mutex::new(0),
            }
        }

        fn seeded(n: usize) -> Self {
            let store = Self::new();
            {
                let mut docs = store.docs.lock().unwrap();
                for i in 1..=n {
                    let id = DocumentId::new(format!("doc-{:04}", i));
                    docs.insert(
                        id.clone(),
                        Document::new(id, json!({"orgId": "org-1", "seq": i})),
                    );
                }
            }
            store
        }

        fn ids(&self) -> Vec<DocumentId> {
            self.docs.lock().unwrap().keys().cloned().collect()
        }
    }

    #[async_trait::async_trait]
    impl Datastore for FakeStore {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn count(&self, entity: &EntityConfig, org_id: &OrgId) -> Result<u64> {
            Ok(self
                .docs
                .lock()
                .unwrap()
                .values()
                .filter(|d| d.belongs_to(entity, org_id))
                .count() as u64)
        }

        async fn fetch_chunk(
            &self,
            entity: &EntityConfig,
            org_id: &OrgId,
            after: Option<&DocumentId>,
            limit: u32,
        ) -> Result<Vec<Document>> {
            Ok(self
                .docs
                .lock()
                .unwrap()
                .values()
                .filter(|d| d.belongs_to(entity, org_id))
                .filter(|d| after.map(|a| d.id > *a).unwrap_or(true))
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn upsert_many(&self, _entity: &EntityConfig, docs: &[Document]) -> Result<()> {
            {
                let mut calls = self.upsert_calls.lock().unwrap();
                *calls += 1;
                if let Some(limit) = *self.fail_upserts_after.lock().unwrap() {
                    if *calls > limit {
                        return Err(DomainError::infrastructure("target write refused"));
                    }
                }
            }
            let mut stored = self.docs.lock().unwrap();
            for doc in docs {
                stored.insert(doc.id.clone(), doc.clone());
            }
            Ok(())
        }

        async fn delete_org_scoped(&self, entity: &EntityConfig, org_id: &OrgId) -> Result<u64> {
            let mut stored = self.docs.lock().unwrap();
            let before = stored.len();
            stored.retain(|_, d| !d.belongs_to(entity, org_id));
            Ok((before - stored.len()) as u64)
        }
    }

    fn users() -> &'static EntityConfig {
        &ENTITY_CONFIGS[0]
    }

    #[tokio::test]
    async fn checkpoints_once_per_chunk() {
        let source = FakeStore::seeded(250);
        let target = FakeStore::new();
        let log = Arc::new(CheckpointLog::new());
        let copier = CollectionCopier::new(log.clone(), 100);

        let progress = copier
            .copy(
                &MigrationId::new(),
                users(),
                &OrgId::from("org-1"),
                &source,
                &target,
                None,
            )
            .await
            .unwrap();

        // 100 + 100 + 50, one checkpoint each.
        assert_eq!(log.count(), 3);
        assert_eq!(progress.total, 250);
        assert_eq!(progress.copied, 250);
        assert_eq!(progress.last_id, Some(DocumentId::from("doc-0250")));
        assert_eq!(target.ids(), source.ids());
    }

    #[tokio::test]
    async fn empty_source_recorded_as_complete() {
        let source = FakeStore::new();
        let target = FakeStore::new();
        let log = Arc::new(CheckpointLog::new());
        let copier = CollectionCopier::new(log.clone(), 100);

        let progress = copier
            .copy(
                &MigrationId::new(),
                users(),
                &OrgId::from("org-1"),
                &source,
                &target,
                None,
            )
            .await
            .unwrap();

        assert_eq!(log.count(), 1);
        assert_eq!(progress, CollectionProgress::new(0));
    }

    #[tokio::test]
    async fn failure_propagates_and_resume_completes_the_copy() {
        let source = FakeStore::seeded(250);
        let target = FakeStore::new();
        *target.fail_upserts_after.lock().unwrap() = Some(1);
        let log = Arc::new(CheckpointLog::new());
        let copier = CollectionCopier::new(log.clone(), 100);
        let migration_id = MigrationId::new();

        let err = copier
            .copy(
                &migration_id,
                users(),
                &OrgId::from("org-1"),
                &source,
                &target,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InfrastructureError { .. }));

        // One chunk landed, one checkpoint written.
        assert_eq!(log.count(), 1);
        let checkpoint = log.last().unwrap();
        assert_eq!(checkpoint.copied, 100);

        *target.fail_upserts_after.lock().unwrap() = None;
        let progress = copier
            .copy(
                &migration_id,
                users(),
                &OrgId::from("org-1"),
                &source,
                &target,
                Some(checkpoint),
            )
            .await
            .unwrap();

        assert_eq!(progress.copied, 250);
        assert_eq!(target.ids(), source.ids());
    }

    #[tokio::test]
    async fn replaying_a_chunk_is_idempotent() {
        let source = FakeStore::seeded(120);
        let target = FakeStore::new();
        let log = Arc::new(CheckpointLog::new());
        let copier = CollectionCopier::new(log.clone(), 50);
        let migration_id = MigrationId::new();

        copier
            .copy(
                &migration_id,
                users(),
                &OrgId::from("org-1"),
                &source,
                &target,
                None,
            )
            .await
            .unwrap();

        // Simulate a crash where the last checkpoint never landed: rewind
        // the cursor one chunk and run again.
        let stale = CollectionProgress {
            total: 120,
            copied: 100,
            last_id: Some(DocumentId::from("doc-0100")),
        };
        copier
            .copy(
                &migration_id,
                users(),
                &OrgId::from("org-1"),
                &source,
                &target,
                Some(stale),
            )
            .await
            .unwrap();

        assert_eq!(target.ids(), source.ids());
        assert_eq!(
            target.count(users(), &OrgId::from("org-1")).await.unwrap(),
            120
        );
    }

    #[tokio::test]
    async fn already_complete_resume_writes_no_checkpoint() {
        let source = FakeStore::seeded(80);
        let target = FakeStore::new();
        let log = Arc::new(CheckpointLog::new());
        let copier = CollectionCopier::new(log.clone(), 100);
        let migration_id = MigrationId::new();

        let done = copier
            .copy(
                &migration_id,
                users(),
                &OrgId::from("org-1"),
                &source,
                &target,
                None,
            )
            .await
            .unwrap();
        let after_first = log.count();

        let again = copier
            .copy(
                &migration_id,
                users(),
                &OrgId::from("org-1"),
                &source,
                &target,
                Some(done.clone()),
            )
            .await
            .unwrap();

        assert_eq!(log.count(), after_first);
        assert_eq!(again.copied, done.copied);
    }

    #[tokio::test]
    async fn cursor_visits_every_document_for_any_chunk_size() {
        for chunk_size in [1u32, 3, 7, 80, 200] {
            let source = FakeStore::seeded(80);
            let target = FakeStore::new();
            let copier = CollectionCopier::new(Arc::new(CheckpointLog::new()), chunk_size);

            let progress = copier
                .copy(
                    &MigrationId::new(),
                    users(),
                    &OrgId::from("org-1"),
                    &source,
                    &target,
                    None,
                )
                .await
                .unwrap();

            assert_eq!(progress.copied, 80, "chunk_size={}", chunk_size);
            assert_eq!(target.ids(), source.ids(), "chunk_size={}", chunk_size);
        }
    }
}
