//! In-Memory Adapters - TEST ONLY
//!
//! These implementations are for testing purposes only.
//! Do NOT use in production code.
//!
//! They provide fast, isolated test data without requiring a database,
//! plus counters and failure injection so migration properties (number
//! of checkpoint writes, connections opened, interrupted chunks) are
//! observable from tests.

pub mod test_in_memory {
    use chrono::{DateTime, Utc};
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, RwLock};
    use tenantshift_domain::audit::{AuditLog, AuditRepository};
    use tenantshift_domain::datastore::{
        Datastore, DatastoreLocation, DatastoreProvider, Document, EntityConfig,
    };
    use tenantshift_domain::migrations::{
        CollectionProgress, MigrationAttempt, MigrationAttemptRepository, MigrationDirection,
    };
    use tenantshift_domain::organizations::{Organization, OrganizationRepository};
    use tenantshift_domain::shared_kernel::{
        DocumentId, DomainError, MigrationId, OrgId, Result,
    };
    use uuid::Uuid;

    /// In-memory attempt store for tests. Records every checkpoint write
    /// so tests can assert checkpoint granularity.
    #[derive(Clone, Default)]
    pub struct InMemoryMigrationAttemptRepository {
        attempts: Arc<RwLock<HashMap<Uuid, MigrationAttempt>>>,
        checkpoints: Arc<Mutex<Vec<(MigrationId, String, CollectionProgress)>>>,
    }

    impl InMemoryMigrationAttemptRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn checkpoint_writes(&self) -> Vec<(MigrationId, String, CollectionProgress)> {
            self.checkpoints.lock().unwrap().clone()
        }

        pub fn checkpoint_count_for(&self, entity_key: &str) -> usize {
            self.checkpoints
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, key, _)| key == entity_key)
                .count()
        }

        pub fn get(&self, migration_id: &MigrationId) -> Option<MigrationAttempt> {
            self.attempts.read().unwrap().get(&migration_id.0).cloned()
        }
    }

    #[async_trait::async_trait]
    impl MigrationAttemptRepository for InMemoryMigrationAttemptRepository {
        async fn create(&self, attempt: &MigrationAttempt) -> Result<()> {
            self.attempts
                .write()
                .unwrap()
                .insert(attempt.id.0, attempt.clone());
            Ok(())
        }

        async fn update(&self, attempt: &MigrationAttempt) -> Result<()> {
            self.attempts
                .write()
                .unwrap()
                .insert(attempt.id.0, attempt.clone());
            Ok(())
        }

        async fn find_by_id_for_org(
            &self,
            migration_id: &MigrationId,
            org_id: &OrgId,
        ) -> Result<Option<MigrationAttempt>> {
            Ok(self
                .attempts
                .read()
                .unwrap()
                .get(&migration_id.0)
                .filter(|a| &a.org_id == org_id)
                .cloned())
        }

        async fn find_latest_for_org(&self, org_id: &OrgId) -> Result<Option<MigrationAttempt>> {
            Ok(self
                .attempts
                .read()
                .unwrap()
                .values()
                .filter(|a| &a.org_id == org_id)
                .max_by_key(|a| a.started_at)
                .cloned())
        }

        async fn find_resumable(
            &self,
            org_id: &OrgId,
            direction: MigrationDirection,
        ) -> Result<Option<MigrationAttempt>> {
            Ok(self
                .attempts
                .read()
                .unwrap()
                .values()
                .filter(|a| {
                    &a.org_id == org_id && a.direction == direction && a.status.is_resumable()
                })
                .max_by_key(|a| a.started_at)
                .cloned())
        }

        async fn find_started_since(
            &self,
            org_id: &OrgId,
            since: DateTime<Utc>,
        ) -> Result<Option<MigrationAttempt>> {
            Ok(self
                .attempts
                .read()
                .unwrap()
                .values()
                .filter(|a| &a.org_id == org_id && a.started_at >= since)
                .max_by_key(|a| a.started_at)
                .cloned())
        }

        async fn record_progress(
            &self,
            migration_id: &MigrationId,
            entity_key: &str,
            progress: &CollectionProgress,
        ) -> Result<()> {
            let mut attempts = self.attempts.write().unwrap();
            let attempt = attempts.get_mut(&migration_id.0).ok_or_else(|| {
                DomainError::MigrationNotFound {
                    migration_id: migration_id.clone(),
                }
            })?;
            attempt
                .progress
                .insert(entity_key.to_string(), progress.clone());
            attempt.last_progress_at = Some(Utc::now());
            self.checkpoints.lock().unwrap().push((
                migration_id.clone(),
                entity_key.to_string(),
                progress.clone(),
            ));
            Ok(())
        }
    }

    /// In-memory organization registry for tests
    #[derive(Clone, Default)]
    pub struct InMemoryOrganizationRepository {
        orgs: Arc<RwLock<HashMap<String, Organization>>>,
    }

    impl InMemoryOrganizationRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put(&self, org: Organization) {
            self.orgs
                .write()
                .unwrap()
                .insert(org.id.as_str().to_string(), org);
        }

        pub fn get(&self, org_id: &OrgId) -> Option<Organization> {
            self.orgs.read().unwrap().get(org_id.as_str()).cloned()
        }
    }

    #[async_trait::async_trait]
    impl OrganizationRepository for InMemoryOrganizationRepository {
        async fn find_by_id(&self, org_id: &OrgId) -> Result<Option<Organization>> {
            Ok(self.orgs.read().unwrap().get(org_id.as_str()).cloned())
        }

        async fn save(&self, org: &Organization) -> Result<()> {
            self.put(org.clone());
            Ok(())
        }
    }

    /// In-memory audit sink for tests
    #[derive(Clone, Default)]
    pub struct InMemoryAuditRepository {
        logs: Arc<Mutex<Vec<AuditLog>>>,
    }

    impl InMemoryAuditRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn event_types(&self) -> Vec<String> {
            self.logs
                .lock()
                .unwrap()
                .iter()
                .map(|l| l.event_type.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl AuditRepository for InMemoryAuditRepository {
        async fn save(&self, log: &AuditLog) -> Result<()> {
            self.logs.lock().unwrap().push(log.clone());
            Ok(())
        }

        async fn find_by_org(&self, org_id: &OrgId, limit: i64) -> Result<Vec<AuditLog>> {
            let mut logs: Vec<AuditLog> = self
                .logs
                .lock()
                .unwrap()
                .iter()
                .filter(|l| l.org_id.as_ref() == Some(org_id))
                .cloned()
                .collect();
            logs.reverse();
            logs.truncate(limit as usize);
            Ok(logs)
        }
    }

    /// In-memory document store for tests. Collections are ordered by
    /// document id, mirroring the ascending-primary-key cursor of the
    /// real adapter.
    #[derive(Default)]
    pub struct InMemoryDatastore {
        collections: RwLock<HashMap<String, BTreeMap<DocumentId, Document>>>,
        upsert_batches: AtomicU64,
        fail_upserts_after_batches: Mutex<Option<u64>>,
        fail_ping: AtomicBool,
    }

    impl InMemoryDatastore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, collection: &str, docs: Vec<Document>) {
            let mut collections = self.collections.write().unwrap();
            let entries = collections.entry(collection.to_string()).or_default();
            for doc in docs {
                entries.insert(doc.id.clone(), doc);
            }
        }

        pub fn documents(&self, collection: &str) -> Vec<Document> {
            self.collections
                .read()
                .unwrap()
                .get(collection)
                .map(|entries| entries.values().cloned().collect())
                .unwrap_or_default()
        }

        pub fn document_ids(&self, collection: &str) -> Vec<DocumentId> {
            self.collections
                .read()
                .unwrap()
                .get(collection)
                .map(|entries| entries.keys().cloned().collect())
                .unwrap_or_default()
        }

        pub fn org_document_count(&self, entity: &EntityConfig, org_id: &OrgId) -> usize {
            self.collections
                .read()
                .unwrap()
                .get(entity.collection)
                .map(|entries| {
                    entries
                        .values()
                        .filter(|d| d.belongs_to(entity, org_id))
                        .count()
                })
                .unwrap_or(0)
        }

        pub fn upsert_batch_count(&self) -> u64 {
            self.upsert_batches.load(Ordering::SeqCst)
        }

        /// Make every upsert batch after the first `batches` fail, until
        /// cleared with `clear_failures`.
        pub fn fail_upserts_after_batches(&self, batches: u64) {
            *self.fail_upserts_after_batches.lock().unwrap() = Some(batches);
        }

        pub fn fail_pings(&self) {
            self.fail_ping.store(true, Ordering::SeqCst);
        }

        pub fn clear_failures(&self) {
            *self.fail_upserts_after_batches.lock().unwrap() = None;
            self.fail_ping.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl Datastore for InMemoryDatastore {
        async fn ping(&self) -> Result<()> {
            if self.fail_ping.load(Ordering::SeqCst) {
                return Err(DomainError::connectivity("simulated unreachable datastore"));
            }
            Ok(())
        }

        async fn count(&self, entity: &EntityConfig, org_id: &OrgId) -> Result<u64> {
            Ok(self.org_document_count(entity, org_id) as u64)
        }

        async fn fetch_chunk(
            &self,
            entity: &EntityConfig,
            org_id: &OrgId,
            after: Option<&DocumentId>,
            limit: u32,
        ) -> Result<Vec<Document>> {
            Ok(self
                .collections
                .read()
                .unwrap()
                .get(entity.collection)
                .map(|entries| {
                    entries
                        .values()
                        .filter(|d| d.belongs_to(entity, org_id))
                        .filter(|d| after.map(|a| d.id > *a).unwrap_or(true))
                        .take(limit as usize)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn upsert_many(&self, entity: &EntityConfig, docs: &[Document]) -> Result<()> {
            let batch = self.upsert_batches.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(limit) = *self.fail_upserts_after_batches.lock().unwrap() {
                if batch > limit {
                    return Err(DomainError::infrastructure("simulated target write failure"));
                }
            }
            let mut collections = self.collections.write().unwrap();
            let entries = collections.entry(entity.collection.to_string()).or_default();
            for doc in docs {
                entries.insert(doc.id.clone(), doc.clone());
            }
            Ok(())
        }

        async fn delete_org_scoped(&self, entity: &EntityConfig, org_id: &OrgId) -> Result<u64> {
            let mut collections = self.collections.write().unwrap();
            let Some(entries) = collections.get_mut(entity.collection) else {
                return Ok(0);
            };
            let before = entries.len();
            entries.retain(|_, d| !d.belongs_to(entity, org_id));
            Ok((before - entries.len()) as u64)
        }
    }

    /// In-memory connection cache for tests. Tracks how many opens
    /// happened so gating tests can assert no connection was touched.
    #[derive(Default)]
    pub struct InMemoryDatastoreProvider {
        stores: RwLock<HashMap<String, Arc<InMemoryDatastore>>>,
        unreachable: RwLock<HashSet<String>>,
        opened: AtomicUsize,
    }

    impl InMemoryDatastoreProvider {
        pub fn new() -> Self {
            Self::default()
        }

        /// Bind a prepared store to a location before the engine runs.
        pub fn register(&self, location: &DatastoreLocation, store: Arc<InMemoryDatastore>) {
            self.stores
                .write()
                .unwrap()
                .insert(location.cache_key(), store);
        }

        /// Store bound to a location, creating an empty one on demand —
        /// handy for asserting on a target the engine itself created.
        pub fn store_for(&self, location: &DatastoreLocation) -> Arc<InMemoryDatastore> {
            self.stores
                .write()
                .unwrap()
                .entry(location.cache_key())
                .or_insert_with(|| Arc::new(InMemoryDatastore::new()))
                .clone()
        }

        pub fn mark_unreachable(&self, location: &DatastoreLocation) {
            self.unreachable
                .write()
                .unwrap()
                .insert(location.cache_key());
        }

        pub fn open_count(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl DatastoreProvider for InMemoryDatastoreProvider {
        async fn open(&self, location: &DatastoreLocation) -> Result<Arc<dyn Datastore>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.unreachable.read().unwrap().contains(&location.cache_key()) {
                return Err(DomainError::connectivity(format!(
                    "{}: simulated connect failure",
                    location
                )));
            }
            Ok(self.store_for(location))
        }
    }

}
