//! End-to-end engine tests over the in-memory adapters.
//!
//! Each test wires a full MigrationService against fresh in-memory
//! ports, seeds tenant documents, and drives the operator surface the
//! way the platform does.

use serde_json::json;
use std::sync::Arc;

use tenantshift_application::{
    AbortMigration, AuditService, FinalizeMigration, MigrationService, MigrationSettings,
    StartMigration,
};
use tenantshift_domain::datastore::{
    DatastoreLocation, Document, EntityConfig, ENTITY_CONFIGS,
};
use tenantshift_domain::migrations::{MigrationDirection, MigrationStatus};
use tenantshift_domain::organizations::{DataResidency, Organization};
use tenantshift_domain::shared_kernel::{Actor, ActorRole, DocumentId, DomainError, OrgId};
use tenantshift_infrastructure::persistence::in_memory::test_in_memory::{
    InMemoryAuditRepository, InMemoryDatastore, InMemoryDatastoreProvider,
    InMemoryMigrationAttemptRepository, InMemoryOrganizationRepository,
};

struct Harness {
    service: MigrationService,
    attempts: Arc<InMemoryMigrationAttemptRepository>,
    orgs: Arc<InMemoryOrganizationRepository>,
    audit_logs: Arc<InMemoryAuditRepository>,
    provider: Arc<InMemoryDatastoreProvider>,
    shared: DatastoreLocation,
}

fn harness() -> Harness {
    let shared = DatastoreLocation::new("mem://shared", Some("saas_core".into()));
    let attempts = Arc::new(InMemoryMigrationAttemptRepository::new());
    let orgs = Arc::new(InMemoryOrganizationRepository::new());
    let audit_logs = Arc::new(InMemoryAuditRepository::new());
    let provider = Arc::new(InMemoryDatastoreProvider::new());
    let service = MigrationService::new(
        attempts.clone(),
        orgs.clone(),
        provider.clone(),
        AuditService::new(audit_logs.clone()),
        MigrationSettings::new(shared.clone()),
    );
    Harness {
        service,
        attempts,
        orgs,
        audit_logs,
        provider,
        shared,
    }
}

fn operator() -> Actor {
    Actor::new("op-1", ActorRole::Superadmin)
}

fn entity(key: &str) -> &'static EntityConfig {
    ENTITY_CONFIGS
        .iter()
        .find(|e| e.key == key)
        .unwrap_or_else(|| panic!("unknown entity {}", key))
}

fn tenant_target() -> DatastoreLocation {
    DatastoreLocation::new("mem://tenant", Some("tenant_org1".into()))
}

fn start_cmd(org: &str) -> StartMigration {
    let target = tenant_target();
    StartMigration {
        target_uri: Some(target.uri),
        target_db_name: target.db_name,
        chunk_size: Some(100),
        ..StartMigration::new(OrgId::from(org), MigrationDirection::SharedToDedicated)
    }
}

fn seed_entity(store: &InMemoryDatastore, config: &EntityConfig, org: &str, count: usize) {
    let docs = (1..=count)
        .map(|i| {
            Document::new(
                DocumentId::new(format!("{}-{:04}", config.key, i)),
                json!({ "orgId": org, "seq": i }),
            )
        })
        .collect();
    store.seed(config.collection, docs);
}

fn assert_org_docs_match(
    source: &InMemoryDatastore,
    target: &InMemoryDatastore,
    org: &OrgId,
) {
    for config in ENTITY_CONFIGS {
        let filter = |store: &InMemoryDatastore| -> Vec<Document> {
            store
                .documents(config.collection)
                .into_iter()
                .filter(|d| d.belongs_to(config, org))
                .collect()
        };
        assert_eq!(filter(source), filter(target), "entity {}", config.key);
    }
}

#[tokio::test]
async fn full_pass_reaches_ready_for_cutover_and_copies_only_the_org() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
    let source = h.provider.store_for(&h.shared);
    seed_entity(&source, entity("users"), "org-1", 12);
    seed_entity(&source, entity("projects"), "org-1", 7);
    seed_entity(&source, entity("users"), "org-2", 5);

    let attempt = h.service.start(start_cmd("org-1"), &operator()).await.unwrap();

    assert_eq!(attempt.status, MigrationStatus::ReadyForCutover);
    assert!(attempt.error.is_none());

    let target = h.provider.store_for(&tenant_target());
    assert_org_docs_match(&source, &target, &OrgId::from("org-1"));
    // The other tenant stays put.
    assert_eq!(
        target.org_document_count(entity("users"), &OrgId::from("org-2")),
        0
    );

    let users = attempt.progress_for("users").unwrap();
    assert_eq!((users.total, users.copied), (12, 12));
    let projects = attempt.progress_for("projects").unwrap();
    assert_eq!((projects.total, projects.copied), (7, 7));
}

#[tokio::test]
async fn scenario_250_contacts_chunk_100_writes_exactly_three_checkpoints() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
    let source = h.provider.store_for(&h.shared);
    seed_entity(&source, entity("contacts"), "org-1", 250);

    let attempt = h.service.start(start_cmd("org-1"), &operator()).await.unwrap();

    let contacts = attempt.progress_for("contacts").unwrap();
    assert_eq!(contacts.total, 250);
    assert_eq!(contacts.copied, 250);
    assert_eq!(contacts.last_id, Some(DocumentId::from("contacts-0250")));
    // After 100, 200, 250 — nothing else.
    assert_eq!(h.attempts.checkpoint_count_for("contacts"), 3);
}

#[tokio::test]
async fn dry_run_simulates_the_pass_without_touching_the_target() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
    let source = h.provider.store_for(&h.shared);
    seed_entity(&source, entity("users"), "org-1", 40);
    seed_entity(&source, entity("contacts"), "org-1", 9);

    let cmd = StartMigration {
        dry_run: true,
        ..start_cmd("org-1")
    };
    let attempt = h.service.start(cmd, &operator()).await.unwrap();

    assert_eq!(attempt.status, MigrationStatus::Completed);
    assert!(attempt.completed_at.is_some());

    let target = h.provider.store_for(&tenant_target());
    assert_eq!(target.upsert_batch_count(), 0);
    for config in ENTITY_CONFIGS {
        assert_eq!(target.documents(config.collection).len(), 0);
    }

    let users = attempt.progress_for("users").unwrap();
    assert_eq!((users.total, users.copied, users.last_id.clone()), (40, 40, None));
    let contacts = attempt.progress_for("contacts").unwrap();
    assert_eq!((contacts.total, contacts.copied), (9, 9));
    assert!(h
        .audit_logs
        .event_types()
        .contains(&"migration.dry_run.completed".to_string()));
}

#[tokio::test]
async fn legal_hold_rejects_before_any_connection_is_opened() {
    let h = harness();
    let mut org = Organization::new(OrgId::from("org-1"), "Acme");
    org.legal_hold = true;
    h.orgs.put(org);

    let err = h.service.start(start_cmd("org-1"), &operator()).await.unwrap_err();
    assert!(matches!(err, DomainError::Forbidden { .. }));
    assert_eq!(h.provider.open_count(), 0);

    // With the override the same call goes through.
    let cmd = StartMigration {
        override_legal_hold: true,
        ..start_cmd("org-1")
    };
    let attempt = h.service.start(cmd, &operator()).await.unwrap();
    assert_eq!(attempt.status, MigrationStatus::ReadyForCutover);
    assert!(attempt.allow_legal_hold_override);
}

#[tokio::test]
async fn non_operator_roles_are_rejected() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));

    for role in [ActorRole::PlatformAdmin, ActorRole::OrgAdmin, ActorRole::Member] {
        let err = h
            .service
            .start(start_cmd("org-1"), &Actor::new("u-1", role))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden { .. }), "role {}", role);
    }
    assert_eq!(h.provider.open_count(), 0);
}

#[tokio::test]
async fn interrupting_at_every_chunk_boundary_resumes_to_the_same_result() {
    // users: 50 docs = 1 chunk, contacts: 250 docs = 3 chunks.
    let total_batches = 4u64;
    for boundary in 0..total_batches {
        let h = harness();
        h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
        let source = h.provider.store_for(&h.shared);
        seed_entity(&source, entity("users"), "org-1", 50);
        seed_entity(&source, entity("contacts"), "org-1", 250);

        let target = h.provider.store_for(&tenant_target());
        target.fail_upserts_after_batches(boundary);

        let err = h.service.start(start_cmd("org-1"), &operator()).await.unwrap_err();
        assert!(
            matches!(err, DomainError::InfrastructureError { .. }),
            "boundary {}",
            boundary
        );

        let failed = h
            .service
            .status(&OrgId::from("org-1"), &operator())
            .await
            .unwrap();
        assert_eq!(failed.status, MigrationStatus::Failed, "boundary {}", boundary);
        assert!(failed.error.is_some());

        target.clear_failures();
        let resumed = h.service.start(start_cmd("org-1"), &operator()).await.unwrap();

        assert_eq!(resumed.status, MigrationStatus::ReadyForCutover);
        assert!(resumed.resume_requested);
        assert_org_docs_match(&source, &target, &OrgId::from("org-1"));
        let contacts = resumed.progress_for("contacts").unwrap();
        assert_eq!((contacts.total, contacts.copied), (250, 250), "boundary {}", boundary);
    }
}

#[tokio::test]
async fn rerunning_a_finished_pass_leaves_the_target_identical() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
    let source = h.provider.store_for(&h.shared);
    seed_entity(&source, entity("users"), "org-1", 30);

    h.service.start(start_cmd("org-1"), &operator()).await.unwrap();
    let target = h.provider.store_for(&tenant_target());
    let first_pass = target.documents("users");

    // ready_for_cutover is resumable; a second pass finds nothing past
    // the cursor and rewrites nothing.
    let again = h.service.start(start_cmd("org-1"), &operator()).await.unwrap();
    assert_eq!(again.status, MigrationStatus::ReadyForCutover);
    assert_eq!(target.documents("users"), first_pass);
    assert_org_docs_match(&source, &target, &OrgId::from("org-1"));
}

#[tokio::test]
async fn existing_attempt_requires_resume_flag() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
    let source = h.provider.store_for(&h.shared);
    seed_entity(&source, entity("users"), "org-1", 3);

    h.service.start(start_cmd("org-1"), &operator()).await.unwrap();

    let cmd = StartMigration {
        resume: false,
        ..start_cmd("org-1")
    };
    let err = h.service.start(cmd, &operator()).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation { .. }));
}

#[tokio::test]
async fn cooldown_throttles_brand_new_starts_for_the_same_org() {
    let h = harness();
    let mut org = Organization::new(OrgId::from("org-1"), "Acme");
    // Dedicated pointer present so the reverse direction passes its
    // precondition and reaches the cool-down check.
    org.use_dedicated_db = true;
    org.database_uri = Some("mem://tenant".into());
    org.database_name = Some("tenant_org1".into());
    h.orgs.put(org);

    let forward = h.service.start(start_cmd("org-1"), &operator()).await.unwrap();
    assert_eq!(forward.status, MigrationStatus::ReadyForCutover);

    // A brand-new attempt in the other direction lands inside the
    // cool-down window while the first is still pending cutover.
    let reverse = StartMigration::new(OrgId::from("org-1"), MigrationDirection::DedicatedToShared);
    let err = h.service.start(reverse, &operator()).await.unwrap_err();
    match err {
        DomainError::Validation { message } => {
            assert!(message.contains("recently started"), "{}", message)
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn self_migration_target_is_rejected_without_creating_a_record() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));

    let cmd = StartMigration {
        target_uri: Some(h.shared.uri.clone()),
        target_db_name: h.shared.db_name.clone(),
        ..StartMigration::new(OrgId::from("org-1"), MigrationDirection::SharedToDedicated)
    };
    let err = h.service.start(cmd, &operator()).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation { .. }));

    let status = h.service.status(&OrgId::from("org-1"), &operator()).await;
    assert!(matches!(status, Err(DomainError::NoMigrationForOrg { .. })));
}

#[tokio::test]
async fn dedicated_to_shared_requires_a_dedicated_org() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));

    let cmd = StartMigration::new(OrgId::from("org-1"), MigrationDirection::DedicatedToShared);
    let err = h.service.start(cmd, &operator()).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation { .. }));
}

#[tokio::test]
async fn unreachable_target_fails_the_attempt_at_preflight() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
    let source = h.provider.store_for(&h.shared);
    seed_entity(&source, entity("users"), "org-1", 5);
    h.provider.mark_unreachable(&tenant_target());

    let err = h.service.start(start_cmd("org-1"), &operator()).await.unwrap_err();
    assert!(matches!(err, DomainError::Connectivity { .. }));

    let attempt = h
        .service
        .status(&OrgId::from("org-1"), &operator())
        .await
        .unwrap();
    assert_eq!(attempt.status, MigrationStatus::Failed);
    assert!(attempt.progress.is_empty());
}

#[tokio::test]
async fn abort_after_users_copied_cleans_the_target() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
    let source = h.provider.store_for(&h.shared);
    seed_entity(&source, entity("users"), "org-1", 50);
    seed_entity(&source, entity("contacts"), "org-1", 30);

    // users land in batch 1; the first contacts batch fails.
    let target = h.provider.store_for(&tenant_target());
    target.fail_upserts_after_batches(1);
    h.service.start(start_cmd("org-1"), &operator()).await.unwrap_err();

    let failed = h
        .service
        .status(&OrgId::from("org-1"), &operator())
        .await
        .unwrap();
    let users = failed.progress_for("users").unwrap();
    assert_eq!((users.total, users.copied), (50, 50));
    assert_eq!(target.org_document_count(entity("users"), &OrgId::from("org-1")), 50);

    target.clear_failures();
    let aborted = h
        .service
        .abort(
            AbortMigration {
                migration_id: failed.id.clone(),
                org_id: OrgId::from("org-1"),
                reason: Some("wrong maintenance window".into()),
            },
            &operator(),
        )
        .await
        .unwrap();

    assert_eq!(aborted.status, MigrationStatus::Aborted);
    assert_eq!(aborted.error.as_deref(), Some("wrong maintenance window"));
    assert!(aborted.completed_at.is_some());
    for config in ENTITY_CONFIGS {
        assert_eq!(
            target.org_document_count(config, &OrgId::from("org-1")),
            0,
            "entity {}",
            config.key
        );
    }
    assert!(h
        .audit_logs
        .event_types()
        .contains(&"migration.aborted".to_string()));
}

#[tokio::test]
async fn abort_cleanup_leaves_foreign_tenants_untouched() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
    let source = h.provider.store_for(&h.shared);
    seed_entity(&source, entity("users"), "org-1", 10);

    // The target already hosts another tenant's documents.
    let target = h.provider.store_for(&tenant_target());
    seed_entity(&target, entity("users"), "org-9", 4);

    let attempt = h.service.start(start_cmd("org-1"), &operator()).await.unwrap();
    h.service
        .abort(
            AbortMigration {
                migration_id: attempt.id.clone(),
                org_id: OrgId::from("org-1"),
                reason: None,
            },
            &operator(),
        )
        .await
        .unwrap();

    assert_eq!(target.org_document_count(entity("users"), &OrgId::from("org-1")), 0);
    assert_eq!(target.org_document_count(entity("users"), &OrgId::from("org-9")), 4);

    let aborted = h
        .service
        .status(&OrgId::from("org-1"), &operator())
        .await
        .unwrap();
    assert_eq!(aborted.error.as_deref(), Some("Aborted by operator"));
}

#[tokio::test]
async fn abort_succeeds_even_when_cleanup_cannot_reach_the_target() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
    let source = h.provider.store_for(&h.shared);
    seed_entity(&source, entity("users"), "org-1", 5);

    let attempt = h.service.start(start_cmd("org-1"), &operator()).await.unwrap();
    h.provider.mark_unreachable(&tenant_target());

    let aborted = h
        .service
        .abort(
            AbortMigration {
                migration_id: attempt.id.clone(),
                org_id: OrgId::from("org-1"),
                reason: Some("datacenter gone".into()),
            },
            &operator(),
        )
        .await
        .unwrap();

    assert_eq!(aborted.status, MigrationStatus::Aborted);
    assert_eq!(aborted.error.as_deref(), Some("datacenter gone"));
}

#[tokio::test]
async fn completed_migrations_cannot_be_aborted() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
    let attempt = h.service.start(start_cmd("org-1"), &operator()).await.unwrap();
    h.service
        .finalize(
            FinalizeMigration {
                migration_id: attempt.id.clone(),
                org_id: OrgId::from("org-1"),
                confirm_cutover: true,
            },
            &operator(),
        )
        .await
        .unwrap();

    let err = h
        .service
        .abort(
            AbortMigration {
                migration_id: attempt.id,
                org_id: OrgId::from("org-1"),
                reason: None,
            },
            &operator(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { .. }));
}

#[tokio::test]
async fn finalize_flips_the_org_pointer_to_dedicated() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
    let source = h.provider.store_for(&h.shared);
    seed_entity(&source, entity("offices"), "org-1", 2);

    let attempt = h.service.start(start_cmd("org-1"), &operator()).await.unwrap();
    let finalized = h
        .service
        .finalize(
            FinalizeMigration {
                migration_id: attempt.id.clone(),
                org_id: OrgId::from("org-1"),
                confirm_cutover: true,
            },
            &operator(),
        )
        .await
        .unwrap();

    assert_eq!(finalized.status, MigrationStatus::Completed);
    assert!(finalized.completed_at.is_some());

    let org = h.orgs.get(&OrgId::from("org-1")).unwrap();
    assert!(org.use_dedicated_db);
    assert_eq!(org.data_residency, DataResidency::Dedicated);
    assert_eq!(org.database_uri.as_deref(), Some("mem://tenant"));
    assert_eq!(org.database_name.as_deref(), Some("tenant_org1"));
    assert!(org.last_migrated_at.is_some());
    assert_eq!(org.datastore_history.len(), 1);
    assert!(h
        .audit_logs
        .event_types()
        .contains(&"migration.finalized".to_string()));
}

#[tokio::test]
async fn finalize_flips_the_org_pointer_back_to_shared() {
    let h = harness();
    let mut org = Organization::new(OrgId::from("org-1"), "Acme");
    org.use_dedicated_db = true;
    org.database_uri = Some("mem://tenant".into());
    org.database_name = Some("tenant_org1".into());
    org.data_residency = DataResidency::Dedicated;
    h.orgs.put(org);

    let dedicated = tenant_target();
    let source = h.provider.store_for(&dedicated);
    seed_entity(&source, entity("users"), "org-1", 6);

    let cmd = StartMigration::new(OrgId::from("org-1"), MigrationDirection::DedicatedToShared);
    let attempt = h.service.start(cmd, &operator()).await.unwrap();
    assert_eq!(attempt.status, MigrationStatus::ReadyForCutover);
    assert_eq!(attempt.target, h.shared);

    let shared_store = h.provider.store_for(&h.shared);
    assert_eq!(
        shared_store.org_document_count(entity("users"), &OrgId::from("org-1")),
        6
    );

    h.service
        .finalize(
            FinalizeMigration {
                migration_id: attempt.id,
                org_id: OrgId::from("org-1"),
                confirm_cutover: true,
            },
            &operator(),
        )
        .await
        .unwrap();

    let org = h.orgs.get(&OrgId::from("org-1")).unwrap();
    assert!(!org.use_dedicated_db);
    assert_eq!(org.data_residency, DataResidency::Shared);
    // The dedicated pointer survives on the record for audit purposes.
    assert_eq!(org.database_uri.as_deref(), Some("mem://tenant"));
}

#[tokio::test]
async fn finalize_preconditions_leave_the_org_untouched() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
    let before = h.orgs.get(&OrgId::from("org-1")).unwrap();

    // Dry-run attempts cannot be finalized.
    let dry = StartMigration {
        dry_run: true,
        ..start_cmd("org-1")
    };
    let dry_attempt = h.service.start(dry, &operator()).await.unwrap();
    let err = h
        .service
        .finalize(
            FinalizeMigration {
                migration_id: dry_attempt.id.clone(),
                org_id: OrgId::from("org-1"),
                confirm_cutover: true,
            },
            &operator(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { .. }));

    // Unconfirmed cutover is rejected up front.
    let err = h
        .service
        .finalize(
            FinalizeMigration {
                migration_id: dry_attempt.id.clone(),
                org_id: OrgId::from("org-1"),
                confirm_cutover: false,
            },
            &operator(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { .. }));

    // Unknown migration id.
    let err = h
        .service
        .finalize(
            FinalizeMigration {
                migration_id: tenantshift_domain::shared_kernel::MigrationId::new(),
                org_id: OrgId::from("org-1"),
                confirm_cutover: true,
            },
            &operator(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::MigrationNotFound { .. }));

    let after = h.orgs.get(&OrgId::from("org-1")).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn archived_and_unknown_orgs_are_rejected() {
    let h = harness();
    let mut org = Organization::new(OrgId::from("org-1"), "Acme");
    org.archived_at = Some(chrono::Utc::now());
    h.orgs.put(org);

    let err = h.service.start(start_cmd("org-1"), &operator()).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation { .. }));

    let err = h.service.start(start_cmd("org-404"), &operator()).await.unwrap_err();
    assert!(matches!(err, DomainError::OrganizationNotFound { .. }));
}

#[tokio::test]
async fn audit_trail_records_the_whole_lifecycle() {
    let h = harness();
    h.orgs.put(Organization::new(OrgId::from("org-1"), "Acme"));
    let source = h.provider.store_for(&h.shared);
    seed_entity(&source, entity("users"), "org-1", 2);

    let attempt = h.service.start(start_cmd("org-1"), &operator()).await.unwrap();
    h.service
        .finalize(
            FinalizeMigration {
                migration_id: attempt.id,
                org_id: OrgId::from("org-1"),
                confirm_cutover: true,
            },
            &operator(),
        )
        .await
        .unwrap();

    let events = h.audit_logs.event_types();
    assert_eq!(
        events.iter().filter(|e| *e == "migration.progress").count(),
        ENTITY_CONFIGS.len()
    );
    for expected in [
        "migration.start",
        "migration.ready_for_cutover",
        "migration.finalized",
    ] {
        assert!(events.contains(&expected.to_string()), "missing {}", expected);
    }
}
