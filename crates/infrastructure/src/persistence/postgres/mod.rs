//! PostgreSQL persistence
//!
//! Control-plane repositories (attempts, organizations, audit) live in
//! the primary database; tenant documents are reached through
//! `PostgresTenantDatastore` handles opened by the connection cache.

pub mod attempt_repository;
pub mod audit_repository;
pub mod datastore_cache;
pub mod migrations;
pub mod organization_repository;
pub mod tenant_datastore;

pub use attempt_repository::PostgresMigrationAttemptRepository;
pub use audit_repository::PostgresAuditRepository;
pub use datastore_cache::PostgresDatastoreCache;
pub use migrations::run_migrations;
pub use organization_repository::PostgresOrganizationRepository;
pub use tenant_datastore::PostgresTenantDatastore;
