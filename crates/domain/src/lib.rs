// Tenantshift - Domain Layer
// Bounded contexts:
// - shared_kernel: base types, IDs and shared errors
// - migrations: MigrationAttempt aggregate, state machine, attempt repository
// - organizations: Organization record and datastore pointer
// - datastore: entity configs, documents and datastore ports
// - audit: AuditLog and audit repository

pub mod shared_kernel;

pub mod audit;
pub mod datastore;
pub mod migrations;
pub mod organizations;

pub use shared_kernel::*;

pub use audit::*;
pub use datastore::*;
pub use migrations::*;
pub use organizations::*;
