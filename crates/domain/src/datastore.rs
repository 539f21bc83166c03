//! Datastore ports
//!
//! The engine never talks to a concrete database from the domain or
//! application layers. It sees tenant data through the `Datastore` port
//! (one handle per physical datastore) and obtains handles through the
//! `DatastoreProvider` port, whose implementation memoizes live
//! connections keyed by location.

use crate::shared_kernel::{DocumentId, OrgId, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Physical location of a datastore: connection URI plus an optional
/// database name carved out of the same server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatastoreLocation {
    pub uri: String,
    pub db_name: Option<String>,
}

impl DatastoreLocation {
    pub fn new(uri: impl Into<String>, db_name: Option<String>) -> Self {
        Self {
            uri: uri.into(),
            db_name,
        }
    }

    /// Stable key used by connection caches to memoize handles.
    pub fn cache_key(&self) -> String {
        format!("{}::{}", self.uri, self.db_name.as_deref().unwrap_or(""))
    }
}

impl fmt::Display for DatastoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.db_name {
            Some(db) => write!(f, "{}/{}", self.uri, db),
            None => write!(f, "{}", self.uri),
        }
    }
}

/// How documents of one entity are scoped to their owning organization.
///
/// Most entities carry a single `orgId` field; a few legacy collections
/// were scoped inconsistently and match on any of several field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgScope {
    Single(&'static str),
    AnyOf(&'static [&'static str]),
}

impl OrgScope {
    pub fn fields(&self) -> &[&'static str] {
        match self {
            OrgScope::Single(field) => std::slice::from_ref(field),
            OrgScope::AnyOf(fields) => fields,
        }
    }
}

/// Static binding of a logical entity to its collection and scope filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityConfig {
    pub key: &'static str,
    pub collection: &'static str,
    pub scope: OrgScope,
}

/// The fixed set of tenant-scoped entities a migration relocates, in
/// copy order. `contacts` historically wrote either `orgId` or
/// `organizationId` depending on the ingestion path, hence the OR scope.
pub const ENTITY_CONFIGS: &[EntityConfig] = &[
    EntityConfig {
        key: "users",
        collection: "users",
        scope: OrgScope::Single("orgId"),
    },
    EntityConfig {
        key: "invites",
        collection: "invites",
        scope: OrgScope::Single("orgId"),
    },
    EntityConfig {
        key: "contacts",
        collection: "contacts",
        scope: OrgScope::AnyOf(&["orgId", "organizationId"]),
    },
    EntityConfig {
        key: "projects",
        collection: "projects",
        scope: OrgScope::Single("orgId"),
    },
    EntityConfig {
        key: "offices",
        collection: "offices",
        scope: OrgScope::Single("orgId"),
    },
    EntityConfig {
        key: "event_logs",
        collection: "event_logs",
        scope: OrgScope::Single("orgId"),
    },
];

/// One tenant-scoped document: an opaque body keyed by its source
/// primary key. Scope fields live inside the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub body: Value,
}

impl Document {
    pub fn new(id: DocumentId, body: Value) -> Self {
        Self { id, body }
    }

    /// True when any of the entity's scope fields matches `org_id`.
    pub fn belongs_to(&self, entity: &EntityConfig, org_id: &OrgId) -> bool {
        entity
            .scope
            .fields()
            .iter()
            .any(|field| self.body.get(field).and_then(Value::as_str) == Some(org_id.as_str()))
    }
}

/// Handle to one physical datastore holding tenant collections.
#[async_trait::async_trait]
pub trait Datastore: Send + Sync {
    /// Lightweight liveness probe, run before any writes are issued.
    async fn ping(&self) -> Result<()>;

    /// Count of org-scoped documents at pass start. Snapshot only: it is
    /// displayed, never used as a completion oracle.
    async fn count(&self, entity: &EntityConfig, org_id: &OrgId) -> Result<u64>;

    /// Fetch up to `limit` org-scoped documents with id strictly greater
    /// than `after`, ordered ascending by id.
    async fn fetch_chunk(
        &self,
        entity: &EntityConfig,
        org_id: &OrgId,
        after: Option<&DocumentId>,
        limit: u32,
    ) -> Result<Vec<Document>>;

    /// Replace-if-present-else-insert every document, keyed by its source
    /// primary key. Writes of one call are issued concurrently and
    /// awaited together; replaying a chunk is a no-op.
    async fn upsert_many(&self, entity: &EntityConfig, docs: &[Document]) -> Result<()>;

    /// Delete every org-scoped document of the entity. Returns the
    /// number of documents removed.
    async fn delete_org_scoped(&self, entity: &EntityConfig, org_id: &OrgId) -> Result<u64>;
}

/// Connection Cache port: hands out memoized datastore handles.
///
/// Implementations create handles lazily on first use and evict an entry
/// whose liveness probe fails, so the next call retries cleanly instead
/// of reusing a broken connection. Handles are shared across unrelated
/// migrations targeting the same location; callers must not assume
/// exclusive ownership.
#[async_trait::async_trait]
pub trait DatastoreProvider: Send + Sync {
    async fn open(&self, location: &DatastoreLocation) -> Result<std::sync::Arc<dyn Datastore>>;
}
