// Shared Kernel - base types and errors shared between bounded contexts

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a migration attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationId(pub Uuid);

impl MigrationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MigrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a tenant organization.
///
/// Org ids originate in the external organization registry and appear
/// verbatim inside documents as scope-field values, so they are kept as
/// opaque strings rather than parsed ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgId(pub String);

impl OrgId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrgId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Primary key of a tenant-scoped document.
///
/// Keys are immutable and assigned in increasing order at creation, so
/// their lexicographic order is the resume-cursor order of the copier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Roles known to the platform. Only `Superadmin` carries the elevated
/// operator capability required by the migration tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Superadmin,
    PlatformAdmin,
    OrgAdmin,
    Member,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Superadmin => "superadmin",
            ActorRole::PlatformAdmin => "platform_admin",
            ActorRole::OrgAdmin => "org_admin",
            ActorRole::Member => "member",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "superadmin" => Some(ActorRole::Superadmin),
            "platform_admin" => Some(ActorRole::PlatformAdmin),
            "org_admin" => Some(ActorRole::OrgAdmin),
            "member" => Some(ActorRole::Member),
            _ => None,
        }
    }

    /// True when this role may drive tenant migrations.
    #[inline]
    pub fn is_platform_operator(&self) -> bool {
        matches!(self, ActorRole::Superadmin)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The authenticated principal invoking an operator call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Option<String>,
    pub role: Option<ActorRole>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            user_id: Some(user_id.into()),
            role: Some(role),
        }
    }

    pub fn is_platform_operator(&self) -> bool {
        self.role.map(|r| r.is_platform_operator()).unwrap_or(false)
    }
}

/// Domain errors
#[derive(thiserror::Error, Debug)]
pub enum DomainError {
    #[error("Organization not found: {org_id}")]
    OrganizationNotFound { org_id: OrgId },

    #[error("Migration not found: {migration_id}")]
    MigrationNotFound { migration_id: MigrationId },

    #[error("No migration found for organization: {org_id}")]
    NoMigrationForOrg { org_id: OrgId },

    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    Forbidden { message: String },

    #[error("Datastore unreachable: {message}")]
    Connectivity { message: String },

    #[error("Invalid migration state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Infrastructure error: {message}")]
    InfrastructureError { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        DomainError::Forbidden {
            message: message.into(),
        }
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        DomainError::Connectivity {
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        DomainError::InfrastructureError {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
