//! Organizations Bounded Context - Domain Layer
//!
//! The organization record is owned by the surrounding platform; the
//! migration engine reads it for gating and writes it exactly once, at
//! finalize, when the datastore pointer flips.

use crate::datastore::DatastoreLocation;
use crate::shared_kernel::{OrgId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an organization's data currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataResidency {
    Shared,
    Dedicated,
}

impl DataResidency {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataResidency::Shared => "shared",
            DataResidency::Dedicated => "dedicated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "shared" => Some(DataResidency::Shared),
            "dedicated" => Some(DataResidency::Dedicated),
            _ => None,
        }
    }
}

impl fmt::Display for DataResidency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in the organization's cutover history, appended whenever
/// the datastore pointer flips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastoreSwitch {
    pub from_residency: DataResidency,
    pub to_residency: DataResidency,
    pub from_uri: Option<String>,
    pub to_uri: Option<String>,
    pub actor_user_id: Option<String>,
    pub switched_at: DateTime<Utc>,
}

/// Tenant organization record, as read from the external registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub archived_at: Option<DateTime<Utc>>,
    pub legal_hold: bool,
    pub use_dedicated_db: bool,
    pub database_uri: Option<String>,
    pub database_name: Option<String>,
    pub data_residency: DataResidency,
    pub last_migrated_at: Option<DateTime<Utc>>,
    pub datastore_history: Vec<DatastoreSwitch>,
}

impl Organization {
    pub fn new(id: OrgId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            archived_at: None,
            legal_hold: false,
            use_dedicated_db: false,
            database_uri: None,
            database_name: None,
            data_residency: DataResidency::Shared,
            last_migrated_at: None,
            datastore_history: Vec::new(),
        }
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// The dedicated location recorded on the org, when complete enough
    /// to connect to.
    pub fn dedicated_location(&self) -> Option<DatastoreLocation> {
        self.database_uri
            .as_ref()
            .map(|uri| DatastoreLocation::new(uri.clone(), self.database_name.clone()))
    }

    /// Flip the pointer to a dedicated datastore and append the cutover
    /// history entry.
    pub fn switch_to_dedicated(
        &mut self,
        target: &DatastoreLocation,
        actor_user_id: Option<String>,
        now: DateTime<Utc>,
    ) {
        let from_uri = self.database_uri.clone();
        self.use_dedicated_db = true;
        self.database_uri = Some(target.uri.clone());
        self.database_name = target.db_name.clone();
        self.datastore_history.push(DatastoreSwitch {
            from_residency: self.data_residency,
            to_residency: DataResidency::Dedicated,
            from_uri,
            to_uri: Some(target.uri.clone()),
            actor_user_id,
            switched_at: now,
        });
        self.data_residency = DataResidency::Dedicated;
        self.last_migrated_at = Some(now);
    }

    /// Flip the pointer back to the shared datastore. The dedicated
    /// location stays on the record for audit purposes.
    pub fn switch_to_shared(&mut self, actor_user_id: Option<String>, now: DateTime<Utc>) {
        self.use_dedicated_db = false;
        self.datastore_history.push(DatastoreSwitch {
            from_residency: self.data_residency,
            to_residency: DataResidency::Shared,
            from_uri: self.database_uri.clone(),
            to_uri: None,
            actor_user_id,
            switched_at: now,
        });
        self.data_residency = DataResidency::Shared;
        self.last_migrated_at = Some(now);
    }
}

#[async_trait::async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn find_by_id(&self, org_id: &OrgId) -> Result<Option<Organization>>;

    async fn save(&self, org: &Organization) -> Result<()>;
}
