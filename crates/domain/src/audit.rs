use crate::shared_kernel::{OrgId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLog {
    pub id: Uuid,
    pub event_type: String,
    pub org_id: Option<OrgId>,
    pub actor: Option<String>,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(
        event_type: impl Into<String>,
        org_id: Option<OrgId>,
        actor: Option<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            org_id,
            actor,
            payload,
            occurred_at: Utc::now(),
        }
    }
}

#[async_trait::async_trait]
pub trait AuditRepository: Send + Sync {
    /// Save an audit log entry
    async fn save(&self, log: &AuditLog) -> Result<()>;

    /// Find audit logs for an organization, newest first
    async fn find_by_org(&self, org_id: &OrgId, limit: i64) -> Result<Vec<AuditLog>>;
}
