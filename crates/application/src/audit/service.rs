use serde_json::Value;
use std::sync::Arc;
use tenantshift_domain::audit::{AuditLog, AuditRepository};
use tenantshift_domain::shared_kernel::{OrgId, Result};
use tracing::warn;

/// Records lifecycle events into the audit sink.
///
/// A failing sink must never fail the migration operation that produced
/// the event, so `record` swallows repository errors after logging them.
#[derive(Clone)]
pub struct AuditService {
    repository: Arc<dyn AuditRepository>,
}

impl AuditService {
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self { repository }
    }

    pub async fn record(
        &self,
        event_type: &str,
        org_id: Option<OrgId>,
        actor: Option<String>,
        payload: Value,
    ) {
        let log = AuditLog::new(event_type, org_id, actor, payload);
        if let Err(err) = self.repository.save(&log).await {
            warn!("Audit write failed for event '{}': {}", event_type, err);
        }
    }

    pub async fn logs_for_org(&self, org_id: &OrgId, limit: i64) -> Result<Vec<AuditLog>> {
        self.repository.find_by_org(org_id, limit).await
    }
}
