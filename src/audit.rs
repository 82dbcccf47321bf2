use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{error::AppResult, store::OrderStore};

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

pub async fn log_audit(
    store: &dyn OrderStore,
    user_id: Option<Uuid>,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) -> AppResult<()> {
    store
        .record_audit(AuditEntry {
            id: Uuid::new_v4(),
            user_id,
            action: action.to_string(),
            resource: resource.map(str::to_string),
            metadata,
            created_at: Utc::now(),
        })
        .await
}
