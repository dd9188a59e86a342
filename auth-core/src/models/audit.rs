//! Audit model - append-only record of state-changing operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request-scoped metadata attached to audit entries and session issuance.
///
/// Advisory only; never consulted for an authorization decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: Some(ip_address.into()),
            user_agent: Some(user_agent.into()),
        }
    }
}

/// Audit entry. Never mutated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    /// Acting user; `None` for out-of-band flows (e.g. password reset).
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl AuditEntry {
    /// Entry for an action performed by a signed-in user.
    pub fn user_action(
        user_id: Uuid,
        action: impl Into<String>,
        resource: impl Into<String>,
        resource_id: Option<String>,
        metadata: Option<serde_json::Value>,
        ctx: &RequestContext,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            user_id: Some(user_id),
            action: action.into(),
            resource: resource.into(),
            resource_id,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            metadata,
            created_utc: Utc::now(),
        }
    }

    /// Entry for an out-of-band flow where no session exists yet.
    pub fn anonymous_action(
        action: impl Into<String>,
        resource: impl Into<String>,
        resource_id: Option<String>,
        ctx: &RequestContext,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            user_id: None,
            action: action.into(),
            resource: resource.into(),
            resource_id,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            metadata: None,
            created_utc: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
