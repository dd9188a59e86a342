//! Audit sink contract and best-effort emission.
//!
//! Every state-changing operation on the session/permission/token surface
//! emits one entry. Emission happens after the primary mutation commits and
//! runs in its own failure scope: a sink outage is logged, never rolled
//! into the caller-visible result.

use async_trait::async_trait;
use std::sync::Arc;

use crate::models::AuditEntry;

/// Append-only audit write contract, owned by a collaborator.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct AuditService {
    sink: Arc<dyn AuditSink>,
}

impl AuditService {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Emit an entry best-effort (non-blocking).
    ///
    /// The write runs on a spawned task; failures are logged and dropped so
    /// they cannot mask the primary operation's outcome.
    pub fn emit(&self, entry: AuditEntry) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.record(&entry).await {
                tracing::error!(
                    error = %e,
                    action = %entry.action,
                    resource = %entry.resource,
                    "Failed to write audit entry"
                );
            }
        });
    }

    /// Record an entry synchronously, surfacing the sink error.
    ///
    /// For callers that need confirmation (e.g. compliance exports); the
    /// auth flows themselves use `emit`.
    pub async fn record(&self, entry: &AuditEntry) -> Result<(), anyhow::Error> {
        tracing::debug!(
            action = %entry.action,
            resource = %entry.resource,
            user_id = ?entry.user_id,
            "Audit event"
        );
        self.sink.record(entry).await
    }
}
