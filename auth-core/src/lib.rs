//! Authentication and authorization core for the admin backend.
//!
//! Three mechanisms live here: a stateless signed cookie session with
//! sliding expiry, a role/override permission resolver with an ADMIN
//! super-role bypass, and a single-use account token store for email
//! verification and password reset. The CRUD surface consuming them is a
//! collaborator, not part of this crate.

pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::AuthConfig;
use crate::services::{
    AccountService, AuditService, AuditSink, AuthStore, CredentialStore, Database,
    PermissionService, ServiceError, SessionService, TokenService,
};

/// Process-wide service bundle.
///
/// Built once at startup and injected by reference (axum state, DI); the
/// signing secret is loaded here and its absence fails construction, never
/// a request.
#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub sessions: SessionService,
    pub permissions: PermissionService,
    pub tokens: TokenService,
    pub accounts: AccountService,
    pub audit: AuditService,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn AuthStore>,
        credentials: Arc<dyn CredentialStore>,
        sink: Arc<dyn AuditSink>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;

        let sessions = SessionService::new(&config.session)?;
        let audit = AuditService::new(sink);
        let tokens = TokenService::new(&config.tokens, store.clone());
        let permissions = PermissionService::new(store, audit.clone());
        let accounts = AccountService::new(
            credentials,
            sessions.clone(),
            tokens.clone(),
            audit.clone(),
            config.password_policy.clone(),
        );

        Ok(Self {
            config,
            sessions,
            permissions,
            tokens,
            accounts,
            audit,
        })
    }

    /// Wire every storage contract to the same PostgreSQL database.
    pub fn with_database(config: AuthConfig, db: Database) -> Result<Self, ServiceError> {
        let db = Arc::new(db);
        Self::new(config, db.clone(), db.clone(), db)
    }
}
