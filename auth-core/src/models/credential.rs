//! Credential record - the slice of the admin app's user row this core
//! consumes for first-party login and token confirmation flows.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::{Identity, Role};

/// Stored credentials and role for one user, as returned by the
/// collaborator-owned users table.
#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role_code: String,
    pub password_hash: String,
    pub email_verified: bool,
    pub last_login_utc: Option<DateTime<Utc>>,
}

impl UserCredentials {
    pub fn role(&self) -> Option<Role> {
        self.role_code.parse().ok()
    }

    /// Identity claims to issue on successful login.
    ///
    /// `last_login` carries the previous login time; the store is touched
    /// with the new one separately.
    pub fn identity(&self) -> Option<Identity> {
        Some(Identity {
            user_id: self.user_id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role()?,
            last_login: self.last_login_utc,
        })
    }
}
