//! Storage contracts for the permission resolver, token store, and account
//! flows, plus an in-memory implementation for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{
    AccountToken, AccountTokenType, AuditEntry, Permission, PermissionOverride, Role,
    UserCredentials, UserPermission,
};
use crate::services::AuditSink;

/// Permission, role-edge, override, and account-token storage.
///
/// `replace_*` and `rotate_account_token` are all-or-nothing: a concurrent
/// reader must never observe a role with zero permissions mid-replace or
/// two simultaneously active tokens of one type.
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn find_permission_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Permission>, anyhow::Error>;
    async fn insert_permission(&self, permission: &Permission) -> Result<(), anyhow::Error>;
    async fn delete_permission(&self, permission_id: Uuid) -> Result<bool, anyhow::Error>;
    async fn list_permissions(&self) -> Result<Vec<Permission>, anyhow::Error>;

    async fn role_has_permission(
        &self,
        role: Role,
        permission_id: Uuid,
    ) -> Result<bool, anyhow::Error>;
    async fn find_role_permissions(&self, role: Role) -> Result<Vec<Permission>, anyhow::Error>;
    async fn replace_role_permissions(
        &self,
        role: Role,
        permission_ids: &[Uuid],
    ) -> Result<(), anyhow::Error>;

    async fn find_user_override(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
    ) -> Result<Option<UserPermission>, anyhow::Error>;
    async fn find_user_overrides(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<UserPermission>, anyhow::Error>;
    async fn replace_user_overrides(
        &self,
        user_id: Uuid,
        overrides: &[PermissionOverride],
    ) -> Result<(), anyhow::Error>;

    /// Delete any active token of the new token's type for its user, then
    /// insert it, as one atomic unit.
    async fn rotate_account_token(&self, token: &AccountToken) -> Result<(), anyhow::Error>;
    async fn find_account_token(
        &self,
        value: &str,
        token_type: AccountTokenType,
    ) -> Result<Option<AccountToken>, anyhow::Error>;
    async fn invalidate_account_token(&self, token_id: Uuid) -> Result<(), anyhow::Error>;
    async fn mark_account_token_used(
        &self,
        value: &str,
        used_at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error>;
    async fn count_active_account_tokens(
        &self,
        user_id: Uuid,
        token_type: AccountTokenType,
    ) -> Result<usize, anyhow::Error>;
}

/// Credential lookup against the collaborator-owned users table.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, anyhow::Error>;
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserCredentials>, anyhow::Error>;
    /// Returns false when no such user exists.
    async fn set_email_verified(&self, user_id: Uuid) -> Result<bool, anyhow::Error>;
    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<bool, anyhow::Error>;
    async fn touch_last_login(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error>;
}

#[derive(Default)]
struct MockState {
    permissions: Vec<Permission>,
    role_permissions: Vec<(String, Uuid)>,
    user_permissions: HashMap<(Uuid, Uuid), bool>,
    tokens: Vec<AccountToken>,
    users: Vec<UserCredentials>,
    audit: Vec<AuditEntry>,
    /// When set, every operation reports an unavailable store.
    unavailable: bool,
}

/// In-memory store for tests. A single mutex makes every multi-row
/// operation trivially atomic.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<MockState>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail, simulating a storage outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state
            .lock()
            .expect("mock store mutex poisoned")
            .unavailable = unavailable;
    }

    pub fn seed_permission(&self, permission: Permission) {
        self.state
            .lock()
            .expect("mock store mutex poisoned")
            .permissions
            .push(permission);
    }

    pub fn seed_role_permission(&self, role: Role, permission_id: Uuid) {
        self.state
            .lock()
            .expect("mock store mutex poisoned")
            .role_permissions
            .push((role.as_str().to_string(), permission_id));
    }

    pub fn seed_user(&self, user: UserCredentials) {
        self.state
            .lock()
            .expect("mock store mutex poisoned")
            .users
            .push(user);
    }

    pub fn seed_token(&self, token: AccountToken) {
        self.state
            .lock()
            .expect("mock store mutex poisoned")
            .tokens
            .push(token);
    }

    pub fn tokens(&self) -> Vec<AccountToken> {
        self.state
            .lock()
            .expect("mock store mutex poisoned")
            .tokens
            .clone()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state
            .lock()
            .expect("mock store mutex poisoned")
            .audit
            .clone()
    }

    pub fn user(&self, user_id: Uuid) -> Option<UserCredentials> {
        self.state
            .lock()
            .expect("mock store mutex poisoned")
            .users
            .iter()
            .find(|u| u.user_id == user_id)
            .cloned()
    }

    /// Lock the state, honoring the simulated-outage flag.
    fn guard(&self) -> Result<MutexGuard<'_, MockState>, anyhow::Error> {
        let state = self
            .state
            .lock()
            .map_err(|e| anyhow::anyhow!("mock store mutex poisoned: {}", e))?;
        if state.unavailable {
            anyhow::bail!("mock store unavailable");
        }
        Ok(state)
    }
}

#[async_trait]
impl AuthStore for MockStore {
    async fn find_permission_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Permission>, anyhow::Error> {
        let state = self.guard()?;
        Ok(state.permissions.iter().find(|p| p.name == name).cloned())
    }

    async fn insert_permission(&self, permission: &Permission) -> Result<(), anyhow::Error> {
        let mut state = self.guard()?;
        if state.permissions.iter().any(|p| p.name == permission.name) {
            anyhow::bail!("duplicate permission name: {}", permission.name);
        }
        state.permissions.push(permission.clone());
        Ok(())
    }

    async fn delete_permission(&self, permission_id: Uuid) -> Result<bool, anyhow::Error> {
        let mut state = self.guard()?;
        let before = state.permissions.len();
        state.permissions.retain(|p| p.permission_id != permission_id);
        state
            .role_permissions
            .retain(|(_, pid)| *pid != permission_id);
        state
            .user_permissions
            .retain(|(_, pid), _| *pid != permission_id);
        Ok(state.permissions.len() != before)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, anyhow::Error> {
        let state = self.guard()?;
        Ok(state.permissions.clone())
    }

    async fn role_has_permission(
        &self,
        role: Role,
        permission_id: Uuid,
    ) -> Result<bool, anyhow::Error> {
        let state = self.guard()?;
        Ok(state
            .role_permissions
            .iter()
            .any(|(r, pid)| r == role.as_str() && *pid == permission_id))
    }

    async fn find_role_permissions(&self, role: Role) -> Result<Vec<Permission>, anyhow::Error> {
        let state = self.guard()?;
        let ids: Vec<Uuid> = state
            .role_permissions
            .iter()
            .filter(|(r, _)| r == role.as_str())
            .map(|(_, pid)| *pid)
            .collect();
        Ok(state
            .permissions
            .iter()
            .filter(|p| ids.contains(&p.permission_id))
            .cloned()
            .collect())
    }

    async fn replace_role_permissions(
        &self,
        role: Role,
        permission_ids: &[Uuid],
    ) -> Result<(), anyhow::Error> {
        let mut state = self.guard()?;
        state.role_permissions.retain(|(r, _)| r != role.as_str());
        for pid in permission_ids {
            state
                .role_permissions
                .push((role.as_str().to_string(), *pid));
        }
        Ok(())
    }

    async fn find_user_override(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
    ) -> Result<Option<UserPermission>, anyhow::Error> {
        let state = self.guard()?;
        Ok(state
            .user_permissions
            .get(&(user_id, permission_id))
            .map(|granted| UserPermission {
                user_id,
                permission_id,
                granted: *granted,
            }))
    }

    async fn find_user_overrides(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<UserPermission>, anyhow::Error> {
        let state = self.guard()?;
        Ok(state
            .user_permissions
            .iter()
            .filter(|((uid, _), _)| *uid == user_id)
            .map(|((uid, pid), granted)| UserPermission {
                user_id: *uid,
                permission_id: *pid,
                granted: *granted,
            })
            .collect())
    }

    async fn replace_user_overrides(
        &self,
        user_id: Uuid,
        overrides: &[PermissionOverride],
    ) -> Result<(), anyhow::Error> {
        let mut state = self.guard()?;
        state.user_permissions.retain(|(uid, _), _| *uid != user_id);
        for o in overrides {
            state
                .user_permissions
                .insert((user_id, o.permission_id), o.granted);
        }
        Ok(())
    }

    async fn rotate_account_token(&self, token: &AccountToken) -> Result<(), anyhow::Error> {
        let mut state = self.guard()?;
        state.tokens.retain(|t| {
            !(t.user_id == token.user_id
                && t.token_type_code == token.token_type_code
                && !t.invalidated
                && t.used_utc.is_none())
        });
        state.tokens.push(token.clone());
        Ok(())
    }

    async fn find_account_token(
        &self,
        value: &str,
        token_type: AccountTokenType,
    ) -> Result<Option<AccountToken>, anyhow::Error> {
        let state = self.guard()?;
        Ok(state
            .tokens
            .iter()
            .find(|t| t.token_value == value && t.token_type_code == token_type.as_str())
            .cloned())
    }

    async fn invalidate_account_token(&self, token_id: Uuid) -> Result<(), anyhow::Error> {
        let mut state = self.guard()?;
        if let Some(token) = state.tokens.iter_mut().find(|t| t.token_id == token_id) {
            token.invalidated = true;
        }
        Ok(())
    }

    async fn mark_account_token_used(
        &self,
        value: &str,
        used_at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        let mut state = self.guard()?;
        if let Some(token) = state.tokens.iter_mut().find(|t| t.token_value == value) {
            token.used_utc = Some(used_at);
        }
        Ok(())
    }

    async fn count_active_account_tokens(
        &self,
        user_id: Uuid,
        token_type: AccountTokenType,
    ) -> Result<usize, anyhow::Error> {
        let state = self.guard()?;
        Ok(state
            .tokens
            .iter()
            .filter(|t| {
                t.user_id == user_id
                    && t.token_type_code == token_type.as_str()
                    && t.is_active()
            })
            .count())
    }
}

#[async_trait]
impl CredentialStore for MockStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, anyhow::Error> {
        let state = self.guard()?;
        Ok(state
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserCredentials>, anyhow::Error> {
        let state = self.guard()?;
        Ok(state.users.iter().find(|u| u.user_id == user_id).cloned())
    }

    async fn set_email_verified(&self, user_id: Uuid) -> Result<bool, anyhow::Error> {
        let mut state = self.guard()?;
        match state.users.iter_mut().find(|u| u.user_id == user_id) {
            Some(user) => {
                user.email_verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<bool, anyhow::Error> {
        let mut state = self.guard()?;
        match state.users.iter_mut().find(|u| u.user_id == user_id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch_last_login(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        let mut state = self.guard()?;
        if let Some(user) = state.users.iter_mut().find(|u| u.user_id == user_id) {
            user.last_login_utc = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MockStore {
    async fn record(&self, entry: &AuditEntry) -> Result<(), anyhow::Error> {
        let mut state = self.guard()?;
        state.audit.push(entry.clone());
        Ok(())
    }
}
