//! PostgreSQL storage for permissions, overrides, account tokens, audit
//! entries, and the credential slice of the users table.
//!
//! The full-replace updates and the token rotation run inside single
//! transactions; concurrent readers never observe a role stripped of its
//! permissions or two active tokens of one type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{
    AccountToken, AccountTokenType, AuditEntry, Permission, PermissionOverride, Role,
    UserCredentials, UserPermission,
};
use crate::services::{AuditSink, AuthStore, CredentialStore};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthStore for Database {
    async fn find_permission_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Permission>, anyhow::Error> {
        let permission =
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(permission)
    }

    async fn insert_permission(&self, permission: &Permission) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO permissions (permission_id, name, description, resource, action, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(permission.permission_id)
        .bind(&permission.name)
        .bind(&permission.description)
        .bind(&permission.resource)
        .bind(&permission.action)
        .bind(permission.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_permission(&self, permission_id: Uuid) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM permissions WHERE permission_id = $1")
            .bind(permission_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, anyhow::Error> {
        let permissions =
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(permissions)
    }

    async fn role_has_permission(
        &self,
        role: Role,
        permission_id: Uuid,
    ) -> Result<bool, anyhow::Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM role_permissions WHERE role_code = $1 AND permission_id = $2)",
        )
        .bind(role.as_str())
        .bind(permission_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn find_role_permissions(&self, role: Role) -> Result<Vec<Permission>, anyhow::Error> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.* FROM permissions p
            JOIN role_permissions rp ON p.permission_id = rp.permission_id
            WHERE rp.role_code = $1
            ORDER BY p.name
            "#,
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    async fn replace_role_permissions(
        &self,
        role: Role,
        permission_ids: &[Uuid],
    ) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_code = $1")
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;

        for permission_id in permission_ids {
            sqlx::query(
                "INSERT INTO role_permissions (role_code, permission_id) VALUES ($1, $2)",
            )
            .bind(role.as_str())
            .bind(permission_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_user_override(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
    ) -> Result<Option<UserPermission>, anyhow::Error> {
        let user_override = sqlx::query_as::<_, UserPermission>(
            "SELECT * FROM user_permissions WHERE user_id = $1 AND permission_id = $2",
        )
        .bind(user_id)
        .bind(permission_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user_override)
    }

    async fn find_user_overrides(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<UserPermission>, anyhow::Error> {
        let overrides = sqlx::query_as::<_, UserPermission>(
            "SELECT * FROM user_permissions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(overrides)
    }

    async fn replace_user_overrides(
        &self,
        user_id: Uuid,
        overrides: &[PermissionOverride],
    ) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_permissions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for o in overrides {
            sqlx::query(
                "INSERT INTO user_permissions (user_id, permission_id, granted) VALUES ($1, $2, $3)",
            )
            .bind(user_id)
            .bind(o.permission_id)
            .bind(o.granted)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn rotate_account_token(&self, token: &AccountToken) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await?;

        // Supersede any still-active token of this type for this user.
        sqlx::query(
            r#"
            DELETE FROM account_tokens
            WHERE user_id = $1 AND token_type_code = $2
              AND invalidated = false AND used_utc IS NULL
            "#,
        )
        .bind(token.user_id)
        .bind(&token.token_type_code)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO account_tokens
                (token_id, user_id, token_type_code, token_value, expires_at, invalidated, used_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(token.token_id)
        .bind(token.user_id)
        .bind(&token.token_type_code)
        .bind(&token.token_value)
        .bind(token.expires_at)
        .bind(token.invalidated)
        .bind(token.used_utc)
        .bind(token.created_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_account_token(
        &self,
        value: &str,
        token_type: AccountTokenType,
    ) -> Result<Option<AccountToken>, anyhow::Error> {
        let token = sqlx::query_as::<_, AccountToken>(
            "SELECT * FROM account_tokens WHERE token_value = $1 AND token_type_code = $2",
        )
        .bind(value)
        .bind(token_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn invalidate_account_token(&self, token_id: Uuid) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE account_tokens SET invalidated = true WHERE token_id = $1")
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_account_token_used(
        &self,
        value: &str,
        used_at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE account_tokens SET used_utc = $2 WHERE token_value = $1")
            .bind(value)
            .bind(used_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_active_account_tokens(
        &self,
        user_id: Uuid,
        token_type: AccountTokenType,
    ) -> Result<usize, anyhow::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM account_tokens
            WHERE user_id = $1 AND token_type_code = $2
              AND invalidated = false AND used_utc IS NULL AND expires_at > $3
            "#,
        )
        .bind(user_id)
        .bind(token_type.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, anyhow::Error> {
        let creds = sqlx::query_as::<_, UserCredentials>(
            r#"
            SELECT user_id, username, email, role_code, password_hash, email_verified, last_login_utc
            FROM users WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(creds)
    }

    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserCredentials>, anyhow::Error> {
        let creds = sqlx::query_as::<_, UserCredentials>(
            r#"
            SELECT user_id, username, email, role_code, password_hash, email_verified, last_login_utc
            FROM users WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(creds)
    }

    async fn set_email_verified(&self, user_id: Uuid) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("UPDATE users SET email_verified = true WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_login(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET last_login_utc = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for Database {
    async fn record(&self, entry: &AuditEntry) -> Result<(), anyhow::Error> {
        let metadata_text = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO audit_log
                (entry_id, user_id, action, resource, resource_id, ip_address, user_agent, metadata, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.entry_id)
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.resource)
        .bind(&entry.resource_id)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&metadata_text)
        .bind(entry.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
