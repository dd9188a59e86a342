//! Single-use account token store.
//!
//! State machine per `(user, type)`: ACTIVE → USED | INVALIDATED, both
//! terminal. Generation supersedes any prior active token of the same type
//! in one atomic store operation; validation never consumes, consumption is
//! the caller's adjacent `mark_used` after its side effect commits.

use chrono::{Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::models::{AccountToken, AccountTokenType};
use crate::services::{AuthStore, ServiceError};

/// Successful validation result: the token's owner.
#[derive(Debug, Clone)]
pub struct TokenValidation {
    pub user_id: Uuid,
}

#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn AuthStore>,
    email_verification_ttl: Duration,
    password_reset_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &TokenConfig, store: Arc<dyn AuthStore>) -> Self {
        Self {
            store,
            email_verification_ttl: Duration::hours(config.email_verification_expiry_hours),
            password_reset_ttl: Duration::minutes(config.password_reset_expiry_minutes),
        }
    }

    /// Issue a fresh token, superseding any active one of the same type.
    ///
    /// Returns the opaque value for the caller to dispatch (email delivery
    /// is the caller's job, not this core's).
    pub async fn generate(
        &self,
        token_type: AccountTokenType,
        user_id: Uuid,
    ) -> Result<String, ServiceError> {
        let value = generate_token_value();
        let ttl = match token_type {
            AccountTokenType::EmailVerification => self.email_verification_ttl,
            AccountTokenType::PasswordReset => self.password_reset_ttl,
        };
        let token = AccountToken::new(user_id, token_type, value.clone(), ttl);

        self.store
            .rotate_account_token(&token)
            .await
            .map_err(ServiceError::storage)?;

        tracing::info!(
            user_id = %user_id,
            token_type = token_type.as_str(),
            expires_at = %token.expires_at,
            "Account token issued"
        );

        Ok(value)
    }

    /// Check a presented token value without consuming it.
    ///
    /// Unknown, used, and invalidated tokens all answer with the same
    /// generic error so callers cannot enumerate which branch failed. A
    /// token found past its expiry is marked invalidated as a side effect.
    pub async fn validate(
        &self,
        value: &str,
        token_type: AccountTokenType,
    ) -> Result<TokenValidation, ServiceError> {
        let token = self
            .store
            .find_account_token(value, token_type)
            .await
            .map_err(ServiceError::storage)?
            .ok_or(ServiceError::TokenInvalidOrExpired)?;

        if token.invalidated || token.used_utc.is_some() {
            return Err(ServiceError::TokenInvalidOrExpired);
        }

        if token.is_expired() {
            self.store
                .invalidate_account_token(token.token_id)
                .await
                .map_err(ServiceError::storage)?;
            tracing::debug!(user_id = %token.user_id, "Expired account token invalidated on check");
            return Err(ServiceError::TokenInvalidOrExpired);
        }

        Ok(TokenValidation {
            user_id: token.user_id,
        })
    }

    /// Consume a token after its effect has been applied.
    pub async fn mark_used(&self, value: &str) -> Result<(), ServiceError> {
        self.store
            .mark_account_token_used(value, Utc::now())
            .await
            .map_err(ServiceError::storage)
    }
}

/// Opaque 32-byte random secret, hex encoded.
fn generate_token_value() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    hex::encode(token_bytes)
}
