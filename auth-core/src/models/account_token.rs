//! Account token model - single-use email verification and password reset
//! secrets.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountTokenType {
    EmailVerification,
    PasswordReset,
}

impl AccountTokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountTokenType::EmailVerification => "email_verification",
            AccountTokenType::PasswordReset => "password_reset",
        }
    }
}

impl std::str::FromStr for AccountTokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_verification" => Ok(AccountTokenType::EmailVerification),
            "password_reset" => Ok(AccountTokenType::PasswordReset),
            _ => Err(format!("Invalid token type: {}", s)),
        }
    }
}

/// Single-use, type-tagged, time-bound secret.
///
/// Lifecycle: active until `used_utc` is stamped (successful redemption) or
/// `invalidated` is set (expiry seen on validation, or superseded by
/// rotation). Both end states are terminal. At most one active token per
/// `(user_id, token_type)` exists at any time; the store enforces this by
/// deleting prior active tokens inside the same transaction that inserts a
/// new one.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccountToken {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub token_type_code: String,
    pub token_value: String,
    pub expires_at: DateTime<Utc>,
    pub invalidated: bool,
    pub used_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl AccountToken {
    /// Create a new token with a type-specific time to live.
    pub fn new(user_id: Uuid, token_type: AccountTokenType, value: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            token_id: Uuid::new_v4(),
            user_id,
            token_type_code: token_type.as_str().to_string(),
            token_value: value,
            expires_at: now + ttl,
            invalidated: false,
            used_utc: None,
            created_utc: now,
        }
    }

    pub fn token_type(&self) -> Option<AccountTokenType> {
        self.token_type_code.parse().ok()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Not used, not invalidated, not past expiry.
    pub fn is_active(&self) -> bool {
        !self.invalidated && self.used_utc.is_none() && !self.is_expired()
    }
}
