//! First-party credential flows: login, email verification, password reset.
//!
//! Composes the session manager, token store, and audit sink over the
//! collaborator-owned credential store. Email dispatch stays with the
//! caller: token-issuing operations hand back the opaque value and nothing
//! here touches a mail transport.

use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::PasswordPolicy;
use crate::models::{AccountTokenType, AuditEntry, Identity, RequestContext, SessionClaims};
use crate::services::{
    policy, AuditService, CredentialStore, ServiceError, SessionOptions, SessionService,
    TokenService,
};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

/// Result of a credential login.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Credentials checked out; the jar carries the new session cookie.
    Session { jar: CookieJar, identity: Identity },
    /// Credentials checked out but the email is unverified. A fresh
    /// verification token has been rotated in; the caller dispatches it.
    EmailUnverified {
        user_id: Uuid,
        verification_token: String,
    },
}

/// A password reset token issued for dispatch by the caller.
///
/// Callers must answer reset requests identically whether or not this is
/// `Some`, so unknown emails cannot be enumerated.
#[derive(Debug, Clone)]
pub struct PasswordResetIssued {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Clone)]
pub struct AccountService {
    credentials: Arc<dyn CredentialStore>,
    sessions: SessionService,
    tokens: TokenService,
    audit: AuditService,
    password_policy: PasswordPolicy,
}

impl AccountService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: SessionService,
        tokens: TokenService,
        audit: AuditService,
        password_policy: PasswordPolicy,
    ) -> Self {
        Self {
            credentials,
            sessions,
            tokens,
            audit,
            password_policy,
        }
    }

    /// Check credentials and issue a session cookie.
    ///
    /// Unknown email and wrong password are indistinguishable to the
    /// caller. A correct password with an unverified email does not sign
    /// in; it rotates a fresh verification token instead.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        jar: CookieJar,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome, ServiceError> {
        let creds = self
            .credentials
            .find_by_email(email)
            .await
            .map_err(ServiceError::storage)?
            .ok_or(ServiceError::InvalidCredentials)?;

        verify_password(
            &Password::new(password.to_string()),
            &PasswordHashString::new(creds.password_hash.clone()),
        )
        .map_err(|_| ServiceError::InvalidCredentials)?;

        if !creds.email_verified {
            let verification_token = self
                .tokens
                .generate(AccountTokenType::EmailVerification, creds.user_id)
                .await?;

            tracing::info!(user_id = %creds.user_id, "Login blocked: email unverified");
            self.audit.emit(
                AuditEntry::user_action(
                    creds.user_id,
                    "auth:login",
                    "session",
                    None,
                    Some(serde_json::json!({ "blocked": "email_unverified" })),
                    ctx,
                ),
            );

            return Ok(LoginOutcome::EmailUnverified {
                user_id: creds.user_id,
                verification_token,
            });
        }

        let identity = creds
            .identity()
            .ok_or_else(|| ServiceError::storage(anyhow::anyhow!(
                "stored role {:?} is not a known role",
                creds.role_code
            )))?;

        let jar = self
            .sessions
            .create_session(&identity, SessionOptions::default(), jar, ctx)?;

        self.credentials
            .touch_last_login(creds.user_id, Utc::now())
            .await
            .map_err(ServiceError::storage)?;

        tracing::info!(user_id = %identity.user_id, "User logged in");
        self.audit.emit(AuditEntry::user_action(
            identity.user_id,
            "auth:login",
            "session",
            None,
            None,
            ctx,
        ));

        Ok(LoginOutcome::Session { jar, identity })
    }

    /// Destroy the session cookie set and audit the sign-out.
    pub fn logout(
        &self,
        session: Option<&SessionClaims>,
        jar: CookieJar,
        ctx: &RequestContext,
    ) -> CookieJar {
        if let Some(claims) = session {
            tracing::info!(user_id = %claims.sub, "User logged out");
            self.audit.emit(AuditEntry::user_action(
                claims.sub,
                "auth:logout",
                "session",
                None,
                None,
                ctx,
            ));
        }
        self.sessions.destroy_session(jar)
    }

    /// Redeem an email verification token.
    pub async fn verify_email(
        &self,
        token_value: &str,
        ctx: &RequestContext,
    ) -> Result<Uuid, ServiceError> {
        let validation = self
            .tokens
            .validate(token_value, AccountTokenType::EmailVerification)
            .await?;

        let matched = self
            .credentials
            .set_email_verified(validation.user_id)
            .await
            .map_err(ServiceError::storage)?;
        if !matched {
            return Err(ServiceError::UserNotFound);
        }

        // Consume only after the verification flag committed.
        self.tokens.mark_used(token_value).await?;

        tracing::info!(user_id = %validation.user_id, "Email verified");
        self.audit.emit(AuditEntry::user_action(
            validation.user_id,
            "auth:verify_email",
            "user",
            Some(validation.user_id.to_string()),
            None,
            ctx,
        ));

        Ok(validation.user_id)
    }

    /// Rotate in a password reset token for the account, if one exists.
    ///
    /// `Ok(None)` for unknown emails: the caller's response must not differ.
    pub async fn request_password_reset(
        &self,
        email: &str,
        ctx: &RequestContext,
    ) -> Result<Option<PasswordResetIssued>, ServiceError> {
        let creds = match self
            .credentials
            .find_by_email(email)
            .await
            .map_err(ServiceError::storage)?
        {
            Some(creds) => creds,
            None => return Ok(None),
        };

        let token = self
            .tokens
            .generate(AccountTokenType::PasswordReset, creds.user_id)
            .await?;

        tracing::info!(user_id = %creds.user_id, "Password reset requested");
        self.audit.emit(AuditEntry::anonymous_action(
            "auth:request_password_reset",
            "user",
            Some(creds.user_id.to_string()),
            ctx,
        ));

        Ok(Some(PasswordResetIssued {
            user_id: creds.user_id,
            token,
        }))
    }

    /// Redeem a password reset token and set the new password.
    pub async fn confirm_password_reset(
        &self,
        token_value: &str,
        new_password: &str,
        ctx: &RequestContext,
    ) -> Result<Uuid, ServiceError> {
        let validation = self
            .tokens
            .validate(token_value, AccountTokenType::PasswordReset)
            .await?;

        policy::validate_password(new_password, &self.password_policy)?;

        let hash = hash_password(&Password::new(new_password.to_string()))?;

        let matched = self
            .credentials
            .update_password_hash(validation.user_id, hash.as_str())
            .await
            .map_err(ServiceError::storage)?;
        if !matched {
            return Err(ServiceError::UserNotFound);
        }

        // Consume only after the new hash committed.
        self.tokens.mark_used(token_value).await?;

        tracing::info!(user_id = %validation.user_id, "Password reset completed");
        self.audit.emit(AuditEntry::user_action(
            validation.user_id,
            "auth:reset_password",
            "user",
            Some(validation.user_id.to_string()),
            None,
            ctx,
        ));

        Ok(validation.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SessionConfig, TokenConfig};
    use crate::models::{Role, UserCredentials};
    use crate::services::{AuthStore, MockStore};
    use secrecy::Secret;

    fn lenient_policy() -> PasswordPolicy {
        PasswordPolicy {
            min_length: 8,
            require_uppercase: false,
            require_number: false,
        }
    }

    fn session_config() -> SessionConfig {
        SessionConfig {
            secret: Secret::new("test-secret-test-secret-test-secret!".to_string()),
            cookie_name: "admin_session".to_string(),
            aux_cookie_names: vec![],
            max_age_seconds: 3600,
            refresh_threshold_seconds: 300,
            secure_cookies: false,
        }
    }

    fn service_with_store() -> (AccountService, Arc<MockStore>, SessionService) {
        let store = Arc::new(MockStore::new());
        let sessions = SessionService::new(&session_config()).unwrap();
        let tokens = TokenService::new(
            &TokenConfig {
                email_verification_expiry_hours: 24,
                password_reset_expiry_minutes: 60,
            },
            store.clone(),
        );
        let audit = AuditService::new(store.clone());
        let service = AccountService::new(
            store.clone(),
            sessions.clone(),
            tokens,
            audit,
            lenient_policy(),
        );
        (service, store, sessions)
    }

    fn seed_user(store: &MockStore, email: &str, password: &str, verified: bool) -> Uuid {
        let user_id = Uuid::new_v4();
        let hash = hash_password(&Password::new(password.to_string())).unwrap();
        store.seed_user(UserCredentials {
            user_id,
            username: email.split('@').next().unwrap().to_string(),
            email: email.to_string(),
            role_code: Role::Editor.as_str().to_string(),
            password_hash: hash.into_string(),
            email_verified: verified,
            last_login_utc: None,
        });
        user_id
    }

    #[tokio::test]
    async fn test_login_issues_session_cookie() {
        let (service, store, sessions) = service_with_store();
        let user_id = seed_user(&store, "alice@example.com", "correct-horse", true);

        let outcome = service
            .login(
                "alice@example.com",
                "correct-horse",
                CookieJar::new(),
                &RequestContext::new("127.0.0.1", "test"),
            )
            .await
            .unwrap();

        let LoginOutcome::Session { jar, identity } = outcome else {
            panic!("expected a session");
        };
        assert_eq!(identity.user_id, user_id);

        let (_, claims) = sessions.get_session(jar);
        assert_eq!(claims.unwrap().sub, user_id);

        // last_login was touched.
        assert!(store.user(user_id).unwrap().last_login_utc.is_some());
    }

    #[tokio::test]
    async fn test_login_wrong_password_is_invalid_credentials() {
        let (service, store, _) = service_with_store();
        seed_user(&store, "alice@example.com", "correct-horse", true);

        let err = service
            .login(
                "alice@example.com",
                "wrong",
                CookieJar::new(),
                &RequestContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_unknown_email_matches_wrong_password() {
        let (service, _, _) = service_with_store();
        let err = service
            .login(
                "nobody@example.com",
                "whatever",
                CookieJar::new(),
                &RequestContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_unverified_rotates_verification_token() {
        let (service, store, _) = service_with_store();
        let user_id = seed_user(&store, "bob@example.com", "correct-horse", false);

        let outcome = service
            .login(
                "bob@example.com",
                "correct-horse",
                CookieJar::new(),
                &RequestContext::default(),
            )
            .await
            .unwrap();

        let LoginOutcome::EmailUnverified {
            user_id: returned,
            verification_token,
        } = outcome
        else {
            panic!("expected unverified outcome");
        };
        assert_eq!(returned, user_id);
        assert!(!verification_token.is_empty());
        assert_eq!(
            store
                .count_active_account_tokens(user_id, AccountTokenType::EmailVerification)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_verify_email_end_to_end() {
        let (service, store, _) = service_with_store();
        let user_id = seed_user(&store, "bob@example.com", "correct-horse", false);

        let LoginOutcome::EmailUnverified {
            verification_token, ..
        } = service
            .login(
                "bob@example.com",
                "correct-horse",
                CookieJar::new(),
                &RequestContext::default(),
            )
            .await
            .unwrap()
        else {
            panic!("expected unverified outcome");
        };

        let verified = service
            .verify_email(&verification_token, &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(verified, user_id);
        assert!(store.user(user_id).unwrap().email_verified);

        // Single use: a second redemption denies.
        assert!(service
            .verify_email(&verification_token, &RequestContext::default())
            .await
            .is_err());

        // And the next login signs in.
        let outcome = service
            .login(
                "bob@example.com",
                "correct-horse",
                CookieJar::new(),
                &RequestContext::default(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Session { .. }));
    }

    #[tokio::test]
    async fn test_password_reset_end_to_end() {
        let (service, store, _) = service_with_store();
        let user_id = seed_user(&store, "carol@example.com", "old-password", true);

        let issued = service
            .request_password_reset("carol@example.com", &RequestContext::default())
            .await
            .unwrap()
            .expect("known email should issue a token");
        assert_eq!(issued.user_id, user_id);

        service
            .confirm_password_reset(&issued.token, "new-password", &RequestContext::default())
            .await
            .unwrap();

        // Old password no longer works; the new one does.
        assert!(service
            .login(
                "carol@example.com",
                "old-password",
                CookieJar::new(),
                &RequestContext::default(),
            )
            .await
            .is_err());
        assert!(service
            .login(
                "carol@example.com",
                "new-password",
                CookieJar::new(),
                &RequestContext::default(),
            )
            .await
            .is_ok());

        // The reset token is spent.
        let err = service
            .confirm_password_reset(&issued.token, "another-one", &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::TokenInvalidOrExpired));
    }

    #[tokio::test]
    async fn test_reset_request_for_unknown_email_is_silent() {
        let (service, _, _) = service_with_store();
        let issued = service
            .request_password_reset("nobody@example.com", &RequestContext::default())
            .await
            .unwrap();
        assert!(issued.is_none());
    }

    #[tokio::test]
    async fn test_reset_rejects_policy_violation_without_consuming() {
        let (service, store, _) = service_with_store();
        seed_user(&store, "dan@example.com", "old-password", true);

        let issued = service
            .request_password_reset("dan@example.com", &RequestContext::default())
            .await
            .unwrap()
            .unwrap();

        let err = service
            .confirm_password_reset(&issued.token, "short", &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // The token survives a rejected attempt and still works.
        assert!(service
            .confirm_password_reset(&issued.token, "long-enough-now", &RequestContext::default())
            .await
            .is_ok());
    }
}
