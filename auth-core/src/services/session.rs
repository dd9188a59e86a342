//! Stateless cookie session manager.
//!
//! Identity lives entirely in a signed HS256 token inside an HTTP-only
//! cookie; no server-side session row exists. Verification and refresh are
//! pure functions of the cookie and the clock, so concurrent refreshes are
//! benign: each re-sign carries the same claims and the last cookie write
//! wins.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;

use crate::config::SessionConfig;
use crate::models::{Identity, RequestContext, SessionClaims, SessionStatus};
use crate::services::ServiceError;

/// Per-call overrides for session issuance. Omitted fields fall back to the
/// configured defaults.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub max_age_seconds: Option<i64>,
}

#[derive(Clone)]
pub struct SessionService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    cookie_name: String,
    aux_cookie_names: Vec<String>,
    max_age_seconds: i64,
    refresh_threshold_seconds: i64,
    secure_cookies: bool,
}

impl SessionService {
    /// Build the codec from the server-held symmetric secret.
    ///
    /// A missing or undersized secret is a fatal startup condition; request
    /// paths never reach this error.
    pub fn new(config: &SessionConfig) -> Result<Self, ServiceError> {
        let secret = config.secret.expose_secret();
        if secret.len() < 32 {
            return Err(ServiceError::SessionInvalid(
                "session signing secret missing or too short".to_string(),
            ));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            cookie_name: config.cookie_name.clone(),
            aux_cookie_names: config.aux_cookie_names.clone(),
            max_age_seconds: config.max_age_seconds,
            refresh_threshold_seconds: config.refresh_threshold_seconds,
            secure_cookies: config.secure_cookies,
        })
    }

    /// Issue a session for `identity` and store it in the jar.
    pub fn create_session(
        &self,
        identity: &Identity,
        options: SessionOptions,
        jar: CookieJar,
        ctx: &RequestContext,
    ) -> Result<CookieJar, ServiceError> {
        let max_age = options.max_age_seconds.unwrap_or(self.max_age_seconds);
        let now = Utc::now();
        let claims = SessionClaims {
            sub: identity.user_id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            role: identity.role,
            last_login: identity.last_login,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(max_age)).timestamp(),
        };

        let token = self.sign(&claims)?;

        // Advisory metadata only; never consulted for authorization.
        tracing::info!(
            user_id = %identity.user_id,
            role = %identity.role,
            ip_address = ?ctx.ip_address,
            user_agent = ?ctx.user_agent,
            "Session issued"
        );

        Ok(jar.add(self.session_cookie(token, max_age)))
    }

    /// Read and verify the session cookie.
    ///
    /// Absent cookie is "no session", not an error. Any verification
    /// failure (bad signature, malformed payload, past expiry) removes the
    /// cookie and degrades to "no session". A valid session whose remaining
    /// lifetime sits below the refresh threshold is transparently re-issued
    /// with fresh timestamps before being returned.
    pub fn get_session(&self, jar: CookieJar) -> (CookieJar, Option<SessionClaims>) {
        let token = match jar.get(&self.cookie_name) {
            Some(cookie) => cookie.value().to_string(),
            None => return (jar, None),
        };

        let claims = match self.verify(&token) {
            Ok(claims) => claims,
            Err(_) => {
                tracing::debug!("Session cookie failed verification; clearing");
                return (self.clear_cookies(jar), None);
            }
        };

        let now = Utc::now();
        if claims.remaining_seconds(now) <= self.refresh_threshold_seconds {
            let refreshed = self.refreshed_claims(&claims, now);
            match self.sign(&refreshed) {
                Ok(token) => {
                    tracing::debug!(user_id = %refreshed.sub, "Session silently refreshed");
                    let jar = jar.add(self.session_cookie(token, self.max_age_seconds));
                    return (jar, Some(refreshed));
                }
                Err(e) => {
                    // Keep the still-valid session rather than logging the
                    // user out over a transient signing failure.
                    tracing::error!(error = %e, "Silent session refresh failed");
                    return (jar, Some(claims));
                }
            }
        }

        (jar, Some(claims))
    }

    /// Pure read-only report: no refresh, no cookie destruction.
    ///
    /// For UI countdowns only; never an authorization gate.
    pub fn check_session_status(&self, jar: &CookieJar) -> SessionStatus {
        let token = match jar.get(&self.cookie_name) {
            Some(cookie) => cookie.value().to_string(),
            None => return SessionStatus::absent(),
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        match decode::<SessionClaims>(&token, &self.decoding_key, &validation) {
            Ok(data) => {
                let remaining = data.claims.remaining_seconds(Utc::now());
                SessionStatus {
                    is_valid: remaining > 0,
                    is_expired: remaining <= 0,
                    remaining_seconds: remaining.max(0),
                }
            }
            Err(_) => SessionStatus {
                is_valid: false,
                is_expired: false,
                remaining_seconds: 0,
            },
        }
    }

    /// Explicit re-issuance of the current session.
    pub fn refresh_session(&self, jar: CookieJar) -> Result<CookieJar, ServiceError> {
        let token = jar
            .get(&self.cookie_name)
            .map(|cookie| cookie.value().to_string())
            .ok_or(ServiceError::SessionNotFound)?;

        let claims = self
            .verify(&token)
            .map_err(|_| ServiceError::SessionNotFound)?;

        let refreshed = self.refreshed_claims(&claims, Utc::now());
        let token = self.sign(&refreshed)?;
        Ok(jar.add(self.session_cookie(token, self.max_age_seconds)))
    }

    /// Remove the identity cookie and all session-adjacent cookies.
    /// Idempotent: destroying an absent session is not an error.
    pub fn destroy_session(&self, jar: CookieJar) -> CookieJar {
        self.clear_cookies(jar)
    }

    fn sign(&self, claims: &SessionClaims) -> Result<String, ServiceError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| ServiceError::SessionInvalid(format!("failed to sign session: {}", e)))
    }

    fn verify(&self, token: &str) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        decode::<SessionClaims>(token, &self.decoding_key, &validation).map(|data| data.claims)
    }

    /// Same identity, fresh issuance window. The sliding-expiration step.
    fn refreshed_claims(&self, claims: &SessionClaims, now: DateTime<Utc>) -> SessionClaims {
        SessionClaims {
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.max_age_seconds)).timestamp(),
            ..claims.clone()
        }
    }

    fn session_cookie(&self, token: String, max_age: i64) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), token))
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::seconds(max_age))
            .build()
    }

    fn clear_cookies(&self, mut jar: CookieJar) -> CookieJar {
        jar = jar.remove(Cookie::build((self.cookie_name.clone(), "")).path("/"));
        for name in &self.aux_cookie_names {
            jar = jar.remove(Cookie::build((name.clone(), "")).path("/"));
        }
        jar
    }
}
