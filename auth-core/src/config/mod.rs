use secrecy::{ExposeSecret, Secret};
use std::env;

use crate::services::ServiceError;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub environment: Environment,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub tokens: TokenConfig,
    pub password_policy: PasswordPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Symmetric signing secret. Loaded once at startup; its absence is a
    /// fatal startup condition, not a per-request error.
    pub secret: Secret<String>,
    pub cookie_name: String,
    /// Session-adjacent cookies removed alongside the identity cookie.
    pub aux_cookie_names: Vec<String>,
    pub max_age_seconds: i64,
    /// Remaining lifetime below which `get_session` silently re-issues.
    pub refresh_threshold_seconds: i64,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub email_verification_expiry_hours: i64,
    pub password_reset_expiry_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: u8,
    pub require_uppercase: bool,
    pub require_number: bool,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(ServiceError::Config)?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            environment,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            session: SessionConfig {
                secret: Secret::new(get_env("SESSION_SECRET", None, true)?),
                cookie_name: get_env("SESSION_COOKIE_NAME", Some("admin_session"), is_prod)?,
                aux_cookie_names: get_env(
                    "SESSION_AUX_COOKIE_NAMES",
                    Some("remember_me,admin_prefs"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                max_age_seconds: parse_env("SESSION_MAX_AGE_SECONDS", "3600", is_prod)?,
                refresh_threshold_seconds: parse_env(
                    "SESSION_REFRESH_THRESHOLD_SECONDS",
                    "300",
                    is_prod,
                )?,
                secure_cookies: parse_env("SESSION_SECURE_COOKIES", "true", is_prod)?,
            },
            tokens: TokenConfig {
                email_verification_expiry_hours: parse_env(
                    "TOKEN_EMAIL_VERIFICATION_EXPIRY_HOURS",
                    "24",
                    is_prod,
                )?,
                password_reset_expiry_minutes: parse_env(
                    "TOKEN_PASSWORD_RESET_EXPIRY_MINUTES",
                    "60",
                    is_prod,
                )?,
            },
            password_policy: PasswordPolicy {
                min_length: parse_env("PASSWORD_MIN_LENGTH", "8", is_prod)?,
                require_uppercase: parse_env("PASSWORD_REQUIRE_UPPERCASE", "false", is_prod)?,
                require_number: parse_env("PASSWORD_REQUIRE_NUMBER", "false", is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.session.secret.expose_secret().len() < 32 {
            return Err(ServiceError::Config(
                "SESSION_SECRET must be at least 32 bytes".to_string(),
            ));
        }

        if self.session.max_age_seconds <= 0 {
            return Err(ServiceError::Config(
                "SESSION_MAX_AGE_SECONDS must be positive".to_string(),
            ));
        }

        if self.session.refresh_threshold_seconds < 0
            || self.session.refresh_threshold_seconds >= self.session.max_age_seconds
        {
            return Err(ServiceError::Config(
                "SESSION_REFRESH_THRESHOLD_SECONDS must be non-negative and below SESSION_MAX_AGE_SECONDS"
                    .to_string(),
            ));
        }

        if self.tokens.email_verification_expiry_hours <= 0
            || self.tokens.password_reset_expiry_minutes <= 0
        {
            return Err(ServiceError::Config(
                "Token expiries must be positive".to_string(),
            ));
        }

        if self.environment == Environment::Prod && !self.session.secure_cookies {
            return Err(ServiceError::Config(
                "SESSION_SECURE_COOKIES must be enabled in production".to_string(),
            ));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, ServiceError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(ServiceError::Config(format!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(ServiceError::Config(format!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, ServiceError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| ServiceError::Config(format!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
