use std::sync::Arc;

use auth_core::config::{
    AuthConfig, DatabaseConfig, Environment, PasswordPolicy, SessionConfig, TokenConfig,
};
use auth_core::services::MockStore;
use auth_core::AuthState;
use secrecy::Secret;

pub fn test_config() -> AuthConfig {
    AuthConfig {
        environment: Environment::Dev,
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: "postgres://localhost/admin_test".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        session: SessionConfig {
            secret: Secret::new("integration-test-secret-0123456789ab".to_string()),
            cookie_name: "admin_session".to_string(),
            aux_cookie_names: vec!["remember_me".to_string(), "admin_prefs".to_string()],
            max_age_seconds: 3600,
            refresh_threshold_seconds: 300,
            secure_cookies: false,
        },
        tokens: TokenConfig {
            email_verification_expiry_hours: 24,
            password_reset_expiry_minutes: 60,
        },
        password_policy: PasswordPolicy {
            min_length: 8,
            require_uppercase: false,
            require_number: false,
        },
    }
}

/// AuthState with every storage contract wired to one in-memory store.
pub fn test_state() -> (AuthState, Arc<MockStore>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .try_init();

    let store = Arc::new(MockStore::new());
    let state = AuthState::new(test_config(), store.clone(), store.clone(), store.clone())
        .expect("failed to build auth state");
    (state, store)
}

/// AuthState whose audit sink is permanently down, while primary storage
/// stays healthy.
pub fn test_state_with_broken_sink() -> (AuthState, Arc<MockStore>) {
    let store = Arc::new(MockStore::new());
    let sink = Arc::new(MockStore::new());
    sink.set_unavailable(true);
    let state = AuthState::new(test_config(), store.clone(), store.clone(), sink)
        .expect("failed to build auth state");
    (state, store)
}
