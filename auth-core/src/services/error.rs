use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Signing or codec setup failed. Fatal configuration class; request
    /// paths never see this for a merely bad cookie (those degrade to
    /// "no session").
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    #[error("No session to refresh")]
    SessionNotFound,

    /// Deliberately generic: callers must not be able to distinguish
    /// unknown, expired, used, and invalidated tokens.
    #[error("Invalid or expired token")]
    TokenInvalidOrExpired,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Underlying store unavailable. Must propagate; never resolves to an
    /// allow or a stale answer.
    #[error("Storage error: {0}")]
    Storage(anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email not verified")]
    EmailNotVerified,

    #[error("User not found")]
    UserNotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Stable machine-readable code for API consumers and audit metadata.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::SessionInvalid(_) => "SESSION_INVALID",
            ServiceError::SessionNotFound => "SESSION_NOT_FOUND",
            ServiceError::TokenInvalidOrExpired => "TOKEN_INVALID_OR_EXPIRED",
            ServiceError::PermissionDenied(_) => "PERMISSION_DENIED",
            ServiceError::Storage(_) => "STORAGE_ERROR",
            ServiceError::InvalidCredentials => "INVALID_CREDENTIALS",
            ServiceError::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            ServiceError::UserNotFound => "USER_NOT_FOUND",
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::Config(_) => "CONFIG_ERROR",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub(crate) fn storage(err: anyhow::Error) -> Self {
        ServiceError::Storage(err)
    }
}
