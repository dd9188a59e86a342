//! Password policy validation.

use crate::config::PasswordPolicy;
use crate::services::ServiceError;

/// Errors related to password policy validation.
#[derive(Debug, Clone)]
pub enum PolicyError {
    /// Password is too short.
    PasswordTooShort {
        min_length: u8,
        actual_length: usize,
    },
    /// Password missing uppercase letter.
    PasswordMissingUppercase,
    /// Password missing number.
    PasswordMissingNumber,
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::PasswordTooShort {
                min_length,
                actual_length,
            } => {
                write!(
                    f,
                    "Password must be at least {} characters (got {})",
                    min_length, actual_length
                )
            }
            PolicyError::PasswordMissingUppercase => {
                write!(f, "Password must contain at least one uppercase letter")
            }
            PolicyError::PasswordMissingNumber => {
                write!(f, "Password must contain at least one number")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

impl From<PolicyError> for ServiceError {
    fn from(err: PolicyError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

/// Validate a password against the configured policy.
///
/// Returns Ok(()) if the password meets all requirements, or Err with the
/// first violation found.
pub fn validate_password(password: &str, policy: &PasswordPolicy) -> Result<(), PolicyError> {
    if password.len() < policy.min_length as usize {
        return Err(PolicyError::PasswordTooShort {
            min_length: policy.min_length,
            actual_length: password.len(),
        });
    }

    if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(PolicyError::PasswordMissingUppercase);
    }

    if policy.require_number && !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PolicyError::PasswordMissingNumber);
    }

    Ok(())
}
