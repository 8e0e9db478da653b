use service_core::error::AppError;
use thiserror::Error;

use crate::services::store::StoreError;

/// Failures of the session and tenant operations.
///
/// Messages of client-facing variants are returned verbatim; everything
/// else becomes a logged, generic internal error.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is suspended or banned")]
    AccountSuspended,

    #[error("Account is temporarily locked")]
    AccountLocked { retry_after_secs: u64 },

    #[error("Token expired")]
    TokenExpired,

    #[error("{0}")]
    TokenInvalid(&'static str),

    #[error("{0}")]
    InvalidCode(&'static str),

    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("MFA not enabled")]
    MfaNotEnabled,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    DuplicateTenant(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("SMS delivery failed: {0}")]
    Sms(String),

    #[error("Email delivery failed: {0}")]
    Email(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::Unauthorized
            | AuthError::TokenInvalid(_) => AppError::Unauthorized(err.to_string()),
            AuthError::AccountSuspended => AppError::Forbidden(err.to_string()),
            AuthError::AccountLocked { retry_after_secs } => AppError::TooManyRequests(
                "Account is temporarily locked. Try again later.".to_string(),
                Some(retry_after_secs),
            ),
            AuthError::InvalidCode(_)
            | AuthError::IncorrectPassword
            | AuthError::MfaNotEnabled
            | AuthError::Validation(_) => AppError::BadRequest(err.to_string()),
            AuthError::NotFound(msg) => AppError::NotFound(msg.to_string()),
            AuthError::DuplicateTenant(msg) | AuthError::Conflict(msg) => {
                AppError::Conflict(msg.to_string())
            }
            AuthError::Sms(detail) => {
                tracing::error!(error = %detail, "SMS gateway failure");
                AppError::BadGateway("Failed to send SMS".to_string())
            }
            AuthError::Email(detail) => {
                tracing::error!(error = %detail, "Email provider failure");
                AppError::BadGateway("Failed to send email".to_string())
            }
            AuthError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            AuthError::Internal(e) => AppError::InternalError(e),
        }
    }
}
