//! Error types for the authentication service
//!
//! `AuthError` is the single failure taxonomy every login mode reports to the
//! transport boundary. Infrastructure errors (store, delivery, identity store)
//! have their own enums and convert into it.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::delivery::DeliveryError;
use crate::identity::IdentityStoreError;
use crate::store::StoreError;
use crate::utils::responses::ResponseBuilder;

/// Failures returned by the OTP, password and provider sign-in flows
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or malformed identifier, passcode or field
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A resend cooldown is active for this identifier
    #[error("please wait before requesting another code")]
    RateLimited,

    /// Per-client request budget exhausted
    #[error("too many requests from this client")]
    Throttled,

    /// The delivery gateway failed or timed out; the challenge was rolled back
    #[error("failed to deliver one-time passcode: {0}")]
    DeliveryFailed(#[source] DeliveryError),

    /// No pending passcode (never requested, consumed, exhausted or expired)
    #[error("one-time passcode expired or not requested")]
    ChallengeNotFound,

    /// Passcode mismatch; the attempt has been counted
    #[error("invalid one-time passcode")]
    InvalidSecret,

    /// Attempt cap exceeded; the challenge has been purged
    #[error("too many attempts")]
    TooManyAttempts,

    /// A unique identity field is already owned by another record
    #[error("identity conflict on {field}")]
    IdentityConflict { field: &'static str },

    /// Identity fields failed format validation
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Unknown e-mail or wrong password (indistinguishable on purpose)
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Third-party ID token rejected
    #[error("invalid provider token: {0}")]
    InvalidProviderToken(String),

    /// Missing, malformed, expired or forged bearer credential
    #[error("not authorized")]
    Unauthorized,

    /// Store, signing or runtime infrastructure failure
    #[error("server error: {0}")]
    ServerError(String),
}

impl AuthError {
    /// Create a server error from any displayable cause
    pub fn server(msg: impl Into<String>) -> Self {
        AuthError::ServerError(msg.into())
    }

    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AuthError::InvalidInput(msg.into())
    }

    /// Machine readable error code used in JSON responses
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidInput(_) => "invalid_request",
            AuthError::RateLimited | AuthError::Throttled => "rate_limited",
            AuthError::DeliveryFailed(_) => "delivery_failed",
            AuthError::ChallengeNotFound => "challenge_not_found",
            AuthError::InvalidSecret => "invalid_otp",
            AuthError::TooManyAttempts => "too_many_attempts",
            AuthError::IdentityConflict { .. } => "identity_conflict",
            AuthError::InvalidIdentity(_) => "invalid_identity",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InvalidProviderToken(_) => "invalid_provider_token",
            AuthError::Unauthorized => "unauthorized",
            AuthError::ServerError(_) => "server_error",
        }
    }

    /// Message safe to show to clients.
    ///
    /// Infrastructure details stay in the logs; nothing here reveals whether
    /// an account exists for the identifier.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            AuthError::InvalidInput(msg) | AuthError::InvalidIdentity(msg) => msg.clone(),
            AuthError::RateLimited => "Please wait before resending OTP".to_string(),
            AuthError::Throttled => "Too many requests, please try again later".to_string(),
            AuthError::DeliveryFailed(_) => "Failed to send OTP".to_string(),
            AuthError::ChallengeNotFound => "OTP expired or not requested".to_string(),
            AuthError::InvalidSecret => "Invalid OTP".to_string(),
            AuthError::TooManyAttempts => "Too many attempts".to_string(),
            AuthError::IdentityConflict { field } => {
                format!("An account already uses this {field}")
            }
            AuthError::InvalidCredentials => "Invalid email or password".to_string(),
            AuthError::InvalidProviderToken(_) => "Invalid Google ID token".to_string(),
            AuthError::Unauthorized => "Not authorized".to_string(),
            AuthError::ServerError(_) => "Server error".to_string(),
        }
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidInput(_) | AuthError::ChallengeNotFound => StatusCode::BAD_REQUEST,
            AuthError::RateLimited | AuthError::Throttled | AuthError::TooManyAttempts => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AuthError::InvalidSecret
            | AuthError::InvalidCredentials
            | AuthError::InvalidProviderToken(_)
            | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::IdentityConflict { .. } => StatusCode::CONFLICT,
            AuthError::InvalidIdentity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::DeliveryFailed(_) | AuthError::ServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        ResponseBuilder::error(self.status_code())
            .with_error_code(self.error_code())
            .with_message(&self.public_message())
            .build()
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::ServerError(err.to_string())
    }
}

impl From<IdentityStoreError> for AuthError {
    fn from(err: IdentityStoreError) -> Self {
        match err {
            IdentityStoreError::Conflict { field } => AuthError::IdentityConflict { field },
            IdentityStoreError::Backend(msg) => AuthError::ServerError(msg),
        }
    }
}

/// Startup configuration errors.
///
/// These are fatal: the binary refuses to start rather than failing per request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingRequired(String),
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}
