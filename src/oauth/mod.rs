//! Third-party sign-in
//!
//! A [`ProviderTokenVerifier`] turns a provider-issued ID token into a
//! [`ProviderProfile`]. Google is the only provider wired up today.

mod google;

pub use google::{
    GoogleTokenVerifier, JsonWebKey, JsonWebKeySet, JwksCache, GOOGLE_ISSUERS,
};

use async_trait::async_trait;
use thiserror::Error;

use crate::error::AuthError;

/// Identity asserted by a verified provider token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub email_verified: bool,
}

#[derive(Debug, Error)]
pub enum ProviderTokenError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("signing key not found: {0}")]
    KeyNotFound(String),
    #[error("failed to decode signing key: {0}")]
    KeyDecoding(String),
    #[error("failed to fetch signing keys: {0}")]
    KeyFetch(String),
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("token has expired")]
    Expired,
    #[error("token is not yet valid")]
    NotYetValid,
    #[error("claim '{claim}' rejected: {actual}")]
    ClaimRejected { claim: &'static str, actual: String },
}

impl From<ProviderTokenError> for AuthError {
    fn from(err: ProviderTokenError) -> Self {
        match err {
            // the provider's key endpoint being down is our problem, not the caller's
            ProviderTokenError::KeyFetch(msg) => AuthError::server(msg),
            other => AuthError::InvalidProviderToken(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ProviderTokenVerifier: Send + Sync {
    /// Verify `id_token` and extract the asserted identity
    ///
    /// # Errors
    ///
    /// Returns `ProviderTokenError` when the token is not acceptable
    async fn verify(&self, id_token: &str) -> Result<ProviderProfile, ProviderTokenError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            AuthError::from(ProviderTokenError::Expired),
            AuthError::InvalidProviderToken(_)
        ));
        assert!(matches!(
            AuthError::from(ProviderTokenError::KeyFetch("down".to_string())),
            AuthError::ServerError(_)
        ));
    }
}
