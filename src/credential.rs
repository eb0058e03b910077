//! Bearer credential issuing and verification
//!
//! Credentials are HS256 JWTs bound to the user's durable id. They are
//! long-lived (365 days by default) and cannot be revoked before expiry;
//! the signing key is static process configuration.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, ConfigError};
use crate::models::{OriginProvider, UserIdentity};
use crate::settings::JwtSettings;

/// Shortest accepted HS256 key
pub const MIN_SECRET_BYTES: usize = 32;

/// Claims carried by an issued credential
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CredentialClaims {
    pub sub: String, // user id
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub phone: Option<String>,
    pub provider: OriginProvider,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl CredentialClaims {
    /// The user id this credential binds
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if `sub` is not a UUID
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::Unauthorized)
    }
}

#[derive(Clone)]
pub struct CredentialIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    validity: Duration,
}

impl CredentialIssuer {
    /// Build the issuer from settings.
    ///
    /// A missing or short key is a startup failure, never a per-request one.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an empty or short secret, or a validity that is
    /// not positive or overflows the calendar
    pub fn new(settings: &JwtSettings) -> Result<Self, ConfigError> {
        if settings.secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
        }
        if settings.secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::InvalidValue {
                key: "JWT_SECRET".to_string(),
                message: format!("must be at least {MIN_SECRET_BYTES} bytes"),
            });
        }
        let validity = Duration::try_days(settings.expires_in_days)
            .filter(|validity| {
                *validity > Duration::zero() && Utc::now().checked_add_signed(*validity).is_some()
            })
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "JWT_EXPIRES_IN_DAYS".to_string(),
                message: format!(
                    "must be a positive number of days, got {}",
                    settings.expires_in_days
                ),
            })?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            issuer: settings.issuer.clone(),
            validity,
        })
    }

    /// Sign a credential for `user`
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if signing fails
    pub fn issue(&self, user: &UserIdentity) -> Result<String, AuthError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.validity)
            .ok_or_else(|| AuthError::server("credential expiry out of range"))?;
        let claims = CredentialClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            provider: user.origin_provider,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::server(format!("failed to sign credential: {e}")))
    }

    /// Verify signature, expiry and issuer
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for any invalid token
    pub fn verify(&self, token: &str) -> Result<CredentialClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);

        decode::<CredentialClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Credential rejected: {e}");
                AuthError::Unauthorized
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_key_32_bytes_long_for_test_";

    fn settings(secret: &str) -> JwtSettings {
        JwtSettings {
            secret: secret.to_string(),
            ..JwtSettings::default()
        }
    }

    fn user() -> UserIdentity {
        let mut user = UserIdentity::new(OriginProvider::Otp);
        user.phone = Some("+15551234567".to_string());
        user
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = CredentialIssuer::new(&settings(SECRET)).unwrap();
        let user = user();

        let token = issuer.issue(&user).unwrap();
        let claims = issuer.verify(&token).unwrap();

        assert_eq!(claims.user_id().unwrap(), user.id);
        assert_eq!(claims.phone.as_deref(), Some("+15551234567"));
        assert_eq!(claims.provider, OriginProvider::Otp);
        assert_eq!(claims.iss, "insura-auth");

        // long-lived: roughly a year
        let lifetime = claims.exp - claims.iat;
        assert_eq!(lifetime, 365 * 24 * 3600);
    }

    #[test]
    fn test_each_credential_is_unique() {
        let issuer = CredentialIssuer::new(&settings(SECRET)).unwrap();
        let user = user();
        let a = issuer.verify(&issuer.issue(&user).unwrap()).unwrap();
        let b = issuer.verify(&issuer.issue(&user).unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_misconfigured_secret_is_fatal() {
        assert_eq!(
            CredentialIssuer::new(&settings("")).err(),
            Some(ConfigError::MissingRequired("JWT_SECRET".to_string()))
        );
        assert!(matches!(
            CredentialIssuer::new(&settings("too-short")),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unusable_validity_is_fatal() {
        for days in [0, -1, 1_000_000_000, i64::MAX] {
            let result = CredentialIssuer::new(&JwtSettings {
                secret: SECRET.to_string(),
                expires_in_days: days,
                ..JwtSettings::default()
            });
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { ref key, .. }) if key == "JWT_EXPIRES_IN_DAYS"),
                "{days}"
            );
        }

        let issuer = CredentialIssuer::new(&JwtSettings {
            secret: SECRET.to_string(),
            expires_in_days: 36_500,
            ..JwtSettings::default()
        })
        .unwrap();
        assert!(issuer.issue(&user()).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let a = CredentialIssuer::new(&settings(SECRET)).unwrap();
        let b = CredentialIssuer::new(&settings("another_key_that_is_32_bytes_lon")).unwrap();
        let token = a.issue(&user()).unwrap();
        assert!(matches!(b.verify(&token), Err(AuthError::Unauthorized)));
        assert!(matches!(a.verify("garbage"), Err(AuthError::Unauthorized)));
    }

    #[test]
    fn test_expired_credential_is_unauthorized() {
        let issuer = CredentialIssuer::new(&settings(SECRET)).unwrap();
        let now = Utc::now().timestamp();
        let claims = CredentialClaims {
            sub: Uuid::new_v4().to_string(),
            email: None,
            phone: None,
            provider: OriginProvider::Password,
            iss: "insura-auth".to_string(),
            iat: now - 7200,
            exp: now - 3600,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(issuer.verify(&token), Err(AuthError::Unauthorized)));
    }

    #[test]
    fn test_foreign_issuer_is_unauthorized() {
        let issuer = CredentialIssuer::new(&settings(SECRET)).unwrap();
        let other = CredentialIssuer::new(&JwtSettings {
            secret: SECRET.to_string(),
            issuer: "someone-else".to_string(),
            ..JwtSettings::default()
        })
        .unwrap();
        let token = other.issue(&user()).unwrap();
        assert!(matches!(issuer.verify(&token), Err(AuthError::Unauthorized)));
    }
}
