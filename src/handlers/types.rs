// Request and response bodies for the /api/auth endpoints
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::models::{Channel, Identifier, LoginOutcome, UserProfile, UserSummary};

/// Body of `/request-otp`; also the identifier part of `/verify-otp`
#[derive(Debug, Default, Deserialize)]
pub struct IdentifierBody {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub via: Option<String>,
}

impl IdentifierBody {
    /// # Errors
    ///
    /// Returns `InvalidInput` for a missing, malformed or ambiguous identifier
    pub fn identifier(&self) -> Result<Identifier, AuthError> {
        let via = self
            .via
            .as_deref()
            .filter(|via| !via.trim().is_empty())
            .map(str::parse::<Channel>)
            .transpose()?;
        Identifier::from_parts(self.phone.as_deref(), self.email.as_deref(), via)
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpBody {
    #[serde(flatten)]
    pub identifier: IdentifierBody,
    pub otp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleSignInBody {
    #[serde(rename = "idToken")]
    pub id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignupBody {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OtpRequestResponse {
    pub ok: bool,
    pub channel: Channel,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub ok: bool,
    pub token: String,
    pub user: UserSummary,
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        Self {
            ok: true,
            token: outcome.token,
            user: outcome.user,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub ok: bool,
    pub user: UserProfile,
}

/// Trimmed value of a required string field
///
/// # Errors
///
/// Returns `InvalidInput` naming the field when it is absent or blank
pub fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, AuthError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::invalid_input(format!("{field} required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_body_with_channel() {
        let body: IdentifierBody =
            serde_json::from_str(r#"{"email": "A@B.com", "via": "email"}"#).unwrap();
        assert_eq!(
            body.identifier().unwrap(),
            Identifier::Email("a@b.com".to_string())
        );

        let mismatch: IdentifierBody =
            serde_json::from_str(r#"{"email": "a@b.com", "via": "sms"}"#).unwrap();
        assert!(matches!(
            mismatch.identifier(),
            Err(AuthError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_verify_body_flattens_identifier() {
        let body: VerifyOtpBody =
            serde_json::from_str(r#"{"phone": "+15551234567", "otp": "123456"}"#).unwrap();
        assert_eq!(body.otp.as_deref(), Some("123456"));
        assert_eq!(
            body.identifier.identifier().unwrap(),
            Identifier::Phone("+15551234567".to_string())
        );
    }

    #[test]
    fn test_required_field() {
        assert_eq!(required(Some(" x "), "otp").unwrap(), "x");
        assert!(matches!(
            required(Some("   "), "otp"),
            Err(AuthError::InvalidInput(msg)) if msg == "otp required"
        ));
        assert!(required(None, "otp").is_err());
    }
}
