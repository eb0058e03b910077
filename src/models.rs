use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::error::AuthError;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?\d{7,15}$").expect("phone pattern is valid"));

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Delivery medium for a one-time passcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Email,
}

impl Channel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sms" => Ok(Channel::Sms),
            "email" => Ok(Channel::Email),
            other => Err(AuthError::invalid_input(format!("Unsupported channel '{other}'"))),
        }
    }
}

/// Phone number or e-mail address a passcode is bound to.
///
/// Constructors normalize the raw value (trimmed; e-mail lowercased; phone
/// stripped of spaces and dashes) so request and verify build the same keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Phone(String),
    Email(String),
}

impl Identifier {
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty or malformed phone number
    pub fn phone(raw: &str) -> Result<Self, AuthError> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();
        if normalized.is_empty() {
            return Err(AuthError::invalid_input("Phone or email required"));
        }
        if !is_valid_phone(&normalized) {
            return Err(AuthError::invalid_input("Invalid phone number"));
        }
        Ok(Identifier::Phone(normalized))
    }

    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty or malformed e-mail address
    pub fn email(raw: &str) -> Result<Self, AuthError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(AuthError::invalid_input("Phone or email required"));
        }
        if !is_valid_email(&normalized) {
            return Err(AuthError::invalid_input("Invalid email address"));
        }
        Ok(Identifier::Email(normalized))
    }

    /// Build an identifier from the optional request fields.
    ///
    /// Exactly one of `phone`/`email` must be non-empty. When `via` is given it
    /// must agree with the field supplied.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when both or neither are supplied, or on a channel mismatch
    pub fn from_parts(
        phone: Option<&str>,
        email: Option<&str>,
        via: Option<Channel>,
    ) -> Result<Self, AuthError> {
        let phone = phone.map(str::trim).filter(|p| !p.is_empty());
        let email = email.map(str::trim).filter(|e| !e.is_empty());

        let identifier = match (phone, email) {
            (Some(p), None) => Self::phone(p)?,
            (None, Some(e)) => Self::email(e)?,
            (Some(_), Some(_)) => {
                return Err(AuthError::invalid_input("Provide either phone or email, not both"))
            }
            (None, None) => return Err(AuthError::invalid_input("Phone or email required")),
        };

        match via {
            Some(channel) if channel != identifier.channel() => Err(AuthError::invalid_input(
                format!("Channel '{channel}' does not match the identifier supplied"),
            )),
            _ => Ok(identifier),
        }
    }

    #[must_use]
    pub fn channel(&self) -> Channel {
        match self {
            Identifier::Phone(_) => Channel::Sms,
            Identifier::Email(_) => Channel::Email,
        }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Identifier::Phone(v) | Identifier::Email(v) => v,
        }
    }
}

#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

#[must_use]
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

/// How the account was first created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OriginProvider {
    Google,
    Otp,
    Password,
    #[default]
    None,
}

impl OriginProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OriginProvider::Google => "google",
            OriginProvider::Otp => "otp",
            OriginProvider::Password => "password",
            OriginProvider::None => "none",
        }
    }
}

/// Durable user record with sparse unique email, phone and provider subject
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub provider_subject_id: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub origin_provider: OriginProvider,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserIdentity {
    /// Fresh record with a random id and no identifiers set
    #[must_use]
    pub fn new(origin_provider: OriginProvider) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            display_name: None,
            email: None,
            phone: None,
            provider_subject_id: None,
            password_hash: None,
            email_verified: false,
            origin_provider,
            profile_image_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.display_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            picture: self.profile_image_url.clone(),
        }
    }
}

/// Minimal user view returned alongside a credential
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub picture: Option<String>,
}

/// Issued credential plus the user it binds; shared by every login mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub token: String,
    pub user: UserSummary,
}

/// Full profile returned by `GET /api/auth/me`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub picture: Option<String>,
    pub email_verified: bool,
    pub provider: OriginProvider,
    pub created_at: DateTime<Utc>,
}

impl From<&UserIdentity> for UserProfile {
    fn from(user: &UserIdentity) -> Self {
        Self {
            id: user.id,
            name: user.display_name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            picture: user.profile_image_url.clone(),
            email_verified: user.email_verified,
            provider: user.origin_provider,
            created_at: user.created_at,
        }
    }
}
