// Centralized logging helpers so identifiers never reach the logs unmasked
use log::{info, warn};

use crate::models::Identifier;

/// Mask an e-mail address: keep the first character of the local part and the domain
#[must_use]
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}

/// Mask a phone number: keep the last two digits
#[must_use]
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 2 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("***{tail}")
}

/// Mask whatever kind of identifier is given
#[must_use]
pub fn mask_identifier(identifier: &Identifier) -> String {
    match identifier {
        Identifier::Email(email) => mask_email(email),
        Identifier::Phone(phone) => mask_phone(phone),
    }
}

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log delivery provider initialization status
    pub fn log_provider_init(channel: &str, provider: &str, configured: bool) {
        if configured {
            info!("✅ {channel} delivery configured ({provider})");
        } else {
            warn!("❌ {channel} delivery not configured - codes will be written to the log");
        }
    }

    /// Log Google sign-in availability
    pub fn log_google_init(configured: bool) {
        if configured {
            info!("✅ Google sign-in configured");
        } else {
            info!("⏭️  Google sign-in disabled, GOOGLE_CLIENT_ID not set");
        }
    }

    /// Log a successful sign-in without revealing the identifier
    pub fn log_login_success(user_id: &str, method: &str) {
        info!("🔓 User {user_id} signed in via {method}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("alice@example.com"), "a***@example.com");
        assert_eq!(mask_email("not-an-email"), "***");
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+15551234567"), "***67");
        assert_eq!(mask_phone("1"), "***");
    }

    #[test]
    fn test_mask_identifier() {
        let id = Identifier::Email("bob@example.com".to_string());
        assert!(!mask_identifier(&id).contains("bob"));
    }
}
