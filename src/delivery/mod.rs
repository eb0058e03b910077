//! Passcode delivery
//!
//! The OTP state machine only sees [`DeliveryGateway`]. [`ProviderGateway`]
//! routes each channel to its configured provider and falls back to
//! [`LogSink`] for channels without credentials, so local development runs
//! the same state machine without sending anything.

mod email;
mod twilio;

pub use email::HttpEmailSender;
pub use twilio::TwilioSmsSender;

use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::settings::InsuraSettings;
use crate::utils::logging::{mask_email, mask_phone, LoggingHelper};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Acknowledgement from a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub provider: &'static str,
    pub message_id: Option<String>,
}

#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// # Errors
    ///
    /// Returns a `DeliveryError` if the provider cannot be reached or refuses the message
    async fn send_sms(&self, phone: &str, secret: &str) -> Result<DeliveryReceipt, DeliveryError>;

    /// # Errors
    ///
    /// Returns a `DeliveryError` if the provider cannot be reached or refuses the message
    async fn send_email(&self, email: &str, secret: &str)
        -> Result<DeliveryReceipt, DeliveryError>;
}

/// Text sent over both channels
#[must_use]
pub fn passcode_message(secret: &str, ttl_seconds: u64) -> String {
    format!("Your verification code is {secret}. It expires in {ttl_seconds} seconds.")
}

/// Writes passcodes to the log instead of sending them
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl DeliveryGateway for LogSink {
    async fn send_sms(&self, phone: &str, secret: &str) -> Result<DeliveryReceipt, DeliveryError> {
        warn!("📵 SMS provider not configured, falling back to log sink");
        info!("[OTP][sms] to {}: {secret}", mask_phone(phone));
        Ok(DeliveryReceipt {
            provider: "log",
            message_id: None,
        })
    }

    async fn send_email(
        &self,
        email: &str,
        secret: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        warn!("📭 Email provider not configured, falling back to log sink");
        info!("[OTP][email] to {}: {secret}", mask_email(email));
        Ok(DeliveryReceipt {
            provider: "log",
            message_id: None,
        })
    }
}

/// Per-channel routing to the configured providers
pub struct ProviderGateway {
    sms: Arc<dyn DeliveryGateway>,
    email: Arc<dyn DeliveryGateway>,
}

impl ProviderGateway {
    #[must_use]
    pub fn new(sms: Arc<dyn DeliveryGateway>, email: Arc<dyn DeliveryGateway>) -> Self {
        Self { sms, email }
    }

    /// Build from settings, using [`LogSink`] for every unconfigured channel
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn from_settings(settings: &InsuraSettings) -> Result<Self, DeliveryError> {
        let sms: Arc<dyn DeliveryGateway> = if settings.twilio.is_configured() {
            LoggingHelper::log_provider_init("SMS", "twilio", true);
            Arc::new(TwilioSmsSender::new(&settings.twilio, &settings.otp)?)
        } else {
            LoggingHelper::log_provider_init("SMS", "twilio", false);
            Arc::new(LogSink)
        };

        let email: Arc<dyn DeliveryGateway> = if settings.email.is_configured() {
            LoggingHelper::log_provider_init("Email", "http api", true);
            Arc::new(HttpEmailSender::new(&settings.email, &settings.otp)?)
        } else {
            LoggingHelper::log_provider_init("Email", "http api", false);
            Arc::new(LogSink)
        };

        Ok(Self::new(sms, email))
    }
}

#[async_trait]
impl DeliveryGateway for ProviderGateway {
    async fn send_sms(&self, phone: &str, secret: &str) -> Result<DeliveryReceipt, DeliveryError> {
        self.sms.send_sms(phone, secret).await
    }

    async fn send_email(
        &self,
        email: &str,
        secret: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        self.email.send_email(email, secret).await
    }
}

/// Shared reqwest client for provider calls
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, DeliveryError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DeliveryError::Transport(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passcode_message() {
        assert_eq!(
            passcode_message("123456", 300),
            "Your verification code is 123456. It expires in 300 seconds."
        );
    }

    #[tokio::test]
    async fn test_log_sink_always_succeeds() {
        let sink = LogSink;
        let receipt = sink.send_sms("+15551234567", "123456").await.unwrap();
        assert_eq!(receipt.provider, "log");
        assert!(sink.send_email("a@b.com", "123456").await.is_ok());
    }

    #[tokio::test]
    async fn test_unconfigured_settings_fall_back_to_log_sink() {
        let settings = InsuraSettings::default();
        let gateway = ProviderGateway::from_settings(&settings).unwrap();
        let receipt = gateway.send_sms("+15551234567", "123456").await.unwrap();
        assert_eq!(receipt.provider, "log");
        let receipt = gateway.send_email("a@b.com", "123456").await.unwrap();
        assert_eq!(receipt.provider, "log");
    }
}
