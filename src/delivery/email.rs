use async_trait::async_trait;
use log::{error, info};
use serde::{Deserialize, Serialize};

use super::{http_client, passcode_message, DeliveryError, DeliveryGateway, DeliveryReceipt};
use crate::settings::{EmailSettings, OtpSettings};
use crate::utils::logging::mask_email;

#[derive(Debug, Serialize)]
struct EmailPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    html: String,
}

#[derive(Debug, Deserialize)]
struct EmailApiResponse {
    id: Option<String>,
}

/// Sender for a transactional e-mail HTTP API (JSON body, bearer key)
#[derive(Debug, Clone)]
pub struct HttpEmailSender {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
    subject: String,
    ttl_seconds: u64,
}

impl HttpEmailSender {
    /// # Errors
    ///
    /// Returns `NotConfigured` when the API URL, key or sender address is missing
    pub fn new(settings: &EmailSettings, otp: &OtpSettings) -> Result<Self, DeliveryError> {
        let required = |value: &Option<String>, name: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
                .ok_or_else(|| DeliveryError::NotConfigured(name.to_string()))
        };

        Ok(Self {
            client: http_client(otp.delivery_timeout())?,
            api_url: required(&settings.api_url, "EMAIL_API_URL")?,
            api_key: required(&settings.api_key, "EMAIL_API_KEY")?,
            from: required(&settings.from, "EMAIL_FROM")?,
            subject: settings.subject.clone(),
            ttl_seconds: otp.ttl_seconds,
        })
    }

    fn payload<'a>(&'a self, to: &'a str, text: &'a str, secret: &str) -> EmailPayload<'a> {
        EmailPayload {
            from: &self.from,
            to,
            subject: &self.subject,
            text,
            html: format!(
                "<p>Your verification code is <b>{secret}</b>.</p><p>It expires in {} seconds.</p>",
                self.ttl_seconds
            ),
        }
    }
}

#[async_trait]
impl DeliveryGateway for HttpEmailSender {
    async fn send_sms(&self, _phone: &str, _secret: &str) -> Result<DeliveryReceipt, DeliveryError> {
        Err(DeliveryError::NotConfigured(
            "e-mail sender only delivers e-mail".to_string(),
        ))
    }

    async fn send_email(
        &self,
        email: &str,
        secret: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let text = passcode_message(secret, self.ttl_seconds);
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.payload(email, &text, secret))
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("E-mail API error ({status}) sending to {}", mask_email(email));
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = response
            .json::<EmailApiResponse>()
            .await
            .ok()
            .and_then(|r| r.id);
        info!("📨 E-mail passcode sent to {}", mask_email(email));
        Ok(DeliveryReceipt {
            provider: "email-api",
            message_id,
        })
    }
}
