use async_trait::async_trait;
use log::{error, info};
use serde::Deserialize;

use super::{http_client, passcode_message, DeliveryError, DeliveryGateway, DeliveryReceipt};
use crate::settings::{OtpSettings, TwilioSettings};
use crate::utils::logging::mask_phone;

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: Option<String>,
}

/// Sender for the Twilio Programmable Messaging API
#[derive(Debug, Clone)]
pub struct TwilioSmsSender {
    client: reqwest::Client,
    messages_url: String,
    account_sid: String,
    auth_token: String,
    sender: Sender,
    ttl_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Sender {
    MessagingService(String),
    From(String),
}

impl TwilioSmsSender {
    /// # Errors
    ///
    /// Returns `NotConfigured` when credentials or a sender are missing
    pub fn new(settings: &TwilioSettings, otp: &OtpSettings) -> Result<Self, DeliveryError> {
        let account_sid = non_empty(settings.account_sid.as_deref())
            .ok_or_else(|| DeliveryError::NotConfigured("TWILIO_SID".to_string()))?;
        let auth_token = non_empty(settings.auth_token.as_deref())
            .ok_or_else(|| DeliveryError::NotConfigured("TWILIO_TOKEN".to_string()))?;

        // A messaging service takes precedence over a plain sender number
        let sender = match (
            non_empty(settings.messaging_service_sid.as_deref()),
            non_empty(settings.from.as_deref()),
        ) {
            (Some(sid), _) => Sender::MessagingService(sid),
            (None, Some(from)) => Sender::From(from),
            (None, None) => {
                return Err(DeliveryError::NotConfigured(
                    "TWILIO_FROM or TWILIO_MESSAGING_SERVICE_SID".to_string(),
                ))
            }
        };

        let messages_url = format!(
            "{}/2010-04-01/Accounts/{account_sid}/Messages.json",
            settings.api_base_url.trim_end_matches('/')
        );

        Ok(Self {
            client: http_client(otp.delivery_timeout())?,
            messages_url,
            account_sid,
            auth_token,
            sender,
            ttl_seconds: otp.ttl_seconds,
        })
    }

    fn form_body<'a>(&'a self, to: &'a str, body: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut form = vec![("To", to), ("Body", body)];
        match &self.sender {
            Sender::MessagingService(sid) => form.push(("MessagingServiceSid", sid.as_str())),
            Sender::From(from) => form.push(("From", from.as_str())),
        }
        form
    }
}

#[async_trait]
impl DeliveryGateway for TwilioSmsSender {
    async fn send_sms(&self, phone: &str, secret: &str) -> Result<DeliveryReceipt, DeliveryError> {
        let body = passcode_message(secret, self.ttl_seconds);
        let response = self
            .client
            .post(&self.messages_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&self.form_body(phone, &body))
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Twilio error ({status}) sending to {}", mask_phone(phone));
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = response
            .json::<MessageResponse>()
            .await
            .ok()
            .and_then(|m| m.sid);
        info!("📨 SMS passcode sent to {}", mask_phone(phone));
        Ok(DeliveryReceipt {
            provider: "twilio",
            message_id,
        })
    }

    async fn send_email(
        &self,
        _email: &str,
        _secret: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        Err(DeliveryError::NotConfigured(
            "Twilio sender only delivers SMS".to_string(),
        ))
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}
