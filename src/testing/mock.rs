//! Fake implementations of the outbound seams

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::delivery::{DeliveryError, DeliveryGateway, DeliveryReceipt};
use crate::oauth::{ProviderProfile, ProviderTokenError, ProviderTokenVerifier};

/// One passcode handed to a gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: String,
    pub secret: String,
}

/// Gateway that records every passcode instead of sending it
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, recipient: &str, secret: &str) -> Result<DeliveryReceipt, DeliveryError> {
        self.sent
            .lock()
            .map_err(|_| DeliveryError::Transport("recording lock poisoned".to_string()))?
            .push(SentMessage {
                recipient: recipient.to_string(),
                secret: secret.to_string(),
            });
        Ok(DeliveryReceipt {
            provider: "recording",
            message_id: None,
        })
    }

    /// Most recent passcode sent to `recipient`
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned
    #[must_use]
    pub fn last_secret_for(&self, recipient: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.recipient == recipient)
            .map(|m| m.secret.clone())
    }

    /// # Panics
    ///
    /// Panics if the lock is poisoned
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// # Panics
    ///
    /// Panics if the lock is poisoned
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryGateway for RecordingGateway {
    async fn send_sms(&self, phone: &str, secret: &str) -> Result<DeliveryReceipt, DeliveryError> {
        self.record(phone, secret)
    }

    async fn send_email(
        &self,
        email: &str,
        secret: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        self.record(email, secret)
    }
}

/// Gateway whose provider always rejects the message
#[derive(Debug, Default)]
pub struct FailingGateway;

#[async_trait]
impl DeliveryGateway for FailingGateway {
    async fn send_sms(&self, _phone: &str, _secret: &str) -> Result<DeliveryReceipt, DeliveryError> {
        Err(DeliveryError::Rejected {
            status: 503,
            body: "provider unavailable".to_string(),
        })
    }

    async fn send_email(
        &self,
        _email: &str,
        _secret: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        Err(DeliveryError::Rejected {
            status: 503,
            body: "provider unavailable".to_string(),
        })
    }
}

/// Gateway that sleeps before acknowledging, for timeout tests
#[derive(Debug)]
pub struct SlowGateway {
    delay: Duration,
}

impl SlowGateway {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl DeliveryGateway for SlowGateway {
    async fn send_sms(&self, _phone: &str, _secret: &str) -> Result<DeliveryReceipt, DeliveryError> {
        tokio::time::sleep(self.delay).await;
        Ok(DeliveryReceipt {
            provider: "slow",
            message_id: None,
        })
    }

    async fn send_email(
        &self,
        email: &str,
        secret: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        self.send_sms(email, secret).await
    }
}

/// Provider verifier accepting only registered tokens
#[derive(Debug, Default)]
pub struct StubProviderVerifier {
    tokens: Mutex<HashMap<String, ProviderProfile>>,
}

impl StubProviderVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as asserting `profile`
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned
    pub fn register(&self, token: &str, profile: ProviderProfile) {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), profile);
    }
}

#[async_trait]
impl ProviderTokenVerifier for StubProviderVerifier {
    async fn verify(&self, id_token: &str) -> Result<ProviderProfile, ProviderTokenError> {
        self.tokens
            .lock()
            .map_err(|_| ProviderTokenError::Malformed("stub lock poisoned".to_string()))?
            .get(id_token)
            .cloned()
            .ok_or(ProviderTokenError::SignatureInvalid)
    }
}
