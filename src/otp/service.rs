use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::keys::ChallengeKeys;
use super::secret::{generate_secret, hash_secret_blocking, verify_secret_blocking};
use crate::delivery::{DeliveryError, DeliveryGateway};
use crate::error::AuthError;
use crate::models::{Channel, Identifier};
use crate::settings::OtpSettings;
use crate::store::{EphemeralStore, StoreError};
use crate::utils::logging::mask_identifier;

/// Acknowledgement text; identical whether or not an account exists
pub const OTP_SENT_MESSAGE: &str = "OTP sent if the identifier exists.";

/// Tunables for the challenge lifecycle
#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub length: u32,
    pub ttl: Duration,
    pub resend_cooldown: Duration,
    pub max_attempts: u32,
    pub store_timeout: Duration,
    pub delivery_timeout: Duration,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self::from(&OtpSettings::default())
    }
}

impl From<&OtpSettings> for OtpConfig {
    fn from(settings: &OtpSettings) -> Self {
        Self {
            length: settings.length,
            ttl: settings.ttl(),
            resend_cooldown: settings.resend_cooldown(),
            max_attempts: settings.max_attempts,
            store_timeout: settings.store_timeout(),
            delivery_timeout: settings.delivery_timeout(),
        }
    }
}

/// Result of a successful request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRequestAck {
    pub channel: Channel,
    pub message: &'static str,
}

/// The OTP state machine.
///
/// Per (channel, identifier) challenge:
/// `NONE -> PENDING -> CONSUMED | EXHAUSTED | EXPIRED`, where expiry is
/// enforced by the store's TTLs. The resend cooldown runs on its own timer.
/// All state lives in the injected store; the service itself is stateless.
pub struct OtpService {
    store: Arc<dyn EphemeralStore>,
    gateway: Arc<dyn DeliveryGateway>,
    config: OtpConfig,
}

impl OtpService {
    #[must_use]
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        gateway: Arc<dyn DeliveryGateway>,
        config: OtpConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn EphemeralStore> {
        &self.store
    }

    /// Issue a fresh passcode for `identifier` and deliver it.
    ///
    /// A new request after the cooldown overwrites any pending secret and
    /// resets the attempt counter.
    ///
    /// # Errors
    ///
    /// * `RateLimited` while the cooldown marker exists (nothing is written)
    /// * `ServerError` if a store write fails or times out (nothing is sent)
    /// * `DeliveryFailed` if the gateway fails or times out; secret and cooldown are rolled back
    pub async fn request(&self, identifier: &Identifier) -> Result<OtpRequestAck, AuthError> {
        let keys = ChallengeKeys::for_identifier(identifier);
        let channel = identifier.channel();
        let masked = mask_identifier(identifier);

        // Check-then-set is two store calls: concurrent requests can both pass
        // the check and each send a code, the last write being the valid one.
        if self
            .bounded("read cooldown", self.store.get(&keys.cooldown))
            .await?
            .is_some()
        {
            info!("⏳ OTP request for {masked} via {channel} rejected by cooldown");
            return Err(AuthError::RateLimited);
        }

        let secret = generate_secret(self.config.length)?;
        let hashed = hash_secret_blocking(secret.clone()).await?;

        if let Err(err) = self.store_challenge(&keys, &hashed).await {
            self.rollback(&keys).await;
            return Err(err);
        }

        if let Err(err) = self.deliver(identifier, &secret).await {
            warn!("📪 OTP delivery via {channel} to {masked} failed: {err}");
            self.rollback(&keys).await;
            return Err(AuthError::DeliveryFailed(err));
        }

        info!("🔐 OTP issued via {channel} to {masked}");
        Ok(OtpRequestAck {
            channel,
            message: OTP_SENT_MESSAGE,
        })
    }

    /// Check `candidate` against the pending challenge and consume it on match.
    ///
    /// Every call that finds a challenge counts one attempt. The call that
    /// pushes the counter past `max_attempts` purges the secret and fails,
    /// even with the right code.
    ///
    /// # Errors
    ///
    /// * `InvalidInput` for an empty candidate
    /// * `ChallengeNotFound` when nothing is pending (or another verify consumed it first)
    /// * `TooManyAttempts` when the cap is exceeded
    /// * `InvalidSecret` on mismatch; the challenge stays pending
    /// * `ServerError` on store failure; the challenge is left intact
    pub async fn verify(&self, identifier: &Identifier, candidate: &str) -> Result<(), AuthError> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Err(AuthError::invalid_input("OTP required"));
        }

        let keys = ChallengeKeys::for_identifier(identifier);
        let masked = mask_identifier(identifier);

        let Some(hashed) = self
            .bounded("read secret", self.store.get(&keys.secret))
            .await?
        else {
            return Err(AuthError::ChallengeNotFound);
        };

        let attempts = self
            .bounded(
                "count attempt",
                self.store.increment(&keys.attempts, self.config.ttl),
            )
            .await?;

        if attempts > i64::from(self.config.max_attempts) {
            self.bounded("purge secret", self.store.delete(&keys.secret))
                .await?;
            self.bounded("purge attempts", self.store.delete(&keys.attempts))
                .await?;
            warn!("🚫 OTP for {masked} exhausted after {} attempts", attempts - 1);
            return Err(AuthError::TooManyAttempts);
        }

        if !verify_secret_blocking(candidate.to_string(), hashed.clone()).await? {
            info!("❌ Wrong OTP for {masked} (attempt {attempts})");
            return Err(AuthError::InvalidSecret);
        }

        // Whoever removes the secret first owns the success. A secret replaced
        // by a newer request while we compared is left in place.
        if !self
            .bounded(
                "consume secret",
                self.store.delete_if_equals(&keys.secret, &hashed),
            )
            .await?
        {
            return Err(AuthError::ChallengeNotFound);
        }
        self.bounded("purge attempts", self.store.delete(&keys.attempts))
            .await?;
        self.bounded("purge cooldown", self.store.delete(&keys.cooldown))
            .await?;

        info!("✅ OTP verified for {masked}");
        Ok(())
    }

    async fn store_challenge(&self, keys: &ChallengeKeys, hashed: &str) -> Result<(), AuthError> {
        self.bounded(
            "write secret",
            self.store.set(&keys.secret, hashed, self.config.ttl),
        )
        .await?;
        self.bounded("reset attempts", self.store.delete(&keys.attempts))
            .await?;
        self.bounded(
            "write cooldown",
            self.store
                .set(&keys.cooldown, "1", self.config.resend_cooldown),
        )
        .await?;
        Ok(())
    }

    async fn deliver(&self, identifier: &Identifier, secret: &str) -> Result<(), DeliveryError> {
        let send = async {
            match identifier {
                Identifier::Phone(phone) => self.gateway.send_sms(phone, secret).await,
                Identifier::Email(email) => self.gateway.send_email(email, secret).await,
            }
        };
        match tokio::time::timeout(self.config.delivery_timeout, send).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(DeliveryError::Timeout(self.config.delivery_timeout)),
        }
    }

    /// Best-effort removal of the secret and cooldown so a failed send does not lock the user out
    async fn rollback(&self, keys: &ChallengeKeys) {
        for key in [&keys.secret, &keys.cooldown] {
            if let Err(err) = self.bounded("rollback", self.store.delete(key)).await {
                error!("Failed to roll back OTP key: {err}");
            }
        }
    }

    /// Run a store call under the store timeout
    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(op.to_string())),
        };
        result.map_err(|err| {
            error!("Ephemeral store failure during '{op}': {err}");
            AuthError::from(err)
        })
    }
}
