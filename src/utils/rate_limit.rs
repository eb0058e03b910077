//! Per-client fixed-window request limits for the public OTP endpoints

use actix_web::HttpRequest;
use log::warn;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AuthError;
use crate::settings::RateLimitSettings;
use crate::store::EphemeralStore;

/// Fixed-window counter per client IP, kept in the ephemeral store.
///
/// Counters live next to the OTP state, so every worker and every process
/// sharing the store draws from one budget per client.
///
/// The first request of a window creates the counter with the window as TTL;
/// the window therefore restarts whenever the counter expires.
pub struct IpRateLimiter {
    store: Arc<dyn EphemeralStore>,
    scope: &'static str,
    limit: u32,
    window: Duration,
}

impl IpRateLimiter {
    #[must_use]
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        scope: &'static str,
        limit: u32,
        window: Duration,
    ) -> Self {
        Self {
            store,
            scope,
            limit,
            window,
        }
    }

    fn key(&self, client: &str) -> String {
        format!("ratelimit:{}:{client}", self.scope)
    }

    /// Count one request from `client`.
    ///
    /// A store failure lets the request through; the OTP state machine has
    /// its own cooldown and attempt cap.
    ///
    /// # Errors
    ///
    /// Returns `Throttled` once the window's budget is spent
    pub async fn check(&self, client: &str) -> Result<(), AuthError> {
        let key = self.key(client);
        let count = match self.store.get(&key).await {
            Ok(Some(_)) => self.store.increment(&key, self.remaining(&key).await).await,
            Ok(None) => self.store.increment(&key, self.window).await,
            Err(e) => Err(e),
        };

        match count {
            Ok(count) if count > i64::from(self.limit) => {
                warn!("🚦 {} limit reached for client {client}", self.scope);
                Err(AuthError::Throttled)
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("⚠️ Rate limiter store error for {}: {e}", self.scope);
                Ok(())
            }
        }
    }

    /// Count one request from the peer of `req`
    ///
    /// # Errors
    ///
    /// Returns `Throttled` once the window's budget is spent
    pub async fn check_request(&self, req: &HttpRequest) -> Result<(), AuthError> {
        self.check(&client_ip(req)).await
    }

    // increment re-arms the TTL, so pass the time left to keep the window fixed
    async fn remaining(&self, key: &str) -> Duration {
        match self.store.ttl(key).await {
            Ok(Some(left)) if !left.is_zero() => left,
            _ => self.window,
        }
    }
}

/// Socket peer address of the request; forwarding headers are not trusted
#[must_use]
pub fn client_ip(req: &HttpRequest) -> String {
    req.peer_addr()
        .map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

/// The limiters guarding `/request-otp` and `/verify-otp`
pub struct RateLimiters {
    pub request_otp: IpRateLimiter,
    pub verify_otp: IpRateLimiter,
}

impl RateLimiters {
    #[must_use]
    pub fn from_settings(store: &Arc<dyn EphemeralStore>, settings: &RateLimitSettings) -> Self {
        Self {
            request_otp: IpRateLimiter::new(
                Arc::clone(store),
                "request-otp",
                settings.request_otp_per_hour,
                Duration::from_secs(3600),
            ),
            verify_otp: IpRateLimiter::new(
                Arc::clone(store),
                "verify-otp",
                settings.verify_otp_per_window,
                Duration::from_secs(settings.verify_window_minutes * 60),
            ),
        }
    }
}
