//! Ephemeral state store
//!
//! A TTL-aware key/value cache shared by every worker. The OTP state machine
//! keeps no in-process state; this store is its only synchronization point.
//! It is injected as a trait object with its own connect/disconnect
//! lifecycle so a networked cache can replace [`InMemoryStore`].

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation timed out: {0}")]
    Timeout(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Key/value cache with per-key expiry
///
/// Expired keys are invisible to every read. `increment` must be atomic
/// per key so concurrent verifies cannot lose updates.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Open the connection to the backend
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the backend cannot be reached
    async fn connect(&self) -> Result<(), StoreError>;

    /// Close the connection; later operations fail with `Unavailable`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses to close cleanly
    async fn disconnect(&self) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value and expiry
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remove `key`, returning whether a live value was removed.
    ///
    /// Only one of several concurrent callers sees `true` for the same value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove `key` only while it still holds `expected`.
    ///
    /// Returns `false` when the key is gone or was overwritten in the meantime.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Atomically create the counter at 1 or add 1 to it, then re-arm its TTL
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the stored value is not an integer
    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StoreError>;

    /// Remaining lifetime of `key`, `None` when it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;
}
