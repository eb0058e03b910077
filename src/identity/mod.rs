//! Durable user identities
//!
//! [`IdentityStore`] is the persistence seam; its uniqueness constraints on
//! email, phone and provider subject are the only strong consistency
//! guarantee used to settle identity-creation races. [`IdentityResolver`]
//! implements find-or-create and account linking on top of it.

mod resolver;
mod store;

pub use resolver::{IdentityClaims, IdentityResolver, MIN_PASSWORD_LENGTH};
pub use store::InMemoryIdentityStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::UserIdentity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityStoreError {
    /// Another record already owns this unique field
    #[error("unique constraint violated on {field}")]
    Conflict { field: &'static str },
    #[error("identity store error: {0}")]
    Backend(String),
}

/// Criteria for a single-field lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityLookup {
    ProviderSubject(String),
    Email(String),
    Phone(String),
}

impl IdentityLookup {
    /// Whether `user` matches this lookup
    #[must_use]
    pub fn matches(&self, user: &UserIdentity) -> bool {
        match self {
            IdentityLookup::ProviderSubject(sub) => {
                user.provider_subject_id.as_deref() == Some(sub.as_str())
            }
            IdentityLookup::Email(email) => user.email.as_deref() == Some(email.as_str()),
            IdentityLookup::Phone(phone) => user.phone.as_deref() == Some(phone.as_str()),
        }
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `Backend` if the store cannot be queried
    async fn find_one(&self, lookup: &IdentityLookup)
        -> Result<Option<UserIdentity>, IdentityStoreError>;

    /// # Errors
    ///
    /// Returns `Backend` if the store cannot be queried
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserIdentity>, IdentityStoreError>;

    /// Atomically return the record matching `lookup`, or insert `defaults`.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when inserting would violate a uniqueness constraint
    async fn upsert(
        &self,
        lookup: &IdentityLookup,
        defaults: UserIdentity,
    ) -> Result<UserIdentity, IdentityStoreError>;

    /// Insert or replace the record with `user.id`
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when the record would collide with another one
    async fn save(&self, user: &UserIdentity) -> Result<(), IdentityStoreError>;
}
