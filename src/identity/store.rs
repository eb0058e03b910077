use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::{IdentityLookup, IdentityStore, IdentityStoreError};
use crate::models::UserIdentity;

/// Identity store held in process memory.
///
/// Uniqueness checks and writes happen under one write lock, so `upsert` is
/// a single atomic find-or-insert.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    users: RwLock<HashMap<Uuid, UserIdentity>>,
}

impl InMemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().map(|users| users.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Uuid, UserIdentity>>, IdentityStoreError> {
        self.users
            .read()
            .map_err(|_| IdentityStoreError::Backend("identity store lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<Uuid, UserIdentity>>, IdentityStoreError> {
        self.users
            .write()
            .map_err(|_| IdentityStoreError::Backend("identity store lock poisoned".to_string()))
    }

    /// Sparse uniqueness: absent fields never collide
    fn check_unique(
        users: &HashMap<Uuid, UserIdentity>,
        candidate: &UserIdentity,
    ) -> Result<(), IdentityStoreError> {
        let constraints = [
            (
                "provider_subject_id",
                candidate
                    .provider_subject_id
                    .clone()
                    .map(IdentityLookup::ProviderSubject),
            ),
            ("email", candidate.email.clone().map(IdentityLookup::Email)),
            ("phone", candidate.phone.clone().map(IdentityLookup::Phone)),
        ];

        for (field, lookup) in constraints {
            let Some(lookup) = lookup else { continue };
            if users
                .values()
                .any(|other| other.id != candidate.id && lookup.matches(other))
            {
                return Err(IdentityStoreError::Conflict { field });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_one(
        &self,
        lookup: &IdentityLookup,
    ) -> Result<Option<UserIdentity>, IdentityStoreError> {
        Ok(self.read()?.values().find(|u| lookup.matches(u)).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserIdentity>, IdentityStoreError> {
        Ok(self.read()?.get(&id).cloned())
    }

    async fn upsert(
        &self,
        lookup: &IdentityLookup,
        defaults: UserIdentity,
    ) -> Result<UserIdentity, IdentityStoreError> {
        let mut users = self.write()?;
        if let Some(existing) = users.values().find(|u| lookup.matches(u)) {
            return Ok(existing.clone());
        }
        Self::check_unique(&users, &defaults)?;
        users.insert(defaults.id, defaults.clone());
        Ok(defaults)
    }

    async fn save(&self, user: &UserIdentity) -> Result<(), IdentityStoreError> {
        let mut users = self.write()?;
        Self::check_unique(&users, user)?;
        users.insert(user.id, user.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OriginProvider;

    fn user_with_email(email: &str) -> UserIdentity {
        let mut user = UserIdentity::new(OriginProvider::Otp);
        user.email = Some(email.to_string());
        user
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_finds() {
        let store = InMemoryIdentityStore::new();
        let lookup = IdentityLookup::Email("a@b.com".to_string());

        let first = store.upsert(&lookup, user_with_email("a@b.com")).await.unwrap();
        let second = store.upsert(&lookup, user_with_email("a@b.com")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_sparse_uniqueness() {
        let store = InMemoryIdentityStore::new();

        // two phone-only users have no email and do not collide
        for phone in ["+15550000001", "+15550000002"] {
            let mut user = UserIdentity::new(OriginProvider::Otp);
            user.phone = Some(phone.to_string());
            store.save(&user).await.unwrap();
        }
        assert_eq!(store.len(), 2);

        store.save(&user_with_email("a@b.com")).await.unwrap();
        assert_eq!(
            store.save(&user_with_email("a@b.com")).await,
            Err(IdentityStoreError::Conflict { field: "email" })
        );
    }

    #[tokio::test]
    async fn test_upsert_conflict_on_other_field() {
        let store = InMemoryIdentityStore::new();
        store.save(&user_with_email("a@b.com")).await.unwrap();

        let mut google = user_with_email("a@b.com");
        google.provider_subject_id = Some("google-sub".to_string());

        let result = store
            .upsert(&IdentityLookup::ProviderSubject("google-sub".to_string()), google)
            .await;
        assert_eq!(result, Err(IdentityStoreError::Conflict { field: "email" }));
    }

    #[tokio::test]
    async fn test_save_updates_in_place() {
        let store = InMemoryIdentityStore::new();
        let mut user = user_with_email("a@b.com");
        store.save(&user).await.unwrap();

        user.display_name = Some("Alice".to_string());
        store.save(&user).await.unwrap();

        let found = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found.display_name.as_deref(), Some("Alice"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_converge() {
        let store = std::sync::Arc::new(InMemoryIdentityStore::new());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert(
                        &IdentityLookup::Phone("+15551234567".to_string()),
                        {
                            let mut u = UserIdentity::new(OriginProvider::Otp);
                            u.phone = Some("+15551234567".to_string());
                            u
                        },
                    )
                    .await
                    .unwrap()
                    .id
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.len(), 1);
    }
}
