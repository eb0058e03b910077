use chrono::Utc;
use log::{debug, info, warn};
use std::sync::{Arc, LazyLock};

use super::{IdentityLookup, IdentityStore, IdentityStoreError};
use crate::error::AuthError;
use crate::models::{is_valid_email, is_valid_phone, Identifier, OriginProvider, UserIdentity};
use crate::otp::secret::{hash_secret, hash_secret_blocking, verify_secret_blocking};

/// Shortest accepted password
pub const MIN_PASSWORD_LENGTH: usize = 8;

const MAX_DISPLAY_NAME_LENGTH: usize = 256;

// Compared against when the e-mail is unknown so both failure paths cost one bcrypt verify
static DUMMY_PASSWORD_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_secret("insura-auth-dummy-password").ok());

/// What a login mode knows about the person signing in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityClaims {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub provider_subject_id: Option<String>,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
    pub email_verified: bool,
    pub origin: OriginProvider,
}

impl IdentityClaims {
    /// Claims proven by a verified passcode.
    ///
    /// Receiving the code by e-mail proves ownership of the address.
    #[must_use]
    pub fn from_verified_identifier(identifier: &Identifier) -> Self {
        match identifier {
            Identifier::Phone(phone) => Self {
                phone: Some(phone.clone()),
                origin: OriginProvider::Otp,
                ..Self::default()
            },
            Identifier::Email(email) => Self {
                email: Some(email.clone()),
                email_verified: true,
                origin: OriginProvider::Otp,
                ..Self::default()
            },
        }
    }

    /// Lookups in resolution order: provider subject, then e-mail, then phone.
    ///
    /// A provider-asserted e-mail the provider has not verified never selects
    /// an existing account.
    fn lookups(&self) -> Vec<IdentityLookup> {
        let mut lookups = Vec::with_capacity(3);
        let subject = non_empty(self.provider_subject_id.as_deref());
        let email_trusted = self.email_verified || subject.is_none();
        if let Some(sub) = subject {
            lookups.push(IdentityLookup::ProviderSubject(sub));
        }
        if let Some(email) = non_empty(self.email.as_deref()).filter(|_| email_trusted) {
            lookups.push(IdentityLookup::Email(email.to_lowercase()));
        }
        if let Some(phone) = non_empty(self.phone.as_deref()) {
            lookups.push(IdentityLookup::Phone(phone));
        }
        lookups
    }
}

/// Find-or-create of durable user records, plus password accounts
pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    /// Return the user these claims identify, creating it on first sight.
    ///
    /// An existing record gets non-empty, changed name and picture values and
    /// a provider subject if it had none. Concurrent creators converge on one
    /// record; a uniqueness conflict is retried once as a lookup.
    ///
    /// # Errors
    ///
    /// * `InvalidIdentity` when no identifier is present or a field is malformed
    /// * `IdentityConflict` when the new record collides with a different one
    /// * `ServerError` on store failure
    pub async fn resolve_or_create(&self, claims: &IdentityClaims) -> Result<UserIdentity, AuthError> {
        let lookups = claims.lookups();
        let Some(primary) = lookups.first().cloned() else {
            return Err(AuthError::InvalidIdentity(
                "An identifier is required".to_string(),
            ));
        };

        if let Some(user) = self.find_existing(&lookups).await? {
            return self.refresh(user, claims).await;
        }

        let defaults = Self::new_record(claims)?;
        match self.store.upsert(&primary, defaults).await {
            Ok(user) => {
                info!("👤 Resolved identity {} ({})", user.id, claims.origin.as_str());
                Ok(user)
            }
            Err(IdentityStoreError::Conflict { field }) => {
                debug!("Identity upsert conflicted on {field}, retrying as lookup");
                match self.find_existing(&lookups).await? {
                    Some(user) => self.refresh(user, claims).await,
                    None => {
                        warn!("Identity conflict on {field} could not be resolved");
                        Err(AuthError::IdentityConflict { field })
                    }
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Create a password account.
    ///
    /// # Errors
    ///
    /// * `InvalidInput` for a malformed e-mail or a short password
    /// * `IdentityConflict` when the e-mail already has an account
    pub async fn signup(
        &self,
        name: Option<&str>,
        email: &str,
        password: &str,
    ) -> Result<UserIdentity, AuthError> {
        let Identifier::Email(email) = Identifier::email(email)? else {
            return Err(AuthError::invalid_input("Invalid email address"));
        };
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::invalid_input(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        let lookup = IdentityLookup::Email(email.clone());
        if self.store.find_one(&lookup).await?.is_some() {
            return Err(AuthError::IdentityConflict { field: "email" });
        }

        let mut user = UserIdentity::new(OriginProvider::Password);
        user.email = Some(email);
        user.display_name = non_empty(name);
        if user
            .display_name
            .as_ref()
            .is_some_and(|n| n.chars().count() > MAX_DISPLAY_NAME_LENGTH)
        {
            return Err(AuthError::InvalidIdentity("Name is too long".to_string()));
        }
        user.password_hash = Some(hash_secret_blocking(password.to_string()).await?);

        self.store.save(&user).await?;
        info!("👤 Created password account {}", user.id);
        Ok(user)
    }

    /// Check an e-mail and password pair.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` for an unknown e-mail, an account without
    /// a password, or a wrong password alike
    pub async fn login(&self, email: &str, password: &str) -> Result<UserIdentity, AuthError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::invalid_input("Email and password required"));
        }

        let user = self.store.find_one(&IdentityLookup::Email(email)).await?;
        let stored_hash = user
            .as_ref()
            .and_then(|u| u.password_hash.clone())
            .or_else(|| DUMMY_PASSWORD_HASH.clone());

        let Some(stored_hash) = stored_hash else {
            return Err(AuthError::InvalidCredentials);
        };
        let matches = verify_secret_blocking(password.to_string(), stored_hash).await?;

        match user {
            Some(user) if matches && user.password_hash.is_some() => Ok(user),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn find_existing(
        &self,
        lookups: &[IdentityLookup],
    ) -> Result<Option<UserIdentity>, AuthError> {
        for lookup in lookups {
            if let Some(user) = self.store.find_one(lookup).await? {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }

    async fn refresh(
        &self,
        mut user: UserIdentity,
        claims: &IdentityClaims,
    ) -> Result<UserIdentity, AuthError> {
        let mut changed = false;

        if let Some(sub) = non_empty(claims.provider_subject_id.as_deref()) {
            if user.provider_subject_id.is_none() {
                info!("🔗 Linking provider identity to user {}", user.id);
                user.provider_subject_id = Some(sub);
                changed = true;
            }
        }
        if let Some(name) = non_empty(claims.display_name.as_deref()) {
            if user.display_name.as_deref() != Some(name.as_str()) {
                user.display_name = Some(name);
                changed = true;
            }
        }
        if let Some(picture) = non_empty(claims.picture_url.as_deref()) {
            if user.profile_image_url.as_deref() != Some(picture.as_str()) {
                user.profile_image_url = Some(picture);
                changed = true;
            }
        }
        if claims.email_verified
            && !user.email_verified
            && user.email.is_some()
            && user.email.as_deref().map(str::to_lowercase)
                == claims.email.as_deref().map(str::to_lowercase)
        {
            user.email_verified = true;
            changed = true;
        }

        if changed {
            user.updated_at = Utc::now();
            self.store.save(&user).await?;
        }
        Ok(user)
    }

    fn new_record(claims: &IdentityClaims) -> Result<UserIdentity, AuthError> {
        let email = non_empty(claims.email.as_deref()).map(|e| e.to_lowercase());
        let phone = non_empty(claims.phone.as_deref());

        if let Some(email) = &email {
            if !is_valid_email(email) {
                return Err(AuthError::InvalidIdentity(
                    "Email address is malformed".to_string(),
                ));
            }
        }
        if let Some(phone) = &phone {
            if !is_valid_phone(phone) {
                return Err(AuthError::InvalidIdentity(
                    "Phone number is malformed".to_string(),
                ));
            }
        }
        let display_name = non_empty(claims.display_name.as_deref());
        if display_name
            .as_ref()
            .is_some_and(|n| n.chars().count() > MAX_DISPLAY_NAME_LENGTH)
        {
            return Err(AuthError::InvalidIdentity("Name is too long".to_string()));
        }
        let picture = non_empty(claims.picture_url.as_deref());
        if picture
            .as_ref()
            .is_some_and(|p| !(p.starts_with("https://") || p.starts_with("http://")))
        {
            return Err(AuthError::InvalidIdentity(
                "Picture must be an http(s) URL".to_string(),
            ));
        }

        let mut user = UserIdentity::new(claims.origin);
        user.email_verified = claims.email_verified && email.is_some();
        user.email = email;
        user.phone = phone;
        user.provider_subject_id = non_empty(claims.provider_subject_id.as_deref());
        user.display_name = display_name;
        user.profile_image_url = picture;
        Ok(user)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::InMemoryIdentityStore;

    fn resolver() -> (IdentityResolver, Arc<InMemoryIdentityStore>) {
        let store = Arc::new(InMemoryIdentityStore::new());
        (IdentityResolver::new(store.clone()), store)
    }

    fn google_claims(sub: &str, email: &str) -> IdentityClaims {
        IdentityClaims {
            provider_subject_id: Some(sub.to_string()),
            email: Some(email.to_string()),
            display_name: Some("Alice Example".to_string()),
            picture_url: Some("https://lh3.googleusercontent.com/a/alice".to_string()),
            email_verified: true,
            origin: OriginProvider::Google,
            ..IdentityClaims::default()
        }
    }

    #[tokio::test]
    async fn test_otp_email_creates_user_once() {
        let (resolver, store) = resolver();
        let claims =
            IdentityClaims::from_verified_identifier(&Identifier::Email("a@b.com".to_string()));

        let first = resolver.resolve_or_create(&claims).await.unwrap();
        assert_eq!(first.email.as_deref(), Some("a@b.com"));
        assert_eq!(first.origin_provider, OriginProvider::Otp);
        assert!(first.email_verified);

        let second = resolver.resolve_or_create(&claims).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_google_links_existing_otp_user() {
        let (resolver, store) = resolver();
        let otp_user = resolver
            .resolve_or_create(&IdentityClaims::from_verified_identifier(
                &Identifier::Email("alice@example.com".to_string()),
            ))
            .await
            .unwrap();

        let linked = resolver
            .resolve_or_create(&google_claims("google-123", "Alice@Example.com"))
            .await
            .unwrap();

        assert_eq!(linked.id, otp_user.id);
        assert_eq!(linked.provider_subject_id.as_deref(), Some("google-123"));
        assert_eq!(linked.display_name.as_deref(), Some("Alice Example"));
        // origin stays with the first login mode
        assert_eq!(linked.origin_provider, OriginProvider::Otp);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unverified_provider_email_does_not_link() {
        let (resolver, store) = resolver();
        let otp_user = resolver
            .resolve_or_create(&IdentityClaims::from_verified_identifier(
                &Identifier::Email("alice@example.com".to_string()),
            ))
            .await
            .unwrap();

        let mut claims = google_claims("google-999", "alice@example.com");
        claims.email_verified = false;
        claims.display_name = Some("Mallory".to_string());

        assert!(matches!(
            resolver.resolve_or_create(&claims).await,
            Err(AuthError::IdentityConflict { field: "email" })
        ));
        let untouched = store.find_by_id(otp_user.id).await.unwrap().unwrap();
        assert_eq!(untouched.provider_subject_id, None);
        assert_eq!(untouched.display_name, None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unverified_provider_email_creates_unverified_user() {
        let (resolver, _) = resolver();
        let mut claims = google_claims("google-777", "new@example.com");
        claims.email_verified = false;

        let user = resolver.resolve_or_create(&claims).await.unwrap();
        assert_eq!(user.email.as_deref(), Some("new@example.com"));
        assert!(!user.email_verified);

        // the same subject signs in again
        let again = resolver.resolve_or_create(&claims).await.unwrap();
        assert_eq!(again.id, user.id);
    }

    #[tokio::test]
    async fn test_refresh_ignores_empty_values() {
        let (resolver, _) = resolver();
        resolver
            .resolve_or_create(&google_claims("google-123", "alice@example.com"))
            .await
            .unwrap();

        let mut claims = google_claims("google-123", "alice@example.com");
        claims.display_name = Some("   ".to_string());
        claims.picture_url = None;
        let user = resolver.resolve_or_create(&claims).await.unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Alice Example"));
        assert!(user.profile_image_url.is_some());
    }

    #[tokio::test]
    async fn test_invalid_identity() {
        let (resolver, _) = resolver();
        let claims = IdentityClaims {
            email: Some("broken".to_string()),
            origin: OriginProvider::Google,
            ..IdentityClaims::default()
        };
        assert!(matches!(
            resolver.resolve_or_create(&claims).await,
            Err(AuthError::InvalidIdentity(_))
        ));
        assert!(matches!(
            resolver.resolve_or_create(&IdentityClaims::default()).await,
            Err(AuthError::InvalidIdentity(_))
        ));
    }

    #[tokio::test]
    async fn test_signup_and_login() {
        let (resolver, _) = resolver();
        let user = resolver
            .signup(Some("Bob"), "Bob@Example.com", "correct horse")
            .await
            .unwrap();
        assert_eq!(user.email.as_deref(), Some("bob@example.com"));
        assert_eq!(user.origin_provider, OriginProvider::Password);
        assert_ne!(user.password_hash.as_deref(), Some("correct horse"));

        let logged_in = resolver.login("bob@example.com", "correct horse").await.unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[tokio::test]
    async fn test_signup_rejects_duplicates_and_short_passwords() {
        let (resolver, _) = resolver();
        resolver.signup(None, "bob@example.com", "password1").await.unwrap();

        assert!(matches!(
            resolver.signup(None, "bob@example.com", "password2").await,
            Err(AuthError::IdentityConflict { field: "email" })
        ));
        assert!(matches!(
            resolver.signup(None, "carol@example.com", "short").await,
            Err(AuthError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (resolver, _) = resolver();
        resolver.signup(None, "bob@example.com", "password1").await.unwrap();
        resolver
            .resolve_or_create(&IdentityClaims::from_verified_identifier(
                &Identifier::Email("otp@example.com".to_string()),
            ))
            .await
            .unwrap();

        for (email, password) in [
            ("bob@example.com", "wrong-password"),
            ("nobody@example.com", "password1"),
            ("otp@example.com", "password1"),
        ] {
            assert!(matches!(
                resolver.login(email, password).await,
                Err(AuthError::InvalidCredentials)
            ));
        }
    }
}
