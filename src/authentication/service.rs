use anyhow::Context;
use log::{info, warn};
use std::sync::Arc;

use crate::credential::CredentialIssuer;
use crate::delivery::{DeliveryGateway, ProviderGateway};
use crate::error::AuthError;
use crate::identity::{IdentityClaims, IdentityResolver, IdentityStore};
use crate::models::{Identifier, LoginOutcome, OriginProvider, UserIdentity};
use crate::oauth::{GoogleTokenVerifier, ProviderTokenVerifier};
use crate::otp::{OtpConfig, OtpRequestAck, OtpService};
use crate::settings::InsuraSettings;
use crate::store::EphemeralStore;
use crate::utils::logging::{mask_identifier, LoggingHelper};

pub struct AuthService {
    otp: OtpService,
    resolver: IdentityResolver,
    issuer: CredentialIssuer,
    provider: Option<Arc<dyn ProviderTokenVerifier>>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        otp: OtpService,
        resolver: IdentityResolver,
        issuer: CredentialIssuer,
        provider: Option<Arc<dyn ProviderTokenVerifier>>,
    ) -> Self {
        Self {
            otp,
            resolver,
            issuer,
            provider,
        }
    }

    /// Wire every component from settings.
    ///
    /// # Errors
    ///
    /// Fails on unusable passcode or signing settings, or when a provider
    /// client cannot be built. All of these are fatal at startup.
    pub fn from_settings(
        settings: &InsuraSettings,
        store: Arc<dyn EphemeralStore>,
        identities: Arc<dyn IdentityStore>,
    ) -> anyhow::Result<Self> {
        info!("🏭 Building authentication services...");

        settings
            .otp
            .validate()
            .context("invalid passcode configuration")?;
        let issuer =
            CredentialIssuer::new(&settings.jwt).context("invalid credential configuration")?;
        let gateway: Arc<dyn DeliveryGateway> = Arc::new(
            ProviderGateway::from_settings(settings)
                .context("failed to initialize delivery providers")?,
        );
        let provider = GoogleTokenVerifier::from_settings(&settings.google)
            .context("failed to initialize Google sign-in")?
            .map(|verifier| Arc::new(verifier) as Arc<dyn ProviderTokenVerifier>);
        LoggingHelper::log_google_init(provider.is_some());

        Ok(Self::new(
            OtpService::new(store, gateway, OtpConfig::from(&settings.otp)),
            IdentityResolver::new(identities),
            issuer,
            provider,
        ))
    }

    #[must_use]
    pub fn otp(&self) -> &OtpService {
        &self.otp
    }

    #[must_use]
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    #[must_use]
    pub fn issuer(&self) -> &CredentialIssuer {
        &self.issuer
    }

    /// # Errors
    ///
    /// See [`OtpService::request`]
    pub async fn request_otp(&self, identifier: &Identifier) -> Result<OtpRequestAck, AuthError> {
        self.otp.request(identifier).await
    }

    /// Consume a passcode, then resolve the user and issue a credential.
    ///
    /// # Errors
    ///
    /// See [`OtpService::verify`]; identity failures after a successful
    /// verify surface as `IdentityConflict`, `InvalidIdentity` or `ServerError`
    pub async fn verify_otp(
        &self,
        identifier: &Identifier,
        candidate: &str,
    ) -> Result<LoginOutcome, AuthError> {
        self.otp.verify(identifier, candidate).await?;

        let claims = IdentityClaims::from_verified_identifier(identifier);
        let user = self.resolver.resolve_or_create(&claims).await.map_err(|e| {
            warn!(
                "⚠️ Passcode for {} verified but identity resolution failed: {e}",
                mask_identifier(identifier)
            );
            e
        })?;
        self.complete_login(&user, "otp")
    }

    /// Exchange a Google ID token for a credential.
    ///
    /// Links to an existing account by e-mail only when Google reports the
    /// address as verified.
    ///
    /// # Errors
    ///
    /// * `ServerError` when Google sign-in is not configured
    /// * `InvalidProviderToken` for a token that fails verification
    /// * `IdentityConflict` when an unverified e-mail belongs to another account
    pub async fn google_sign_in(&self, id_token: &str) -> Result<LoginOutcome, AuthError> {
        let id_token = id_token.trim();
        if id_token.is_empty() {
            return Err(AuthError::invalid_input("idToken required"));
        }
        let Some(provider) = &self.provider else {
            return Err(AuthError::server("Google sign-in is not configured"));
        };

        let profile = provider.verify(id_token).await?;
        let claims = IdentityClaims {
            phone: None,
            email: profile.email.map(|email| email.trim().to_lowercase()),
            provider_subject_id: Some(profile.subject),
            display_name: profile.name,
            picture_url: profile.picture,
            email_verified: profile.email_verified,
            origin: OriginProvider::Google,
        };

        let user = self.resolver.resolve_or_create(&claims).await?;
        self.complete_login(&user, "google")
    }

    /// # Errors
    ///
    /// See [`IdentityResolver::signup`]
    pub async fn signup(
        &self,
        name: Option<&str>,
        email: &str,
        password: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let user = self.resolver.signup(name, email, password).await?;
        self.complete_login(&user, "signup")
    }

    /// # Errors
    ///
    /// See [`IdentityResolver::login`]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let user = self.resolver.login(email, password).await?;
        self.complete_login(&user, "password")
    }

    /// Resolve a bearer credential to its user.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for an invalid credential or one whose user no longer exists
    pub async fn authenticate(&self, token: &str) -> Result<UserIdentity, AuthError> {
        let claims = self.issuer.verify(token)?;
        self.resolver
            .store()
            .find_by_id(claims.user_id()?)
            .await?
            .ok_or(AuthError::Unauthorized)
    }

    fn complete_login(&self, user: &UserIdentity, method: &str) -> Result<LoginOutcome, AuthError> {
        let token = self.issuer.issue(user)?;
        LoggingHelper::log_login_success(&user.id.to_string(), method);
        Ok(LoginOutcome {
            token,
            user: user.summary(),
        })
    }
}
