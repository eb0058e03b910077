//! Pre-wired services over in-memory stores

use actix_web::web;
use std::sync::Arc;

use super::constants::TEST_JWT_SECRET;
use super::mock::RecordingGateway;
use crate::authentication::AuthService;
use crate::credential::CredentialIssuer;
use crate::delivery::DeliveryGateway;
use crate::identity::{IdentityResolver, InMemoryIdentityStore};
use crate::oauth::ProviderTokenVerifier;
use crate::otp::{OtpConfig, OtpService};
use crate::settings::InsuraSettings;
use crate::store::{EphemeralStore, InMemoryStore};
use crate::utils::rate_limit::RateLimiters;

/// Shared stores and a recording gateway; every service built from one
/// fixture sees the same state
pub struct TestFixtures {
    pub settings: InsuraSettings,
    pub store: Arc<InMemoryStore>,
    pub identities: Arc<InMemoryIdentityStore>,
    pub gateway: Arc<RecordingGateway>,
}

impl Default for TestFixtures {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixtures {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(Self::settings())
    }

    #[must_use]
    pub fn with_settings(settings: InsuraSettings) -> Self {
        Self {
            settings,
            store: Arc::new(InMemoryStore::new()),
            identities: Arc::new(InMemoryIdentityStore::new()),
            gateway: Arc::new(RecordingGateway::new()),
        }
    }

    /// Default settings with a valid signing key
    #[must_use]
    pub fn settings() -> InsuraSettings {
        let mut settings = InsuraSettings::default();
        settings.jwt.secret = TEST_JWT_SECRET.to_string();
        settings
    }

    #[must_use]
    pub fn otp_service(&self) -> OtpService {
        self.otp_service_with_gateway(self.gateway.clone())
    }

    #[must_use]
    pub fn otp_service_with_gateway(&self, gateway: Arc<dyn DeliveryGateway>) -> OtpService {
        OtpService::new(
            self.store.clone(),
            gateway,
            OtpConfig::from(&self.settings.otp),
        )
    }

    /// # Panics
    ///
    /// Panics if the fixture's signing key is invalid
    #[must_use]
    pub fn issuer(&self) -> CredentialIssuer {
        CredentialIssuer::new(&self.settings.jwt).unwrap()
    }

    /// Auth service without Google sign-in
    #[must_use]
    pub fn auth_service(&self) -> AuthService {
        AuthService::new(
            self.otp_service(),
            IdentityResolver::new(self.identities.clone()),
            self.issuer(),
            None,
        )
    }

    #[must_use]
    pub fn auth_service_with_provider(
        &self,
        provider: Arc<dyn ProviderTokenVerifier>,
    ) -> AuthService {
        AuthService::new(
            self.otp_service(),
            IdentityResolver::new(self.identities.clone()),
            self.issuer(),
            Some(provider),
        )
    }

    #[must_use]
    pub fn rate_limiters(&self) -> RateLimiters {
        let store: Arc<dyn EphemeralStore> = self.store.clone();
        RateLimiters::from_settings(&store, &self.settings.rate_limit)
    }

    /// App data for `App::new().app_data(..)`, matching what `main` registers
    #[must_use]
    pub fn app_data(&self, auth: AuthService) -> (web::Data<AuthService>, web::Data<RateLimiters>) {
        (web::Data::new(auth), web::Data::new(self.rate_limiters()))
    }
}
