//! Test doubles and fixtures
//!
//! - [`mock`] - delivery gateways and a provider verifier that never touch the network
//! - [`fixtures`] - settings and fully wired services backed by in-memory stores
//!
//! ```rust
//! use insura_auth::models::Identifier;
//! use insura_auth::testing::TestFixtures;
//!
//! # tokio_test_block(async {
//! let fixtures = TestFixtures::new();
//! let auth = fixtures.auth_service();
//! let phone = Identifier::phone("+15551234567").unwrap();
//! auth.request_otp(&phone).await.unwrap();
//! let code = fixtures.gateway.last_secret_for("+15551234567").unwrap();
//! let outcome = auth.verify_otp(&phone, &code).await.unwrap();
//! assert!(!outcome.token.is_empty());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod fixtures;
pub mod mock;

pub use fixtures::TestFixtures;
pub use mock::{FailingGateway, RecordingGateway, SlowGateway, StubProviderVerifier};

/// Common test constants
pub mod constants {
    /// 32-byte HS256 key accepted by the credential issuer
    pub const TEST_JWT_SECRET: &str = "insura-test-signing-key-32-bytes";
    pub const TEST_PHONE: &str = "+15551234567";
    pub const TEST_EMAIL: &str = "a@b.com";
}
