#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the insura-auth service
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod authentication;
pub mod credential;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod oauth;
pub mod otp;
pub mod settings;
pub mod store;
pub mod testing;
pub mod utils;

/// Re-export commonly used items
pub use authentication::{AuthService, AuthenticatedUser};
pub use credential::CredentialIssuer;
pub use error::AuthError;
pub use handlers::configure_services;
pub use otp::OtpService;
pub use settings::InsuraSettings;
