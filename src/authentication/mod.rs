//! Login-mode unification
//!
//! OTP, password and Google sign-in all end in the same [`LoginOutcome`]:
//! a credential from the [`CredentialIssuer`] plus a user summary.
//! [`AuthenticatedUser`] is the other half of that contract, turning a
//! bearer credential back into a user.
//!
//! [`LoginOutcome`]: crate::models::LoginOutcome
//! [`CredentialIssuer`]: crate::credential::CredentialIssuer

mod extractor;
mod service;

pub use extractor::{bearer_token, AuthenticatedUser};
pub use service::AuthService;
