// HTTP handlers for the /api/auth surface
pub mod google;
pub mod health;
pub mod me;
pub mod otp;
pub mod password;
pub mod types;

pub use google::google_sign_in;
pub use health::health;
pub use me::me;
pub use otp::{request_otp, verify_otp};
pub use password::{login, signup};

use actix_web::web;

use crate::error::AuthError;

/// Path prefix of every endpoint
pub const API_SCOPE: &str = "/api/auth";

/// Register the auth routes.
///
/// Expects `web::Data<AuthService>` and `web::Data<RateLimiters>` on the app.
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config()).service(
        web::scope(API_SCOPE)
            .route("/request-otp", web::post().to(request_otp))
            .route("/verify-otp", web::post().to(verify_otp))
            .route("/google", web::post().to(google_sign_in))
            .route("/signup", web::post().to(signup))
            .route("/login", web::post().to(login))
            .route("/me", web::get().to(me))
            .route("/ping", web::get().to(health)),
    );
}

/// Malformed JSON answers with the same error body as every other failure
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(16 * 1024)
        .error_handler(|err, _req| AuthError::invalid_input(format!("Invalid JSON body: {err}")).into())
}
