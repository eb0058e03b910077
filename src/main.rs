#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use log::error;
use std::sync::Arc;

use insura_auth::{
    handlers::{configure_services, API_SCOPE},
    identity::{IdentityStore, InMemoryIdentityStore},
    settings::InsuraSettings,
    store::{EphemeralStore, InMemoryStore},
    utils::rate_limit::RateLimiters,
    AuthService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = InsuraSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let store: Arc<dyn EphemeralStore> = Arc::new(InMemoryStore::new());
    store
        .connect()
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to connect ephemeral store: {e}")))?;
    let identities: Arc<dyn IdentityStore> = Arc::new(InMemoryIdentityStore::new());

    // A missing or short JWT_SECRET stops startup here
    let auth = AuthService::from_settings(&settings, Arc::clone(&store), identities).map_err(|e| {
        error!("❌ {e:#}");
        std::io::Error::other(format!("Failed to initialize authentication: {e:#}"))
    })?;
    let limiters = RateLimiters::from_settings(&store, &settings.rate_limit);

    let result = start_server(settings, auth, limiters).await;

    if let Err(e) = store.disconnect().await {
        error!("Failed to disconnect ephemeral store: {e}");
    }
    result
}

/// Start the HTTP server
///
/// # Errors
///
/// Returns an error if binding fails or the server stops with an error
async fn start_server(
    settings: InsuraSettings,
    auth: AuthService,
    limiters: RateLimiters,
) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &settings);

    let auth = web::Data::new(auth);
    let limiters = web::Data::new(limiters);
    let cors_origins = settings.get_cors_origins();

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                cors_origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Authorization", "Content-Type", "Accept"])
            .max_age(3600);

        App::new()
            .app_data(auth.clone())
            .app_data(limiters.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &InsuraSettings) {
    println!("Starting InsuraAI auth service v{} on http://{bind_address}", insura_auth::VERSION);
    println!();
    println!("OTP endpoints:");
    println!("  POST {API_SCOPE}/request-otp - Send a one-time passcode (sms or email)");
    println!("  POST {API_SCOPE}/verify-otp  - Exchange a passcode for a credential");
    println!();
    println!("Password and Google endpoints:");
    println!("  POST {API_SCOPE}/signup      - Create an e-mail and password account");
    println!("  POST {API_SCOPE}/login       - Sign in with e-mail and password");
    println!(
        "  POST {API_SCOPE}/google      - Sign in with a Google ID token ({})",
        if settings.google.client_id().is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();
    println!("System endpoints:");
    println!("  GET  {API_SCOPE}/me          - Current user (Bearer credential)");
    println!("  GET  {API_SCOPE}/ping        - Health check");
    println!();
    println!(
        "Passcodes: {} digits, valid {}s, resend after {}s, {} attempts",
        settings.otp.length,
        settings.otp.ttl_seconds,
        settings.otp.resend_cooldown_seconds,
        settings.otp.max_attempts
    );
}
