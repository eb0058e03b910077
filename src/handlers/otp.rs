// Passcode request and verification
use actix_web::{web, HttpRequest, HttpResponse};
use log::info;

use super::types::{required, IdentifierBody, LoginResponse, OtpRequestResponse, VerifyOtpBody};
use crate::authentication::AuthService;
use crate::error::AuthError;
use crate::utils::logging::mask_identifier;
use crate::utils::rate_limit::RateLimiters;
use crate::utils::responses::ResponseBuilder;

/// `POST /api/auth/request-otp`
///
/// # Errors
///
/// `InvalidInput`, `Throttled`, `RateLimited`, `DeliveryFailed` or `ServerError`
pub async fn request_otp(
    req: HttpRequest,
    body: web::Json<IdentifierBody>,
    auth: web::Data<AuthService>,
    limiters: web::Data<RateLimiters>,
) -> Result<HttpResponse, AuthError> {
    limiters.request_otp.check_request(&req).await?;

    let identifier = body.identifier()?;
    info!(
        "📨 OTP requested for {} via {}",
        mask_identifier(&identifier),
        identifier.channel()
    );

    let ack = auth.request_otp(&identifier).await?;
    Ok(ResponseBuilder::ok().json(&OtpRequestResponse {
        ok: true,
        channel: ack.channel,
        message: ack.message.to_string(),
    }))
}

/// `POST /api/auth/verify-otp`
///
/// # Errors
///
/// `InvalidInput`, `Throttled`, `ChallengeNotFound`, `InvalidSecret`,
/// `TooManyAttempts`, identity errors or `ServerError`
pub async fn verify_otp(
    req: HttpRequest,
    body: web::Json<VerifyOtpBody>,
    auth: web::Data<AuthService>,
    limiters: web::Data<RateLimiters>,
) -> Result<HttpResponse, AuthError> {
    limiters.verify_otp.check_request(&req).await?;

    let identifier = body.identifier.identifier()?;
    let otp = required(body.otp.as_deref(), "OTP")?;

    let outcome = auth.verify_otp(&identifier, otp).await?;
    Ok(ResponseBuilder::ok().json(&LoginResponse::from(outcome)))
}
