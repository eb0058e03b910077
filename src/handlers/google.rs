// Google ID token sign-in
use actix_web::{web, HttpResponse};

use super::types::{required, GoogleSignInBody, LoginResponse};
use crate::authentication::AuthService;
use crate::error::AuthError;
use crate::utils::responses::ResponseBuilder;

/// `POST /api/auth/google`
///
/// # Errors
///
/// `InvalidInput` without a token, `InvalidProviderToken` for a rejected one,
/// `ServerError` when Google sign-in is not configured
pub async fn google_sign_in(
    body: web::Json<GoogleSignInBody>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    let id_token = required(body.id_token.as_deref(), "idToken")?;
    let outcome = auth.google_sign_in(id_token).await?;
    Ok(ResponseBuilder::ok().json(&LoginResponse::from(outcome)))
}
