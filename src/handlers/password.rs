// E-mail and password accounts
use actix_web::{web, HttpResponse};

use super::types::{required, LoginBody, LoginResponse, SignupBody};
use crate::authentication::AuthService;
use crate::error::AuthError;
use crate::utils::responses::ResponseBuilder;

/// `POST /api/auth/signup`
///
/// # Errors
///
/// `InvalidInput` for missing or weak fields, `IdentityConflict` for a taken e-mail
pub async fn signup(
    body: web::Json<SignupBody>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    let email = required(body.email.as_deref(), "Email")?;
    let password = required(body.password.as_deref(), "Password")?;

    let outcome = auth.signup(body.name.as_deref(), email, password).await?;
    Ok(ResponseBuilder::created().json(&LoginResponse::from(outcome)))
}

/// `POST /api/auth/login`
///
/// # Errors
///
/// `InvalidInput` for missing fields, `InvalidCredentials` otherwise
pub async fn login(
    body: web::Json<LoginBody>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    let email = required(body.email.as_deref(), "Email")?;
    // passwords are compared as typed
    let password = body
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AuthError::invalid_input("Password required"))?;

    let outcome = auth.login(email, password).await?;
    Ok(ResponseBuilder::ok().json(&LoginResponse::from(outcome)))
}
