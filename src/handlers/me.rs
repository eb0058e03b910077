use actix_web::HttpResponse;

use super::types::ProfileResponse;
use crate::authentication::AuthenticatedUser;
use crate::error::AuthError;
use crate::models::UserProfile;
use crate::utils::responses::ResponseBuilder;

/// `GET /api/auth/me`: profile of the bearer credential's user
///
/// # Errors
///
/// `Unauthorized` is raised by the extractor before this runs
pub async fn me(user: AuthenticatedUser) -> Result<HttpResponse, AuthError> {
    Ok(ResponseBuilder::ok().json(&ProfileResponse {
        ok: true,
        user: UserProfile::from(&*user),
    }))
}
