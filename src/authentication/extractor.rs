use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;

use super::AuthService;
use crate::error::AuthError;
use crate::models::UserIdentity;

/// Extract the credential from an `Authorization: Bearer <token>` header
#[must_use]
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// The user behind a valid bearer credential; rejects with 401 otherwise
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub UserIdentity);

impl AuthenticatedUser {
    #[must_use]
    pub fn into_inner(self) -> UserIdentity {
        self.0
    }
}

impl Deref for AuthenticatedUser {
    type Target = UserIdentity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AuthError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let service = req.app_data::<web::Data<AuthService>>().cloned();
        let token = bearer_token(req);

        Box::pin(async move {
            let service =
                service.ok_or_else(|| AuthError::server("AuthService is not registered"))?;
            let token = token.ok_or(AuthError::Unauthorized)?;
            service.authenticate(&token).await.map(AuthenticatedUser)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_bearer_token_parsing() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer abc.def.ghi"))
            .to_http_request();
        assert_eq!(bearer_token(&req).as_deref(), Some("abc.def.ghi"));

        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "bearer   abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req).as_deref(), Some("abc"));
    }

    #[test]
    fn test_bearer_token_rejects_other_schemes() {
        for value in ["Basic dXNlcjpwYXNz", "Bearer", "Bearer    ", "abc"] {
            let req = TestRequest::default()
                .insert_header((AUTHORIZATION, value))
                .to_http_request();
            assert_eq!(bearer_token(&req), None, "{value}");
        }
        assert_eq!(bearer_token(&TestRequest::default().to_http_request()), None);
    }
}
