use actix_web::HttpResponse;

use crate::models::HealthResponse;
use crate::utils::responses::ResponseBuilder;

/// Health check endpoint
pub async fn health() -> HttpResponse {
    ResponseBuilder::ok().json(&HealthResponse {
        status: "ok".to_string(),
        message: "InsuraAI auth service is running".to_string(),
    })
}
