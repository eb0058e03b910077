//! HTTP response handling
//!
//! A single fluent entry point for JSON error and success bodies so every
//! endpoint answers with the same `{ "error", "message" }` shape.

use actix_web::{http::StatusCode, HttpResponse};
use serde_json::json;

/// Unified response builder
pub struct ResponseBuilder;

impl ResponseBuilder {
    /// Error response with an arbitrary status code
    #[must_use]
    pub fn error(status: StatusCode) -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(status)
    }

    /// 200 OK with a JSON body
    #[must_use]
    pub fn ok() -> JsonResponseBuilder {
        JsonResponseBuilder::new(StatusCode::OK)
    }

    /// 201 Created with a JSON body
    #[must_use]
    pub fn created() -> JsonResponseBuilder {
        JsonResponseBuilder::new(StatusCode::CREATED)
    }
}

/// Builder for error responses
pub struct ErrorResponseBuilder {
    status: StatusCode,
    error_code: Option<String>,
    message: Option<String>,
}

impl ErrorResponseBuilder {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            error_code: None,
            message: None,
        }
    }

    /// Set the machine-readable code (e.g. "`invalid_otp`")
    #[must_use]
    pub fn with_error_code(mut self, code: &str) -> Self {
        self.error_code = Some(code.to_string());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    /// Build the final `HttpResponse`; unset fields fall back to the status
    #[must_use]
    pub fn build(self) -> HttpResponse {
        let error_code = self
            .error_code
            .unwrap_or_else(|| default_error_code(self.status).to_string());
        let message = self
            .message
            .unwrap_or_else(|| self.status.canonical_reason().unwrap_or("Error").to_string());

        HttpResponse::build(self.status).json(json!({
            "error": error_code,
            "message": message,
        }))
    }
}

fn default_error_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "invalid_request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::CONFLICT => "conflict",
        StatusCode::TOO_MANY_REQUESTS => "rate_limited",
        _ => "server_error",
    }
}

/// Builder for JSON success responses
pub struct JsonResponseBuilder {
    status: StatusCode,
}

impl JsonResponseBuilder {
    fn new(status: StatusCode) -> Self {
        Self { status }
    }

    /// Build the response with JSON content
    #[must_use]
    pub fn json<T: serde::Serialize>(self, data: &T) -> HttpResponse {
        HttpResponse::build(self.status).json(data)
    }
}
