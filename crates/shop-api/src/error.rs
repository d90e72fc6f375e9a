//! # API Errors
//!
//! Maps [`CheckoutError`] onto HTTP responses with a JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use shop_core::CheckoutError;
use thiserror::Error;
use tracing::error;

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Error returned by API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error("Missing header: {0}")]
    MissingHeader(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Checkout(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::MissingHeader(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = if status.is_server_error() {
            error!("Request failed: {}", self);
            match &self {
                ApiError::Checkout(CheckoutError::UpstreamFailure { service, .. }) => {
                    ErrorResponse::new("Upstream service unavailable", status.as_u16())
                        .with_details(service.clone())
                }
                _ => ErrorResponse::new("Internal server error", status.as_u16()),
            }
        } else {
            let response = ErrorResponse::new(self.to_string(), status.as_u16());
            match &self {
                ApiError::Checkout(err) => response.with_details(err.reason()),
                ApiError::MissingHeader(_) => response,
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("Test error", 400).with_details("invalid_request");
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, 400);
        assert_eq!(err.details.as_deref(), Some("invalid_request"));
    }

    #[test]
    fn test_checkout_error_status() {
        let cases = [
            (CheckoutError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (CheckoutError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (CheckoutError::EmptyCart, StatusCode::UNPROCESSABLE_ENTITY),
            (CheckoutError::not_found("order", "o-1"), StatusCode::NOT_FOUND),
            (CheckoutError::upstream("stripe", "down"), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
        assert_eq!(
            ApiError::MissingHeader("stripe-signature").status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let response = ApiError::from(CheckoutError::Internal("lock poisoned".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
