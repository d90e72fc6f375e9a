//! # Checkout Error Types
//!
//! Typed error handling for the storefront checkout core.
//! All cart, order and checkout operations return `Result<T, CheckoutError>`.

use thiserror::Error;

/// Core error type for all checkout operations
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// No valid session (missing, tampered and expired are not distinguished)
    #[error("Authentication required")]
    Unauthenticated,

    /// The caller does not own the resource or lacks the required role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Checkout attempted without an active, non-empty cart
    #[error("Cart is empty")]
    EmptyCart,

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A payment event references no known order
    #[error("No order matches payment session {session_id}")]
    Reconciliation { session_id: String },

    /// Payment, email, identity or storage provider error
    #[error("Upstream failure [{service}]: {message}")]
    UpstreamFailure { service: String, message: String },

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Webhook signature verification failed
    #[error("Webhook verification failed: {0}")]
    WebhookVerificationFailed(String),

    /// Webhook payload parsing error
    #[error("Webhook parse error: {0}")]
    WebhookParseError(String),

    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CheckoutError {
    /// Shorthand for [`CheckoutError::NotFound`]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CheckoutError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`CheckoutError::UpstreamFailure`]
    pub fn upstream(service: impl Into<String>, message: impl ToString) -> Self {
        CheckoutError::UpstreamFailure {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            CheckoutError::Unauthenticated => 401,
            CheckoutError::Forbidden(_) => 403,
            CheckoutError::EmptyCart => 422,
            CheckoutError::NotFound { .. } => 404,
            CheckoutError::Reconciliation { .. } => 422,
            CheckoutError::UpstreamFailure { .. } => 502,
            CheckoutError::InvalidRequest(_) => 400,
            CheckoutError::WebhookVerificationFailed(_) => 401,
            CheckoutError::WebhookParseError(_) => 400,
            CheckoutError::Configuration(_) => 500,
            CheckoutError::Internal(_) => 500,
        }
    }

    /// Short machine-readable reason, used in error page redirects
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::Unauthenticated => "unauthenticated",
            CheckoutError::Forbidden(_) => "forbidden",
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::NotFound { .. } => "not_found",
            CheckoutError::Reconciliation { .. } => "reconciliation",
            CheckoutError::UpstreamFailure { .. } => "upstream_failure",
            CheckoutError::InvalidRequest(_) => "invalid_request",
            CheckoutError::WebhookVerificationFailed(_) => "webhook_verification",
            CheckoutError::WebhookParseError(_) => "webhook_parse",
            CheckoutError::Configuration(_) | CheckoutError::Internal(_) => "internal",
        }
    }
}

/// Result type alias for checkout operations
pub type CheckoutResult<T> = Result<T, CheckoutError>;
