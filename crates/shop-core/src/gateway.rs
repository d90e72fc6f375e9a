//! # Payment Gateway Port
//!
//! Trait implemented by payment provider adapters, plus the provider-neutral
//! checkout session and payment event types the orchestrator consumes.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            PaymentGateway (trait)            │
//! │  ├── create_checkout()                       │
//! │  ├── retrieve_completion()                   │
//! │  ├── verify_webhook()                        │
//! │  └── provider_name()                         │
//! └──────────────────────────────────────────────┘
//!                       ▲
//!              ┌────────┴────────┐
//!              │ StripeCheckout  │
//!              │    Gateway      │
//!              └─────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CheckoutResult;
use crate::order::{Order, OrderItem, PaymentDetails, ShippingAddress};

/// Payment status reported by the provider for a checkout session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    /// Anything else (e.g. "no_payment_required", "processing")
    Other(String),
}

impl PaymentStatus {
    pub fn from_provider(status: &str) -> Self {
        match status {
            "paid" => PaymentStatus::Paid,
            "unpaid" => PaymentStatus::Unpaid,
            other => PaymentStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Other(s) => s,
        }
    }
}

/// Provider-neutral outcome of a checkout session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompletion {
    /// Provider's checkout session id
    pub session_id: String,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddress>,
}

impl PaymentCompletion {
    pub fn new(session_id: impl Into<String>, payment_status: PaymentStatus) -> Self {
        Self {
            session_id: session_id.into(),
            payment_status,
            payment_intent_id: None,
            customer_email: None,
            shipping_address: None,
        }
    }

    /// Builder: set payment intent id
    pub fn with_payment_intent(mut self, id: impl Into<String>) -> Self {
        self.payment_intent_id = Some(id.into());
        self
    }

    /// Builder: set customer email
    pub fn with_customer_email(mut self, email: impl Into<String>) -> Self {
        self.customer_email = Some(email.into());
        self
    }

    /// Fields persisted on the order when it transitions
    pub fn payment_details(&self) -> PaymentDetails {
        PaymentDetails {
            payment_intent_id: self.payment_intent_id.clone(),
            customer_email: self.customer_email.clone(),
            shipping_address: self.shipping_address.clone(),
        }
    }
}

/// A checkout session created by a payment provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider's session ID
    pub session_id: String,

    /// Our internal order ID
    pub order_id: Uuid,

    /// Provider name (e.g., "stripe")
    pub provider: String,

    /// URL to redirect customer to for payment
    pub checkout_url: String,

    /// When the session expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

/// Webhook event types the checkout core reacts to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    /// Checkout session completed (payment may still be pending)
    CheckoutCompleted,
    /// Delayed payment method succeeded
    AsyncPaymentSucceeded,
    /// Delayed payment method failed
    AsyncPaymentFailed,
    /// Session expired without payment
    CheckoutExpired,
    /// Unknown event (passthrough)
    Unknown(String),
}

/// A verified, parsed webhook event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event ID from provider
    pub event_id: String,

    pub event_type: WebhookEventType,

    /// Provider name
    pub provider: String,

    /// Session outcome for checkout session events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<PaymentCompletion>,

    pub timestamp: DateTime<Utc>,
}

/// Core trait for payment provider adapters.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session charging the order total.
    ///
    /// # Arguments
    /// * `order` - The pending order, with computed amounts
    /// * `items` - The order's item snapshot
    /// * `urls` - Where the provider sends the customer afterwards
    async fn create_checkout(
        &self,
        order: &Order,
        items: &[OrderItem],
        urls: &CheckoutUrls,
    ) -> CheckoutResult<CheckoutSession>;

    /// Fetch the current outcome of a checkout session from the provider.
    async fn retrieve_completion(&self, session_id: &str) -> CheckoutResult<PaymentCompletion>;

    /// Verify a webhook signature and parse the event.
    ///
    /// # Arguments
    /// * `payload` - Raw webhook body bytes
    /// * `signature` - Signature header from the request
    async fn verify_webhook(&self, payload: &[u8], signature: &str)
        -> CheckoutResult<WebhookEvent>;

    /// Get the provider name (for logging and routing).
    fn provider_name(&self) -> &'static str;
}

/// Configuration for URLs used in checkout
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    /// Base URL of the application (e.g., "https://shop.example.com")
    pub base_url: String,
    /// Completion path; the provider appends the session id
    pub complete_path: String,
    /// Cancel page path
    pub cancel_path: String,
}

impl CheckoutUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            complete_path: "/checkout/complete".to_string(),
            cancel_path: "/checkout/cancel".to_string(),
        }
    }

    /// Success URL with the provider's session id placeholder
    pub fn success_url(&self) -> String {
        format!(
            "{}{}?session_id={{CHECKOUT_SESSION_ID}}",
            self.base_url, self.complete_path
        )
    }

    pub fn cancel_url(&self) -> String {
        format!("{}{}", self.base_url, self.cancel_path)
    }
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self::new("http://localhost:8080")
    }
}
