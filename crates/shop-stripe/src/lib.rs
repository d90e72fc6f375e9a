//! # shop-stripe
//!
//! Stripe Checkout payment gateway for the storefront.
//!
//! [`StripeCheckoutGateway`] implements `shop_core::PaymentGateway`:
//! - hosted Checkout Sessions charging the order's server-computed total
//! - session lookup for the synchronous redirect flow
//! - webhook signature verification and event parsing
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shop_stripe::StripeCheckoutGateway;
//! use shop_core::{CheckoutUrls, PaymentGateway};
//!
//! let gateway = StripeCheckoutGateway::from_env()?;
//!
//! let session = gateway
//!     .create_checkout(&order, &items, &CheckoutUrls::new("https://shop.example.com"))
//!     .await?;
//!
//! // Redirect the customer to session.checkout_url
//! ```
//!
//! ## Webhook Handling
//!
//! ```rust,ignore
//! let event = gateway.verify_webhook(body, stripe_signature_header).await?;
//! if let Some(completion) = event.completion {
//!     orchestrator.handle_payment_completion(&completion).await?;
//! }
//! ```

pub mod checkout;
pub mod config;
pub mod webhook;

// Re-exports
pub use checkout::StripeCheckoutGateway;
pub use config::StripeConfig;
pub use webhook::{HANDLED_WEBHOOK_EVENTS, SIGNATURE_TOLERANCE_SECS};
