//! # shop-core
//!
//! Core types and traits for the storefront checkout engine.
//!
//! This crate provides:
//! - `SessionAuthority` for issuing and verifying signed session tokens
//! - `ProductCatalog`, `CartStore` and `OrderLedger` storage ports, with an
//!   in-memory implementation in [`memory`]
//! - `PaymentGateway` trait for implementing payment providers
//! - `CheckoutOrchestrator` tying carts, orders and payments together
//! - `CheckoutError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use shop_core::{CheckoutConfig, CheckoutOrchestrator, InMemoryStore, LoggingMailer};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let orchestrator = CheckoutOrchestrator::new(
//!     store.clone(),
//!     store.clone(),
//!     gateway,
//!     Arc::new(LoggingMailer),
//!     CheckoutConfig::default(),
//! );
//!
//! // Snapshot the cart into a pending order and open a payment session
//! let redirect = orchestrator.initiate_checkout(Some(&claims)).await?;
//!
//! // Later, from the webhook or the redirect endpoint
//! orchestrator.handle_payment_completion(&completion).await?;
//! ```

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod notify;
pub mod order;
pub mod pricing;
pub mod product;
pub mod session;

// Re-exports for convenience
pub use auth::{Identity, IdentityProvider, StaticIdentityProvider, StaticUser};
pub use cart::{Cart, CartItem, CartLine, CartService, CartStatus, CartStore, CartView};
pub use catalog::{CatalogAdmin, NewProduct, ProductCatalog, ProductUpdate};
pub use checkout::{
    CheckoutConfig, CheckoutOrchestrator, CheckoutRedirect, CompletionOutcome, UnpaidPolicy,
};
pub use error::{CheckoutError, CheckoutResult};
pub use gateway::{
    CheckoutSession, CheckoutUrls, PaymentCompletion, PaymentGateway, PaymentStatus,
    WebhookEvent, WebhookEventType,
};
pub use memory::InMemoryStore;
pub use notify::{EmailMessage, LoggingMailer, Mailer, OutboxMailer};
pub use order::{
    Order, OrderDetail, OrderHistory, OrderItem, OrderLedger, OrderStatus, PaymentDetails,
    ShippingAddress, TransitionOutcome,
};
pub use pricing::{calculate_order_amount, calculate_order_amount_with, OrderAmount, TaxRate};
pub use product::{CatalogSeed, Currency, Money, Product, ProductLifecycle};
pub use session::{Role, SessionAuthority, SessionClaims, SessionToken};
