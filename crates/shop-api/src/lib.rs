//! # shop-api
//!
//! HTTP API layer for the storefront checkout.
//!
//! This crate provides:
//! - Axum-based HTTP server with cookie sessions
//! - REST endpoints for products, carts, orders and catalog admin
//! - Browser checkout flow (redirects) and the Stripe webhook
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/auth/login` | Log in, set session cookie |
//! | POST | `/auth/logout` | Clear session cookie |
//! | GET | `/auth/session` | Current session |
//! | GET | `/api/v1/products` | List active products |
//! | GET | `/api/v1/products/{id}` | Get product |
//! | GET | `/api/v1/cart` | Active cart |
//! | POST | `/api/v1/cart/items` | Add to cart |
//! | PATCH | `/api/v1/carts/{cart_id}/items/{item_id}` | Update quantity |
//! | DELETE | `/api/v1/carts/{cart_id}/items/{item_id}` | Remove item |
//! | DELETE | `/api/v1/carts/{cart_id}/items` | Clear cart |
//! | GET | `/api/v1/orders` | Order history |
//! | GET | `/api/v1/orders/{id}` | Order detail |
//! | POST | `/api/v1/admin/products` | Create product |
//! | PUT | `/api/v1/admin/products/{id}` | Update product |
//! | DELETE | `/api/v1/admin/products/{id}` | Retire product |
//! | POST | `/checkout` | Start checkout (303) |
//! | GET | `/checkout/complete` | Resolve checkout session (303) |
//! | POST | `/webhook/stripe` | Stripe webhook |

pub mod error;
pub mod handlers;
pub mod identity;
pub mod mailer;
pub mod routes;
pub mod session;
pub mod state;

pub use error::{ApiError, ErrorResponse};
pub use routes::create_router;
pub use state::{AppConfig, AppState};
