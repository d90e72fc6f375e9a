//! # Routes
//!
//! Axum router configuration for the storefront.

use crate::handlers;
use crate::session::refresh_session;
use crate::state::AppState;
use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Auth:
///   - POST /auth/login, POST /auth/logout, GET /auth/session
///
/// - API v1:
///   - GET  /api/v1/products, GET /api/v1/products/{id}
///   - GET  /api/v1/cart, POST /api/v1/cart/items
///   - PATCH/DELETE /api/v1/carts/{cart_id}/items/{item_id}
///   - DELETE /api/v1/carts/{cart_id}/items
///   - GET  /api/v1/orders, GET /api/v1/orders/{id}
///   - POST /api/v1/admin/products, PUT/DELETE /api/v1/admin/products/{id}
///
/// - Checkout (browser, redirects):
///   - POST /checkout
///   - GET  /checkout/complete?session_id=...
///   - GET  /checkout/success, /checkout/cancel, /checkout/error
///
/// - Webhooks:
///   - POST /webhook/stripe
pub fn create_router(state: AppState) -> Router {
    // CORS applies to the JSON API only
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/session", get(handlers::current_session));

    let admin_routes = Router::new()
        .route("/products", post(handlers::admin_create_product))
        .route(
            "/products/{product_id}",
            put(handlers::admin_update_product).delete(handlers::admin_retire_product),
        );

    let api_routes = Router::new()
        // Products
        .route("/products", get(handlers::list_products))
        .route("/products/{product_id}", get(handlers::get_product))
        // Cart
        .route("/cart", get(handlers::get_cart))
        .route("/cart/items", post(handlers::add_cart_item))
        .route(
            "/carts/{cart_id}/items/{item_id}",
            patch(handlers::update_cart_item).delete(handlers::remove_cart_item),
        )
        .route("/carts/{cart_id}/items", delete(handlers::clear_cart))
        // Orders
        .route("/orders", get(handlers::list_orders))
        .route("/orders/{order_id}", get(handlers::get_order))
        .nest("/admin", admin_routes)
        .layer(cors);

    // Webhook routes (no CORS, must accept raw body)
    let webhook_routes = Router::new().route("/stripe", post(handlers::stripe_webhook));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/auth", auth_routes)
        // Browser checkout flow
        .route("/checkout", post(handlers::start_checkout))
        .route("/checkout/complete", get(handlers::complete_checkout))
        .route("/checkout/success", get(handlers::checkout_success))
        .route("/checkout/cancel", get(handlers::checkout_cancel))
        .route("/checkout/error", get(handlers::checkout_error))
        .nest("/api/v1", api_routes)
        .nest("/webhook", webhook_routes)
        // Middleware (tracing outermost)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn_with_state(state.clone(), refresh_session)),
        )
        // State
        .with_state(state)
}
