//! # Storefront
//!
//! Checkout server: sessions, carts, orders and Stripe payments.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export SESSION_SECRET=$(openssl rand -hex 32)
//! export STRIPE_SECRET_KEY=sk_test_...
//! export STRIPE_PUBLISHABLE_KEY=pk_test_...
//! export STRIPE_WEBHOOK_SECRET=whsec_...
//!
//! # Run the server
//! storefront
//! ```

use shop_api::{routes, state::AppState};
use shop_stripe::HANDLED_WEBHOOK_EVENTS;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // Print banner
    print_banner();

    // Initialize application state
    let state = AppState::from_env()?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!(
        "Store currency: {}, unpaid policy: {:?}",
        state.config.currency, state.config.unpaid_policy
    );
    info!("Payment provider: {}", state.checkout.gateway().provider_name());

    // Create router
    let app = routes::create_router(state);

    info!("Storefront starting on http://{}", addr);

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Checkout: POST http://{}/checkout", addr);
        info!("Webhook: POST http://{}/webhook/stripe", addr);
        info!("Webhook events to enable: {}", HANDLED_WEBHOOK_EVENTS.join(", "));
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Storefront stopped");
    Ok(())
}

/// `LOG_FORMAT=json` switches to structured JSON logs
fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn print_banner() {
    println!(
        r#"
  Storefront
  ━━━━━━━━━━━━━━━━━━━━━━━
  Checkout server
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
