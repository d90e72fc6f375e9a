//! # Application State
//!
//! Shared state for the Axum application. Every collaborator is built once
//! at startup and injected here; handlers never reach for globals.

use anyhow::Context;
use shop_core::{
    CartService, CartStore, CatalogAdmin, CatalogSeed, CheckoutConfig, CheckoutOrchestrator,
    CheckoutUrls, Currency, IdentityProvider, InMemoryStore, LoggingMailer, Mailer,
    OrderHistory, OrderLedger, PaymentGateway, Product, ProductCatalog, SessionAuthority,
    StaticIdentityProvider, TaxRate, UnpaidPolicy,
};
use shop_stripe::StripeCheckoutGateway;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::identity::SupabaseIdentityProvider;
use crate::mailer::HttpMailer;

/// Application configuration
#[derive(Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Base URL for callbacks
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// HMAC key for session tokens (at least 32 bytes)
    pub session_secret: String,
    pub session_ttl_hours: i64,
    pub tax_rate: TaxRate,
    pub currency: Currency,
    pub unpaid_policy: UnpaidPolicy,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub mail_relay_url: Option<String>,
    pub static_users_file: Option<String>,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let session_secret = env::var("SESSION_SECRET").context("SESSION_SECRET not set")?;

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", 8080)?,
            base_url: env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            session_secret,
            session_ttl_hours: parse_var("SESSION_TTL_HOURS", shop_core::session::DEFAULT_SESSION_TTL_HOURS)?,
            tax_rate: parse_var("TAX_RATE", TaxRate::default())?,
            currency: parse_var("STORE_CURRENCY", Currency::default())?,
            unpaid_policy: parse_var("UNPAID_POLICY", UnpaidPolicy::default())?,
            supabase_url: optional_var("SUPABASE_URL"),
            supabase_anon_key: optional_var("SUPABASE_ANON_KEY"),
            mail_relay_url: optional_var("MAIL_RELAY_URL"),
            static_users_file: optional_var("STATIC_USERS_FILE"),
        })
    }

    /// Configuration for tests and local tooling
    pub fn for_tests(base_url: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            base_url: base_url.into(),
            environment: "test".to_string(),
            session_secret: "test-session-secret-0123456789abcdef".to_string(),
            session_ttl_hours: shop_core::session::DEFAULT_SESSION_TTL_HOURS,
            tax_rate: TaxRate::default(),
            currency: Currency::USD,
            unpaid_policy: UnpaidPolicy::default(),
            supabase_url: None,
            supabase_anon_key: None,
            mail_relay_url: None,
            static_users_file: None,
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid socket address {}:{}", self.host, self.port))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn checkout_config(&self) -> CheckoutConfig {
        CheckoutConfig {
            currency: self.currency,
            tax_rate: self.tax_rate,
            unpaid_policy: self.unpaid_policy,
            urls: CheckoutUrls::new(&self.base_url),
        }
    }

    pub fn session_authority(&self) -> anyhow::Result<SessionAuthority> {
        SessionAuthority::new(
            self.session_secret.as_bytes(),
            chrono::Duration::hours(self.session_ttl_hours),
        )
        .context("Invalid session settings")
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("environment", &self.environment)
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("tax_rate", &self.tax_rate)
            .field("currency", &self.currency)
            .field("unpaid_policy", &self.unpaid_policy)
            .finish_non_exhaustive()
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", name, e)),
        None => Ok(default),
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: SessionAuthority,
    pub identity: Arc<dyn IdentityProvider>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub carts: CartService,
    pub catalog_admin: CatalogAdmin,
    pub orders: OrderHistory,
    pub checkout: CheckoutOrchestrator,
}

impl AppState {
    /// Wire the services from their collaborators
    pub fn new(
        config: AppConfig,
        catalog: Arc<dyn ProductCatalog>,
        carts: Arc<dyn CartStore>,
        ledger: Arc<dyn OrderLedger>,
        gateway: Arc<dyn PaymentGateway>,
        identity: Arc<dyn IdentityProvider>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let sessions = config.session_authority()?;
        let checkout = CheckoutOrchestrator::new(
            carts.clone(),
            ledger.clone(),
            gateway,
            mailer,
            config.checkout_config(),
        );

        Ok(Self {
            sessions,
            identity,
            carts: CartService::new(carts, catalog.clone(), config.currency),
            catalog_admin: CatalogAdmin::new(catalog.clone(), config.currency),
            orders: OrderHistory::new(ledger),
            catalog,
            checkout,
            config: Arc::new(config),
        })
    }

    /// Build the production state from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let store = Arc::new(InMemoryStore::new());
        let seeded = store.seed_products(load_product_catalog()?);
        info!("Seeded {} products", seeded);

        let gateway = StripeCheckoutGateway::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize Stripe: {}", e))?;

        let identity: Arc<dyn IdentityProvider> =
            match (&config.supabase_url, &config.supabase_anon_key) {
                (Some(url), Some(key)) => {
                    info!("Identity provider: supabase");
                    Arc::new(SupabaseIdentityProvider::new(url, key)?)
                }
                _ => {
                    let provider = load_static_users(config.static_users_file.as_deref())?;
                    info!("Identity provider: static ({} users)", provider.len());
                    Arc::new(provider)
                }
            };

        let mailer: Arc<dyn Mailer> = match &config.mail_relay_url {
            Some(url) => Arc::new(HttpMailer::new(url)?),
            None => {
                warn!("MAIL_RELAY_URL not set, emails will only be logged");
                Arc::new(LoggingMailer)
            }
        };

        Self::new(
            config,
            store.clone(),
            store.clone(),
            store,
            Arc::new(gateway),
            identity,
            mailer,
        )
    }
}

/// Load the seed product catalog from config file
fn load_product_catalog() -> anyhow::Result<Vec<Product>> {
    let config_paths = [
        "config/products.toml",
        "../config/products.toml",
        "../../config/products.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let seed = CatalogSeed::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            info!("Loaded {} products from {}", seed.products.len(), path);
            return Ok(seed.products);
        }
    }

    warn!("No product catalog found, starting with an empty catalog");
    Ok(Vec::new())
}

fn load_static_users(path: Option<&str>) -> anyhow::Result<StaticIdentityProvider> {
    let Some(path) = path else {
        warn!("No identity provider configured, nobody can log in");
        return Ok(StaticIdentityProvider::default());
    };

    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    StaticIdentityProvider::from_toml(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))
}
