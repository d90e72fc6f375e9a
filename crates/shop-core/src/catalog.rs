//! # Product Catalog
//!
//! Storage port for products and the admin-only catalog management actions.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::{CheckoutError, CheckoutResult};
use crate::product::{parse_price, Currency, Product};
use crate::session::{Role, SessionClaims};

/// Storage port for catalog products
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// A product by id, whatever its lifecycle
    async fn get_product(&self, id: &str) -> CheckoutResult<Option<Product>>;

    /// All active products, ordered by name
    async fn list_active_products(&self) -> CheckoutResult<Vec<Product>>;

    /// Insert a new product; fails if the id is taken
    async fn insert_product(&self, product: Product) -> CheckoutResult<Product>;

    /// Apply a partial update
    async fn update_product(&self, id: &str, update: ProductUpdate) -> CheckoutResult<Product>;

    /// Move a product to `Retired`. Retiring twice keeps the first timestamp.
    async fn retire_product(&self, id: &str) -> CheckoutResult<Product>;
}

/// Admin request to create a product
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Decimal string, e.g. "19.99"
    pub price: String,
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Partial product update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, with = "optional_price")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub image_url: Option<String>,
}

mod optional_price {
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| super::parse_price(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Catalog management actions available to admins
#[derive(Clone)]
pub struct CatalogAdmin {
    catalog: Arc<dyn ProductCatalog>,
    default_currency: Currency,
}

impl CatalogAdmin {
    pub fn new(catalog: Arc<dyn ProductCatalog>, default_currency: Currency) -> Self {
        Self {
            catalog,
            default_currency,
        }
    }

    #[instrument(skip(self, session, request), fields(product_id = %request.id))]
    pub async fn create_product(
        &self,
        session: Option<&SessionClaims>,
        request: NewProduct,
    ) -> CheckoutResult<Product> {
        require_admin(session)?;

        if request.id.trim().is_empty() || request.name.trim().is_empty() {
            return Err(CheckoutError::InvalidRequest(
                "product id and name are required".to_string(),
            ));
        }
        let price = parse_price(&request.price)?;
        let currency = request.currency.unwrap_or(self.default_currency);

        let mut product = Product::new(request.id.trim(), request.name.trim(), price, currency)
            .with_description(request.description);
        product.image_url = request.image_url;

        let product = self.catalog.insert_product(product).await?;
        info!(price = %product.price, "Product created");
        Ok(product)
    }

    #[instrument(skip(self, session, update))]
    pub async fn update_product(
        &self,
        session: Option<&SessionClaims>,
        product_id: &str,
        update: ProductUpdate,
    ) -> CheckoutResult<Product> {
        require_admin(session)?;
        let product = self.catalog.update_product(product_id, update).await?;
        info!(price = %product.price, "Product updated");
        Ok(product)
    }

    #[instrument(skip(self, session))]
    pub async fn retire_product(
        &self,
        session: Option<&SessionClaims>,
        product_id: &str,
    ) -> CheckoutResult<Product> {
        require_admin(session)?;
        let product = self.catalog.retire_product(product_id).await?;
        info!("Product retired");
        Ok(product)
    }
}

fn require_admin(session: Option<&SessionClaims>) -> CheckoutResult<&SessionClaims> {
    let claims = session.ok_or(CheckoutError::Unauthenticated)?;
    if claims.role != Role::Admin {
        return Err(CheckoutError::Forbidden(
            "catalog management requires the admin role".to_string(),
        ));
    }
    Ok(claims)
}
