//! # Product Types
//!
//! Catalog types for the storefront.
//! Prices are decimal strings on the product and minor-unit integers everywhere else.
//! The seed catalog is loaded from `config/products.toml`.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::CheckoutError;

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CAD,
    AUD,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::USD => "usd",
            Currency::EUR => "eur",
            Currency::GBP => "gbp",
            Currency::JPY => "jpy",
            Currency::CAD => "cad",
            Currency::AUD => "aud",
        }
    }

    /// Returns the number of decimal places for this currency
    /// (JPY has 0 decimals, the others have 2)
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Convert a decimal amount to the smallest currency unit (cents, etc.)
    ///
    /// Returns `None` if the amount does not fit in an `i64`.
    pub fn to_minor_units(&self, amount: Decimal) -> Option<i64> {
        let scale = Decimal::from(10_i64.pow(self.decimal_places()));
        amount
            .checked_mul(scale)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }

    /// Convert from smallest unit back to a decimal
    pub fn from_minor_units(&self, amount: i64) -> Decimal {
        Decimal::new(amount, self.decimal_places())
    }

    fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::JPY => "¥",
            Currency::CAD => "C$",
            Currency::AUD => "A$",
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::USD
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

impl FromStr for Currency {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "usd" => Ok(Currency::USD),
            "eur" => Ok(Currency::EUR),
            "gbp" => Ok(Currency::GBP),
            "jpy" => Ok(Currency::JPY),
            "cad" => Ok(Currency::CAD),
            "aud" => Ok(Currency::AUD),
            other => Err(CheckoutError::InvalidRequest(format!(
                "unsupported currency: {other}"
            ))),
        }
    }
}

/// An amount in the smallest currency unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in smallest currency unit (cents for USD)
    pub amount: i64,
    /// Currency
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Format for display (e.g., "$10.00")
    pub fn display(&self) -> String {
        let sign = if self.amount < 0 { "-" } else { "" };
        let value = self.currency.from_minor_units(self.amount.abs());
        format!("{}{}{}", sign, self.currency.symbol(), value)
    }
}

/// Lifecycle of a catalog product.
///
/// Retired products stay resolvable so cart lines and order history can still
/// show them, but they can no longer be purchased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProductLifecycle {
    #[default]
    Active,
    Retired { retired_at: DateTime<Utc> },
}

/// A product in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Unique product identifier (e.g., "linen-shirt-blue")
    pub id: String,

    /// Display name
    pub name: String,

    /// Short description
    #[serde(default)]
    pub description: String,

    /// Unit price as a decimal in major units (serialized as a string)
    pub price: Decimal,

    /// Currency of `price`
    #[serde(default)]
    pub currency: Currency,

    /// Optional image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default)]
    pub lifecycle: ProductLifecycle,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Create a new active product
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        price: Decimal,
        currency: Currency,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            price,
            currency,
            image_url: None,
            lifecycle: ProductLifecycle::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: set description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: set image URL
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn is_active(&self) -> bool {
        matches!(self.lifecycle, ProductLifecycle::Active)
    }

    /// Unit price in minor units
    pub fn unit_amount(&self) -> Result<i64, CheckoutError> {
        self.currency.to_minor_units(self.price).ok_or_else(|| {
            CheckoutError::InvalidRequest(format!("price out of range for {}", self.id))
        })
    }

    /// Unit price as [`Money`]
    pub fn unit_price(&self) -> Result<Money, CheckoutError> {
        Ok(Money::new(self.unit_amount()?, self.currency))
    }
}

/// Parse and validate a decimal price string.
pub fn parse_price(raw: &str) -> Result<Decimal, CheckoutError> {
    let price = Decimal::from_str(raw.trim())
        .map_err(|e| CheckoutError::InvalidRequest(format!("invalid price {raw:?}: {e}")))?;
    if price.is_sign_negative() {
        return Err(CheckoutError::InvalidRequest(format!(
            "price must not be negative: {raw}"
        )));
    }
    Ok(price)
}

/// Seed catalog (loaded from config)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub products: Vec<Product>,
}

impl CatalogSeed {
    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_conversion() {
        let usd = Currency::USD;
        assert_eq!(usd.to_minor_units(Decimal::from_str("10.99").unwrap()), Some(1099));
        assert_eq!(usd.to_minor_units(Decimal::from_str("0.005").unwrap()), Some(1));
        assert_eq!(usd.from_minor_units(1099).to_string(), "10.99");

        let jpy = Currency::JPY;
        assert_eq!(jpy.to_minor_units(Decimal::from(1000)), Some(1000));
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::new(2999, Currency::USD).display(), "$29.99");
        assert_eq!(Money::new(1999, Currency::EUR).display(), "€19.99");
        assert_eq!(Money::new(-150, Currency::USD).display(), "-$1.50");
        assert_eq!(Money::new(500, Currency::JPY).display(), "¥500");
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!("USD".parse::<Currency>().unwrap(), Currency::USD);
        assert_eq!("gbp".parse::<Currency>().unwrap(), Currency::GBP);
        assert!("xyz".parse::<Currency>().is_err());
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(" 12.50 ").unwrap(), Decimal::from_str("12.50").unwrap());
        assert!(parse_price("-1").is_err());
        assert!(parse_price("twelve").is_err());
    }

    #[test]
    fn test_seed_from_toml() {
        let seed = CatalogSeed::from_toml(
            r#"
            [[products]]
            id = "linen-shirt"
            name = "Linen Shirt"
            price = "49.90"

            [[products]]
            id = "wool-socks"
            name = "Wool Socks"
            price = "12.00"
            currency = "eur"
            "#,
        )
        .unwrap();

        assert_eq!(seed.products.len(), 2);
        let shirt = &seed.products[0];
        assert!(shirt.is_active());
        assert_eq!(shirt.currency, Currency::USD);
        assert_eq!(shirt.unit_amount().unwrap(), 4990);
        assert_eq!(seed.products[1].currency, Currency::EUR);
    }
}
