//! # Order Amounts
//!
//! Server-side subtotal, tax and total computation. Client-supplied totals are
//! never trusted; every order amount is derived here from the snapshot.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{CheckoutError, CheckoutResult};

/// Flat tax rate applied to the order subtotal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxRate(Decimal);

impl TaxRate {
    pub fn new(rate: Decimal) -> CheckoutResult<Self> {
        if rate.is_sign_negative() || rate > Decimal::ONE {
            return Err(CheckoutError::Configuration(format!(
                "tax rate must be within 0..=1, got {rate}"
            )));
        }
        Ok(Self(rate))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl Default for TaxRate {
    /// 10%
    fn default() -> Self {
        Self(Decimal::new(10, 2))
    }
}

impl FromStr for TaxRate {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rate = Decimal::from_str(s.trim())
            .map_err(|e| CheckoutError::Configuration(format!("invalid tax rate {s:?}: {e}")))?;
        Self::new(rate)
    }
}

/// Subtotal, tax and total of an order, in minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAmount {
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
}

/// Derive tax and total from a subtotal using the default rate.
///
/// `tax = round(subtotal × rate)`, `total = subtotal + tax`.
pub fn calculate_order_amount(subtotal: i64) -> CheckoutResult<OrderAmount> {
    calculate_order_amount_with(subtotal, TaxRate::default())
}

/// Derive tax and total from a subtotal.
///
/// Rounds half away from zero, so negated subtotals give negated amounts.
/// Amounts that do not fit in minor units are `InvalidRequest`.
pub fn calculate_order_amount_with(subtotal: i64, rate: TaxRate) -> CheckoutResult<OrderAmount> {
    let out_of_range =
        || CheckoutError::InvalidRequest(format!("order amount out of range: {subtotal}"));

    let tax = Decimal::from(subtotal)
        .checked_mul(rate.value())
        .ok_or_else(out_of_range)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(out_of_range)?;
    let total = subtotal.checked_add(tax).ok_or_else(out_of_range)?;

    Ok(OrderAmount {
        subtotal,
        tax,
        total,
    })
}
