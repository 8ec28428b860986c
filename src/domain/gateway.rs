//! Data exchanged with an external payment gateway.
//!
//! The gateway is an opaque client; these types only carry what the core needs.

use super::money::Money;
use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub id: String,
    pub description: String,
    /// Unit amount (value plus extra value) with two decimal places.
    pub amount: String,
    pub weight: Option<Decimal>,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub reference: String,
    pub sender: BTreeMap<String, String>,
    pub shipping: BTreeMap<String, String>,
    pub extra_amount: Option<String>,
    pub items: Vec<CheckoutLine>,
    pub redirect_url: Option<String>,
    pub notification_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub code: Option<String>,
    pub payment_url: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Authoritative state of one gateway transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetail {
    pub code: String,
    pub reference: Option<String>,
    /// Gateway specific status code, e.g. `"3"`.
    pub status: String,
    pub payment_method: Option<String>,
    pub gross_amount: Option<Money>,
    pub fee_amount: Option<Money>,
    pub date: Option<Timestamp>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unknown code '{0}'")]
    UnknownCode(String),
    #[error("timed out after {0} ms")]
    Timeout(u64),
}
