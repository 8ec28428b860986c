//! Deterministic in-process payment gateway.
//!
//! Checkouts get sequential codes (`CHK-1`, `TX-1`, ...) and start in gateway
//! status `"1"`. Tests and the CLI drive later status changes through
//! [`SandboxGateway::publish_for_checkout`], which returns the notification code
//! the gateway would post back.

use crate::domain::gateway::{CheckoutRequest, CheckoutResponse, GatewayError, TransactionDetail};
use crate::domain::money::Money;
use crate::domain::ports::PaymentGateway;
use async_trait::async_trait;
use jiff::Timestamp;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

pub const SANDBOX_PAYMENT_URL: &str = "https://sandbox.example/pay";

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxCheckout {
    pub code: String,
    pub transaction_code: String,
    pub request: CheckoutRequest,
}

#[derive(Debug, Default)]
struct SandboxState {
    sequence: u64,
    checkouts: Vec<SandboxCheckout>,
    transactions: HashMap<String, TransactionDetail>,
    notifications: HashMap<String, String>,
    reject_next: Option<String>,
}

impl SandboxState {
    fn next(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

#[derive(Debug, Clone, Default)]
pub struct SandboxGateway {
    state: Arc<RwLock<SandboxState>>,
    latency: Option<Duration>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every checkout call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next checkout come back with this error instead of a code.
    pub async fn reject_next_checkout(&self, error: impl Into<String>) {
        self.state.write().await.reject_next = Some(error.into());
    }

    pub async fn checkouts(&self) -> Vec<SandboxCheckout> {
        self.state.read().await.checkouts.clone()
    }

    pub async fn transaction_for_checkout(&self, checkout_code: &str) -> Option<TransactionDetail> {
        let state = self.state.read().await;
        let checkout = state.checkouts.iter().find(|c| c.code == checkout_code)?;
        state.transactions.get(&checkout.transaction_code).cloned()
    }

    /// Moves the checkout's transaction to `status` and returns a fresh
    /// notification code for it. `None` when the checkout is unknown.
    pub async fn publish_for_checkout(
        &self,
        checkout_code: &str,
        status: &str,
        fee: Option<Money>,
    ) -> Option<String> {
        let mut state = self.state.write().await;
        let transaction_code = state
            .checkouts
            .iter()
            .find(|c| c.code == checkout_code)?
            .transaction_code
            .clone();
        let detail = state.transactions.get_mut(&transaction_code)?;
        detail.status = status.to_string();
        detail.date = Some(Timestamp::now());
        if fee.is_some() {
            detail.fee_amount = fee;
        }
        let code = format!("NOTIF-{}", state.next());
        state.notifications.insert(code.clone(), transaction_code);
        debug!(%code, checkout_code, status, "Published sandbox notification");
        Some(code)
    }
}

fn gross_amount(request: &CheckoutRequest) -> Money {
    let lines: Money = request
        .items
        .iter()
        .filter_map(|line| line.amount.parse::<Money>().ok().map(|unit| unit.times(line.quantity)))
        .sum();
    let extra = request
        .extra_amount
        .as_deref()
        .and_then(|a| a.parse::<Money>().ok())
        .unwrap_or_default();
    lines + extra
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn checkout(&self, request: &CheckoutRequest) -> Result<CheckoutResponse, GatewayError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.write().await;
        if let Some(error) = state.reject_next.take() {
            return Ok(CheckoutResponse {
                code: None,
                payment_url: None,
                errors: vec![error],
            });
        }

        let n = state.next();
        let code = format!("CHK-{n}");
        let transaction_code = format!("TX-{n}");
        state.transactions.insert(
            transaction_code.clone(),
            TransactionDetail {
                code: transaction_code.clone(),
                reference: Some(request.reference.clone()),
                status: "1".to_string(),
                payment_method: Some("sandbox".to_string()),
                gross_amount: Some(gross_amount(request)),
                fee_amount: None,
                date: Some(Timestamp::now()),
            },
        );
        state.checkouts.push(SandboxCheckout {
            code: code.clone(),
            transaction_code,
            request: request.clone(),
        });

        Ok(CheckoutResponse {
            payment_url: Some(format!("{SANDBOX_PAYMENT_URL}/{code}")),
            code: Some(code),
            errors: Vec::new(),
        })
    }

    async fn check_notification(&self, code: &str) -> Result<TransactionDetail, GatewayError> {
        let state = self.state.read().await;
        state
            .notifications
            .get(code)
            .and_then(|tx| state.transactions.get(tx))
            .cloned()
            .ok_or_else(|| GatewayError::UnknownCode(code.to_string()))
    }

    async fn check_transaction(&self, code: &str) -> Result<TransactionDetail, GatewayError> {
        let state = self.state.read().await;
        state
            .transactions
            .get(code)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownCode(code.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gateway::CheckoutLine;
    use rust_decimal_macros::dec;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            reference: "cart-1".into(),
            extra_amount: Some("1.50".into()),
            items: vec![CheckoutLine {
                id: "p1".into(),
                description: "Mug".into(),
                amount: "10.00".into(),
                weight: None,
                quantity: 2,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_checkout_then_notification() {
        let gateway = SandboxGateway::new();
        let response = gateway.checkout(&request()).await.unwrap();
        assert_eq!(response.code.as_deref(), Some("CHK-1"));
        assert_eq!(response.payment_url.as_deref(), Some("https://sandbox.example/pay/CHK-1"));

        let detail = gateway.transaction_for_checkout("CHK-1").await.unwrap();
        assert_eq!(detail.status, "1");
        assert_eq!(detail.gross_amount, Some(Money::new(dec!(21.50))));

        let code = gateway
            .publish_for_checkout("CHK-1", "3", Some(Money::new(dec!(0.99))))
            .await
            .unwrap();
        let detail = gateway.check_notification(&code).await.unwrap();
        assert_eq!(detail.status, "3");
        assert_eq!(detail.reference.as_deref(), Some("cart-1"));
        assert_eq!(detail.fee_amount, Some(Money::new(dec!(0.99))));

        assert_eq!(gateway.check_transaction("TX-1").await.unwrap(), detail);
        assert!(gateway.check_notification("NOTIF-404").await.is_err());
        assert!(gateway.publish_for_checkout("CHK-404", "3", None).await.is_none());
    }

    #[tokio::test]
    async fn test_rejected_checkout() {
        let gateway = SandboxGateway::new();
        gateway.reject_next_checkout("invalid sender email").await;

        let response = gateway.checkout(&request()).await.unwrap();
        assert!(response.code.is_none());
        assert_eq!(response.errors, vec!["invalid sender email".to_string()]);
        assert!(gateway.checkouts().await.is_empty());

        let response = gateway.checkout(&request()).await.unwrap();
        assert!(response.code.is_some());
    }
}
