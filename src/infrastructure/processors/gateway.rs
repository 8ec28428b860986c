//! Processor for redirect-style payment gateways.
//!
//! `validate` builds the checkout request; `process` sends it, keeps the
//! checkout code on the cart and redirects the buyer to the payment page.
//! Gateway status codes map onto cart statuses through [`status_for_code`].

use crate::application::processors::ProcessorContext;
use crate::domain::cart::{Cart, CartStatus};
use crate::domain::gateway::{CheckoutLine, CheckoutRequest, GatewayError, TransactionDetail};
use crate::domain::money::Money;
use crate::domain::ports::{PaymentProcessor, ProcessorBox, SharedGateway};
use crate::domain::processor::ProcessorRecord;
use crate::domain::view::View;
use crate::error::{CartError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

pub const MODULE: &str = "gateway";

/// Keys read from the processor config (merged with the cart's config).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewaySettings {
    pub email: String,
    pub token: String,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub notification_url: Option<String>,
    /// Prepended to the cart reference code sent to the gateway.
    #[serde(default)]
    pub reference_prefix: String,
    /// Overrides the configured gateway timeout for this processor.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

pub fn status_for_code(code: &str) -> Option<CartStatus> {
    Some(match code.trim() {
        "1" => CartStatus::CheckedOut,
        "2" => CartStatus::Analysing,
        "3" => CartStatus::Confirmed,
        "4" => CartStatus::Completed,
        "5" => CartStatus::Refunding,
        "6" => CartStatus::Refunded,
        "7" => CartStatus::Cancelled,
        _ => return None,
    })
}

pub struct GatewayProcessor {
    record: ProcessorRecord,
    settings: GatewaySettings,
    gateway: SharedGateway,
    timeout: Duration,
    request: Option<CheckoutRequest>,
}

impl GatewayProcessor {
    pub fn from_context(context: ProcessorContext, gateway: SharedGateway) -> Result<Self> {
        let settings: GatewaySettings = serde_json::from_value(Value::Object(context.config)).map_err(|e| {
            CartError::ConfigurationError(format!(
                "processor '{}' has an invalid gateway config: {e}",
                context.record.identifier
            ))
        })?;
        let timeout = settings
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(context.timeout);
        Ok(Self {
            record: context.record,
            settings,
            gateway,
            timeout,
            request: None,
        })
    }

    /// Registry constructor bound to one gateway client.
    pub fn factory(gateway: SharedGateway) -> impl Fn(ProcessorContext) -> Result<ProcessorBox> + Send + Sync + 'static {
        move |context| Ok(Box::new(Self::from_context(context, gateway.clone())?) as ProcessorBox)
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// The outbound request for this cart. Lines with a negative total are left out.
    pub fn build_request(&self, cart: &Cart) -> CheckoutRequest {
        let items = cart
            .items
            .iter()
            .filter(|item| item.quantity > 0 && item.total_value >= Money::ZERO)
            .map(|item| {
                let title = item.title.clone().unwrap_or_default();
                let description = match item.description.as_deref().filter(|d| !d.is_empty()) {
                    Some(description) => format!("{title} - {description}"),
                    None => title,
                };
                CheckoutLine {
                    id: item.uid.clone().unwrap_or_default(),
                    description,
                    amount: item.unit_plus_extra().to_cents_string(),
                    weight: item.weight,
                    quantity: item.quantity,
                }
            })
            .collect();

        let reference = cart
            .reference_code
            .clone()
            .unwrap_or_else(|| cart.id.to_string());
        CheckoutRequest {
            reference: format!("{}{reference}", self.settings.reference_prefix),
            sender: cart.sender_data.clone(),
            shipping: cart.shipping_data.clone(),
            extra_amount: cart.extra_costs_total().map(|m| m.to_cents_string()),
            items,
            redirect_url: self.settings.redirect_url.clone(),
            notification_url: self.settings.notification_url.clone(),
        }
    }

    async fn call<T>(&self, call: impl Future<Output = std::result::Result<T, GatewayError>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                let millis = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(processor = %self.record.identifier, millis, "Gateway call timed out");
                Err(GatewayError::Timeout(millis).into())
            }
        }
    }
}

#[async_trait]
impl PaymentProcessor for GatewayProcessor {
    fn record(&self) -> &ProcessorRecord {
        &self.record
    }

    async fn validate(&mut self, cart: &Cart) -> Result<bool> {
        let request = self.build_request(cart);
        if request.items.is_empty() {
            return Ok(false);
        }
        self.request = Some(request);
        Ok(true)
    }

    async fn process(&mut self, cart: &mut Cart) -> Result<View> {
        let request = match self.request.take() {
            Some(request) => request,
            None => self.build_request(cart),
        };
        let response = self.call(self.gateway.checkout(&request)).await?;

        let (Some(code), Some(payment_url)) = (response.code, response.payment_url) else {
            return Err(CartError::ProcessingError(format!(
                "gateway rejected checkout of cart {}: {}",
                cart.id,
                response.errors.join("; ")
            )));
        };

        info!(cart = %cart.id, %code, "Gateway checkout created");
        cart.add_log(format!("gateway checkout {code}"));
        cart.checkout_code = Some(code);
        Ok(View::redirect(payment_url))
    }

    async fn notification(&self, code: &str) -> Result<TransactionDetail> {
        self.call(self.gateway.check_notification(code)).await
    }

    async fn confirmation(&self, transaction_code: &str) -> Result<TransactionDetail> {
        self.call(self.gateway.check_transaction(transaction_code)).await
    }

    fn status_for(&self, gateway_status: &str) -> Option<CartStatus> {
        status_for_code(gateway_status)
    }

    fn reference_prefix(&self) -> &str {
        &self.settings.reference_prefix
    }
}
