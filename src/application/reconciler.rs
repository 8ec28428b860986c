use super::cart::CartService;
use crate::domain::cart::{Cart, CartId, CartStatus, Payment};
use crate::domain::gateway::TransactionDetail;
use crate::domain::ports::PaymentProcessor;
use crate::domain::processor::ProcessorSelector;
use crate::domain::session::FormArgs;
use crate::domain::view::View;
use crate::error::{CartError, Result};
use jiff::Timestamp;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const CONFIRMATION_TEMPLATE: &str = "cart/confirmation.html";
pub const GENERIC_CONFIRMATION_TEMPLATE: &str = "cart/thank_you.html";

/// Result of applying one gateway transaction to a cart.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub cart_id: CartId,
    pub status: CartStatus,
    pub transaction_code: String,
}

impl fmt::Display for Reconciled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cart {} is {} (transaction {})",
            self.cart_id, self.status, self.transaction_code
        )
    }
}

/// Applies gateway callbacks to carts.
///
/// Both entry points recover every failure locally. A failed lookup never
/// changes a cart.
pub struct PaymentReconciler {
    service: Arc<CartService>,
}

impl PaymentReconciler {
    pub fn new(service: Arc<CartService>) -> Self {
        Self { service }
    }

    /// Handles an asynchronous notification and returns a diagnostic line.
    #[instrument(skip(self))]
    pub async fn notification(&self, processor: &str, code: &str) -> String {
        match self.reconcile_notification(processor, code).await {
            Ok(reconciled) => reconciled.to_string(),
            Err(e) => {
                warn!("Notification not applied: {e}");
                format!("notification {code} not applied: {e}")
            }
        }
    }

    /// Handles the buyer coming back from the gateway with a transaction code.
    #[instrument(skip(self))]
    pub async fn confirmation(&self, processor: &str, transaction_code: Option<&str>) -> View {
        let Some(code) = transaction_code.map(str::trim).filter(|c| !c.is_empty()) else {
            return generic_confirmation(processor);
        };
        match self.reconcile_confirmation(processor, code).await {
            Ok(reconciled) => View::render(
                CONFIRMATION_TEMPLATE,
                json!({
                    "processor": processor,
                    "cart_id": reconciled.cart_id,
                    "status": reconciled.status,
                    "transaction_code": reconciled.transaction_code,
                }),
            ),
            Err(e) => {
                warn!("Confirmation not applied: {e}");
                generic_confirmation(processor)
            }
        }
    }

    async fn reconcile_notification(&self, processor: &str, code: &str) -> Result<Reconciled> {
        let instance = self.instance(processor).await?;
        let detail = instance.notification(code).await?;
        self.apply(instance.as_ref(), &detail).await
    }

    async fn reconcile_confirmation(&self, processor: &str, code: &str) -> Result<Reconciled> {
        let instance = self.instance(processor).await?;
        let detail = instance.confirmation(code).await?;
        self.apply(instance.as_ref(), &detail).await
    }

    async fn instance(&self, identifier: &str) -> Result<Box<dyn PaymentProcessor>> {
        let processors = self.service.processors();
        let record = processors.resolve(ProcessorSelector::from(identifier)).await?;
        processors.instance(&record, None, FormArgs::new())
    }

    /// Maps the transaction onto its cart: status, transaction code, payment
    /// record, fee as tax. Safe to repeat with the same detail.
    pub async fn apply(&self, processor: &dyn PaymentProcessor, detail: &TransactionDetail) -> Result<Reconciled> {
        let reference = detail
            .reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                CartError::ReconciliationError(format!("transaction {} carries no reference", detail.code))
            })?;
        let reference = reference
            .strip_prefix(processor.reference_prefix())
            .unwrap_or(reference);

        let found = self
            .find_cart(reference)
            .await?
            .ok_or_else(|| CartError::ReconciliationError(format!("no cart for reference '{reference}'")))?;

        let _guard = self.service.locks().acquire(found.id).await;
        let mut cart = self.service.carts().get(found.id).await?.unwrap_or(found);
        let refs = self.service.resolve_refs(&cart).await;
        let identifier = processor.record().identifier.as_str();

        let mapped = processor.status_for(&detail.status);
        match mapped {
            None => cart.add_log(format!(
                "gateway status '{}' of transaction {} left the status unchanged",
                detail.status, detail.code
            )),
            Some(next)
                if !self.service.config().allow_terminal_regression
                    && !cart.status.can_transition_to(next) =>
            {
                warn!(cart = %cart.id, from = %cart.status, to = %next, "Ignoring status regression");
                cart.add_log(format!(
                    "ignored gateway status {next} for a {} cart (transaction {})",
                    cart.status, detail.code
                ));
            }
            Some(next) => cart.set_status(next, &refs),
        }

        cart.transaction_code = Some(detail.code.clone());
        record_payment(&mut cart, identifier, detail, mapped);
        if let Some(fee) = detail.fee_amount {
            cart.set_tax_value(fee, &refs);
        }
        if let Some(receiver) = refs
            .get(cart.reference.as_ref())
            .and_then(|r| r.as_response_receivable())
        {
            receiver.get_response(&serde_json::to_value(detail)?, identifier);
        }

        self.service.save(&mut cart, None, &refs).await?;
        info!(cart = %cart.id, status = %cart.status, transaction = %detail.code, "Reconciled gateway transaction");
        Ok(Reconciled {
            cart_id: cart.id,
            status: cart.status,
            transaction_code: detail.code.clone(),
        })
    }

    async fn find_cart(&self, reference: &str) -> Result<Option<Cart>> {
        let carts = self.service.carts();
        if let Some(cart) = carts.find_by_reference_code(reference).await? {
            return Ok(Some(cart));
        }
        match reference.parse::<CartId>() {
            Ok(id) => carts.get(id).await,
            Err(_) => Ok(None),
        }
    }
}

/// Appends a payment unless the same transaction was already recorded with this status.
fn record_payment(cart: &mut Cart, identifier: &str, detail: &TransactionDetail, mapped: Option<CartStatus>) {
    if cart
        .payments
        .iter()
        .any(|p| p.uid == detail.code && p.status == detail.status)
    {
        return;
    }
    let confirmed = matches!(mapped, Some(CartStatus::Confirmed | CartStatus::Completed));
    cart.payments.push(Payment {
        uid: detail.code.clone(),
        payment_system: identifier.to_string(),
        method: detail.payment_method.clone(),
        value: detail.gross_amount,
        extra_value: detail.fee_amount,
        status: detail.status.clone(),
        date: detail.date.unwrap_or_else(Timestamp::now),
        confirmed_at: confirmed.then(Timestamp::now),
    });
}

fn generic_confirmation(processor: &str) -> View {
    View::render(GENERIC_CONFIRMATION_TEMPLATE, json!({ "processor": processor }))
}
