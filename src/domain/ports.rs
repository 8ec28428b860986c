use super::cart::{Cart, CartId, CartStatus};
use super::gateway::{CheckoutRequest, CheckoutResponse, GatewayError, TransactionDetail};
use super::processor::{ProcessorId, ProcessorRecord};
use super::reference::{DomainRef, Reference};
use super::session::{SessionId, SessionState};
use super::view::View;
use crate::error::{CartError, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn store(&self, cart: Cart) -> Result<()>;
    async fn get(&self, id: CartId) -> Result<Option<Cart>>;
    async fn find_by_reference_code(&self, reference_code: &str) -> Result<Option<Cart>>;
    async fn get_all(&self) -> Result<Vec<Cart>>;
}

#[async_trait]
pub trait ProcessorStore: Send + Sync {
    async fn store(&self, processor: ProcessorRecord) -> Result<()>;
    async fn get(&self, id: ProcessorId) -> Result<Option<ProcessorRecord>>;
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<ProcessorRecord>>;
    async fn get_all(&self) -> Result<Vec<ProcessorRecord>>;
}

/// Per-session key-value state. Implementations must isolate sessions from each other.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the default state for sessions never stored.
    async fn load(&self, session: &SessionId) -> Result<SessionState>;
    async fn store(&self, session: &SessionId, state: SessionState) -> Result<()>;
}

/// Loads products and other referenced domain objects.
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    async fn resolve(&self, key: &DomainRef) -> Result<Option<Arc<dyn Reference>>>;
}

/// Opaque client of an external payment gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn checkout(&self, request: &CheckoutRequest) -> std::result::Result<CheckoutResponse, GatewayError>;
    /// Resolves the code sent by an asynchronous notification into a transaction.
    async fn check_notification(&self, code: &str) -> std::result::Result<TransactionDetail, GatewayError>;
    async fn check_transaction(&self, code: &str) -> std::result::Result<TransactionDetail, GatewayError>;
}

/// A processor record turned into a runtime instance.
///
/// `validate` and `process` run during checkout. `notification` and `confirmation`
/// serve gateway callbacks and run independently of any checkout.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// The persisted record this instance was built from.
    fn record(&self) -> &ProcessorRecord;

    /// Checks the cart and prepares the outbound request. Must not touch the cart.
    async fn validate(&mut self, cart: &Cart) -> Result<bool>;

    /// Performs the external call. May store codes on the cart.
    async fn process(&mut self, cart: &mut Cart) -> Result<View>;

    async fn notification(&self, code: &str) -> Result<TransactionDetail> {
        Err(CartError::ReconciliationError(format!(
            "processor '{}' does not handle notifications (code {code})",
            self.record().identifier
        )))
    }

    async fn confirmation(&self, transaction_code: &str) -> Result<TransactionDetail> {
        Err(CartError::ReconciliationError(format!(
            "processor '{}' does not handle confirmations (transaction {transaction_code})",
            self.record().identifier
        )))
    }

    /// Maps a gateway status code onto the cart vocabulary.
    fn status_for(&self, _gateway_status: &str) -> Option<CartStatus> {
        None
    }

    /// Prefix prepended to cart references sent to the gateway.
    fn reference_prefix(&self) -> &str {
        ""
    }
}

pub type SharedCartStore = Arc<dyn CartStore>;
pub type SharedProcessorStore = Arc<dyn ProcessorStore>;
pub type SharedSessionStore = Arc<dyn SessionStore>;
pub type SharedResolver = Arc<dyn ReferenceResolver>;
pub type SharedGateway = Arc<dyn PaymentGateway>;
pub type ProcessorBox = Box<dyn PaymentProcessor>;
