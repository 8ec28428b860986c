//! Links from carts and items to domain objects the cart does not own.
//!
//! A cart or item stores only a [`DomainRef`]. The application layer resolves those
//! links into [`Reference`] objects before calling into the aggregate, so the
//! aggregate itself stays synchronous. Every hook is optional: a collaborator opts
//! into a capability by returning `Some(self)` from the matching `as_*` accessor.

use super::cart::{CartStatus, StatusContext};
use super::item::ItemMatch;
use super::money::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Polymorphic pointer to an object outside the cart (a product, an order, a booking).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainRef {
    pub kind: String,
    pub id: String,
}

impl DomainRef {
    pub const PRODUCT: &'static str = "product";

    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn product(id: impl Into<String>) -> Self {
        Self::new(Self::PRODUCT, id)
    }
}

impl fmt::Display for DomainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Receives cart status changes.
pub trait StatusSettable {
    fn set_status(&self, status: CartStatus, context: &StatusContext);
}

/// Receives the cart tax whenever it changes.
pub trait TaxSettable {
    fn set_tax(&self, tax: Money);
}

/// Keeps external inventory or reservations in sync with removed cart lines.
pub trait ItemRemovable {
    fn remove_item(&self, criteria: &ItemMatch);
}

/// Receives the raw payload of a gateway callback applied to the cart.
pub trait ResponseReceivable {
    fn get_response(&self, payload: &serde_json::Value, source_identifier: &str);
}

/// A product or any other canonical object an item or cart can mirror.
///
/// Attribute getters feed item reconciliation; `None` means "no opinion" and the
/// item keeps whatever it already has.
pub trait Reference: Send + Sync + fmt::Debug {
    fn uid(&self) -> Option<String> {
        None
    }

    fn title(&self) -> Option<String> {
        None
    }

    fn description(&self) -> Option<String> {
        None
    }

    fn absolute_url(&self) -> Option<String> {
        None
    }

    fn unit_value(&self) -> Option<Money> {
        None
    }

    fn weight(&self) -> Option<Decimal> {
        None
    }

    fn dimensions(&self) -> Option<String> {
        None
    }

    fn extra_value(&self) -> Option<Money> {
        None
    }

    /// Checkout steps required by every item created from this object.
    fn pipeline(&self) -> Vec<String> {
        Vec::new()
    }

    fn as_status_settable(&self) -> Option<&dyn StatusSettable> {
        None
    }

    fn as_tax_settable(&self) -> Option<&dyn TaxSettable> {
        None
    }

    fn as_item_removable(&self) -> Option<&dyn ItemRemovable> {
        None
    }

    fn as_response_receivable(&self) -> Option<&dyn ResponseReceivable> {
        None
    }
}

/// References resolved for one cart operation.
#[derive(Debug, Clone, Default)]
pub struct Refs {
    resolved: HashMap<DomainRef, Arc<dyn Reference>>,
}

impl Refs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: DomainRef, reference: Arc<dyn Reference>) {
        self.resolved.insert(key, reference);
    }

    pub fn get(&self, key: Option<&DomainRef>) -> Option<&dyn Reference> {
        key.and_then(|k| self.resolved.get(k)).map(|r| &**r)
    }

    pub fn contains(&self, key: &DomainRef) -> bool {
        self.resolved.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}
