use super::item::{Item, ItemFields, ItemMatch};
use super::money::Money;
use super::processor::{ProcessorId, ProcessorRecord};
use super::reference::{DomainRef, Reference, Refs};
use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

/// Registry key of the step every checkout pipeline starts with.
pub const START_STEP: &str = "start";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartId(pub Uuid);

impl CartId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CartId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CartId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    /// Not checked out yet.
    #[default]
    Pending,
    /// Handed to the payment gateway, payment not confirmed.
    CheckedOut,
    Analysing,
    Confirmed,
    /// Money released.
    Completed,
    Refunding,
    Refunded,
    Cancelled,
    /// Long time without updates. Set outside this crate.
    Abandoned,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CheckedOut => "checked_out",
            Self::Analysing => "analysing",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Refunding => "refunding",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Refunded | Self::Cancelled | Self::Abandoned
        )
    }

    /// Whether a gateway callback may move a cart from `self` to `next`.
    ///
    /// Terminal statuses only accept themselves, except that a completed payment
    /// can still be refunded.
    pub fn can_transition_to(&self, next: CartStatus) -> bool {
        if *self == next || !self.is_terminal() {
            return true;
        }
        *self == Self::Completed && matches!(next, Self::Refunding | Self::Refunded)
    }
}

impl fmt::Display for CartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CartStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "pending" => Self::Pending,
            "checked_out" => Self::CheckedOut,
            "analysing" => Self::Analysing,
            "confirmed" => Self::Confirmed,
            "completed" => Self::Completed,
            "refunding" => Self::Refunding,
            "refunded" => Self::Refunded,
            "cancelled" => Self::Cancelled,
            "abandoned" => Self::Abandoned,
            other => return Err(format!("unknown cart status '{other}'")),
        })
    }
}

/// Passed along with every status change fanned out to references.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusContext {
    pub cart_id: CartId,
    pub reference_code: Option<String>,
    pub transaction_code: Option<String>,
    pub total: Money,
}

/// The user a cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
        }
    }
}

/// One settlement event reported by a gateway. Never modified once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub uid: String,
    pub payment_system: String,
    pub method: Option<String>,
    pub value: Option<Money>,
    pub extra_value: Option<Money>,
    pub status: String,
    pub date: Timestamp,
    pub confirmed_at: Option<Timestamp>,
}

/// The aggregate root of one shopping session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub belongs_to: Option<Actor>,
    pub items: Vec<Item>,
    pub payments: Vec<Payment>,
    pub status: CartStatus,
    /// Sum of item totals as of the last [`Cart::refresh`].
    pub total: Money,
    pub tax: Money,
    pub extra_costs: BTreeMap<String, Money>,
    pub sender_data: BTreeMap<String, String>,
    pub shipping_data: BTreeMap<String, String>,
    pub shipping_cost: Money,
    pub processor: Option<ProcessorId>,
    pub reference_code: Option<String>,
    pub checkout_code: Option<String>,
    pub transaction_code: Option<String>,
    pub requires_login: bool,
    pub continue_shopping_url: String,
    /// Cart specific checkout steps.
    pub pipeline: Vec<String>,
    pub log: Vec<String>,
    /// Overrides merged over the processor config when an instance is built.
    pub config: serde_json::Map<String, serde_json::Value>,
    pub reference: Option<DomainRef>,
    pub search_helper: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Cart {
    pub fn new(requires_login: bool, continue_shopping_url: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id: CartId::new(),
            belongs_to: None,
            items: Vec::new(),
            payments: Vec::new(),
            status: CartStatus::Pending,
            total: Money::ZERO,
            tax: Money::ZERO,
            extra_costs: BTreeMap::new(),
            sender_data: BTreeMap::new(),
            shipping_data: BTreeMap::new(),
            shipping_cost: Money::ZERO,
            processor: None,
            reference_code: None,
            checkout_code: None,
            transaction_code: None,
            requires_login,
            continue_shopping_url: continue_shopping_url.into(),
            pipeline: Vec::new(),
            log: Vec::new(),
            config: serde_json::Map::new(),
            reference: None,
            search_helper: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a timestamped entry to the cart history.
    pub fn add_log(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        debug!(cart = %self.id, "{msg}");
        self.log.push(format!("{},{}", Timestamp::now(), msg));
    }

    /// External identifier: the reference's uid when it has one, the cart id otherwise.
    pub fn get_uid(&self, refs: &Refs) -> String {
        refs.get(self.reference.as_ref())
            .and_then(|r| r.uid())
            .filter(|uid| !uid.is_empty())
            .unwrap_or_else(|| self.id.to_string())
    }

    pub fn extra_costs_total(&self) -> Option<Money> {
        if self.extra_costs.is_empty() {
            None
        } else {
            Some(self.extra_costs.values().copied().sum())
        }
    }

    pub fn get_item(&self, uid: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.uid.as_deref() == Some(uid))
    }

    /// Creates or updates the line identified by the fields' uid.
    ///
    /// The product named in `fields.product` must already be resolved into `refs`
    /// under [`DomainRef::product`]; an unresolved product counts as absent. New lines
    /// are only created for a product. Existing lines only take attributes from
    /// their allow-list, and end up removed when their quantity drops to zero.
    /// The caller is expected to refresh and store the cart afterwards.
    pub fn set_item(&mut self, fields: &ItemFields, refs: &Refs) -> Option<Item> {
        let product_key = fields
            .product
            .as_ref()
            .map(DomainRef::product)
            .filter(|key| refs.contains(key));
        let product = refs.get(product_key.as_ref());

        let Some(uid) = fields.uid.clone().or_else(|| product.and_then(|p| p.uid())) else {
            warn!(cart = %self.id, ?fields, "Cannot set an item without an uid");
            return None;
        };

        match self.items.iter().position(|i| i.uid.as_deref() == Some(&uid)) {
            None => {
                let (Some(key), Some(product)) = (product_key, product) else {
                    debug!(cart = %self.id, %uid, "Refusing to create an item without a product");
                    return None;
                };
                let quantity = fields.quantity.unwrap_or(1);
                if quantity == 0 {
                    return None;
                }
                let mut item = Item::from_product(uid, key, quantity);
                item.pipeline = product.pipeline();
                item.total(refs);
                self.items.push(item.clone());
                Some(item)
            }
            Some(index) => {
                let item = &mut self.items[index];
                item.apply(fields);
                if item.quantity == 0 {
                    self.remove_items(&ItemMatch::by_uid(uid), refs);
                    return None;
                }
                item.total(refs);
                Some(item.clone())
            }
        }
    }

    /// Deletes matching lines and tells the reference about it. Returns how many went.
    pub fn remove_items(&mut self, criteria: &ItemMatch, refs: &Refs) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !item.matches(criteria));
        let removed = before - self.items.len();
        if removed > 0
            && let Some(removable) = refs
                .get(self.reference.as_ref())
                .and_then(|r| r.as_item_removable())
        {
            removable.remove_item(criteria);
        }
        removed
    }

    /// Sets the status and mirrors it onto the reference and every item.
    pub fn set_status(&mut self, status: CartStatus, refs: &Refs) {
        if self.status != status {
            self.add_log(format!("status {} -> {}", self.status, status));
        }
        self.status = status;
        self.propagate_status(refs);
    }

    fn propagate_status(&self, refs: &Refs) {
        let context = StatusContext {
            cart_id: self.id,
            reference_code: self.reference_code.clone(),
            transaction_code: self.transaction_code.clone(),
            total: self.total,
        };
        for target in self.hook_targets(refs) {
            if let Some(settable) = target.as_status_settable() {
                settable.set_status(self.status, &context);
            }
        }
    }

    /// Parses and stores the tax, mirroring it like a status change.
    ///
    /// A value that does not parse is logged on the cart and otherwise ignored.
    pub fn set_tax(&mut self, raw: &str, refs: &Refs) -> bool {
        let tax = match raw.parse::<Money>() {
            Ok(tax) => tax,
            Err(e) => {
                warn!(cart = %self.id, raw, "Invalid tax value: {e}");
                self.add_log(format!("invalid tax value '{raw}': {e}"));
                return false;
            }
        };
        self.set_tax_value(tax, refs);
        true
    }

    /// Stores the tax as given and mirrors it onto the reference and every item.
    pub fn set_tax_value(&mut self, tax: Money, refs: &Refs) {
        self.tax = tax;
        for target in self.hook_targets(refs) {
            if let Some(settable) = target.as_tax_settable() {
                settable.set_tax(tax);
            }
        }
    }

    /// The cart reference followed by each item's reference (or product).
    fn hook_targets<'a>(&self, refs: &'a Refs) -> Vec<&'a dyn Reference> {
        let mut targets: Vec<&'a dyn Reference> = Vec::new();
        targets.extend(refs.get(self.reference.as_ref()));
        for item in &self.items {
            targets.extend(
                refs.get(item.reference.as_ref())
                    .or_else(|| refs.get(item.product.as_ref())),
            );
        }
        targets
    }

    /// Recomputes every derived field. Runs before each store of the cart.
    ///
    /// Also re-propagates the current status, which is how references catch up
    /// with changes made while they were unreachable.
    pub fn refresh(&mut self, actor: Option<&Actor>, refs: &Refs) {
        self.total = self.items.iter_mut().map(|item| item.total(refs)).sum();
        if self.belongs_to.is_none() {
            self.belongs_to = actor.cloned();
        }
        if self.reference_code.is_none() {
            self.reference_code = Some(self.get_uid(refs));
        }
        self.search_helper = self.belongs_to.as_ref().map_or_else(String::new, |owner| {
            [Some(owner.id.as_str()), owner.name.as_deref(), owner.email.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase()
        });
        self.propagate_status(refs);
        self.updated_at = Timestamp::now();
    }

    /// Checkout steps in execution order: start, global, items, cart, processor.
    pub fn build_pipeline(&self, global: &[String], processor: Option<&ProcessorRecord>) -> Vec<String> {
        let mut steps = vec![START_STEP.to_string()];
        steps.extend(global.iter().cloned());
        steps.extend(self.items.iter().flat_map(|i| i.pipeline.iter().cloned()));
        steps.extend(self.pipeline.iter().cloned());
        if let Some(processor) = processor {
            steps.extend(processor.pipeline.iter().cloned());
        }
        steps
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn quantity_total(&self) -> Decimal {
        self.items.iter().map(|i| Decimal::from(i.quantity)).sum()
    }
}
