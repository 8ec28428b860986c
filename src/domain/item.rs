use super::money::Money;
use super::reference::{DomainRef, Reference, Refs};
use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Attributes an existing item accepts from `set_item` unless told otherwise.
pub const DEFAULT_ALLOWED_TO_SET: &[&str] = &["quantity"];

/// One line of a cart.
///
/// Descriptive fields are a lazy snapshot of `reference`/`product`: they are only
/// filled while unset, so anything set explicitly wins over the canonical object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub product: Option<DomainRef>,
    /// Customised product. Takes precedence over `product` during reconciliation.
    pub reference: Option<DomainRef>,
    pub uid: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub quantity: u32,
    pub unit_value: Option<Money>,
    /// Last computed `(unit_value + extra_value) * quantity`.
    pub total_value: Money,
    pub weight: Option<Decimal>,
    pub dimensions: Option<String>,
    pub extra_value: Option<Money>,
    pub allowed_to_set: Vec<String>,
    pub pipeline: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Item {
    /// Creates a line backed by a canonical product.
    pub fn from_product(uid: String, product: DomainRef, quantity: u32) -> Self {
        let now = Timestamp::now();
        Self {
            product: Some(product),
            reference: None,
            uid: Some(uid),
            title: None,
            description: None,
            link: None,
            quantity,
            unit_value: None,
            total_value: Money::ZERO,
            weight: None,
            dimensions: None,
            extra_value: None,
            allowed_to_set: DEFAULT_ALLOWED_TO_SET
                .iter()
                .map(|s| s.to_string())
                .collect(),
            pipeline: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fills unset attributes from `reference` first, then from `product`.
    pub fn reconcile(&mut self, refs: &Refs) {
        let sources = [
            refs.get(self.reference.as_ref()),
            refs.get(self.product.as_ref()),
        ];
        for source in sources.into_iter().flatten() {
            self.fill_from(source);
        }
    }

    fn fill_from(&mut self, source: &dyn Reference) {
        fill(&mut self.title, || source.title());
        fill(&mut self.description, || source.description());
        fill(&mut self.link, || source.absolute_url());
        fill(&mut self.unit_value, || source.unit_value());
        fill(&mut self.weight, || source.weight());
        fill(&mut self.dimensions, || source.dimensions());
        fill(&mut self.extra_value, || source.extra_value());
        fill(&mut self.uid, || source.uid());
    }

    pub fn unit_plus_extra(&self) -> Money {
        self.unit_value.unwrap_or_default() + self.extra_value.unwrap_or_default()
    }

    /// Total from the fields currently on the item, without reconciliation.
    pub fn computed_total(&self) -> Money {
        self.unit_plus_extra().times(self.quantity)
    }

    /// Reconciles the snapshot, then recomputes and stores `total_value`.
    ///
    /// Never fails: missing values count as zero.
    pub fn total(&mut self, refs: &Refs) -> Money {
        self.reconcile(refs);
        self.total_value = self.computed_total();
        self.total_value
    }

    /// Applies the fields listed in `allowed_to_set`. Returns the names that changed.
    pub fn apply(&mut self, fields: &ItemFields) -> Vec<&'static str> {
        let mut changed = Vec::new();
        let allowed = |name: &str| self.allowed_to_set.iter().any(|a| a == name);

        let quantity = fields.quantity.filter(|_| allowed("quantity"));
        let title = fields.title.clone().filter(|_| allowed("title"));
        let description = fields.description.clone().filter(|_| allowed("description"));
        let link = fields.link.clone().filter(|_| allowed("link"));
        let unit_value = fields.unit_value.filter(|_| allowed("unit_value"));
        let weight = fields.weight.filter(|_| allowed("weight"));
        let dimensions = fields.dimensions.clone().filter(|_| allowed("dimensions"));
        let extra_value = fields.extra_value.filter(|_| allowed("extra_value"));

        if let Some(q) = quantity {
            self.quantity = q;
            changed.push("quantity");
        }
        if title.is_some() {
            self.title = title;
            changed.push("title");
        }
        if description.is_some() {
            self.description = description;
            changed.push("description");
        }
        if link.is_some() {
            self.link = link;
            changed.push("link");
        }
        if unit_value.is_some() {
            self.unit_value = unit_value;
            changed.push("unit_value");
        }
        if weight.is_some() {
            self.weight = weight;
            changed.push("weight");
        }
        if dimensions.is_some() {
            self.dimensions = dimensions;
            changed.push("dimensions");
        }
        if extra_value.is_some() {
            self.extra_value = extra_value;
            changed.push("extra_value");
        }
        if !changed.is_empty() {
            self.updated_at = Timestamp::now();
        }
        changed
    }

    pub fn matches(&self, criteria: &ItemMatch) -> bool {
        if criteria.is_empty() {
            return false;
        }
        criteria.uid.as_ref().is_none_or(|uid| self.uid.as_ref() == Some(uid))
            && criteria
                .product
                .as_ref()
                .is_none_or(|p| self.product.as_ref() == Some(p))
    }
}

fn fill<T>(slot: &mut Option<T>, value: impl FnOnce() -> Option<T>) {
    if slot.is_none() {
        *slot = value();
    }
}

/// Input of `set_item`, as submitted by the front end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemFields {
    pub uid: Option<String>,
    /// Catalog id of the product backing the line.
    pub product: Option<String>,
    pub quantity: Option<u32>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub unit_value: Option<Money>,
    pub weight: Option<Decimal>,
    pub dimensions: Option<String>,
    pub extra_value: Option<Money>,
}

impl ItemFields {
    pub fn for_product(product: impl Into<String>, quantity: u32) -> Self {
        Self {
            product: Some(product.into()),
            quantity: Some(quantity),
            ..Self::default()
        }
    }

    pub fn for_uid(uid: impl Into<String>, quantity: u32) -> Self {
        Self {
            uid: Some(uid.into()),
            quantity: Some(quantity),
            ..Self::default()
        }
    }
}

/// Selects items to remove. Every set field must match; an empty match selects nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMatch {
    pub uid: Option<String>,
    pub product: Option<DomainRef>,
}

impl ItemMatch {
    pub fn by_uid(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            product: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.uid.is_none() && self.product.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Product {
        uid: Option<String>,
        title: Option<String>,
        unit_value: Option<Money>,
        extra_value: Option<Money>,
    }

    impl Reference for Product {
        fn uid(&self) -> Option<String> {
            self.uid.clone()
        }
        fn title(&self) -> Option<String> {
            self.title.clone()
        }
        fn unit_value(&self) -> Option<Money> {
            self.unit_value
        }
        fn extra_value(&self) -> Option<Money> {
            self.extra_value
        }
    }

    fn refs_with(key: DomainRef, product: Product) -> Refs {
        let mut refs = Refs::new();
        refs.insert(key, Arc::new(product));
        refs
    }

    #[test]
    fn test_total_pulls_unit_value_from_product() {
        let key = DomainRef::product("p1");
        let refs = refs_with(
            key.clone(),
            Product {
                unit_value: Some(Money::new(dec!(10))),
                extra_value: Some(Money::new(dec!(1.5))),
                title: Some("Mug".into()),
                ..Default::default()
            },
        );
        let mut item = Item::from_product("p1".into(), key, 2);

        assert_eq!(item.total(&refs), Money::new(dec!(23.0)));
        assert_eq!(item.total_value, Money::new(dec!(23.0)));
        assert_eq!(item.title.as_deref(), Some("Mug"));
    }

    #[test]
    fn test_explicit_fields_win_over_reference() {
        let key = DomainRef::product("p1");
        let refs = refs_with(
            key.clone(),
            Product {
                unit_value: Some(Money::new(dec!(10))),
                title: Some("Mug".into()),
                ..Default::default()
            },
        );
        let mut item = Item::from_product("p1".into(), key, 1);
        item.title = Some("Custom mug".into());
        item.unit_value = Some(Money::new(dec!(7)));

        assert_eq!(item.total(&refs), Money::new(dec!(7)));
        assert_eq!(item.title.as_deref(), Some("Custom mug"));
    }

    #[test]
    fn test_reference_takes_precedence_over_product() {
        let product_key = DomainRef::product("p1");
        let custom_key = DomainRef::new("engraving", "e1");
        let mut refs = refs_with(
            product_key.clone(),
            Product {
                unit_value: Some(Money::new(dec!(10))),
                ..Default::default()
            },
        );
        refs.insert(
            custom_key.clone(),
            Arc::new(Product {
                unit_value: Some(Money::new(dec!(12))),
                ..Default::default()
            }),
        );
        let mut item = Item::from_product("p1".into(), product_key, 1);
        item.reference = Some(custom_key);

        assert_eq!(item.total(&refs), Money::new(dec!(12)));
    }

    #[test]
    fn test_total_with_unresolvable_references_is_degenerate() {
        let mut item = Item::from_product("p1".into(), DomainRef::product("gone"), 3);
        assert_eq!(item.total(&Refs::new()), Money::ZERO);
        assert_eq!(item.uid.as_deref(), Some("p1"));
    }

    #[test]
    fn test_apply_respects_allow_list() {
        let mut item = Item::from_product("p1".into(), DomainRef::product("p1"), 1);
        let fields = ItemFields {
            quantity: Some(4),
            unit_value: Some(Money::new(dec!(0.01))),
            title: Some("Free".into()),
            ..Default::default()
        };

        let changed = item.apply(&fields);
        assert_eq!(changed, vec!["quantity"]);
        assert_eq!(item.quantity, 4);
        assert_eq!(item.unit_value, None);
        assert_eq!(item.title, None);
    }

    #[test]
    fn test_matches() {
        let item = Item::from_product("p1".into(), DomainRef::product("p1"), 1);
        assert!(item.matches(&ItemMatch::by_uid("p1")));
        assert!(!item.matches(&ItemMatch::by_uid("p2")));
        assert!(!item.matches(&ItemMatch::default()));
        assert!(item.matches(&ItemMatch {
            uid: Some("p1".into()),
            product: Some(DomainRef::product("p1")),
        }));
    }
}
