use crate::domain::cart::{Cart, CartId};
use crate::domain::money::Money;
use crate::domain::ports::{CartStore, ProcessorStore, ReferenceResolver, SessionStore};
use crate::domain::processor::{ProcessorId, ProcessorRecord};
use crate::domain::reference::{DomainRef, Reference};
use crate::domain::session::{SessionId, SessionState};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for carts.
///
/// Uses `Arc<RwLock<HashMap<CartId, Cart>>>` so clones share the same carts.
#[derive(Default, Clone)]
pub struct InMemoryCartStore {
    carts: Arc<RwLock<HashMap<CartId, Cart>>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn store(&self, cart: Cart) -> Result<()> {
        let mut carts = self.carts.write().await;
        carts.insert(cart.id, cart);
        Ok(())
    }

    async fn get(&self, id: CartId) -> Result<Option<Cart>> {
        let carts = self.carts.read().await;
        Ok(carts.get(&id).cloned())
    }

    async fn find_by_reference_code(&self, reference_code: &str) -> Result<Option<Cart>> {
        let carts = self.carts.read().await;
        Ok(carts
            .values()
            .find(|c| c.reference_code.as_deref() == Some(reference_code))
            .cloned())
    }

    async fn get_all(&self) -> Result<Vec<Cart>> {
        let carts = self.carts.read().await;
        Ok(carts.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryProcessorStore {
    processors: Arc<RwLock<HashMap<ProcessorId, ProcessorRecord>>>,
}

impl InMemoryProcessorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessorStore for InMemoryProcessorStore {
    async fn store(&self, processor: ProcessorRecord) -> Result<()> {
        let mut processors = self.processors.write().await;
        processors.insert(processor.id, processor);
        Ok(())
    }

    async fn get(&self, id: ProcessorId) -> Result<Option<ProcessorRecord>> {
        let processors = self.processors.read().await;
        Ok(processors.get(&id).cloned())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<ProcessorRecord>> {
        let processors = self.processors.read().await;
        Ok(processors
            .values()
            .find(|p| p.identifier == identifier)
            .cloned())
    }

    async fn get_all(&self) -> Result<Vec<ProcessorRecord>> {
        let processors = self.processors.read().await;
        Ok(processors.values().cloned().collect())
    }
}

/// Session state keyed by session id. Each session only ever sees its own entry.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, SessionState>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session: &SessionId) -> Result<SessionState> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session).cloned().unwrap_or_default())
    }

    async fn store(&self, session: &SessionId, state: SessionState) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.clone(), state);
        Ok(())
    }
}

/// A product as listed in a catalog JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    pub price: Money,
    #[serde(default)]
    pub weight: Option<Decimal>,
    #[serde(default)]
    pub dimensions: Option<String>,
    #[serde(default)]
    pub extra_value: Option<Money>,
    /// Checkout steps every cart line of this product adds.
    #[serde(default)]
    pub pipeline: Vec<String>,
}

impl CatalogProduct {
    pub fn new(id: impl Into<String>, title: impl Into<String>, price: Money) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            link: None,
            price,
            weight: None,
            dimensions: None,
            extra_value: None,
            pipeline: Vec::new(),
        }
    }
}

impl Reference for CatalogProduct {
    fn uid(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn title(&self) -> Option<String> {
        Some(self.title.clone())
    }

    fn description(&self) -> Option<String> {
        self.description.clone()
    }

    fn absolute_url(&self) -> Option<String> {
        self.link.clone()
    }

    fn unit_value(&self) -> Option<Money> {
        Some(self.price)
    }

    fn weight(&self) -> Option<Decimal> {
        self.weight
    }

    fn dimensions(&self) -> Option<String> {
        self.dimensions.clone()
    }

    fn extra_value(&self) -> Option<Money> {
        self.extra_value
    }

    fn pipeline(&self) -> Vec<String> {
        self.pipeline.clone()
    }
}

/// Resolves domain references from memory. Products are keyed by their id.
#[derive(Default, Clone)]
pub struct InMemoryCatalog {
    entries: Arc<RwLock<HashMap<DomainRef, Arc<dyn Reference>>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = CatalogProduct>) -> Self {
        let entries = products
            .into_iter()
            .map(|p| (DomainRef::product(&p.id), Arc::new(p) as Arc<dyn Reference>))
            .collect();
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Loads a JSON array of [`CatalogProduct`].
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let products: Vec<CatalogProduct> = serde_json::from_str(&json)?;
        Ok(Self::with_products(products))
    }

    pub async fn add_product(&self, product: CatalogProduct) {
        self.insert(DomainRef::product(&product.id), Arc::new(product)).await;
    }

    /// Registers any other referenced object, e.g. an order a cart mirrors onto.
    pub async fn insert(&self, key: DomainRef, reference: Arc<dyn Reference>) {
        self.entries.write().await.insert(key, reference);
    }

    pub async fn remove(&self, key: &DomainRef) {
        self.entries.write().await.remove(key);
    }
}

#[async_trait]
impl ReferenceResolver for InMemoryCatalog {
    async fn resolve(&self, key: &DomainRef) -> Result<Option<Arc<dyn Reference>>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }
}
