#![allow(dead_code)]

use cartflow::application::cart::RequestContext;
use cartflow::application::pipeline::StepRegistry;
use cartflow::application::processors::ProcessorRegistry;
use cartflow::application::{CartApp, Ports};
use cartflow::config::{CartConfig, ProcessorSeed};
use cartflow::domain::cart::{Actor, Cart, CartStatus, StatusContext};
use cartflow::domain::item::ItemMatch;
use cartflow::domain::money::Money;
use cartflow::domain::reference::{ItemRemovable, Reference, ResponseReceivable, StatusSettable, TaxSettable};
use cartflow::infrastructure::in_memory::{
    CatalogProduct, InMemoryCartStore, InMemoryCatalog, InMemoryProcessorStore, InMemorySessionStore,
};
use cartflow::infrastructure::processors::default_registry;
use cartflow::infrastructure::sandbox::SandboxGateway;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct Harness {
    pub app: Arc<CartApp>,
    pub sandbox: SandboxGateway,
    pub catalog: InMemoryCatalog,
    pub sessions: InMemorySessionStore,
}

/// Config with login disabled and a `sandbox` gateway processor seeded.
pub fn config() -> CartConfig {
    let mut sandbox = ProcessorSeed::new("sandbox", "gateway");
    sandbox.config = json!({
        "email": "shop@example.com",
        "token": "secret",
        "redirect_url": "https://shop.example/confirm",
        "notification_url": "https://shop.example/notify",
        "reference_prefix": "SHOP-",
    });
    CartConfig {
        requires_login: false,
        processors: vec![sandbox],
        ..CartConfig::default()
    }
}

pub fn products() -> Vec<CatalogProduct> {
    let mut mug = CatalogProduct::new("mug", "Mug", Money::new(dec!(10)));
    mug.description = Some("Blue".into());
    let tea = CatalogProduct::new("tea", "Tea", Money::new(dec!(4.50)));
    let coupon = CatalogProduct::new("coupon", "Coupon", Money::new(dec!(-5)));
    vec![mug, tea, coupon]
}

pub async fn harness(config: CartConfig) -> Harness {
    harness_with(config, SandboxGateway::new(), |_| {}, StepRegistry::with_defaults()).await
}

/// Builds the app over in-memory adapters. `customize` may register extra processor modules.
pub async fn harness_with(
    config: CartConfig,
    sandbox: SandboxGateway,
    customize: impl FnOnce(&mut ProcessorRegistry),
    steps: StepRegistry,
) -> Harness {
    let catalog = InMemoryCatalog::with_products(products());
    let sessions = InMemorySessionStore::new();
    let ports = Ports {
        carts: Arc::new(InMemoryCartStore::new()),
        processors: Arc::new(InMemoryProcessorStore::new()),
        sessions: Arc::new(sessions.clone()),
        resolver: Arc::new(catalog.clone()),
    };
    let mut registry = default_registry(Arc::new(sandbox.clone()));
    customize(&mut registry);
    let app = CartApp::new(ports, registry, steps, config)
        .await
        .expect("app should start");
    Harness {
        app: Arc::new(app),
        sandbox,
        catalog,
        sessions,
    }
}

pub fn ctx(session: &str) -> RequestContext {
    RequestContext::new(session)
}

pub fn logged_in(session: &str) -> RequestContext {
    RequestContext::new(session).with_actor(Actor {
        id: session.to_string(),
        name: Some(format!("User {session}")),
        email: Some(format!("{session}@example.com")),
    })
}

pub async fn stored_cart(harness: &Harness, cart: &Cart) -> Cart {
    harness
        .app
        .carts
        .carts()
        .get(cart.id)
        .await
        .unwrap()
        .expect("cart should be stored")
}

/// A domain object a cart can point at, recording every hook call.
#[derive(Debug, Default)]
pub struct RecordingOrder {
    pub uid: String,
    pub statuses: Mutex<Vec<CartStatus>>,
    pub taxes: Mutex<Vec<Money>>,
    pub removed: Mutex<Vec<ItemMatch>>,
    pub responses: Mutex<Vec<(Value, String)>>,
}

impl RecordingOrder {
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            ..Self::default()
        }
    }

    pub fn last_status(&self) -> Option<CartStatus> {
        self.statuses.lock().unwrap().last().copied()
    }
}

impl Reference for RecordingOrder {
    fn uid(&self) -> Option<String> {
        Some(self.uid.clone())
    }

    fn as_status_settable(&self) -> Option<&dyn StatusSettable> {
        Some(self)
    }

    fn as_tax_settable(&self) -> Option<&dyn TaxSettable> {
        Some(self)
    }

    fn as_item_removable(&self) -> Option<&dyn ItemRemovable> {
        Some(self)
    }

    fn as_response_receivable(&self) -> Option<&dyn ResponseReceivable> {
        Some(self)
    }
}

impl StatusSettable for RecordingOrder {
    fn set_status(&self, status: CartStatus, _context: &StatusContext) {
        self.statuses.lock().unwrap().push(status);
    }
}

impl TaxSettable for RecordingOrder {
    fn set_tax(&self, tax: Money) {
        self.taxes.lock().unwrap().push(tax);
    }
}

impl ItemRemovable for RecordingOrder {
    fn remove_item(&self, criteria: &ItemMatch) {
        self.removed.lock().unwrap().push(criteria.clone());
    }
}

impl ResponseReceivable for RecordingOrder {
    fn get_response(&self, payload: &Value, source_identifier: &str) {
        self.responses
            .lock()
            .unwrap()
            .push((payload.clone(), source_identifier.to_string()));
    }
}

pub fn write_script(path: &Path, rows: &[[&str; 5]]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["op", "session", "target", "quantity", "value"])?;
    for row in rows {
        wtr.write_record(row)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_catalog(path: &Path) -> Result<(), Error> {
    std::fs::write(path, serde_json::to_string(&products())?)
}

pub fn write_config(path: &Path, config: &Value) -> Result<(), Error> {
    std::fs::write(path, config.to_string())
}
