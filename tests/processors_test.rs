mod common;

use async_trait::async_trait;
use cartflow::application::pipeline::StepRegistry;
use cartflow::application::processors::ProcessorContext;
use cartflow::application::{CartApp, Ports};
use cartflow::config::{CartConfig, ProcessorSeed};
use cartflow::domain::cart::{Cart, CartStatus};
use cartflow::domain::item::ItemFields;
use cartflow::domain::ports::{PaymentProcessor, ProcessorBox};
use cartflow::domain::processor::{ProcessorRecord, ProcessorSelector};
use cartflow::domain::session::FormArgs;
use cartflow::domain::view::View;
use cartflow::error::{CartError, Result};
use cartflow::infrastructure::in_memory::{
    InMemoryCartStore, InMemoryCatalog, InMemoryProcessorStore, InMemorySessionStore,
};
use cartflow::infrastructure::processors::default_registry;
use cartflow::infrastructure::sandbox::SandboxGateway;
use common::{config, ctx, harness, harness_with, stored_cart};
use serde_json::json;
use std::sync::Arc;

async fn start(config: CartConfig, processors: InMemoryProcessorStore) -> Result<CartApp> {
    let ports = Ports {
        carts: Arc::new(InMemoryCartStore::new()),
        processors: Arc::new(processors),
        sessions: Arc::new(InMemorySessionStore::new()),
        resolver: Arc::new(InMemoryCatalog::new()),
    };
    CartApp::new(
        ports,
        default_registry(Arc::new(SandboxGateway::new())),
        StepRegistry::with_defaults(),
        config,
    )
    .await
}

/// Refuses every cart.
struct Closed {
    record: ProcessorRecord,
}

impl Closed {
    fn factory(context: ProcessorContext) -> Result<ProcessorBox> {
        Ok(Box::new(Self { record: context.record }))
    }
}

#[async_trait]
impl PaymentProcessor for Closed {
    fn record(&self) -> &ProcessorRecord {
        &self.record
    }

    async fn validate(&mut self, _cart: &Cart) -> Result<bool> {
        Ok(false)
    }

    async fn process(&mut self, _cart: &mut Cart) -> Result<View> {
        Err(CartError::ProcessingError("closed for business".into()))
    }
}

#[tokio::test]
async fn test_unknown_module_is_rejected_at_start_up() {
    let mut config = CartConfig::default();
    config.processors.push(ProcessorSeed::new("paypal", "paypal"));

    let result = start(config, InMemoryProcessorStore::new()).await;
    assert!(matches!(result, Err(CartError::ConfigurationError(_))));
}

#[tokio::test]
async fn test_requires_accepts_known_modules_and_steps_only() {
    let mut config = CartConfig::default();
    let mut seed = ProcessorSeed::new("careful", "dummy");
    seed.requires = vec!["gateway".into(), "sender_data".into()];
    config.processors.push(seed);
    assert!(start(config, InMemoryProcessorStore::new()).await.is_ok());

    let mut config = CartConfig::default();
    let mut seed = ProcessorSeed::new("careful", "dummy");
    seed.requires = vec!["shipping_quote".into()];
    config.processors.push(seed);
    let result = start(config, InMemoryProcessorStore::new()).await;
    assert!(matches!(result, Err(CartError::ConfigurationError(_))));
}

#[tokio::test]
async fn test_seeding_twice_keeps_record_ids() {
    let store = InMemoryProcessorStore::new();
    let first = start(config(), store.clone()).await.unwrap();
    let before = first.carts.processors().find_by_identifier("sandbox").await.unwrap().unwrap();

    let mut changed = config();
    changed.processors[0].title = Some("Sandbox payments".into());
    let second = start(changed, store).await.unwrap();
    let after = second.carts.processors().find_by_identifier("sandbox").await.unwrap().unwrap();

    assert_eq!(before.id, after.id);
    assert_eq!(after.title.as_deref(), Some("Sandbox payments"));
}

#[tokio::test]
async fn test_default_processor_is_created_once() {
    let h = harness(config()).await;
    let processors = h.app.carts.processors();
    assert!(processors.find_by_identifier("dummy").await.unwrap().is_none());

    let first = processors.default_processor().await.unwrap();
    let second = processors.default_processor().await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.module, "dummy");
}

#[tokio::test]
async fn test_available_lists_published_records_by_identifier() {
    let mut config = config();
    config.processors.push(ProcessorSeed::new("zeta", "dummy"));
    config.processors.push(ProcessorSeed::new("alpha", "dummy"));
    let mut hidden = ProcessorSeed::new("hidden", "dummy");
    hidden.published = false;
    config.processors.push(hidden);
    let h = harness(config).await;

    let available = h.app.carts.processors().available().await.unwrap();
    let identifiers: Vec<_> = available.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(identifiers, vec!["alpha", "sandbox", "zeta"]);
}

#[tokio::test]
async fn test_resolve_by_id_identifier_or_record() {
    let h = harness(config()).await;
    let processors = h.app.carts.processors();
    let sandbox = processors.find_by_identifier("sandbox").await.unwrap().unwrap();

    let by_id = processors.resolve(ProcessorSelector::from(sandbox.id)).await.unwrap();
    assert_eq!(by_id, sandbox);
    let by_identifier = processors.resolve("sandbox".into()).await.unwrap();
    assert_eq!(by_identifier, sandbox);

    let detached = ProcessorRecord::new("detached", "dummy");
    let by_record = processors.resolve(detached.clone().into()).await.unwrap();
    assert_eq!(by_record, detached);

    let missing = processors.resolve("nope".into()).await;
    assert!(matches!(missing, Err(CartError::NotFound(_))));
}

#[tokio::test]
async fn test_instance_requires_mapping_config_and_known_module() {
    let h = harness(config()).await;
    let processors = h.app.carts.processors();

    let mut record = ProcessorRecord::new("broken", "dummy");
    record.config = json!("token=abc");
    let result = processors.instance(&record, None, FormArgs::new());
    assert!(matches!(result, Err(CartError::ConfigurationError(_))));

    let unknown = ProcessorRecord::new("ghost", "ghost");
    let result = processors.instance(&unknown, None, FormArgs::new());
    assert!(matches!(result, Err(CartError::ConfigurationError(_))));

    let mut sandbox = processors.find_by_identifier("sandbox").await.unwrap().unwrap();
    sandbox.config = json!({"email": "shop@example.com"});
    let result = processors.instance(&sandbox, None, FormArgs::new());
    assert!(matches!(result, Err(CartError::ConfigurationError(_))));
}

#[tokio::test]
async fn test_custom_module_can_refuse_carts() {
    let mut config = config();
    config.processors.push(ProcessorSeed::new("closed", "closed"));
    let h = harness_with(
        config,
        SandboxGateway::new(),
        |registry| {
            registry.register("closed", Closed::factory);
        },
        StepRegistry::with_defaults(),
    )
    .await;
    let s = ctx("s1");
    h.app.carts.set_item(&s, ItemFields::for_product("mug", 1)).await.unwrap();
    let cart = h.app.carts.get_or_create_cart(&s).await.unwrap();

    let result = h.app.carts.checkout(&s, Some("closed".into()), FormArgs::new()).await;
    assert!(matches!(result, Err(CartError::CheckoutValidation(_))));
    assert_eq!(stored_cart(&h, &cart).await.status, CartStatus::Pending);
}
