//! Application layer: the services the front end and gateway callbacks call into.
//!
//! [`CartApp`] wires the ports to the cart service, the checkout pipeline and the
//! payment reconciler. All three share one [`CartService`] and therefore one set
//! of per-cart locks.

pub mod cart;
pub mod locks;
pub mod pipeline;
pub mod processors;
pub mod reconciler;
pub mod steps;

use crate::config::CartConfig;
use crate::domain::ports::{SharedCartStore, SharedProcessorStore, SharedResolver, SharedSessionStore};
use crate::error::Result;
use cart::CartService;
use pipeline::{PipelineEngine, StepRegistry};
use processors::{ProcessorRegistry, Processors};
use reconciler::PaymentReconciler;
use std::sync::Arc;

/// The storage and lookup adapters the core runs on.
#[derive(Clone)]
pub struct Ports {
    pub carts: SharedCartStore,
    pub processors: SharedProcessorStore,
    pub sessions: SharedSessionStore,
    pub resolver: SharedResolver,
}

pub struct CartApp {
    pub carts: Arc<CartService>,
    pub pipeline: PipelineEngine,
    pub reconciler: PaymentReconciler,
}

impl CartApp {
    /// Wires the services and seeds the configured processor records.
    pub async fn new(
        ports: Ports,
        registry: ProcessorRegistry,
        steps: StepRegistry,
        config: CartConfig,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let processors = Processors::new(ports.processors, registry, &config)
            .with_known_steps(steps.keys().map(str::to_string).collect::<Vec<_>>());
        processors.seed(&config.processors).await?;

        let service = Arc::new(CartService::new(
            ports.carts,
            ports.sessions,
            ports.resolver,
            Arc::new(processors),
            config,
        ));
        Ok(Self {
            pipeline: PipelineEngine::new(service.clone(), steps),
            reconciler: PaymentReconciler::new(service.clone()),
            carts: service,
        })
    }
}
