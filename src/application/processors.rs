//! Processor registry and the directory of persisted processor records.

use crate::config::{CartConfig, ProcessorSeed};
use crate::domain::cart::Cart;
use crate::domain::ports::{ProcessorBox, SharedProcessorStore};
use crate::domain::processor::{ProcessorId, ProcessorRecord, ProcessorSelector};
use crate::domain::session::FormArgs;
use crate::error::{CartError, Result};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Everything a processor implementation receives when it is instantiated.
#[derive(Debug, Clone)]
pub struct ProcessorContext {
    pub record: ProcessorRecord,
    /// Record config with the cart's own config merged over it.
    pub config: Map<String, Value>,
    /// Extra arguments given to the checkout call.
    pub args: FormArgs,
    pub timeout: Duration,
}

pub type ProcessorFactory = Arc<dyn Fn(ProcessorContext) -> Result<ProcessorBox> + Send + Sync>;

/// Maps module keys to processor constructors. Filled at start-up.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    factories: HashMap<String, ProcessorFactory>,
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, module: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(ProcessorContext) -> Result<ProcessorBox> + Send + Sync + 'static,
    {
        self.factories.insert(module.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, module: &str) -> bool {
        self.factories.contains_key(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn build(&self, context: ProcessorContext) -> Result<ProcessorBox> {
        let factory = self.factories.get(&context.record.module).ok_or_else(|| {
            CartError::ConfigurationError(format!(
                "processor '{}' uses unknown module '{}'",
                context.record.identifier, context.record.module
            ))
        })?;
        factory(context)
    }
}

/// Persisted processor records plus the registry that turns them into instances.
pub struct Processors {
    store: SharedProcessorStore,
    registry: ProcessorRegistry,
    known_steps: BTreeSet<String>,
    default_seed: ProcessorSeed,
    timeout: Duration,
    default_lock: Mutex<()>,
}

impl Processors {
    pub fn new(store: SharedProcessorStore, registry: ProcessorRegistry, config: &CartConfig) -> Self {
        Self {
            store,
            registry,
            known_steps: BTreeSet::new(),
            default_seed: config.default_processor.clone(),
            timeout: config.gateway_timeout(),
            default_lock: Mutex::new(()),
        }
    }

    /// Step keys accepted in `requires`, next to the registered modules.
    pub fn with_known_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_steps.extend(steps.into_iter().map(Into::into));
        self
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Checks the module and every `requires` entry are known.
    pub fn validate(&self, record: &ProcessorRecord) -> Result<()> {
        if !self.registry.contains(&record.module) {
            return Err(CartError::ConfigurationError(format!(
                "processor '{}' uses unknown module '{}'",
                record.identifier, record.module
            )));
        }
        if let Some(missing) = record
            .requires
            .iter()
            .find(|r| !self.registry.contains(r) && !self.known_steps.contains(*r))
        {
            return Err(CartError::ConfigurationError(format!(
                "processor '{}' requires unknown module '{missing}'",
                record.identifier
            )));
        }
        Ok(())
    }

    pub async fn save(&self, record: ProcessorRecord) -> Result<()> {
        self.validate(&record)?;
        self.store.store(record).await
    }

    /// Creates or updates records by identifier, keeping existing ids.
    pub async fn seed(&self, seeds: &[ProcessorSeed]) -> Result<()> {
        for seed in seeds {
            let mut record = seed.to_record();
            if let Some(existing) = self.store.find_by_identifier(&seed.identifier).await? {
                record.id = existing.id;
            }
            info!(identifier = %record.identifier, module = %record.module, "Seeding processor");
            self.save(record).await?;
        }
        Ok(())
    }

    /// The configured default record, created on first use.
    pub async fn default_processor(&self) -> Result<ProcessorRecord> {
        let _guard = self.default_lock.lock().await;
        if let Some(record) = self
            .store
            .find_by_identifier(&self.default_seed.identifier)
            .await?
        {
            return Ok(record);
        }
        let record = self.default_seed.to_record();
        info!(identifier = %record.identifier, "Creating default processor");
        self.save(record.clone()).await?;
        Ok(record)
    }

    pub async fn get(&self, id: ProcessorId) -> Result<Option<ProcessorRecord>> {
        self.store.get(id).await
    }

    pub async fn find_by_identifier(&self, identifier: &str) -> Result<Option<ProcessorRecord>> {
        self.store.find_by_identifier(identifier).await
    }

    /// Resolves a selector by id first, then by identifier.
    pub async fn resolve(&self, selector: ProcessorSelector) -> Result<ProcessorRecord> {
        let key = match selector {
            ProcessorSelector::Record(record) => return Ok(record),
            ProcessorSelector::Key(key) => key,
        };
        if let Ok(id) = key.parse::<ProcessorId>()
            && let Some(record) = self.store.get(id).await?
        {
            return Ok(record);
        }
        self.store
            .find_by_identifier(&key)
            .await?
            .ok_or_else(|| CartError::NotFound(format!("processor '{key}'")))
    }

    /// Published records, for the front end to offer as payment options.
    pub async fn available(&self) -> Result<Vec<ProcessorRecord>> {
        let mut records: Vec<_> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|r| r.published)
            .collect();
        records.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(records)
    }

    /// Builds a runtime instance. The record config must be a JSON object; the
    /// cart's own config overrides its keys.
    pub fn instance(&self, record: &ProcessorRecord, cart: Option<&Cart>, args: FormArgs) -> Result<ProcessorBox> {
        let Value::Object(base) = &record.config else {
            return Err(CartError::ConfigurationError(format!(
                "config of processor '{}' must be a mapping",
                record.identifier
            )));
        };
        let mut config = base.clone();
        if let Some(cart) = cart {
            config.extend(cart.config.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        debug!(identifier = %record.identifier, keys = config.len(), "Instantiating processor");
        self.registry.build(ProcessorContext {
            record: record.clone(),
            config,
            args,
            timeout: self.timeout,
        })
    }
}

impl fmt::Debug for Processors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processors")
            .field("registry", &self.registry)
            .field("known_steps", &self.known_steps)
            .field("default", &self.default_seed.identifier)
            .finish()
    }
}
