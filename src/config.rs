use crate::domain::processor::ProcessorRecord;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Settings of the cart core. Every field has a default, so `{}` is a valid file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartConfig {
    /// Steps run right after `start` for every cart.
    pub pipeline: Vec<String>,
    /// Processor used when a cart has none. Created on first use if missing.
    pub default_processor: ProcessorSeed,
    /// Processor records created at start-up.
    pub processors: Vec<ProcessorSeed>,
    pub permanent_session: bool,
    pub requires_login: bool,
    pub continue_shopping_url: String,
    /// Upper bound for every outbound gateway call.
    pub gateway_timeout_ms: u64,
    /// Step transitions allowed in a single pipeline run.
    pub max_pipeline_transitions: usize,
    /// Let gateway callbacks move carts out of terminal statuses.
    pub allow_terminal_regression: bool,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            pipeline: Vec::new(),
            default_processor: ProcessorSeed::new("dummy", "dummy"),
            processors: Vec::new(),
            permanent_session: true,
            requires_login: true,
            continue_shopping_url: "/".to_string(),
            gateway_timeout_ms: 10_000,
            max_pipeline_transitions: 64,
            allow_terminal_regression: false,
        }
    }
}

impl CartConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}

/// A processor record as written in configuration, without an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSeed {
    pub identifier: String,
    pub module: String,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_object")]
    pub config: Value,
    #[serde(default)]
    pub pipeline: Vec<String>,
    #[serde(default = "yes")]
    pub published: bool,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn yes() -> bool {
    true
}

impl ProcessorSeed {
    pub fn new(identifier: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            module: module.into(),
            requires: Vec::new(),
            title: None,
            description: None,
            config: empty_object(),
            pipeline: Vec::new(),
            published: true,
        }
    }

    pub fn to_record(&self) -> ProcessorRecord {
        let mut record = ProcessorRecord::new(&self.identifier, &self.module);
        record.requires = self.requires.clone();
        record.title = self.title.clone();
        record.description = self.description.clone();
        record.config = self.config.clone();
        record.pipeline = self.pipeline.clone();
        record.published = self.published;
        record
    }
}
