use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessorId(pub Uuid);

impl ProcessorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProcessorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ProcessorId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A persisted payment backend binding.
///
/// `module` is the registry key of the implementation; `config` is only interpreted
/// by that implementation and must be a JSON object by the time an instance is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorRecord {
    pub id: ProcessorId,
    pub identifier: String,
    pub module: String,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default = "empty_config")]
    pub config: Value,
    /// Steps appended to the checkout pipeline of carts using this processor.
    #[serde(default)]
    pub pipeline: Vec<String>,
    #[serde(default = "published_by_default")]
    pub published: bool,
}

fn empty_config() -> Value {
    Value::Object(Default::default())
}

fn published_by_default() -> bool {
    true
}

impl ProcessorRecord {
    pub fn new(identifier: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            id: ProcessorId::new(),
            identifier: identifier.into(),
            module: module.into(),
            requires: Vec::new(),
            title: None,
            description: None,
            link: None,
            config: empty_config(),
            pipeline: Vec::new(),
            published: true,
        }
    }
}

impl fmt::Display for ProcessorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier)
    }
}

/// How a caller names the processor a cart should use.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorSelector {
    /// An id or an identifier. Ids are tried first.
    Key(String),
    Record(ProcessorRecord),
}

impl From<&str> for ProcessorSelector {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for ProcessorSelector {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<ProcessorId> for ProcessorSelector {
    fn from(id: ProcessorId) -> Self {
        Self::Key(id.to_string())
    }
}

impl From<ProcessorRecord> for ProcessorSelector {
    fn from(record: ProcessorRecord) -> Self {
        Self::Record(record)
    }
}
