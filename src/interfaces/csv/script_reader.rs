use crate::domain::session::FormArgs;
use crate::error::{CartError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ScriptOp {
    /// Add a product (`target`) to the session's cart.
    Add,
    /// Set the quantity of an existing line (`target` is the item uid).
    Set,
    Remove,
    /// Select the payment processor by id or identifier.
    Processor,
    /// Run the checkout pipeline with `value` as `k=v;k=v` form fields.
    Checkout,
    /// Publish gateway status `target` (fee in `value`) for the last checkout.
    Notify,
    /// Come back from the gateway for the last checkout.
    Confirm,
}

/// One row of a cart script.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ScriptCommand {
    pub op: ScriptOp,
    pub session: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub value: Option<String>,
}

impl ScriptCommand {
    pub fn target(&self) -> Result<&str> {
        self.target
            .as_deref()
            .ok_or_else(|| CartError::InvalidInput(format!("'{:?}' command without target", self.op)))
    }

    pub fn quantity(&self) -> Result<u32> {
        self.quantity
            .ok_or_else(|| CartError::InvalidInput(format!("'{:?}' command without quantity", self.op)))
    }

    /// `value` read as `name=Ana;email=ana@example.com`.
    pub fn form_args(&self) -> FormArgs {
        self.value
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
            .collect()
    }
}

/// Reads cart script commands from a CSV source with columns
/// `op, session, target, quantity, value`.
pub struct ScriptReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ScriptReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes commands; a malformed row yields an error and reading goes on.
    pub fn commands(self) -> impl Iterator<Item = Result<ScriptCommand>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(CartError::from))
    }
}
