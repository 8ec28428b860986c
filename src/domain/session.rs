use super::cart::CartId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Form fields submitted while walking through the checkout pipeline.
pub type FormArgs = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the core keeps in a user's session between requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub cart_id: Option<CartId>,
    pub pipeline_index: usize,
    pub pipeline_args: FormArgs,
    pub permanent: bool,
}

impl SessionState {
    /// Points the session at a new cart and forgets any pipeline progress.
    pub fn bind_cart(&mut self, cart_id: CartId) {
        self.cart_id = Some(cart_id);
        self.clear_pipeline();
    }

    pub fn unbind_cart(&mut self) {
        self.cart_id = None;
    }

    pub fn clear_pipeline(&mut self) {
        self.pipeline_index = 0;
        self.pipeline_args.clear();
    }

    pub fn pipeline_for(&self, cart_id: CartId) -> PipelineState {
        PipelineState {
            cart_id,
            step_index: self.pipeline_index,
            args: self.pipeline_args.clone(),
        }
    }

    pub fn store_pipeline(&mut self, state: &PipelineState) {
        self.pipeline_index = state.step_index;
        self.pipeline_args = state.args.clone();
    }
}

/// Cross-request progress of one checkout pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    pub cart_id: CartId,
    pub step_index: usize,
    pub args: FormArgs,
}

impl PipelineState {
    /// Newly submitted fields override earlier ones with the same name.
    pub fn merge_args(&mut self, submitted: FormArgs) {
        self.args.extend(submitted);
    }
}
