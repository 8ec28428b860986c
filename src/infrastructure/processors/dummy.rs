use crate::application::processors::ProcessorContext;
use crate::domain::cart::Cart;
use crate::domain::ports::{PaymentProcessor, ProcessorBox};
use crate::domain::processor::ProcessorRecord;
use crate::domain::view::View;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

pub const MODULE: &str = "dummy";

/// Accepts every cart without talking to anyone. Used as the default processor.
#[derive(Debug, Clone)]
pub struct DummyProcessor {
    record: ProcessorRecord,
}

impl DummyProcessor {
    pub fn new(record: ProcessorRecord) -> Self {
        Self { record }
    }

    pub fn factory(context: ProcessorContext) -> Result<ProcessorBox> {
        Ok(Box::new(Self::new(context.record)))
    }
}

#[async_trait]
impl PaymentProcessor for DummyProcessor {
    fn record(&self) -> &ProcessorRecord {
        &self.record
    }

    async fn validate(&mut self, _cart: &Cart) -> Result<bool> {
        Ok(true)
    }

    async fn process(&mut self, cart: &mut Cart) -> Result<View> {
        info!(cart = %cart.id, total = %cart.total, "Dummy processor accepted cart");
        cart.add_log(format!("processed by {}", self.record.identifier));
        Ok(View::render(
            "cart/dummy.html",
            json!({"cart_id": cart.id, "total": cart.total}),
        ))
    }
}
