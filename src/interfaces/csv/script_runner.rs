use super::script_reader::{ScriptCommand, ScriptOp};
use crate::application::CartApp;
use crate::application::cart::RequestContext;
use crate::domain::cart::{Actor, Cart, CartId, CartStatus};
use crate::domain::item::{ItemFields, ItemMatch};
use crate::domain::money::Money;
use crate::error::{CartError, Result};
use crate::infrastructure::sandbox::SandboxGateway;
use std::collections::HashMap;
use tracing::debug;

/// Replays script commands against the cart services, playing the sandbox
/// gateway for `notify` and `confirm`.
///
/// Every session acts as a logged-in user of the same name.
pub struct ScriptRunner<'a> {
    app: &'a CartApp,
    sandbox: &'a SandboxGateway,
    last_checkout: HashMap<String, CartId>,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(app: &'a CartApp, sandbox: &'a SandboxGateway) -> Self {
        Self {
            app,
            sandbox,
            last_checkout: HashMap::new(),
        }
    }

    /// Runs one command and describes what happened.
    pub async fn run(&mut self, command: ScriptCommand) -> Result<String> {
        let ctx = RequestContext::new(command.session.as_str()).with_actor(actor_for(&command.session));
        let carts = &self.app.carts;
        debug!(?command, "Running script command");

        match command.op {
            ScriptOp::Add => {
                let fields = ItemFields::for_product(command.target()?, command.quantity.unwrap_or(1));
                let item = carts.set_item(&ctx, fields).await?;
                Ok(describe_item(command.target()?, item.map(|i| i.quantity)))
            }
            ScriptOp::Set => {
                let quantity = command.quantity()?;
                let item = carts
                    .set_item(&ctx, ItemFields::for_uid(command.target()?, quantity))
                    .await?;
                Ok(describe_item(command.target()?, item.map(|i| i.quantity)))
            }
            ScriptOp::Remove => {
                let removed = carts.remove_item(&ctx, ItemMatch::by_uid(command.target()?)).await?;
                Ok(format!("removed {removed} item(s)"))
            }
            ScriptOp::Processor => {
                let record = carts.set_processor(&ctx, Some(command.target()?.into())).await?;
                Ok(format!("processor {}", record.identifier))
            }
            ScriptOp::Checkout => {
                let cart_id = carts.get_or_create_cart(&ctx).await?.id;
                let view = self.app.pipeline.process_pipeline(&ctx, command.form_args()).await?;
                if let Some(cart) = carts.carts().get(cart_id).await?
                    && cart.status != CartStatus::Pending
                {
                    self.last_checkout.insert(command.session.clone(), cart_id);
                }
                Ok(serde_json::to_string(&view)?)
            }
            ScriptOp::Notify => {
                let fee = command
                    .value
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .map(str::parse::<Money>)
                    .transpose()
                    .map_err(|e| CartError::InternalError(Box::new(e)))?;
                let cart = self.checked_out_cart(&command.session).await?;
                let identifier = self.processor_identifier(&cart).await?;
                let checkout_code = cart
                    .checkout_code
                    .as_deref()
                    .ok_or_else(|| CartError::NotFound(format!("checkout code of cart {}", cart.id)))?;
                let code = self
                    .sandbox
                    .publish_for_checkout(checkout_code, command.target()?, fee)
                    .await
                    .ok_or_else(|| CartError::NotFound(format!("sandbox checkout {checkout_code}")))?;
                Ok(self.app.reconciler.notification(&identifier, &code).await)
            }
            ScriptOp::Confirm => {
                let cart = self.checked_out_cart(&command.session).await?;
                let identifier = self.processor_identifier(&cart).await?;
                let transaction_code = match (&cart.transaction_code, &cart.checkout_code) {
                    (Some(code), _) => Some(code.clone()),
                    (None, Some(checkout)) => self
                        .sandbox
                        .transaction_for_checkout(checkout)
                        .await
                        .map(|detail| detail.code),
                    (None, None) => None,
                };
                let view = self
                    .app
                    .reconciler
                    .confirmation(&identifier, transaction_code.as_deref())
                    .await;
                Ok(serde_json::to_string(&view)?)
            }
        }
    }

    async fn checked_out_cart(&self, session: &str) -> Result<Cart> {
        let id = self
            .last_checkout
            .get(session)
            .ok_or_else(|| CartError::NotFound(format!("checked out cart of session '{session}'")))?;
        self.app
            .carts
            .carts()
            .get(*id)
            .await?
            .ok_or_else(|| CartError::NotFound(format!("cart {id}")))
    }

    async fn processor_identifier(&self, cart: &Cart) -> Result<String> {
        let id = cart
            .processor
            .ok_or_else(|| CartError::NotFound(format!("processor of cart {}", cart.id)))?;
        let record = self
            .app
            .carts
            .processors()
            .get(id)
            .await?
            .ok_or_else(|| CartError::NotFound(format!("processor {id}")))?;
        Ok(record.identifier)
    }
}

fn actor_for(session: &str) -> Actor {
    Actor {
        id: session.to_string(),
        name: Some(session.to_string()),
        email: Some(format!("{session}@example.com")),
    }
}

fn describe_item(uid: &str, quantity: Option<u32>) -> String {
    match quantity {
        Some(quantity) => format!("{uid} x{quantity}"),
        None => format!("{uid} not in cart"),
    }
}
