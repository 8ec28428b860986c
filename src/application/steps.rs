use super::pipeline::{PipelineStep, StepContext, StepOutcome};
use crate::domain::view::View;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::json;

pub const SENDER_DATA_STEP: &str = "sender_data";

const SENDER_FIELDS: [&str; 2] = ["name", "email"];

/// First step of every pipeline. Holds the run until someone is logged in, if
/// the cart requires it.
#[derive(Debug, Default, Clone, Copy)]
pub struct StartStep;

#[async_trait]
impl PipelineStep for StartStep {
    async fn execute(&self, ctx: &mut StepContext<'_>) -> Result<Option<StepOutcome>> {
        if ctx.cart.requires_login && ctx.actor.is_none() {
            return Ok(Some(StepOutcome::Suspend(View::render(
                "cart/login_required.html",
                json!({
                    "cart_id": ctx.cart.id,
                    "continue_shopping_url": ctx.cart.continue_shopping_url,
                }),
            ))));
        }
        Ok(None)
    }
}

/// Collects the buyer's name and email into `sender_data`.
///
/// Known actor data fills blanks; the form is shown until both fields are
/// present and the email looks like one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SenderDataStep;

#[async_trait]
impl PipelineStep for SenderDataStep {
    async fn execute(&self, ctx: &mut StepContext<'_>) -> Result<Option<StepOutcome>> {
        if let Some(actor) = ctx.actor {
            let known = [("name", actor.name.as_ref()), ("email", actor.email.as_ref())];
            for (field, value) in known {
                if let Some(value) = value
                    && ctx.arg(field).is_none()
                {
                    ctx.args.insert(field.to_string(), value.clone());
                }
            }
        }

        let missing: Vec<&str> = SENDER_FIELDS
            .into_iter()
            .filter(|field| ctx.arg(field).is_none())
            .collect();
        let bad_email = ctx.arg("email").is_some_and(|email| !email.contains('@'));

        if !missing.is_empty() || bad_email {
            return Ok(Some(StepOutcome::Suspend(View::render(
                "cart/sender_form.html",
                json!({
                    "cart_id": ctx.cart.id,
                    "missing": missing,
                    "invalid_email": bad_email,
                    "values": ctx.args,
                }),
            ))));
        }

        for field in SENDER_FIELDS {
            if let Some(value) = ctx.arg(field).map(str::to_string) {
                ctx.cart.sender_data.insert(field.to_string(), value);
            }
        }
        Ok(Some(StepOutcome::Advance))
    }
}
