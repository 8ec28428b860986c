//! Resumable checkout pipeline.
//!
//! The current step index and the accumulated form arguments live in the
//! session, so a step that renders a page pauses the run and the next request
//! resumes at the same step. Running past the last step is the normal way out
//! and ends in checkout.

use super::cart::{CartService, RequestContext};
use super::steps::{SENDER_DATA_STEP, SenderDataStep, StartStep};
use crate::domain::cart::{Actor, Cart, START_STEP};
use crate::domain::reference::Refs;
use crate::domain::session::{FormArgs, PipelineState};
use crate::domain::view::View;
use crate::error::{CartError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub const EMPTY_CART_TEMPLATE: &str = "cart/empty_cart.html";
pub const PIPELINE_ERROR_TEMPLATE: &str = "cart/pipeline_error.html";
pub const CHECKOUT_ERROR_TEMPLATE: &str = "cart/checkout_error.html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepTarget {
    Index(usize),
    Name(String),
}

/// What a step asks the engine to do next. Returning `None` means advance.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Pause and show this to the user. The run resumes at the same step.
    Suspend(View),
    Advance,
    Jump(StepTarget),
}

/// The engine's reading of a step outcome against the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Suspend(View),
    Advance(usize),
    /// No steps remain; the cart goes to checkout.
    Overflow,
}

impl Transition {
    pub fn from_outcome(outcome: Option<StepOutcome>, index: usize, pipeline: &[String]) -> Result<Self> {
        let next = match outcome {
            Some(StepOutcome::Suspend(view)) => return Ok(Self::Suspend(view)),
            None | Some(StepOutcome::Advance) => index + 1,
            Some(StepOutcome::Jump(StepTarget::Index(target))) => target,
            Some(StepOutcome::Jump(StepTarget::Name(name))) => pipeline
                .iter()
                .position(|step| *step == name)
                .ok_or_else(|| CartError::PipelineError(format!("no step named '{name}' in the pipeline")))?,
        };
        Ok(if next >= pipeline.len() {
            Self::Overflow
        } else {
            Self::Advance(next)
        })
    }
}

/// A step that failed. Recovered by the engine, never returned to callers.
#[derive(Debug, Error)]
#[error("{error} {index} {step}")]
pub struct StepFailure {
    pub index: usize,
    pub step: String,
    pub error: CartError,
}

/// Everything a step may look at or change while it executes.
pub struct StepContext<'a> {
    pub cart: &'a mut Cart,
    pub pipeline: &'a [String],
    pub index: usize,
    /// Arguments accumulated over every request of this run.
    pub args: &'a mut FormArgs,
    pub actor: Option<&'a Actor>,
    pub refs: &'a Refs,
}

impl StepContext<'_> {
    /// The value of a submitted field, ignoring blanks.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// A stateless pipeline step looked up by key.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    async fn execute(&self, ctx: &mut StepContext<'_>) -> Result<Option<StepOutcome>>;
}

pub type StepFactory = Arc<dyn Fn() -> Box<dyn PipelineStep> + Send + Sync>;

#[derive(Clone, Default)]
pub struct StepRegistry {
    factories: HashMap<String, StepFactory>,
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `start` and `sender_data` steps.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(START_STEP, || Box::new(StartStep))
            .register(SENDER_DATA_STEP, || Box::new(SenderDataStep));
        registry
    }

    pub fn register<F>(&mut self, key: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn PipelineStep> + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn build(&self, key: &str) -> Option<Box<dyn PipelineStep>> {
        self.factories.get(key).map(|factory| factory())
    }
}

enum RunEnd {
    Suspended(View),
    Overflow,
}

pub struct PipelineEngine {
    service: Arc<CartService>,
    steps: StepRegistry,
}

impl PipelineEngine {
    pub fn new(service: Arc<CartService>, steps: StepRegistry) -> Self {
        Self { service, steps }
    }

    pub fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    /// Runs the session cart's pipeline from the stored step with the submitted
    /// fields merged into the accumulated ones.
    ///
    /// Step failures and checkout failures are rendered, not returned. Errors
    /// only come out of here when the stores fail.
    #[instrument(skip(self, submitted), fields(session = %ctx.session))]
    pub async fn process_pipeline(&self, ctx: &RequestContext, submitted: FormArgs) -> Result<View> {
        let (_guard, mut cart) = self.service.lock_current(ctx).await?;
        if cart.items.is_empty() {
            return Ok(View::render(
                EMPTY_CART_TEMPLATE,
                json!({"cart_id": cart.id, "continue_shopping_url": cart.continue_shopping_url}),
            ));
        }

        let mut session = self.service.sessions().load(&ctx.session).await?;
        let record = self.service.assign_processor(&mut cart, None).await?;
        let pipeline = cart.build_pipeline(&self.service.config().pipeline, Some(&record));
        let refs = self.service.resolve_refs(&cart).await;

        let mut state = session.pipeline_for(cart.id);
        state.merge_args(submitted);

        match self
            .run(&mut cart, &pipeline, &mut state, ctx.actor.as_ref(), &refs)
            .await
        {
            Ok(RunEnd::Suspended(view)) => {
                session.store_pipeline(&state);
                self.service.save(&mut cart, ctx.actor.as_ref(), &refs).await?;
                self.service.sessions().store(&ctx.session, session).await?;
                Ok(view)
            }
            Ok(RunEnd::Overflow) => {
                session.clear_pipeline();
                let args = std::mem::take(&mut state.args);
                match self
                    .service
                    .checkout_locked(ctx, &mut cart, &mut session, None, args)
                    .await
                {
                    Ok(view) => Ok(view),
                    Err(e) => {
                        warn!(cart = %cart.id, "Checkout after pipeline failed: {e}");
                        self.service.sessions().store(&ctx.session, session).await?;
                        Ok(View::render(
                            CHECKOUT_ERROR_TEMPLATE,
                            json!({"cart_id": cart.id, "error": e.to_string()}),
                        ))
                    }
                }
            }
            Err(failure) => {
                warn!(cart = %cart.id, step = %failure.step, index = failure.index, "Pipeline step failed: {}", failure.error);
                session.clear_pipeline();
                cart.add_log(format!("{failure} cart: {}", cart.id));
                self.service.save(&mut cart, ctx.actor.as_ref(), &refs).await?;
                self.service.sessions().store(&ctx.session, session).await?;
                Ok(View::render(
                    PIPELINE_ERROR_TEMPLATE,
                    json!({"cart_id": cart.id, "step": failure.step}),
                ))
            }
        }
    }

    async fn run(
        &self,
        cart: &mut Cart,
        pipeline: &[String],
        state: &mut PipelineState,
        actor: Option<&Actor>,
        refs: &Refs,
    ) -> std::result::Result<RunEnd, StepFailure> {
        let limit = self.service.config().max_pipeline_transitions;
        let mut transitions = 0;
        loop {
            let index = state.step_index;
            let fail = |error: CartError| StepFailure {
                index,
                step: pipeline.get(index).cloned().unwrap_or_default(),
                error,
            };

            let Some(key) = pipeline.get(index) else {
                return Err(fail(CartError::PipelineError(format!(
                    "step index {index} is outside a pipeline of {} steps",
                    pipeline.len()
                ))));
            };
            let step = self
                .steps
                .build(key)
                .ok_or_else(|| fail(CartError::PipelineError(format!("unknown pipeline step '{key}'"))))?;

            debug!(cart = %cart.id, index, step = %key, "Executing pipeline step");
            let mut ctx = StepContext {
                cart: &mut *cart,
                pipeline,
                index,
                args: &mut state.args,
                actor,
                refs,
            };
            let outcome = step.execute(&mut ctx).await.map_err(fail)?;

            match Transition::from_outcome(outcome, index, pipeline).map_err(fail)? {
                Transition::Suspend(view) => return Ok(RunEnd::Suspended(view)),
                Transition::Overflow => return Ok(RunEnd::Overflow),
                Transition::Advance(next) => {
                    transitions += 1;
                    if transitions > limit {
                        return Err(fail(CartError::PipelineError(format!(
                            "more than {limit} step transitions in one run"
                        ))));
                    }
                    state.step_index = next;
                }
            }
        }
    }
}

impl fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEngine").field("steps", &self.steps).finish()
    }
}
