use super::locks::CartLocks;
use super::processors::Processors;
use crate::config::CartConfig;
use crate::domain::cart::{Actor, Cart, CartStatus};
use crate::domain::item::{Item, ItemFields, ItemMatch};
use crate::domain::ports::{SharedCartStore, SharedResolver, SharedSessionStore};
use crate::domain::processor::{ProcessorRecord, ProcessorSelector};
use crate::domain::reference::{DomainRef, Refs};
use crate::domain::session::{FormArgs, SessionId, SessionState};
use crate::domain::view::View;
use crate::error::{CartError, Result};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, instrument, warn};

/// Who is asking: the session key and, when logged in, the user.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub session: SessionId,
    pub actor: Option<Actor>,
}

impl RequestContext {
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: SessionId::new(session),
            actor: None,
        }
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }
}

/// Entry points the front end uses to read and mutate the session's cart.
///
/// Every mutation runs under the cart's lock: reload, change, refresh, store.
pub struct CartService {
    carts: SharedCartStore,
    sessions: SharedSessionStore,
    resolver: SharedResolver,
    processors: Arc<Processors>,
    locks: Arc<CartLocks>,
    config: Arc<CartConfig>,
}

impl CartService {
    pub fn new(
        carts: SharedCartStore,
        sessions: SharedSessionStore,
        resolver: SharedResolver,
        processors: Arc<Processors>,
        config: Arc<CartConfig>,
    ) -> Self {
        Self {
            carts,
            sessions,
            resolver,
            processors,
            locks: Arc::new(CartLocks::new()),
            config,
        }
    }

    pub fn carts(&self) -> &SharedCartStore {
        &self.carts
    }

    pub fn sessions(&self) -> &SharedSessionStore {
        &self.sessions
    }

    pub fn processors(&self) -> &Arc<Processors> {
        &self.processors
    }

    pub fn locks(&self) -> &Arc<CartLocks> {
        &self.locks
    }

    pub fn config(&self) -> &CartConfig {
        &self.config
    }

    /// Resolves the cart's reference and every item's product and reference.
    ///
    /// Lookups that fail are logged and skipped; reconciliation then works with
    /// whatever is already stored on the items.
    pub async fn resolve_refs(&self, cart: &Cart) -> Refs {
        let mut refs = Refs::new();
        let keys: Vec<DomainRef> = cart
            .reference
            .iter()
            .chain(cart.items.iter().flat_map(|i| i.product.iter().chain(i.reference.iter())))
            .cloned()
            .collect();
        for key in &keys {
            self.resolve_into(&mut refs, key).await;
        }
        refs
    }

    async fn resolve_into(&self, refs: &mut Refs, key: &DomainRef) {
        if refs.contains(key) {
            return;
        }
        match self.resolver.resolve(key).await {
            Ok(Some(reference)) => refs.insert(key.clone(), reference),
            Ok(None) => warn!(%key, "Reference not found"),
            Err(e) => warn!(%key, "Reference lookup failed: {e}"),
        }
    }

    /// Recomputes derived fields and persists. The caller must hold the cart's lock.
    pub async fn save(&self, cart: &mut Cart, actor: Option<&Actor>, refs: &Refs) -> Result<()> {
        cart.refresh(actor, refs);
        self.carts.store(cart.clone()).await
    }

    /// Returns the session's pending cart, creating and binding a new one if needed.
    #[instrument(skip(self), fields(session = %ctx.session))]
    pub async fn get_or_create_cart(&self, ctx: &RequestContext) -> Result<Cart> {
        let (_guard, cart) = self.lock_current(ctx).await?;
        Ok(cart)
    }

    /// The bound pending cart, without creating one.
    pub async fn current_cart(&self, ctx: &RequestContext) -> Result<Option<Cart>> {
        let session = self.sessions.load(&ctx.session).await?;
        let Some(id) = session.cart_id else {
            return Ok(None);
        };
        Ok(self
            .carts
            .get(id)
            .await?
            .filter(|cart| cart.status == CartStatus::Pending))
    }

    /// Locks the session's pending cart, creating and binding a new one if needed.
    ///
    /// The returned cart was read and found pending under the returned guard, so
    /// it stays pending until the guard is dropped.
    pub async fn lock_current(&self, ctx: &RequestContext) -> Result<(OwnedMutexGuard<()>, Cart)> {
        let session = self.sessions.load(&ctx.session).await?;
        if let Some(id) = session.cart_id {
            let guard = self.locks.acquire(id).await;
            if let Some(mut cart) = self.carts.get(id).await?
                && cart.status == CartStatus::Pending
            {
                let refs = self.resolve_refs(&cart).await;
                self.save(&mut cart, ctx.actor.as_ref(), &refs).await?;
                return Ok((guard, cart));
            }
        }

        let mut cart = Cart::new(self.config.requires_login, &self.config.continue_shopping_url);
        let guard = self.locks.acquire(cart.id).await;
        self.save(&mut cart, ctx.actor.as_ref(), &Refs::new()).await?;
        let mut session = self.sessions.load(&ctx.session).await?;
        session.bind_cart(cart.id);
        session.permanent = self.config.permanent_session;
        self.sessions.store(&ctx.session, session).await?;
        info!(cart = %cart.id, "Created cart");
        Ok((guard, cart))
    }

    #[instrument(skip(self, fields), fields(session = %ctx.session))]
    pub async fn set_item(&self, ctx: &RequestContext, fields: ItemFields) -> Result<Option<Item>> {
        let (_guard, mut cart) = self.lock_current(ctx).await?;
        let mut refs = self.resolve_refs(&cart).await;
        if let Some(product) = &fields.product {
            self.resolve_into(&mut refs, &DomainRef::product(product)).await;
        }
        let item = cart.set_item(&fields, &refs);
        self.save(&mut cart, ctx.actor.as_ref(), &refs).await?;
        Ok(item)
    }

    #[instrument(skip(self), fields(session = %ctx.session))]
    pub async fn remove_item(&self, ctx: &RequestContext, criteria: ItemMatch) -> Result<usize> {
        let (_guard, mut cart) = self.lock_current(ctx).await?;
        let refs = self.resolve_refs(&cart).await;
        let removed = cart.remove_items(&criteria, &refs);
        self.save(&mut cart, ctx.actor.as_ref(), &refs).await?;
        Ok(removed)
    }

    #[instrument(skip(self), fields(session = %ctx.session))]
    pub async fn set_processor(
        &self,
        ctx: &RequestContext,
        selector: Option<ProcessorSelector>,
    ) -> Result<ProcessorRecord> {
        let (_guard, mut cart) = self.lock_current(ctx).await?;
        let record = self.assign_processor(&mut cart, selector).await?;
        let refs = self.resolve_refs(&cart).await;
        self.save(&mut cart, ctx.actor.as_ref(), &refs).await?;
        Ok(record)
    }

    /// Points the cart at the selected processor, keeping the current one (or the
    /// default when there is none) if nothing is selected. Does not persist.
    pub async fn assign_processor(
        &self,
        cart: &mut Cart,
        selector: Option<ProcessorSelector>,
    ) -> Result<ProcessorRecord> {
        let record = match (selector, cart.processor) {
            (Some(selector), _) => self.processors.resolve(selector).await?,
            (None, Some(id)) => match self.processors.get(id).await? {
                Some(record) => record,
                None => self.processors.default_processor().await?,
            },
            (None, None) => self.processors.default_processor().await?,
        };
        if cart.processor != Some(record.id) {
            cart.add_log(format!("processor set to {}", record.identifier));
        }
        cart.processor = Some(record.id);
        Ok(record)
    }

    #[instrument(skip(self), fields(session = %ctx.session))]
    pub async fn set_status(&self, ctx: &RequestContext, status: CartStatus) -> Result<()> {
        let (_guard, mut cart) = self.lock_current(ctx).await?;
        let refs = self.resolve_refs(&cart).await;
        cart.set_status(status, &refs);
        self.save(&mut cart, ctx.actor.as_ref(), &refs).await
    }

    /// Returns whether the value parsed. Invalid values are logged on the cart.
    #[instrument(skip(self), fields(session = %ctx.session))]
    pub async fn set_tax(&self, ctx: &RequestContext, raw: &str) -> Result<bool> {
        let (_guard, mut cart) = self.lock_current(ctx).await?;
        let refs = self.resolve_refs(&cart).await;
        let parsed = cart.set_tax(raw, &refs);
        self.save(&mut cart, ctx.actor.as_ref(), &refs).await?;
        Ok(parsed)
    }

    /// Validates and processes the session's cart with its processor.
    #[instrument(skip(self, args), fields(session = %ctx.session))]
    pub async fn checkout(
        &self,
        ctx: &RequestContext,
        selector: Option<ProcessorSelector>,
        args: FormArgs,
    ) -> Result<View> {
        let (_guard, mut cart) = self.lock_current(ctx).await?;
        let mut session = self.sessions.load(&ctx.session).await?;
        self.checkout_locked(ctx, &mut cart, &mut session, selector, args)
            .await
    }

    /// Checkout body for callers already holding the cart lock.
    ///
    /// On success the cart is `checked_out`, stored, and unbound from the session,
    /// which is stored too.
    pub async fn checkout_locked(
        &self,
        ctx: &RequestContext,
        cart: &mut Cart,
        session: &mut SessionState,
        selector: Option<ProcessorSelector>,
        args: FormArgs,
    ) -> Result<View> {
        let refs = self.resolve_refs(cart).await;
        let record = self.assign_processor(cart, selector).await?;
        cart.refresh(ctx.actor.as_ref(), &refs);

        let mut processor = self.processors.instance(&record, Some(cart), args)?;

        if !processor.validate(cart).await? {
            cart.add_log(format!("checkout did not validate with {}", record.identifier));
            self.save(cart, ctx.actor.as_ref(), &refs).await?;
            return Err(CartError::CheckoutValidation(format!(
                "cart {} did not validate with processor '{}'",
                cart.id, record.identifier
            )));
        }

        let view = match processor.process(cart).await {
            Ok(view) => view,
            Err(e) => {
                cart.add_log(format!("checkout failed with {}: {e}", record.identifier));
                self.save(cart, ctx.actor.as_ref(), &refs).await?;
                return Err(e);
            }
        };

        cart.set_status(CartStatus::CheckedOut, &refs);
        self.save(cart, ctx.actor.as_ref(), &refs).await?;

        session.unbind_cart();
        session.clear_pipeline();
        self.sessions.store(&ctx.session, session.clone()).await?;
        info!(cart = %cart.id, processor = %record.identifier, "Cart checked out");
        Ok(view)
    }
}
