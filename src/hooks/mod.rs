//! Request lifecycle hooks.
//!
//! Per request the stages run in a fixed order:
//!
//! 1. `request`: global, observational, before route matching
//! 2. `transform`: may rewrite params/query/body before validation
//! 3. schema validation
//! 4. `beforeHandle`: returning `Some(reply)` short-circuits the rest
//! 5. the handler
//! 6. `afterHandle`: may replace the reply
//!
//! Synchronous closures implement the hook traits directly. A hook that needs
//! to await implements the trait on its own type:
//!
//! ```rust
//! use vireo::hooks::BeforeHandle;
//! use vireo::{Context, Reply, ServerError, ServerResult};
//! use futures::future::BoxFuture;
//!
//! struct RequireToken;
//!
//! impl BeforeHandle for RequireToken {
//!     fn before_handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServerResult<Option<Reply>>> {
//!         Box::pin(async move {
//!             match ctx.header("authorization") {
//!                 Some(token) if token.starts_with("Bearer ") => Ok(None),
//!                 _ => Err(ServerError::Unauthorized("token required".into())),
//!             }
//!         })
//!     }
//! }
//! ```

mod pipeline;

pub(crate) use pipeline::run;

use crate::context::Context;
use crate::error::ServerResult;
use crate::handler::Reply;
use futures::future::{self, BoxFuture};
use std::sync::Arc;

/// Runs for every incoming request before matching. Cannot alter the outcome.
pub trait OnRequest: Send + Sync + 'static {
    fn on_request<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, ()>;
}

impl<F> OnRequest for F
where
    F: Fn(&Context) + Send + Sync + 'static,
{
    fn on_request<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, ()> {
        (self)(ctx);
        Box::pin(future::ready(()))
    }
}

/// Mutates the context in place before validation.
pub trait Transform: Send + Sync + 'static {
    fn transform<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServerResult<()>>;
}

impl<F> Transform for F
where
    F: Fn(&mut Context) -> ServerResult<()> + Send + Sync + 'static,
{
    fn transform<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServerResult<()>> {
        Box::pin(future::ready((self)(ctx)))
    }
}

/// Runs after validation. `Ok(Some(reply))` becomes the response and the handler is skipped.
pub trait BeforeHandle: Send + Sync + 'static {
    fn before_handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServerResult<Option<Reply>>>;
}

impl<F> BeforeHandle for F
where
    F: Fn(&mut Context) -> ServerResult<Option<Reply>> + Send + Sync + 'static,
{
    fn before_handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServerResult<Option<Reply>>> {
        Box::pin(future::ready((self)(ctx)))
    }
}

/// Post-processes the handler's reply.
pub trait AfterHandle: Send + Sync + 'static {
    fn after_handle<'a>(&'a self, ctx: &'a Context, reply: Reply) -> BoxFuture<'a, ServerResult<Reply>>;
}

impl<F> AfterHandle for F
where
    F: Fn(&Context, Reply) -> ServerResult<Reply> + Send + Sync + 'static,
{
    fn after_handle<'a>(&'a self, ctx: &'a Context, reply: Reply) -> BoxFuture<'a, ServerResult<Reply>> {
        Box::pin(future::ready((self)(ctx, reply)))
    }
}

/// Ordered hook lists for the per-route stages.
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) transform: Vec<Arc<dyn Transform>>,
    pub(crate) before_handle: Vec<Arc<dyn BeforeHandle>>,
    pub(crate) after_handle: Vec<Arc<dyn AfterHandle>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transform(&mut self, hook: impl Transform) -> &mut Self {
        self.transform.push(Arc::new(hook));
        self
    }

    pub fn before_handle(&mut self, hook: impl BeforeHandle) -> &mut Self {
        self.before_handle.push(Arc::new(hook));
        self
    }

    pub fn after_handle(&mut self, hook: impl AfterHandle) -> &mut Self {
        self.after_handle.push(Arc::new(hook));
        self
    }

    /// Appends `other`'s hooks after this set's, stage by stage.
    pub fn append(&mut self, other: &Hooks) -> &mut Self {
        self.transform.extend(other.transform.iter().cloned());
        self.before_handle.extend(other.before_handle.iter().cloned());
        self.after_handle.extend(other.after_handle.iter().cloned());
        self
    }

    /// A new set with this set's hooks first and `other`'s after.
    pub fn then(&self, other: &Hooks) -> Hooks {
        let mut hooks = self.clone();
        hooks.append(other);
        hooks
    }

    pub fn len(&self) -> usize {
        self.transform.len() + self.before_handle.len() + self.after_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("transform", &self.transform.len())
            .field("before_handle", &self.before_handle.len())
            .field("after_handle", &self.after_handle.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn then_keeps_stage_order() {
        let mut outer = Hooks::new();
        outer.transform(|_ctx: &mut Context| Ok(()));
        let mut inner = Hooks::new();
        inner
            .transform(|_ctx: &mut Context| Ok(()))
            .before_handle(|_ctx: &mut Context| Ok(None))
            .after_handle(|_ctx: &Context, reply: Reply| Ok(reply));

        let combined = outer.then(&inner);
        assert_eq!(combined.transform.len(), 2);
        assert!(Arc::ptr_eq(&combined.transform[0], &outer.transform[0]));
        assert_eq!(combined.len(), 4);
        assert_eq!(outer.len(), 1);
    }
}
