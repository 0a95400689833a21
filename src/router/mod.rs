pub mod path;

pub use path::{Pattern, PatternError, Segment, WILDCARD};

use path::join;

use crate::context::Context;
use crate::error::{ServerError, ServerResult};
use crate::handler::{Handler, IntoReply};
use crate::hooks::{self, AfterHandle, BeforeHandle, Hooks, Transform};
use crate::http::{Method, Response};
use crate::schema::{RouteSchema, Shape};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct Route {
    pub(crate) method: Method,
    pub(crate) pattern: Pattern,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) schema: RouteSchema,
    pub(crate) hooks: Hooks,
}

impl Route {
    pub(crate) async fn handle(&self, ctx: Context) -> ServerResult<Response> {
        hooks::run(&self.hooks, &self.schema, self.handler.as_ref(), ctx).await
    }
}

/// Schemas and route-local hooks for a single route.
///
/// ```rust
/// use vireo::router::RouteOptions;
/// use vireo::schema::{Field, Shape};
///
/// let options = RouteOptions::new()
///     .body(Shape::object([Field::required("name", Shape::String)]));
/// ```
#[derive(Clone, Default, Debug)]
pub struct RouteOptions {
    schema: RouteSchema,
    hooks: Hooks,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, shape: Shape) -> Self {
        self.schema.body = Some(shape);
        self
    }

    pub fn params(mut self, shape: Shape) -> Self {
        self.schema.params = Some(shape);
        self
    }

    pub fn query(mut self, shape: Shape) -> Self {
        self.schema.query = Some(shape);
        self
    }

    pub fn transform(mut self, hook: impl Transform) -> Self {
        self.hooks.transform(hook);
        self
    }

    pub fn before_handle(mut self, hook: impl BeforeHandle) -> Self {
        self.hooks.before_handle(hook);
        self
    }

    pub fn after_handle(mut self, hook: impl AfterHandle) -> Self {
        self.hooks.after_handle(hook);
        self
    }
}

/// Generates `get`/`get_with`-style registration helpers over a `route` method.
macro_rules! route_methods {
    ($($name:ident, $with:ident => $method:ident;)*) => {
        $(
            #[doc = concat!("Registers a `", stringify!($method), "` route. Panics on an invalid pattern.")]
            pub fn $name<F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
            where
                F: Fn($crate::Context) -> Fut + Send + Sync + 'static,
                Fut: std::future::Future + Send + 'static,
                Fut::Output: $crate::handler::IntoReply,
            {
                self.route(
                    $crate::http::Method::$method,
                    pattern,
                    $crate::router::RouteOptions::default(),
                    handler,
                )
            }

            #[doc = concat!("Registers a `", stringify!($method), "` route with schemas and route-local hooks.")]
            pub fn $with<F, Fut>(
                &mut self,
                pattern: &str,
                options: $crate::router::RouteOptions,
                handler: F,
            ) -> &mut Self
            where
                F: Fn($crate::Context) -> Fut + Send + Sync + 'static,
                Fut: std::future::Future + Send + 'static,
                Fut::Output: $crate::handler::IntoReply,
            {
                self.route($crate::http::Method::$method, pattern, options, handler)
            }
        )*
    };
}

pub(crate) use route_methods;

/// An ordered route table. Registration order is match priority.
#[derive(Clone, Default)]
pub struct Router {
    prefix: String,
    hooks: Hooks,
    routes: Vec<Route>,
}

/// A route selected by [`Router::find`] together with its captured parameters.
pub(crate) struct RouteMatch<'a> {
    pub(crate) route: &'a Route,
    pub(crate) params: HashMap<String, String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// A router whose routes all live under `prefix`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            ..Self::default()
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    route_methods! {
        get, get_with => GET;
        post, post_with => POST;
        put, put_with => PUT;
        patch, patch_with => PATCH;
        delete, delete_with => DELETE;
        head, head_with => HEAD;
        options, options_with => OPTIONS;
    }

    /// Registers a route. Panics if `pattern` is invalid.
    pub fn route<F, Fut>(&mut self, method: Method, pattern: &str, options: RouteOptions, handler: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoReply,
    {
        match self.try_route(method, pattern, options, handler) {
            Ok(router) => router,
            Err(err) => panic!("invalid route: {err}"),
        }
    }

    pub fn try_route<F, Fut>(
        &mut self,
        method: Method,
        pattern: &str,
        options: RouteOptions,
        handler: F,
    ) -> Result<&mut Self, PatternError>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoReply,
    {
        let pattern = Pattern::compile(&join(&self.prefix, pattern))?;
        self.routes.push(Route {
            method,
            pattern,
            handler: Arc::new(handler),
            schema: options.schema,
            hooks: self.hooks.then(&options.hooks),
        });
        Ok(self)
    }

    /// Adds a `transform` hook for every route registered after this call.
    pub fn on_transform(&mut self, hook: impl Transform) -> &mut Self {
        self.hooks.transform(hook);
        self
    }

    pub fn on_before_handle(&mut self, hook: impl BeforeHandle) -> &mut Self {
        self.hooks.before_handle(hook);
        self
    }

    pub fn on_after_handle(&mut self, hook: impl AfterHandle) -> &mut Self {
        self.hooks.after_handle(hook);
        self
    }

    /// Registers routes under `prefix`. Hooks added inside the group stay inside it.
    pub fn group<F>(&mut self, prefix: &str, build: F) -> &mut Self
    where
        F: FnOnce(&mut Router),
    {
        let mut group = Router {
            prefix: join(&self.prefix, prefix),
            hooks: self.hooks.clone(),
            routes: Vec::new(),
        };
        build(&mut group);
        self.routes.append(&mut group.routes);
        self
    }

    /// Appends `router`'s routes under `prefix`, behind this router's scoped hooks.
    pub fn mount(&mut self, prefix: &str, router: Router) -> &mut Self {
        let prefix = join(&self.prefix, prefix);
        for route in router.routes {
            let pattern = match route.pattern.prefixed(&prefix) {
                Ok(pattern) => pattern,
                Err(err) => panic!("invalid mount prefix: {err}"),
            };
            self.routes.push(Route {
                pattern,
                hooks: self.hooks.then(&route.hooks),
                ..route
            });
        }
        self
    }

    /// Registered routes as `(method, pattern)` in match order.
    pub fn routes(&self) -> impl Iterator<Item = (Method, &str)> {
        self.routes.iter().map(|route| (route.method, route.pattern.as_str()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First route matching both `method` and `path`.
    ///
    /// `HEAD` falls back to the first matching `GET`. A path that matches only
    /// under other methods yields `MethodNotAllowed`.
    pub(crate) fn find(&self, method: Method, path: &str) -> ServerResult<RouteMatch<'_>> {
        let mut allowed: Vec<Method> = Vec::new();
        let mut head_fallback = None;

        for route in &self.routes {
            let Some(params) = route.pattern.matches(path) else {
                continue;
            };
            if route.method == method {
                return Ok(RouteMatch { route, params });
            }
            if method == Method::HEAD && route.method == Method::GET && head_fallback.is_none() {
                head_fallback = Some(RouteMatch { route, params });
            } else if !allowed.contains(&route.method) {
                allowed.push(route.method);
            }
        }

        match head_fallback {
            Some(found) => Ok(found),
            None if allowed.is_empty() => Err(ServerError::RouteNotFound),
            None => Err(ServerError::MethodNotAllowed { allowed }),
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("prefix", &self.prefix)
            .field("hooks", &self.hooks)
            .field("routes", &self.routes().collect::<Vec<_>>())
            .finish()
    }
}
