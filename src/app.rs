//! Application is the main entry point for a vireo server.
//!
//! It owns the route table, the shared [`Store`], decorations and the global
//! hooks. Everything is registered up front; [`Application::listen`] and
//! [`Application::serve`] consume the application, so the table cannot change
//! once requests are flowing.
//!
//! # Examples
//!
//! ```rust
//! use vireo::app::Application;
//! use vireo::{json, Context};
//!
//! let mut app = Application::new();
//! app.get("/", |_| async { "Hello Vireo" });
//! app.get("/product/:id", |ctx: Context| async move {
//!     json!({ "id": ctx.param("id") })
//! });
//! ```

use crate::context::Context;
use crate::error::{ServerError, ServerResult};
use crate::hooks::{AfterHandle, BeforeHandle, OnRequest, Transform};
use crate::http::codec;
use crate::http::{Method, Request, Response};
use crate::router::{route_methods, PatternError, RouteOptions, Router};
use crate::state::{Decorations, Store};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

type ErrorHandler = Arc<dyn Fn(ServerError) -> Response + Send + Sync>;

/// Limits and timeouts for the serving loop.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_connections: usize,
    /// How long an idle keep-alive connection waits for its next request.
    pub keep_alive: Duration,
    pub max_body_size: usize,
    /// Upper bound for reading one request once its first line arrived.
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 256,
            keep_alive: Duration::from_secs(5),
            max_body_size: 10 * 1024 * 1024,
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// The main application struct that represents your web server.
///
/// Another `Application` can be merged in as a plugin with [`Application::use_plugin`]:
///
/// ```rust
/// use vireo::app::Application;
///
/// let mut v2 = Application::with_prefix("/v2");
/// v2.state("plugin-version", 2);
/// v2.get("/hi", |_| async { "hi from v2" });
///
/// let mut app = Application::new();
/// app.state("version", 1);
/// app.use_plugin(v2);
/// ```
#[derive(Clone, Default)]
pub struct Application {
    config: ServerConfig,
    router: Router,
    store: Store,
    decorations: Decorations,
    on_request: Vec<Arc<dyn OnRequest>>,
    on_error: Option<ErrorHandler>,
}

impl Application {
    pub fn new() -> Self {
        Self::default()
    }

    /// An application whose own routes all live under `prefix`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            router: Router::with_prefix(prefix),
            ..Self::default()
        }
    }

    pub fn max_connections(&mut self, max_connections: usize) -> &mut Self {
        self.config.max_connections = max_connections;
        self
    }

    pub fn keep_alive(&mut self, keep_alive: Duration) -> &mut Self {
        self.config.keep_alive = keep_alive;
        self
    }

    pub fn max_body_size(&mut self, max_body_size: usize) -> &mut Self {
        self.config.max_body_size = max_body_size;
        self
    }

    pub fn read_timeout(&mut self, read_timeout: Duration) -> &mut Self {
        self.config.read_timeout = read_timeout;
        self
    }

    pub fn config(&mut self, config: ServerConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn server_config(&self) -> &ServerConfig {
        &self.config
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

    /// Registers a route for any method. Panics if `pattern` is invalid.
    pub fn route<F, Fut>(&mut self, method: Method, pattern: &str, options: RouteOptions, handler: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: crate::handler::IntoReply,
    {
        self.router.route(method, pattern, options, handler);
        self
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
        Fut::Output: crate::handler::IntoReply,
    {
        self.router.try_route(method, pattern, options, handler)?;
        Ok(self)
    }

    /// Runs `hook` for every request before route matching, including ones that end in 404.
    pub fn on_request(&mut self, hook: impl OnRequest) -> &mut Self {
        self.on_request.push(Arc::new(hook));
        self
    }

    pub fn on_transform(&mut self, hook: impl Transform) -> &mut Self {
        self.router.on_transform(hook);
        self
    }

    pub fn on_before_handle(&mut self, hook: impl BeforeHandle) -> &mut Self {
        self.router.on_before_handle(hook);
        self
    }

    pub fn on_after_handle(&mut self, hook: impl AfterHandle) -> &mut Self {
        self.router.on_after_handle(hook);
        self
    }

    /// Replaces the default JSON error mapping for every error kind.
    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(ServerError) -> Response + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn group<F>(&mut self, prefix: &str, build: F) -> &mut Self
    where
        F: FnOnce(&mut Router),
    {
        self.router.group(prefix, build);
        self
    }

    pub fn mount(&mut self, prefix: &str, router: Router) -> &mut Self {
        self.router.mount(prefix, router);
        self
    }

    /// Inserts or overwrites a store entry.
    pub fn state(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.store.set(key, value);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Attaches a named value, reachable from every context through [`Context::decorator`].
    pub fn decorate<T>(&mut self, name: impl Into<String>, value: T) -> &mut Self
    where
        T: Send + Sync + 'static,
    {
        self.decorations.insert(name, value);
        self
    }

    pub fn decorations(&self) -> &Decorations {
        &self.decorations
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Merges `plugin` into this application.
    ///
    /// Routes are appended behind this application's prefix and scoped hooks.
    /// Store entries and decorations are only taken when the key is still free.
    /// Request hooks are appended. This application's error handler is kept when set.
    pub fn use_plugin(&mut self, plugin: Application) -> &mut Self {
        debug!(
            routes = plugin.router.len(),
            state = plugin.store.len(),
            decorations = plugin.decorations.len(),
            "merging plugin"
        );
        self.router.mount("", plugin.router);
        self.store.merge_absent(&plugin.store);
        self.decorations.merge_absent(&plugin.decorations);
        self.on_request.extend(plugin.on_request);
        if self.on_error.is_none() {
            self.on_error = plugin.on_error;
        }
        self
    }

    /// Runs one request through the application without any I/O.
    ///
    /// Errors and panics are mapped to responses here, so this never fails.
    pub async fn handle(&self, request: Request) -> Response {
        let method = request.method;
        let result = match AssertUnwindSafe(self.dispatch(request)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic);
                error!(%message, "request handler panicked");
                Err(ServerError::Panic(message))
            }
        };

        let mut response = match result {
            Ok(response) => response,
            Err(err) => self.handle_error(err),
        };
        if method == Method::HEAD {
            response.body.clear();
        }
        response
    }

    async fn dispatch(&self, request: Request) -> ServerResult<Response> {
        let mut ctx = Context::new(request, self.store.clone(), self.decorations.clone());
        for hook in &self.on_request {
            hook.on_request(&ctx).await;
        }

        let found = self.router.find(ctx.method, &ctx.path)?;
        ctx.bind(found.route.pattern.as_str(), found.params);
        ctx.parse_body(self.config.max_body_size)?;
        found.route.handle(ctx).await
    }

    fn handle_error(&self, err: ServerError) -> Response {
        if err.status_code() >= 500 {
            error!(error = %err, "request failed");
        }
        match &self.on_error {
            Some(handler) => handler(err),
            None => Response::error(&err),
        }
    }

    /// Starts the HTTP server on its own tokio runtime and blocks.
    ///
    /// # Arguments
    /// * `addr` - Address to listen on (e.g. "127.0.0.1:3000")
    pub fn listen(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
        let runtime = Runtime::new()?;
        runtime.block_on(async move {
            let listener = TcpListener::bind(addr).await?;
            self.serve(listener).await
        })?;
        Ok(())
    }

    /// Serves connections from `listener` until the task is dropped.
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        let addr = listener.local_addr()?;
        info!(host = %addr.ip(), port = addr.port(), "listening");

        let permits = Arc::new(Semaphore::new(self.config.max_connections));
        let app = Arc::new(self);
        loop {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                return Ok(());
            };
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    continue;
                }
            };

            let app = Arc::clone(&app);
            tokio::spawn(async move {
                if let Err(err) = app.handle_connection(stream).await {
                    warn!(%peer, error = %err, "connection error");
                }
                drop(permit);
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> ServerResult<()> {
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        loop {
            let incoming = match codec::read_request(&mut reader, &self.config).await {
                Ok(Some(incoming)) => incoming,
                Ok(None) => return Ok(()),
                Err(err) => {
                    let response = self.handle_error(err);
                    return codec::write_response(&mut writer, &response, false).await;
                }
            };

            let started = Instant::now();
            let method = incoming.request.method;
            let path = incoming.request.path.clone();
            let response = tokio::select! {
                biased;
                response = self.handle(incoming.request) => response,
                _ = connection_lost(&mut reader) => {
                    debug!(%method, %path, "connection lost, request cancelled");
                    return Ok(());
                }
            };
            debug!(
                %method,
                %path,
                status = response.status,
                elapsed = ?started.elapsed(),
                "request handled"
            );

            codec::write_response(&mut writer, &response, incoming.keep_alive).await?;
            if !incoming.keep_alive {
                return Ok(());
            }
        }
    }
}

/// Resolves once reading from the peer fails, as after a reset.
/// A clean EOF is a half-close and stays pending, as do pipelined bytes.
async fn connection_lost<R: AsyncBufRead + Unpin>(reader: &mut R) {
    if reader.fill_buf().await.is_ok() {
        std::future::pending::<()>().await;
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
