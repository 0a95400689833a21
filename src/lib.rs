//! # Vireo
//!
//! A small embeddable HTTP routing and request-pipeline engine.
//!
//! ## Features
//!
//! - Express-style routing with `:params` and trailing `*` wildcards
//! - Lifecycle hooks: `request`, `transform`, `beforeHandle`, `afterHandle`
//! - Schema validation for params, query, body and uploaded files
//! - A shared application store and named decorations
//! - Route groups, mounted routers and plugins
//! - JSON, form and multipart bodies
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vireo::app::Application;
//! use vireo::Context;
//!
//! fn main() {
//!     vireo::init_tracing();
//!
//!     let mut app = Application::new();
//!     app.get("/", |_| async { "Hello Vireo" });
//!     app.get("/product/:id", |ctx: Context| async move {
//!         vireo::json!({ "id": ctx.param("id") })
//!     });
//!
//!     app.listen("127.0.0.1:3000").unwrap();
//! }
//! ```
//!
//! ## Hooks and schemas
//!
//! ```rust
//! use vireo::app::Application;
//! use vireo::router::RouteOptions;
//! use vireo::schema::{Field, Shape};
//! use vireo::{Context, Reply, ServerError};
//!
//! let mut app = Application::new();
//! app.on_before_handle(|ctx: &mut Context| match ctx.header("x-api-key") {
//!     Some(_) => Ok(None),
//!     None => Err(ServerError::Unauthorized("missing api key".into())),
//! });
//! app.post_with(
//!     "/create",
//!     RouteOptions::new().body(Shape::object([
//!         Field::required("name", Shape::String),
//!         Field::required("age", Shape::Number),
//!     ])),
//!     |ctx: Context| async move { Reply::Json(ctx.body) },
//! );
//! ```

pub mod app;
pub mod context;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod http;
pub mod router;
pub mod schema;
pub mod state;
pub extern crate serde_json;

pub use app::{Application, ServerConfig};
pub use context::{Context, ResponseControl};
pub use error::{ServerError, ServerResult};
pub use handler::{IntoReply, Reply};
pub use router::{RouteOptions, Router};

// Reexport serde_json
pub use serde_json::{json, Value};

/// Installs a `tracing` subscriber that logs to stderr, filtered by `RUST_LOG` (default `info`).
///
/// Does nothing when a global subscriber is already set.
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
