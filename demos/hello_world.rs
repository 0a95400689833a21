//! A minimal vireo server with a versioned plugin.
//!
//! Try:
//! - `curl localhost:3000/`
//! - `curl localhost:3000/product/42`
//! - `curl localhost:3000/user/any/nested/path`
//! - `curl localhost:3000/plugin`
//! - `curl localhost:3000/v2/hi`

use vireo::{Application, Context};

fn plugin() -> Application {
    let mut plugin = Application::new();
    plugin.state("plugin-version", 1);
    plugin.get("/plugin", |ctx: Context| async move {
        format!("Plugin version: {}", ctx.store.get("plugin-version").unwrap_or_default())
    });
    plugin
}

fn v2() -> Application {
    let mut v2 = Application::with_prefix("/v2");
    v2.get("/hi", |_| async { "Hi from v2" });
    v2
}

fn main() {
    vireo::init_tracing();

    let mut app = Application::new();
    app.get("/", |_| async { "Hello Vireo" })
        .get("/hello", |_| async { "Hello World" })
        .get("/product/:id", |ctx: Context| async move {
            format!("Product {}", ctx.param("id").unwrap_or_default())
        })
        .get("/user/*", |_| async { "User is here" });

    app.use_plugin(plugin()).use_plugin(v2());

    app.listen("127.0.0.1:3000")
        .expect("Server failed to start");
}
