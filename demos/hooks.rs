//! Lifecycle hooks and route groups.
//!
//! ```text
//! curl localhost:3000/id/7
//! curl localhost:3000/admin/stats                    # 401
//! curl -H 'authorization: Bearer t' localhost:3000/admin/stats
//! ```

use futures::future::BoxFuture;
use std::time::Duration;
use vireo::hooks::BeforeHandle;
use vireo::router::RouteOptions;
use vireo::schema::{Field, Shape};
use vireo::{json, Application, Context, Reply, ServerError, ServerResult};

/// Checks the bearer token after a simulated lookup.
struct RequireToken;

impl BeforeHandle for RequireToken {
    fn before_handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ServerResult<Option<Reply>>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            match ctx.header("authorization") {
                Some(token) if token.starts_with("Bearer ") => Ok(None),
                _ => Err(ServerError::Unauthorized("bearer token required".into())),
            }
        })
    }
}

fn main() {
    vireo::init_tracing();

    let mut app = Application::new();
    app.state("requests", 0);

    app.on_request(|ctx: &Context| {
        ctx.store.update("requests", |count| {
            *count = json!(count.as_u64().unwrap_or(0) + 1);
        });
    });

    app.on_after_handle(|ctx: &Context, reply: Reply| {
        ctx.set.header("X-Powered-By", "vireo");
        Ok(reply)
    });

    app.get_with(
        "/id/:id",
        RouteOptions::new()
            .transform(|ctx: &mut Context| -> ServerResult<()> {
                let id: i64 = ctx
                    .param("id")
                    .unwrap_or_default()
                    .parse()
                    .map_err(|_| ServerError::BadRequest("id must be a number".into()))?;
                ctx.params.insert("id".into(), json!(id));
                Ok(())
            })
            .params(Shape::object([Field::required("id", Shape::Integer)])),
        |ctx: Context| async move { ctx.params["id"].clone() },
    );

    app.group("/admin", |admin| {
        admin.on_before_handle(RequireToken);
        admin.get("/stats", |ctx: Context| async move {
            json!({ "requests": ctx.store.get("requests") })
        });
    });

    app.listen("127.0.0.1:3000")
        .expect("Server failed to start");
}
