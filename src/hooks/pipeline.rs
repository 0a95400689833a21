use super::Hooks;
use crate::context::Context;
use crate::error::ServerResult;
use crate::handler::{Handler, Reply};
use crate::http::Response;
use crate::schema::RouteSchema;
use tracing::debug;

/// Drives one matched request from `transform` through `afterHandle`.
///
/// The first error from any stage aborts the run and is returned to the caller.
pub(crate) async fn run(
    hooks: &Hooks,
    schema: &RouteSchema,
    handler: &dyn Handler,
    mut ctx: Context,
) -> ServerResult<Response> {
    for hook in &hooks.transform {
        hook.transform(&mut ctx).await?;
    }

    schema.apply(&mut ctx)?;

    for hook in &hooks.before_handle {
        if let Some(reply) = hook.before_handle(&mut ctx).await? {
            debug!(path = %ctx.path, "request answered by beforeHandle hook");
            return Ok(reply.into_response(&ctx.set));
        }
    }

    let mut reply: Reply = handler.handle(ctx.clone()).await?;

    for hook in &hooks.after_handle {
        reply = hook.after_handle(&ctx, reply).await?;
    }

    Ok(reply.into_response(&ctx.set))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use crate::schema::{Field, Shape};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn echo_body() -> impl Handler {
        |ctx: Context| async move { ctx.body }
    }

    #[tokio::test]
    async fn transform_runs_before_validation() {
        let mut hooks = Hooks::new();
        hooks.transform(|ctx: &mut Context| {
            let id = ctx.param("id").and_then(|id| id.parse::<i64>().ok());
            if let Some(id) = id {
                ctx.params.insert("id".into(), json!(id));
            }
            Ok(())
        });
        let schema = RouteSchema {
            params: Some(Shape::object([Field::required("id", Shape::Integer)])),
            ..RouteSchema::default()
        };
        let handler = |ctx: Context| async move { ctx.params["id"].clone() };

        let mut ctx = Context::for_test();
        ctx.params.insert("id".into(), json!("42"));
        let response = run(&hooks, &schema, &handler, ctx).await.unwrap();
        assert_eq!(response.json_body(), Some(json!(42)));
    }

    #[tokio::test]
    async fn failed_validation_skips_everything_after() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut hooks = Hooks::new();
        let seen = Arc::clone(&calls);
        hooks.before_handle(move |_ctx: &mut Context| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        });
        let schema = RouteSchema {
            body: Some(Shape::object([Field::required("name", Shape::String)])),
            ..RouteSchema::default()
        };

        let mut ctx = Context::for_test();
        ctx.body = json!({"name": 5});
        let err = run(&hooks, &schema, &echo_body(), ctx).await.unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn before_handle_short_circuits_handler_and_after_handle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut hooks = Hooks::new();
        hooks.before_handle(|ctx: &mut Context| {
            ctx.set.status(401);
            Ok(Some(Reply::text("denied")))
        });
        let seen = Arc::clone(&calls);
        hooks.after_handle(move |_ctx: &Context, reply: Reply| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(reply)
        });
        let handled = Arc::clone(&calls);
        let handler = move |_ctx: Context| {
            handled.fetch_add(1, Ordering::SeqCst);
            async { "handled" }
        };

        let response = run(&hooks, &RouteSchema::default(), &handler, Context::for_test())
            .await
            .unwrap();
        assert_eq!(response.status, 401);
        assert_eq!(response.text_body(), "denied");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn after_handle_hooks_chain_in_order() {
        let mut hooks = Hooks::new();
        hooks
            .after_handle(|_ctx: &Context, reply: Reply| {
                let text = reply.as_text().unwrap_or_default().to_string();
                Ok(Reply::text(format!("{text}-a")))
            })
            .after_handle(|_ctx: &Context, reply: Reply| {
                let text = reply.as_text().unwrap_or_default().to_string();
                Ok(Reply::text(format!("{text}-b")))
            });
        let handler = |_ctx: Context| async { "base" };

        let response = run(&hooks, &RouteSchema::default(), &handler, Context::for_test())
            .await
            .unwrap();
        assert_eq!(response.text_body(), "base-a-b");
    }

    #[tokio::test]
    async fn handler_status_survives_after_handle() {
        let mut hooks = Hooks::new();
        hooks.after_handle(|_ctx: &Context, reply: Reply| {
            let mut value = reply.as_json().cloned().unwrap_or(Value::Null);
            value["wrapped"] = json!(true);
            Ok(Reply::Json(value))
        });
        let handler = |ctx: Context| async move {
            ctx.set.status(201);
            json!({"id": 1})
        };

        let response = run(&hooks, &RouteSchema::default(), &handler, Context::for_test())
            .await
            .unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.json_body(), Some(json!({"id": 1, "wrapped": true})));
    }
}
