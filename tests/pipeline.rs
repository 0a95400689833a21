use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vireo::http::{Method, Request, Response};
use vireo::router::RouteOptions;
use vireo::schema::{Field, FileShape, Shape};
use vireo::{json, Application, Context, Reply, ServerError, ServerResult, Value};

fn get(path: &str) -> Request {
    Request::new(Method::GET, path)
}

fn multipart(fields: &[(&str, Option<&str>, &str)]) -> Request {
    let mut body = Vec::new();
    for (name, filename, data) in fields {
        body.extend_from_slice(b"--BOUNDARY\r\n");
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
            }
        }
        body.extend_from_slice(data.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(b"--BOUNDARY--\r\n");
    Request::new(Method::POST, "/upload").with_body("multipart/form-data; boundary=BOUNDARY", body)
}

#[tokio::test]
async fn hello_routes() {
    let mut app = Application::new();
    app.get("/", |_| async { "Hello Vireo" })
        .get("/hello", |_| async { "Hello World" })
        .get("/product/:id", |ctx: Context| async move {
            format!("Product {}", ctx.param("id").unwrap_or_default())
        })
        .get("/user/*", |_| async { "User is here" });

    let response = app.handle(get("/")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.text_body(), "Hello Vireo");
    assert_eq!(response.get_header("content-type"), Some("text/plain; charset=utf-8"));

    assert_eq!(app.handle(get("/product/42")).await.text_body(), "Product 42");
    assert_eq!(app.handle(get("/user/a/b/c")).await.text_body(), "User is here");
    assert_eq!(app.handle(get("/user/x")).await.text_body(), "User is here");
}

#[tokio::test]
async fn earlier_route_wins_on_overlap() {
    let mut app = Application::new();
    app.get("/files/*", |_| async { "wildcard" })
        .get("/files/:name", |_| async { "param" });

    assert_eq!(app.handle(get("/files/report")).await.text_body(), "wildcard");
}

#[tokio::test]
async fn params_are_uncoerced_strings() {
    let mut app = Application::new();
    app.get("/product/:id", |ctx: Context| async move { Value::Object(ctx.params) });

    let response = app.handle(get("/product/42")).await;
    assert_eq!(response.json_body(), Some(json!({"id": "42"})));
}

#[tokio::test]
async fn transform_turns_param_into_number() {
    let mut app = Application::new();
    app.get("/", |_| async { "Hello" });
    app.get_with(
        "/id/:id",
        RouteOptions::new()
            .transform(|ctx: &mut Context| -> ServerResult<()> {
                let id: i64 = ctx
                    .param("id")
                    .unwrap_or_default()
                    .parse()
                    .map_err(|_| ServerError::BadRequest("id must be numeric".into()))?;
                ctx.params.insert("id".into(), json!(id));
                Ok(())
            })
            .params(Shape::object([Field::required("id", Shape::Integer)])),
        |ctx: Context| async move { ctx.params["id"].clone() },
    );

    let response = app.handle(get("/id/7")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.get_header("content-type"), Some("application/json"));
    assert_eq!(response.json_body(), Some(json!(7)));

    let response = app.handle(get("/id/seven")).await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn missing_body_field_is_422_and_handler_never_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut app = Application::new();
    app.post_with(
        "/create",
        RouteOptions::new().body(Shape::object([
            Field::required("name", Shape::String),
            Field::required("age", Shape::Number),
        ])),
        move |ctx: Context| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Reply::Json(ctx.body) }
        },
    );

    let request = Request::new(Method::POST, "/create").with_json(&json!({"name": "a"}));
    let response = app.handle(request).await;

    assert_eq!(response.status, 422);
    let body = response.json_body().unwrap();
    assert_eq!(body["error"]["type"], "validation");
    assert_eq!(body["error"]["details"]["kind"], "missing");
    assert_eq!(body["error"]["details"]["path"], "age");
    assert_eq!(body["error"]["details"]["location"], "body");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let request = Request::new(Method::POST, "/create").with_json(&json!({"name": "a", "age": 3}));
    let response = app.handle(request).await;
    assert_eq!(response.status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn before_handle_short_circuit_keeps_handler_counter_at_zero() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut app = Application::new();
    app.get_with(
        "/secret",
        RouteOptions::new().before_handle(|ctx: &mut Context| {
            if ctx.header("authorization").is_none() {
                ctx.set.status(401);
                return Ok(Some(Reply::text("who are you?")));
            }
            Ok(None)
        }),
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { "the secret" }
        },
    );

    let response = app.handle(get("/secret")).await;
    assert_eq!(response.status, 401);
    assert_eq!(response.text_body(), "who are you?");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let response = app.handle(get("/secret").with_header("Authorization", "Bearer t")).await;
    assert_eq!(response.text_body(), "the secret");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn not_found_versus_method_not_allowed() {
    let mut app = Application::new();
    app.get("/items", |_| async { "list" });

    let response = app.handle(get("/nope")).await;
    assert_eq!(response.status, 404);
    assert_eq!(response.json_body().unwrap()["error"]["type"], "not_found");

    let response = app.handle(Request::new(Method::DELETE, "/items")).await;
    assert_eq!(response.status, 405);
    assert_eq!(response.get_header("allow"), Some("GET"));
}

#[tokio::test]
async fn request_hooks_see_unmatched_requests() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);

    let mut app = Application::new();
    app.on_request(move |_ctx: &Context| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    app.get("/", |_| async { "home" });

    app.handle(get("/")).await;
    app.handle(get("/missing")).await;
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn handler_errors_become_json_500() {
    let mut app = Application::new();
    app.get("/fail", |_| async { Err::<Reply, _>(ServerError::handler("database unavailable")) });

    let response = app.handle(get("/fail")).await;
    assert_eq!(response.status, 500);
    let body = response.json_body().unwrap();
    assert_eq!(body["error"]["type"], "handler");
    assert_eq!(body["error"]["status"], 500);
}

#[tokio::test]
async fn response_control_and_raw_responses() {
    let mut app = Application::new();
    app.post("/things", |ctx: Context| async move {
        ctx.set.status(201).header("Location", "/things/1");
        json!({"id": 1})
    });
    app.get("/raw", |_| async {
        let mut response = Response::new(418);
        response.header("X-Raw", "yes").body("short and stout");
        response
    });

    let response = app.handle(Request::new(Method::POST, "/things")).await;
    assert_eq!(response.status, 201);
    assert_eq!(response.get_header("location"), Some("/things/1"));

    let response = app.handle(get("/raw")).await;
    assert_eq!(response.status, 418);
    assert_eq!(response.get_header("x-raw"), Some("yes"));
    assert_eq!(response.text_body(), "short and stout");
}

#[tokio::test]
async fn plugin_prefix_relocates_routes() {
    let mut plugin = Application::with_prefix("/v2");
    plugin.get("/hi", |_| async { "hi from v2" });

    let mut app = Application::new();
    app.use_plugin(plugin);

    let response = app.handle(get("/v2/hi")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.text_body(), "hi from v2");
    assert_eq!(app.handle(get("/hi")).await.status, 404);
}

#[tokio::test]
async fn plugin_state_reaches_parent_and_parent_keeps_collisions() {
    let mut plugin = Application::new();
    plugin
        .state("plugin-version", 1)
        .state("version", "plugin")
        .decorate("greeting", "plugin hello")
        .get("/plugin", |ctx: Context| async move {
            format!("Plugin version: {}", ctx.store.get("plugin-version").unwrap_or_default())
        });

    let mut app = Application::new();
    app.state("version", "parent").decorate("greeting", "parent hello");
    app.use_plugin(plugin);
    app.get("/greeting", |ctx: Context| async move {
        ctx.decorator::<&str>("greeting").copied().unwrap_or_default()
    });

    assert_eq!(app.handle(get("/plugin")).await.text_body(), "Plugin version: 1");
    assert_eq!(app.store().get("version"), Some(json!("parent")));
    assert_eq!(app.handle(get("/greeting")).await.text_body(), "parent hello");
}

#[tokio::test]
async fn parent_scoped_hooks_wrap_plugin_routes() {
    let mut plugin = Application::new();
    plugin.get("/ping", |_| async { "pong" });

    let mut app = Application::new();
    app.on_after_handle(|_ctx: &Context, reply: Reply| {
        let text = reply.as_text().unwrap_or_default().to_string();
        Ok(Reply::text(text.to_uppercase()))
    });
    app.use_plugin(plugin);

    assert_eq!(app.handle(get("/ping")).await.text_body(), "PONG");
}

#[tokio::test]
async fn store_is_shared_across_requests() {
    let mut app = Application::new();
    app.state("hits", 0);
    app.post("/hit", |ctx: Context| async move {
        ctx.store.update("hits", |hits| {
            *hits = json!(hits.as_i64().unwrap_or(0) + 1);
            hits.clone()
        })
    });

    let app = Arc::new(app);
    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let app = Arc::clone(&app);
            tokio::spawn(async move { app.handle(Request::new(Method::POST, "/hit")).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().status, 200);
    }
    assert_eq!(app.store().get("hits"), Some(json!(20)));
}

#[tokio::test]
async fn group_routes_share_store_and_scope_hooks() {
    let mut app = Application::new();
    app.state("name", "vireo");
    app.group("/admin", |admin| {
        admin.on_before_handle(|ctx: &mut Context| match ctx.header("x-admin") {
            Some(_) => Ok(None),
            None => Err(ServerError::Forbidden("admins only".into())),
        });
        admin.get("/name", |ctx: Context| async move { ctx.store.get("name").unwrap_or_default() });
    });
    app.get("/name", |ctx: Context| async move { ctx.store.get("name").unwrap_or_default() });

    assert_eq!(app.handle(get("/admin/name")).await.status, 403);
    let response = app.handle(get("/admin/name").with_header("X-Admin", "1")).await;
    assert_eq!(response.json_body(), Some(json!("vireo")));
    assert_eq!(app.handle(get("/name")).await.status, 200);
}

#[tokio::test]
async fn query_schema_reports_location() {
    let mut app = Application::new();
    app.get_with(
        "/search",
        RouteOptions::new().query(Shape::object([Field::required("q", Shape::String)])),
        |ctx: Context| async move { ctx.query_param("q").unwrap_or_default().to_string() },
    );

    assert_eq!(app.handle(get("/search?q=rust")).await.text_body(), "rust");
    let response = app.handle(get("/search")).await;
    assert_eq!(response.status, 422);
    let body = response.json_body().unwrap();
    assert_eq!(body["error"]["details"]["location"], "query");
    assert_eq!(body["error"]["details"]["path"], "q");
}

fn upload_app() -> Application {
    let mut app = Application::new();
    app.post_with(
        "/upload",
        RouteOptions::new().body(Shape::object([
            Field::required("title", Shape::String),
            Field::required("image", Shape::file(FileShape::new().max_size(8).content_type("image"))),
        ])),
        |ctx: Context| async move {
            let image = ctx.file("image").map(|file| file.size()).unwrap_or_default();
            json!({ "title": ctx.body["title"], "size": image })
        },
    );
    app
}

#[tokio::test]
async fn file_size_bound_is_inclusive() {
    let app = upload_app();

    let response = app
        .handle(multipart(&[("title", None, "cat"), ("image", Some("cat.png"), "12345678")]))
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.json_body(), Some(json!({"title": "cat", "size": 8})));

    let response = app
        .handle(multipart(&[("title", None, "cat"), ("image", Some("cat.png"), "123456789")]))
        .await;
    assert_eq!(response.status, 422);
    let details = &response.json_body().unwrap()["error"]["details"];
    assert_eq!(details["kind"], "too_large");
    assert_eq!(details["path"], "image");
    assert_eq!(details["max"], 8);
    assert_eq!(details["actual"], 9);
}

#[tokio::test]
async fn missing_upload_is_reported() {
    let app = upload_app();
    let response = app.handle(multipart(&[("title", None, "cat")])).await;
    assert_eq!(response.status, 422);
    let details = &response.json_body().unwrap()["error"]["details"];
    assert_eq!(details["kind"], "missing");
    assert_eq!(details["path"], "image");
}

#[tokio::test]
async fn nested_upload_fields_match_bracketed_parts() {
    let mut app = Application::new();
    app.post_with(
        "/upload",
        RouteOptions::new().body(Shape::object([Field::required(
            "user",
            Shape::object([
                Field::required("name", Shape::String),
                Field::required("avatar", Shape::file(FileShape::new().max_size(4))),
            ]),
        )])),
        |ctx: Context| async move {
            let size = ctx.file("user.avatar").map(|file| file.size()).unwrap_or_default();
            json!({ "name": ctx.body["user"]["name"], "size": size })
        },
    );

    let response = app
        .handle(multipart(&[("user[name]", None, "ann"), ("user[avatar]", Some("a.png"), "1234")]))
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.json_body(), Some(json!({"name": "ann", "size": 4})));

    let response = app
        .handle(multipart(&[("user[name]", None, "ann"), ("user[avatar]", Some("a.png"), "12345")]))
        .await;
    assert_eq!(response.status, 422);
    assert_eq!(response.json_body().unwrap()["error"]["details"]["path"], "user.avatar");
}

#[tokio::test]
async fn form_bodies_build_nested_objects() {
    let mut app = Application::new();
    app.post("/form", |ctx: Context| async move { ctx.body });

    let request = Request::new(Method::POST, "/form")
        .with_body("application/x-www-form-urlencoded", "user[name]=ann&tags[]=a&tags[]=b");
    let response = app.handle(request).await;
    assert_eq!(response.json_body(), Some(json!({"user": {"name": "ann"}, "tags": ["a", "b"]})));
}

#[tokio::test]
async fn malformed_json_is_400() {
    let mut app = Application::new();
    app.post("/json", |ctx: Context| async move { ctx.body });

    let request = Request::new(Method::POST, "/json").with_body("application/json", "{not json");
    let response = app.handle(request).await;
    assert_eq!(response.status, 400);
    assert_eq!(response.json_body().unwrap()["error"]["type"], "parse");
}
