//! Schema validation and uploads.
//!
//! ```text
//! curl -X POST localhost:3000/users -H 'content-type: application/json' -d '{"name":"ann","age":31}'
//! curl -X POST localhost:3000/users -H 'content-type: application/json' -d '{"name":"ann"}'
//! curl -X POST localhost:3000/avatar -F name=ann -F avatar=@face.png
//! curl 'localhost:3000/search?q=rust'
//! ```

use serde::{Deserialize, Serialize};
use vireo::http::Response;
use vireo::router::RouteOptions;
use vireo::schema::{Field, FileShape, Shape};
use vireo::{json, Application, Context, Router, ServerResult};

#[derive(Serialize, Deserialize)]
struct User {
    name: String,
    age: u32,
    #[serde(default)]
    tags: Vec<String>,
}

fn user_shape() -> Shape {
    Shape::object([
        Field::required("name", Shape::String),
        Field::required("age", Shape::Integer),
        Field::optional("tags", Shape::array(Shape::String).max_items(5)),
    ])
}

fn main() {
    vireo::init_tracing();

    let mut app = Application::new();
    app.max_body_size(2 * 1024 * 1024);

    app.post_with(
        "/users",
        RouteOptions::new().body(user_shape()),
        |ctx: Context| async move {
            let user: User = ctx.body_as()?;
            ctx.set.status(201);
            ServerResult::Ok(json!({ "created": user }))
        },
    );

    app.post_with(
        "/avatar",
        RouteOptions::new().body(Shape::object([
            Field::required("name", Shape::String),
            Field::required(
                "avatar",
                Shape::file(FileShape::new().max_size(1024 * 1024).content_type("image/*")),
            ),
        ])),
        |ctx: Context| async move {
            let avatar = ctx.file("avatar").map(|file| (file.filename.clone(), file.size()));
            json!({ "name": ctx.body["name"], "avatar": avatar })
        },
    );

    app.get_with(
        "/search",
        RouteOptions::new().query(Shape::object([
            Field::required("q", Shape::String),
            Field::optional("page", Shape::String),
        ])),
        |ctx: Context| async move {
            json!({ "q": ctx.query_param("q"), "page": ctx.query_param("page").unwrap_or("1") })
        },
    );

    let mut api = Router::new();
    api.get("/status", |_| async {
        Response::ok(&json!({ "status": "operational", "version": "1.0.0" }))
    });
    app.mount("/api", api);

    app.listen("127.0.0.1:3000")
        .expect("Server failed to start")
}
