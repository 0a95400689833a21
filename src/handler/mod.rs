use crate::context::{Context, ResponseControl};
use crate::error::{ServerError, ServerResult};
use crate::http::Response;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;

/// What a handler or hook produced, before it is turned into a [`Response`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Empty,
    Text(String),
    Json(Value),
    /// A finished response, sent as-is.
    Raw(Response),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Reply {
        Reply::Text(text.into())
    }

    pub fn json<T: Serialize>(value: &T) -> ServerResult<Reply> {
        Ok(Reply::Json(serde_json::to_value(value)?))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Reply::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Reply::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Serializes the reply, applying status and headers collected in `set`.
    ///
    /// `Raw` responses bypass both serialization and `set`.
    pub(crate) fn into_response(self, set: &ResponseControl) -> Response {
        let (content_type, body) = match self {
            Reply::Raw(response) => return response,
            Reply::Empty => (None, Vec::new()),
            Reply::Text(text) => (Some("text/plain; charset=utf-8"), text.into_bytes()),
            Reply::Json(value) => (
                Some("application/json"),
                serde_json::to_vec(&value).unwrap_or_default(),
            ),
        };

        let mut response = Response::new(200);
        response.body(body);
        if let Some(content_type) = content_type {
            if !set.has_header("content-type") {
                response.header("Content-Type", content_type);
            }
        }
        set.apply(&mut response);
        response
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Raw(response)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Text(text)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Json(value)
    }
}

/// Anything a handler may return.
pub trait IntoReply {
    fn into_reply(self) -> ServerResult<Reply>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> ServerResult<Reply> {
        Ok(self)
    }
}

impl IntoReply for Response {
    fn into_reply(self) -> ServerResult<Reply> {
        Ok(Reply::Raw(self))
    }
}

impl IntoReply for String {
    fn into_reply(self) -> ServerResult<Reply> {
        Ok(Reply::Text(self))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> ServerResult<Reply> {
        Ok(Reply::Text(self.to_string()))
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> ServerResult<Reply> {
        Ok(Reply::Json(self))
    }
}

impl IntoReply for () {
    fn into_reply(self) -> ServerResult<Reply> {
        Ok(Reply::Empty)
    }
}

macro_rules! json_scalar_reply {
    ($($ty:ty),*) => {
        $(
            impl IntoReply for $ty {
                fn into_reply(self) -> ServerResult<Reply> {
                    Ok(Reply::Json(Value::from(self)))
                }
            }
        )*
    };
}

json_scalar_reply!(bool, i32, i64, u32, u64, usize, f64);

impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<ServerError>,
{
    fn into_reply(self) -> ServerResult<Reply> {
        match self {
            Ok(value) => value.into_reply(),
            Err(err) => Err(err.into()),
        }
    }
}

/// A route handler: takes the request context, produces a reply.
///
/// Implemented for every `Fn(Context) -> impl Future<Output = impl IntoReply>`.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, ctx: Context) -> BoxFuture<'static, ServerResult<Reply>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoReply,
{
    fn handle(&self, ctx: Context) -> BoxFuture<'static, ServerResult<Reply>> {
        let fut = (self)(ctx);
        Box::pin(async move { fut.await.into_reply() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn closures_are_handlers() {
        let handler = |ctx: Context| async move { format!("at {}", ctx.path) };
        let reply = handler.handle(Context::for_test()).await.unwrap();
        assert_eq!(reply, Reply::Text("at /".into()));
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let handler = |_ctx: Context| async { Err::<Reply, _>(ServerError::Forbidden("no".into())) };
        let err = handler.handle(Context::for_test()).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn json_reply_respects_status_and_headers() {
        let set = ResponseControl::default();
        set.status(201).header("X-Id", "1");
        let response = Reply::Json(json!({"ok": true})).into_response(&set);
        assert_eq!(response.status, 201);
        assert_eq!(response.get_header("content-type"), Some("application/json"));
        assert_eq!(response.get_header("x-id"), Some("1"));
        assert_eq!(response.json_body(), Some(json!({"ok": true})));
    }

    #[test]
    fn explicit_content_type_wins() {
        let set = ResponseControl::default();
        set.header("Content-Type", "text/html");
        let response = Reply::text("<b>hi</b>").into_response(&set);
        assert_eq!(response.get_header("content-type"), Some("text/html"));
    }

    #[test]
    fn raw_response_bypasses_response_control() {
        let set = ResponseControl::default();
        set.status(500);
        let response = Reply::Raw(Response::text("raw")).into_response(&set);
        assert_eq!(response.status, 200);
        assert_eq!(response.text_body(), "raw");
    }

    #[test]
    fn scalars_become_json() {
        assert_eq!(7i64.into_reply().unwrap(), Reply::Json(json!(7)));
        assert_eq!(true.into_reply().unwrap(), Reply::Json(json!(true)));
    }
}
