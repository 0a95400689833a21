//! The per-request context handed through the hook pipeline.

use crate::error::{ServerError, ServerResult};
use crate::http::{Body, Files, Method, Request, Response, UploadedFile};
use crate::state::{Decorations, Store};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Status and headers a hook or handler wants on the eventual response.
///
/// Clones share the same slot, so a handler working on its own copy of the
/// context still reaches the response of its request.
#[derive(Debug, Clone, Default)]
pub struct ResponseControl {
    inner: Arc<Mutex<ResponseParts>>,
}

#[derive(Debug, Default)]
struct ResponseParts {
    status: Option<u16>,
    headers: Vec<(String, String)>,
}

impl ResponseControl {
    fn lock(&self) -> MutexGuard<'_, ResponseParts> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self, status: u16) -> &Self {
        self.lock().status = Some(status);
        self
    }

    pub fn header(&self, name: impl Into<String>, value: impl Into<String>) -> &Self {
        self.lock().headers.push((name.into(), value.into()));
        self
    }

    pub fn redirect(&self, location: &str) -> &Self {
        self.status(302).header("Location", location)
    }

    pub fn get_status(&self) -> Option<u16> {
        self.lock().status
    }

    pub(crate) fn has_header(&self, name: &str) -> bool {
        self.lock()
            .headers
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Writes the collected status and headers onto `response`.
    pub(crate) fn apply(&self, response: &mut Response) {
        let parts = self.lock();
        if let Some(status) = parts.status {
            response.status(status);
        }
        for (name, value) in &parts.headers {
            response.header(name, value);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    pub method: Method,
    pub path: String,
    pub headers: HashMap<String, String>,
    /// Path parameters: raw strings after matching, possibly replaced by transform hooks.
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Value,
    pub files: Files,
    pub set: ResponseControl,
    pub store: Store,
    decorations: Decorations,
    route: Option<String>,
    raw_body: Body,
}

impl Context {
    pub(crate) fn new(request: Request, store: Store, decorations: Decorations) -> Self {
        Self {
            method: request.method,
            path: request.path,
            headers: request.headers,
            params: Map::new(),
            query: request
                .query
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect(),
            body: Value::Null,
            files: Files::new(),
            set: ResponseControl::default(),
            store,
            decorations,
            route: None,
            raw_body: request.body,
        }
    }

    /// Records the matched route pattern and its raw parameters.
    pub(crate) fn bind(&mut self, route: &str, params: HashMap<String, String>) {
        self.route = Some(route.to_string());
        self.params = params
            .into_iter()
            .map(|(name, value)| (name, Value::String(value)))
            .collect();
    }

    /// Decodes the buffered body into `body` and `files`.
    pub(crate) fn parse_body(&mut self, max_body_size: usize) -> ServerResult<()> {
        let raw = std::mem::take(&mut self.raw_body);
        if raw.len() > max_body_size {
            return Err(ServerError::PayloadTooLarge);
        }
        let payload = raw.parse()?;
        self.body = payload.value;
        self.files = payload.files;
        Ok(())
    }

    /// The pattern of the matched route, e.g. `/product/:id`.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).and_then(Value::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body_as<T: DeserializeOwned>(&self) -> ServerResult<T> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| ServerError::BadRequest(format!("unexpected body: {e}")))
    }

    /// The first file uploaded under `field`, a dotted path for bracketed parts (`user.avatar`).
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.get(field).and_then(|files| files.first())
    }

    pub fn decorator<T: 'static>(&self, name: &str) -> Option<&T> {
        self.decorations.get(name)
    }

    pub fn decorations(&self) -> &Decorations {
        &self.decorations
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self::new(Request::new(Method::GET, "/"), Store::new(), Decorations::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_parts_become_context_fields() {
        let request = Request::new(Method::POST, "/items/9?sort=asc")
            .with_header("X-Trace", "abc")
            .with_json(&json!({"name": "a"}));
        let mut ctx = Context::new(request, Store::new(), Decorations::new());
        ctx.bind("/items/:id", HashMap::from([("id".to_string(), "9".to_string())]));
        ctx.parse_body(1024).unwrap();

        assert_eq!(ctx.route(), Some("/items/:id"));
        assert_eq!(ctx.param("id"), Some("9"));
        assert_eq!(ctx.query_param("sort"), Some("asc"));
        assert_eq!(ctx.header("x-trace"), Some("abc"));
        assert_eq!(ctx.body, json!({"name": "a"}));
    }

    #[test]
    fn oversized_body_is_rejected() {
        let request = Request::new(Method::POST, "/").with_text("too long");
        let mut ctx = Context::new(request, Store::new(), Decorations::new());
        assert!(matches!(ctx.parse_body(3), Err(ServerError::PayloadTooLarge)));
    }

    #[test]
    fn response_control_is_shared_between_clones() {
        let ctx = Context::for_test();
        let copy = ctx.clone();
        copy.set.status(201).header("X-Id", "7");

        let mut response = Response::new(200);
        ctx.set.apply(&mut response);
        assert_eq!(response.status, 201);
        assert_eq!(response.get_header("x-id"), Some("7"));
    }
}
