use crate::error::ServerError;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Response {
        Response {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    // Chainable status setter
    pub fn status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    pub fn body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Sets a header, replacing any existing header with the same name in any case.
    pub fn header<K: AsRef<str>, V: AsRef<str>>(&mut self, name: K, value: V) -> &mut Self {
        let name = name.as_ref();
        self.headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value.as_ref().to_string());
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self, ServerError> {
        let body = serde_json::to_vec(value)
            .map_err(|e| ServerError::Handler(format!("JSON serialization error: {}", e)))?;
        self.header("Content-Type", "application/json");
        self.body(body);
        Ok(self)
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text_body(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Body decoded as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn ok<T: Serialize>(data: &T) -> Result<Response, ServerError> {
        let mut response = Response::new(200);
        response.json(data)?;
        Ok(response)
    }

    pub fn text<T: AsRef<str>>(content: T) -> Response {
        let mut response = Response::new(200);
        response
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(content.as_ref());
        response
    }

    /// Default rendering of an error: a JSON document, plus `Allow` for 405.
    pub fn error(err: &ServerError) -> Response {
        let mut response = Response::new(err.status_code());
        if let ServerError::MethodNotAllowed { allowed } = err {
            let allowed: Vec<&str> = allowed.iter().map(|m| m.as_str()).collect();
            response.header("Allow", allowed.join(", "));
        }
        let body = serde_json::to_vec(&err.to_json()).unwrap_or_default();
        response.header("Content-Type", "application/json").body(body);
        response
    }
}

pub(crate) fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

#[macro_export]
macro_rules! ok_json {
    ($($json:tt)+) => {
        $crate::http::Response::ok(&$crate::json!($($json)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use serde_json::json;

    #[test]
    fn header_replaces_case_insensitively() {
        let mut response = Response::new(200);
        response.header("content-type", "text/plain");
        response.header("Content-Type", "application/json");
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.get_header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn method_not_allowed_lists_allowed_methods() {
        let response = Response::error(&ServerError::MethodNotAllowed {
            allowed: vec![Method::GET, Method::POST],
        });
        assert_eq!(response.status, 405);
        assert_eq!(response.get_header("allow"), Some("GET, POST"));
        assert_eq!(response.json_body().unwrap()["error"]["type"], "method_not_allowed");
    }

    #[test]
    fn ok_json_macro_builds_json_response() {
        let response: Response = ok_json!({ "status": "up" }).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.json_body(), Some(json!({"status": "up"})));
    }
}
