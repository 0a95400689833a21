use crate::http::Method;
use crate::schema::ValidationError;
use serde_json::{json, Value};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Route not found")]
    RouteNotFound,
    #[error("Method not allowed")]
    MethodNotAllowed { allowed: Vec<Method> },
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Payload too large")]
    PayloadTooLarge,
    #[error("Handler error: {0}")]
    Handler(String),
    #[error("Panic: {0}")]
    Panic(String),
}

impl ServerError {
    /// Wraps any displayable failure raised inside a hook or handler.
    pub fn handler(cause: impl std::fmt::Display) -> Self {
        ServerError::Handler(cause.to_string())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::Parse(_) | ServerError::BadRequest(_) => 400,
            ServerError::Unauthorized(_) => 401,
            ServerError::Forbidden(_) => 403,
            ServerError::RouteNotFound => 404,
            ServerError::MethodNotAllowed { .. } => 405,
            ServerError::PayloadTooLarge => 413,
            ServerError::Validation(_) => 422,
            ServerError::Io(_) | ServerError::Handler(_) | ServerError::Panic(_) => 500,
        }
    }

    /// Stable machine-readable name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Io(_) => "io",
            ServerError::Parse(_) => "parse",
            ServerError::Validation(_) => "validation",
            ServerError::RouteNotFound => "not_found",
            ServerError::MethodNotAllowed { .. } => "method_not_allowed",
            ServerError::BadRequest(_) => "bad_request",
            ServerError::Unauthorized(_) => "unauthorized",
            ServerError::Forbidden(_) => "forbidden",
            ServerError::PayloadTooLarge => "payload_too_large",
            ServerError::Handler(_) => "handler",
            ServerError::Panic(_) => "internal",
        }
    }

    /// The JSON document sent to clients for this error.
    ///
    /// Internal failures never leak their message: the cause is only logged.
    pub fn to_json(&self) -> Value {
        let status = self.status_code();
        let message = match self {
            ServerError::Io(_) | ServerError::Panic(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        let mut error = json!({
            "type": self.kind(),
            "message": message,
            "status": status,
        });
        let details = match self {
            ServerError::Validation(err) => serde_json::to_value(err).ok(),
            ServerError::MethodNotAllowed { allowed } => Some(json!({
                "allowed": allowed.iter().map(Method::as_str).collect::<Vec<_>>(),
            })),
            _ => None,
        };
        if let (Some(details), Some(map)) = (details, error.as_object_mut()) {
            map.insert("details".to_string(), details);
        }
        json!({ "error": error })
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Parse(err.to_string())
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Location, ValidationError, ValidationErrorKind};

    #[test]
    fn routing_errors_have_distinct_statuses() {
        assert_eq!(ServerError::RouteNotFound.status_code(), 404);
        let err = ServerError::MethodNotAllowed { allowed: vec![Method::GET] };
        assert_eq!(err.status_code(), 405);
        assert_eq!(err.to_json()["error"]["details"]["allowed"], json!(["GET"]));
    }

    #[test]
    fn validation_error_carries_structured_details() {
        let err: ServerError = ValidationError::new("age", ValidationErrorKind::Missing)
            .at(Location::Body)
            .into();
        let body = err.to_json();
        assert_eq!(body["error"]["status"], 422);
        assert_eq!(body["error"]["details"]["path"], "age");
        assert_eq!(body["error"]["details"]["kind"], "missing");
        assert_eq!(body["error"]["details"]["location"], "body");
    }

    #[test]
    fn panic_message_is_not_exposed() {
        let err = ServerError::Panic("index out of bounds: secret".into());
        let body = err.to_json();
        assert_eq!(body["error"]["message"], "internal server error");
        assert_eq!(body["error"]["status"], 500);
    }
}
