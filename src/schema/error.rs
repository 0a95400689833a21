use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// The part of the request a validation failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Params,
    Query,
    Body,
}

/// JSON-level kind of a value, as reported in type mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Null,
    Boolean,
    Number,
    Integer,
    String,
    Array,
    Object,
    File,
}

impl Kind {
    pub fn of(value: &Value) -> Kind {
        match value {
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Boolean,
            Value::Number(_) => Kind::Number,
            Value::String(_) => Kind::String,
            Value::Array(_) => Kind::Array,
            Value::Object(_) => Kind::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Boolean => "boolean",
            Kind::Number => "number",
            Kind::Integer => "integer",
            Kind::String => "string",
            Kind::Array => "array",
            Kind::Object => "object",
            Kind::File => "file",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationErrorKind {
    Missing,
    Type { expected: Kind, found: Kind },
    TooShort { min: usize, actual: usize },
    TooLong { max: usize, actual: usize },
    TooSmall { min: usize, actual: usize },
    TooLarge { max: usize, actual: usize },
    ContentType { allowed: Vec<String>, found: String },
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationErrorKind::Missing => write!(f, "missing required field"),
            ValidationErrorKind::Type { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            ValidationErrorKind::TooShort { min, actual } => {
                write!(f, "expected at least {min} items, found {actual}")
            }
            ValidationErrorKind::TooLong { max, actual } => {
                write!(f, "expected at most {max} items, found {actual}")
            }
            ValidationErrorKind::TooSmall { min, actual } => {
                write!(f, "file is {actual} bytes, minimum is {min}")
            }
            ValidationErrorKind::TooLarge { max, actual } => {
                write!(f, "file is {actual} bytes, maximum is {max}")
            }
            ValidationErrorKind::ContentType { allowed, found } => {
                write!(f, "content type `{found}` is not one of [{}]", allowed.join(", "))
            }
        }
    }
}

/// The first violation found while validating a value against a [`Shape`](super::Shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind} at `{}`", field_label(.path))]
pub struct ValidationError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Dotted field path such as `user.tags[2]`; empty for the root value.
    pub path: String,
    #[serde(flatten)]
    pub kind: ValidationErrorKind,
}

fn field_label(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

impl ValidationError {
    pub fn new(path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            location: None,
            path: path.into(),
            kind,
        }
    }

    pub(crate) fn type_mismatch(path: &str, expected: Kind, found: &Value) -> Self {
        Self::new(
            path,
            ValidationErrorKind::Type {
                expected,
                found: Kind::of(found),
            },
        )
    }

    /// Tags the error with the request part it came from.
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Re-roots the error under `parent`.
    pub(crate) fn under(mut self, parent: &str) -> Self {
        self.path = match (parent.is_empty(), self.path.is_empty()) {
            (true, _) => self.path,
            (false, true) => parent.to_string(),
            (false, false) if self.path.starts_with('[') => format!("{parent}{}", self.path),
            (false, false) => format!("{parent}.{}", self.path),
        };
        self
    }
}
