//! Declarative input shapes and the validator that checks values against them.
//!
//! A [`Shape`] only describes structure. [`validate`] interprets it. The validator
//! never coerces: `"7"` is a string even where a number is expected. Coercion is
//! the job of a transform hook that runs before validation.
//!
//! ```rust
//! use vireo::schema::{validate, Field, Shape};
//! use vireo::json;
//!
//! let shape = Shape::object([
//!     Field::required("name", Shape::String),
//!     Field::optional("age", Shape::Integer),
//! ]);
//! assert!(validate(&shape, &json!({ "name": "a" })).is_ok());
//! assert!(validate(&shape, &json!({ "name": 1 })).is_err());
//! ```

mod error;
mod file;

pub use error::{Kind, Location, ValidationError, ValidationErrorKind};
pub use file::{validate_file, FileShape};

use crate::context::Context;
use crate::http::Files;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Accepts anything.
    Any,
    String,
    Number,
    /// A number without a fractional part.
    Integer,
    Boolean,
    /// Declared fields are checked in order; undeclared fields pass through.
    Object(Vec<Field>),
    Array {
        items: Box<Shape>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    /// Exactly one uploaded file.
    ///
    /// Uploads are resolved by field path, so `File` and `Files` only apply as
    /// fields of an `Object`. Anywhere else they report a type mismatch.
    File(FileShape),
    /// A list of uploaded files.
    Files {
        file: FileShape,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub shape: Shape,
    pub optional: bool,
}

impl Field {
    pub fn required(name: impl Into<String>, shape: Shape) -> Self {
        Self { name: name.into(), shape, optional: false }
    }

    pub fn optional(name: impl Into<String>, shape: Shape) -> Self {
        Self { name: name.into(), shape, optional: true }
    }
}

impl Shape {
    pub fn object(fields: impl IntoIterator<Item = Field>) -> Shape {
        Shape::Object(fields.into_iter().collect())
    }

    pub fn array(items: Shape) -> Shape {
        Shape::Array { items: Box::new(items), min_items: None, max_items: None }
    }

    pub fn file(file: FileShape) -> Shape {
        Shape::File(file)
    }

    pub fn files(file: FileShape) -> Shape {
        Shape::Files { file, min_items: None, max_items: None }
    }

    /// Lower item-count bound for `Array` and `Files`; other shapes are returned unchanged.
    pub fn min_items(mut self, min: usize) -> Shape {
        if let Shape::Array { min_items, .. } | Shape::Files { min_items, .. } = &mut self {
            *min_items = Some(min);
        }
        self
    }

    /// Upper item-count bound for `Array` and `Files`; other shapes are returned unchanged.
    pub fn max_items(mut self, max: usize) -> Shape {
        if let Shape::Array { max_items, .. } | Shape::Files { max_items, .. } = &mut self {
            *max_items = Some(max);
        }
        self
    }

    fn is_upload(&self) -> bool {
        matches!(self, Shape::File(_) | Shape::Files { .. })
    }
}

/// Validates a value that carries no uploads.
pub fn validate(shape: &Shape, value: &Value) -> Result<Value, ValidationError> {
    validate_with_files(shape, value, &Files::new())
}

/// Validates `value`, resolving `File`/`Files` fields against `files` by field path.
///
/// Returns the validated value. Uploads stay in `files` and are not copied into it.
pub fn validate_with_files(shape: &Shape, value: &Value, files: &Files) -> Result<Value, ValidationError> {
    Validator { files }.check(shape, value, "")
}

struct Validator<'a> {
    files: &'a Files,
}

impl Validator<'_> {
    fn check(&self, shape: &Shape, value: &Value, path: &str) -> Result<Value, ValidationError> {
        let accepted = match shape {
            Shape::Any => true,
            Shape::String => value.is_string(),
            Shape::Number => value.is_number(),
            Shape::Integer => {
                value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|n| n.fract() == 0.0)
            }
            Shape::Boolean => value.is_boolean(),
            Shape::Object(fields) => return self.check_object(fields, value, path),
            Shape::Array { items, min_items, max_items } => {
                let Value::Array(values) = value else {
                    return Err(ValidationError::type_mismatch(path, Kind::Array, value));
                };
                check_count(path, values.len(), *min_items, *max_items)?;
                return values
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.check(items, item, &format!("{path}[{index}]")))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array);
            }
            Shape::File(_) | Shape::Files { .. } => {
                return Err(ValidationError::type_mismatch(path, Kind::File, value));
            }
        };

        if accepted {
            Ok(value.clone())
        } else {
            Err(ValidationError::type_mismatch(path, expected_kind(shape), value))
        }
    }

    fn check_object(&self, fields: &[Field], value: &Value, path: &str) -> Result<Value, ValidationError> {
        let Value::Object(map) = value else {
            return Err(ValidationError::type_mismatch(path, Kind::Object, value));
        };

        let mut checked = map.clone();
        for field in fields {
            let field_path = if path.is_empty() {
                field.name.clone()
            } else {
                format!("{path}.{}", field.name)
            };

            if field.shape.is_upload() {
                self.check_uploads(field, &field_path)?;
                continue;
            }

            match map.get(&field.name) {
                None | Some(Value::Null) if field.optional => {}
                None => {
                    return Err(ValidationError::new(field_path, ValidationErrorKind::Missing));
                }
                Some(item) => {
                    let item = self.check(&field.shape, item, &field_path)?;
                    checked.insert(field.name.clone(), item);
                }
            }
        }
        Ok(Value::Object(checked))
    }

    fn check_uploads(&self, field: &Field, path: &str) -> Result<(), ValidationError> {
        let uploaded = self.files.get(path).map(Vec::as_slice).unwrap_or_default();
        if uploaded.is_empty() {
            return if field.optional {
                Ok(())
            } else {
                Err(ValidationError::new(path, ValidationErrorKind::Missing))
            };
        }

        match &field.shape {
            Shape::File(shape) => match uploaded {
                [file] => validate_file(shape, file).map_err(|e| e.under(path)),
                many => Err(ValidationError::new(
                    path,
                    ValidationErrorKind::TooLong { max: 1, actual: many.len() },
                )),
            },
            Shape::Files { file, min_items, max_items } => {
                check_count(path, uploaded.len(), *min_items, *max_items)?;
                for (index, upload) in uploaded.iter().enumerate() {
                    validate_file(file, upload).map_err(|e| e.under(&format!("{path}[{index}]")))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn expected_kind(shape: &Shape) -> Kind {
    match shape {
        Shape::String => Kind::String,
        Shape::Number => Kind::Number,
        Shape::Integer => Kind::Integer,
        Shape::Boolean => Kind::Boolean,
        Shape::Object(_) => Kind::Object,
        Shape::Array { .. } => Kind::Array,
        Shape::File(_) | Shape::Files { .. } => Kind::File,
        Shape::Any => Kind::Null,
    }
}

fn check_count(path: &str, actual: usize, min: Option<usize>, max: Option<usize>) -> Result<(), ValidationError> {
    if let Some(min) = min {
        if actual < min {
            return Err(ValidationError::new(path, ValidationErrorKind::TooShort { min, actual }));
        }
    }
    if let Some(max) = max {
        if actual > max {
            return Err(ValidationError::new(path, ValidationErrorKind::TooLong { max, actual }));
        }
    }
    Ok(())
}

/// Per-route schemas for the three structured request parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteSchema {
    pub params: Option<Shape>,
    pub query: Option<Shape>,
    pub body: Option<Shape>,
}

impl RouteSchema {
    pub fn is_empty(&self) -> bool {
        self.params.is_none() && self.query.is_none() && self.body.is_none()
    }

    /// Validates params, query and body in that order, storing the checked values back.
    pub(crate) fn apply(&self, ctx: &mut Context) -> Result<(), ValidationError> {
        if let Some(shape) = &self.params {
            let checked = validate(shape, &Value::Object(ctx.params.clone()))
                .map_err(|e| e.at(Location::Params))?;
            if let Value::Object(params) = checked {
                ctx.params = params;
            }
        }
        if let Some(shape) = &self.query {
            let checked = validate(shape, &Value::Object(ctx.query.clone()))
                .map_err(|e| e.at(Location::Query))?;
            if let Value::Object(query) = checked {
                ctx.query = query;
            }
        }
        if let Some(shape) = &self.body {
            ctx.body = validate_with_files(shape, &ctx.body, &ctx.files)
                .map_err(|e| e.at(Location::Body))?;
        }
        Ok(())
    }
}
