use super::error::{ValidationError, ValidationErrorKind};
use crate::http::UploadedFile;

/// Constraints on a single uploaded file. Size bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileShape {
    pub min_size: Option<usize>,
    pub max_size: Option<usize>,
    /// Accepted content types. `image` and `image/*` accept any `image/...` type.
    pub content_types: Vec<String>,
}

impl FileShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_size(mut self, bytes: usize) -> Self {
        self.min_size = Some(bytes);
        self
    }

    pub fn max_size(mut self, bytes: usize) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_types.push(content_type.into());
        self
    }
}

pub fn validate_file(shape: &FileShape, file: &UploadedFile) -> Result<(), ValidationError> {
    let size = file.size();
    if let Some(min) = shape.min_size {
        if size < min {
            return Err(ValidationError::new("", ValidationErrorKind::TooSmall { min, actual: size }));
        }
    }
    if let Some(max) = shape.max_size {
        if size > max {
            return Err(ValidationError::new("", ValidationErrorKind::TooLarge { max, actual: size }));
        }
    }
    if !shape.content_types.is_empty()
        && !shape
            .content_types
            .iter()
            .any(|allowed| content_type_matches(allowed, &file.content_type))
    {
        return Err(ValidationError::new(
            "",
            ValidationErrorKind::ContentType {
                allowed: shape.content_types.clone(),
                found: file.content_type.clone(),
            },
        ));
    }
    Ok(())
}

fn content_type_matches(allowed: &str, actual: &str) -> bool {
    let actual = actual
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let allowed = allowed.trim().to_ascii_lowercase();
    let top_level = actual.split('/').next().unwrap_or_default();

    if let Some(prefix) = allowed.strip_suffix("/*") {
        top_level == prefix
    } else if !allowed.contains('/') {
        top_level == allowed
    } else {
        actual == allowed
    }
}
