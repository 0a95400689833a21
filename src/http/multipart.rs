use crate::http::request::insert_nested;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Uploaded files grouped by field path, in upload order.
///
/// Bracketed names are stored dotted: `user[avatar]` under `user.avatar`.
/// List markers are dropped, so `docs[]` and `docs[0]` both land under `docs`.
pub type Files = HashMap<String, Vec<UploadedFile>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub filename: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(field: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            field: field.into(),
            filename: None,
            content_type: content_type.into(),
            data,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("boundary not found in content type")]
    BoundaryNotFound,
    #[error("part is missing its header block")]
    InvalidFormat,
    #[error("part headers are not valid UTF-8")]
    Utf8Error,
}

/// Splits a `multipart/form-data` body into text fields and files.
pub(crate) fn parse(content_type: &str, body: &[u8]) -> Result<(Map<String, Value>, Files), MultipartError> {
    let boundary = extract_boundary(content_type)?;
    let delimiter = format!("--{boundary}").into_bytes();

    let mut positions = Vec::new();
    let mut start = 0;
    while let Some(pos) = find_subsequence(&body[start..], &delimiter) {
        positions.push(start + pos);
        start += pos + delimiter.len();
    }

    let mut fields = Map::new();
    let mut files = Files::new();
    for window in positions.windows(2) {
        let part = &body[window[0] + delimiter.len()..window[1]];
        let part = part.strip_prefix(&b"\r\n"[..]).unwrap_or(part);
        let part = part.strip_suffix(&b"\r\n"[..]).unwrap_or(part);

        let (head, content) = split_headers_content(part)?;
        let headers = parse_headers(head)?;
        let Some(name) = headers.get("name") else {
            continue;
        };

        let filename = headers.get("filename");
        match (filename, std::str::from_utf8(content)) {
            (None, Ok(text)) => insert_nested(&mut fields, name, Value::String(text.to_string())),
            (filename, _) => {
                let content_type = headers
                    .get("content-type")
                    .cloned()
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                files.entry(file_key(name)).or_default().push(UploadedFile {
                    field: name.clone(),
                    filename: filename.cloned(),
                    content_type,
                    data: content.to_vec(),
                });
            }
        }
    }

    Ok((fields, files))
}

fn file_key(name: &str) -> String {
    let (root, rest) = match name.find('[') {
        Some(index) => (&name[..index], &name[index..]),
        None => return name.to_string(),
    };
    let mut key = root.to_string();
    for segment in rest.split('[').skip(1).filter_map(|s| s.strip_suffix(']')) {
        if segment.is_empty() || segment.parse::<usize>().is_ok() {
            continue;
        }
        key.push('.');
        key.push_str(segment);
    }
    key
}

fn extract_boundary(content_type: &str) -> Result<String, MultipartError> {
    content_type
        .split(';')
        .find_map(|s| s.trim().strip_prefix("boundary="))
        .map(|s| s.trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .ok_or(MultipartError::BoundaryNotFound)
}

fn split_headers_content(part: &[u8]) -> Result<(&[u8], &[u8]), MultipartError> {
    let sep = b"\r\n\r\n";
    part.windows(sep.len())
        .position(|w| w == sep)
        .map(|pos| (&part[..pos], &part[pos + sep.len()..]))
        .ok_or(MultipartError::InvalidFormat)
}

fn parse_headers(headers: &[u8]) -> Result<HashMap<String, String>, MultipartError> {
    let mut map = HashMap::new();
    let headers = std::str::from_utf8(headers).map_err(|_| MultipartError::Utf8Error)?;

    for line in headers.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key == "content-disposition" {
            for param in value.split(';').skip(1) {
                if let Some((k, v)) = param.trim().split_once('=') {
                    map.insert(k.trim().to_ascii_lowercase(), v.trim().trim_matches('"').to_string());
                }
            }
        } else {
            map.insert(key, value.trim().to_string());
        }
    }

    Ok(map)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
