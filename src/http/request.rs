use crate::error::{ServerError, ServerResult};
use crate::http::multipart::{self, Files};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
        }
    }
}

impl FromStr for Method {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "HEAD" => Ok(Method::HEAD),
            "CONNECT" => Ok(Method::CONNECT),
            "OPTIONS" => Ok(Method::OPTIONS),
            "TRACE" => Ok(Method::TRACE),
            "PATCH" => Ok(Method::PATCH),
            other => Err(ServerError::BadRequest(format!("unsupported method `{other}`"))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Body {
    pub(crate) content_type: String,
    pub(crate) data: Vec<u8>,
}

/// A decoded request body: the structured value plus any uploaded files.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub value: Value,
    pub files: Files,
}

impl Payload {
    fn value(value: Value) -> Self {
        Self { value, files: Files::new() }
    }
}

impl Body {
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Body {
        Body { content_type: content_type.into(), data }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Media type without parameters, lowercased.
    fn essence(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    /// Decodes the body according to its content type.
    pub fn parse(&self) -> ServerResult<Payload> {
        if self.data.is_empty() {
            return Ok(Payload::default());
        }

        match self.essence().as_str() {
            "application/json" => Self::parse_json(&self.data),
            "application/x-www-form-urlencoded" => {
                Ok(Payload::value(Value::Object(parse_urlencoded(&self.data))))
            }
            "multipart/form-data" => {
                let (fields, files) = multipart::parse(&self.content_type, &self.data)
                    .map_err(|e| ServerError::Parse(format!("invalid multipart body: {e}")))?;
                Ok(Payload { value: Value::Object(fields), files })
            }
            essence if essence.ends_with("+json") => Self::parse_json(&self.data),
            _ => Ok(Payload::value(
                std::str::from_utf8(&self.data)
                    .map(|text| Value::String(text.to_string()))
                    .unwrap_or(Value::Null),
            )),
        }
    }

    fn parse_json(data: &[u8]) -> ServerResult<Payload> {
        serde_json::from_slice(data)
            .map(Payload::value)
            .map_err(|e| ServerError::Parse(format!("invalid JSON body: {e}")))
    }
}

/// Decodes `a=1&b[c]=2&tags[]=x` into a nested JSON object.
pub(crate) fn parse_urlencoded(data: &[u8]) -> Map<String, Value> {
    let mut fields = Map::new();
    for (key, value) in form_pairs(&String::from_utf8_lossy(data)) {
        insert_nested(&mut fields, &key, Value::String(value));
    }
    fields
}

fn form_pairs(input: &str) -> impl Iterator<Item = (String, String)> + '_ {
    input.split('&').filter(|s| !s.is_empty()).map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (decode_component(key), decode_component(value))
    })
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(raw)
}

/// Inserts `value` under a bracketed key such as `user[address][city]` or `tags[]`.
pub(crate) fn insert_nested(target: &mut Map<String, Value>, key: &str, value: Value) {
    let (root, rest) = match key.find('[') {
        Some(index) => (&key[..index], &key[index..]),
        None => (key, ""),
    };
    if root.is_empty() {
        return;
    }
    let segments: Vec<&str> = rest
        .split('[')
        .skip(1)
        .filter_map(|segment| segment.strip_suffix(']'))
        .collect();
    let slot = target.entry(root.to_string()).or_insert(Value::Null);
    assign(slot, &segments, value);
}

fn assign(slot: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        // Repeated keys collect into an array.
        match slot {
            Value::Null => *slot = value,
            Value::Array(items) => items.push(value),
            other => {
                let previous = other.take();
                *other = Value::Array(vec![previous, value]);
            }
        }
        return;
    };

    if head.is_empty() {
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            let mut child = Value::Null;
            assign(&mut child, rest, value);
            items.push(child);
        }
    } else if let Some(index) = array_index(slot, head) {
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            if index == items.len() {
                items.push(Value::Null);
            }
            assign(&mut items[index], rest, value);
        }
    } else {
        // Sparse indices turn the array into an object keyed by position.
        if slot.is_array() {
            if let Value::Array(items) = slot.take() {
                *slot = Value::Object(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| (i.to_string(), item))
                        .collect(),
                );
            }
        }
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(map) = slot {
            let child = map.entry(head.to_string()).or_insert(Value::Null);
            assign(child, rest, value);
        }
    }
}

/// A numeric segment indexes an array only when it overwrites or appends.
fn array_index(slot: &Value, segment: &str) -> Option<usize> {
    let index = segment.parse::<usize>().ok()?;
    let len = match slot {
        Value::Null => 0,
        Value::Array(items) => items.len(),
        _ => return None,
    };
    (index <= len).then_some(index)
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Body,
}

impl Request {
    /// Builds a request for `target`, which may carry a query string.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Self::parse_query(query)),
            None => (target, HashMap::new()),
        };
        let path = if path.is_empty() { "/" } else { path };
        Self {
            method,
            path: path.to_string(),
            query,
            headers: HashMap::new(),
            body: Body::default(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if name.eq_ignore_ascii_case("content-type") {
            self.body.content_type = value.clone();
        }
        self.headers.insert(name.to_ascii_lowercase(), value);
        self
    }

    pub fn with_body(mut self, content_type: &str, data: impl Into<Vec<u8>>) -> Self {
        self.headers.insert("content-type".to_string(), content_type.to_string());
        self.body = Body::new(content_type, data.into());
        self
    }

    pub fn with_json<T: Serialize>(self, value: &T) -> Self {
        let data = serde_json::to_vec(value).unwrap_or_default();
        self.with_body("application/json", data)
    }

    pub fn with_text(self, text: &str) -> Self {
        self.with_body("text/plain; charset=utf-8", text.as_bytes())
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub(crate) fn parse_query(query: &str) -> HashMap<String, String> {
        form_pairs(query).collect()
    }
}
