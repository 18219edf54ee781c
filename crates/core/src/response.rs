//! Response model shared by the network, the stores and the fetch engine.
//!
//! A [`Response`] is an owned, single-consumption value. It does not
//! implement `Clone`: a branch that both returns a response and persists
//! it must call [`Response::duplicate`] before either consumer takes it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Response classification, mirroring what the network layer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response.
    Basic,
    /// Cross-origin response with readable body.
    Cors,
    /// Cross-origin response whose status and body are hidden.
    Opaque,
    /// Network-level failure surfaced as a response.
    Error,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Basic => "basic",
            ResponseType::Cors => "cors",
            ResponseType::Opaque => "opaque",
            ResponseType::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(ResponseType::Basic),
            "cors" => Some(ResponseType::Cors),
            "opaque" => Some(ResponseType::Opaque),
            "error" => Some(ResponseType::Error),
            _ => None,
        }
    }
}

/// Where the engine obtained a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    /// Generated locally (offline document, 503 placeholder).
    Synthetic,
}

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set `name`, replacing any existing values.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.0.push((name, value.into()));
    }

    /// Add a value without touching existing ones (e.g. `set-cookie`).
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A response on its way back to the page.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub response_type: ResponseType,
    pub source: ResponseSource,
    body: Bytes,
}

impl Response {
    /// A network response with the given status and body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            response_type: ResponseType::Basic,
            source: ResponseSource::Network,
            body: body.into(),
        }
    }

    /// A locally generated response.
    pub fn synthetic(status: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
        Self::new(status, body)
            .with_header("content-type", content_type)
            .with_source(ResponseSource::Synthetic)
    }

    /// The network-error response (status 0, type `error`).
    pub fn error() -> Self {
        Self::new(0, Bytes::new()).with_type(ResponseType::Error)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only complete 200 responses of a non-error type may enter a store.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.response_type != ResponseType::Error
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consume the response, yielding its body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Consume the response, decoding the body as (lossy) UTF-8.
    pub fn text(self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// An independent copy for a second consumer.
    pub fn duplicate(&self) -> Self {
        Self {
            status: self.status,
            headers: self.headers.clone(),
            response_type: self.response_type,
            source: self.source,
            body: self.body.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/css");
        assert_eq!(headers.get("content-type"), Some("text/css"));

        headers.insert("content-type", "text/html");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));
    }

    #[test]
    fn test_headers_append_keeps_existing() {
        let mut headers = Headers::new();
        headers.append("set-cookie", "a=1");
        headers.append("set-cookie", "b=2");
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_cacheable() {
        assert!(Response::new(200, "ok").is_cacheable());
        assert!(!Response::new(404, "missing").is_cacheable());
        assert!(!Response::new(206, "partial").is_cacheable());
        assert!(!Response::error().is_cacheable());
        assert!(Response::new(200, "").with_type(ResponseType::Cors).is_cacheable());
    }

    #[test]
    fn test_duplicate_is_independent() {
        let original = Response::new(200, "body").with_header("content-type", "text/plain");
        let copy = original.duplicate();
        assert_eq!(original.text(), "body");
        assert_eq!(copy.content_type(), Some("text/plain"));
        assert_eq!(copy.into_body(), Bytes::from_static(b"body"));
    }

    #[test]
    fn test_synthetic() {
        let response = Response::synthetic(503, "text/plain", "Offline");
        assert_eq!(response.source, ResponseSource::Synthetic);
        assert_eq!(response.content_type(), Some("text/plain"));
        assert!(!response.ok());
    }
}
