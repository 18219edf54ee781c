//! Intercepted request model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::Error;

/// How the page issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level page navigation.
    Navigate,
    #[default]
    SameOrigin,
    Cors,
    NoCors,
}

impl RequestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMode::Navigate => "navigate",
            RequestMode::SameOrigin => "same-origin",
            RequestMode::Cors => "cors",
            RequestMode::NoCors => "no-cors",
        }
    }
}

impl fmt::Display for RequestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "navigate" => Ok(RequestMode::Navigate),
            "same-origin" => Ok(RequestMode::SameOrigin),
            "cors" => Ok(RequestMode::Cors),
            "no-cors" => Ok(RequestMode::NoCors),
            other => Err(Error::InvalidInput(format!("unknown request mode: {other}"))),
        }
    }
}

/// A request observed by the fetch interception engine.
///
/// Cache identity is method plus URL; the fragment never reaches the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
    pub accept: Option<String>,
}

impl Request {
    /// A plain GET for `url`.
    pub fn get(mut url: Url) -> Self {
        url.set_fragment(None);
        Self { method: "GET".into(), url, mode: RequestMode::default(), accept: None }
    }

    /// A top-level navigation to `url`.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_mode(RequestMode::Navigate).with_accept("text/html")
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Whether the declared Accept header mentions `needle`.
    pub fn accepts(&self, needle: &str) -> bool {
        self.accept.as_deref().is_some_and(|a| a.to_ascii_lowercase().contains(needle))
    }

    /// Whether the request targets `origin` (scheme, host and port).
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}
