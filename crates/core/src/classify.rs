//! Resource classification and the caching policy table.
//!
//! Classification is pure and recomputed for every request. Rules are
//! evaluated in order and the first match wins:
//!
//! 1. Remote-data backend (host or URL matches an allow-list pattern)
//! 2. Cross-origin (CDN)
//! 3. Navigation or HTML accept
//! 4. Static asset (script, style, image, font)
//! 5. Large model/weights binary
//! 6. Everything else

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{AppConfig, ConfigError};
use crate::request::{Request, RequestMode};

const STATIC_EXTENSIONS: &[&str] =
    &["js", "mjs", "css", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2", "ttf", "otf"];

const STATIC_ACCEPT: &[&str] = &["javascript", "text/css", "image/", "font/"];

/// Category assigned to an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    RemoteDataApi,
    CrossOriginCdn,
    NavigationDocument,
    StaticAsset,
    LargeModelAsset,
    Uncategorized,
}

/// How the fetch engine serves a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CachingStrategy {
    NetworkOnly,
    /// Stale-while-revalidate.
    CacheFirstWithBackgroundRefresh,
    NetworkFirstWithCacheFallback,
    CacheFirstNoRefresh,
}

/// Which of a version's stores receives writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    Precache,
    Runtime,
}

impl ResourceCategory {
    /// The fixed policy table.
    pub fn strategy(&self) -> CachingStrategy {
        match self {
            ResourceCategory::RemoteDataApi => CachingStrategy::NetworkOnly,
            ResourceCategory::CrossOriginCdn => CachingStrategy::CacheFirstWithBackgroundRefresh,
            ResourceCategory::NavigationDocument => CachingStrategy::NetworkFirstWithCacheFallback,
            ResourceCategory::StaticAsset => CachingStrategy::CacheFirstWithBackgroundRefresh,
            ResourceCategory::LargeModelAsset => CachingStrategy::CacheFirstNoRefresh,
            ResourceCategory::Uncategorized => CachingStrategy::NetworkFirstWithCacheFallback,
        }
    }

    /// Store that responses of this category are written to, if any.
    pub fn store_scope(&self) -> Option<StoreScope> {
        match self {
            ResourceCategory::RemoteDataApi => None,
            ResourceCategory::StaticAsset | ResourceCategory::LargeModelAsset => Some(StoreScope::Precache),
            ResourceCategory::CrossOriginCdn
            | ResourceCategory::NavigationDocument
            | ResourceCategory::Uncategorized => Some(StoreScope::Runtime),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::RemoteDataApi => "remote_data_api",
            ResourceCategory::CrossOriginCdn => "cross_origin_cdn",
            ResourceCategory::NavigationDocument => "navigation_document",
            ResourceCategory::StaticAsset => "static_asset",
            ResourceCategory::LargeModelAsset => "large_model_asset",
            ResourceCategory::Uncategorized => "uncategorized",
        }
    }
}

/// Inputs the classifier needs besides the request itself.
#[derive(Debug, Clone)]
pub struct ClassifierRules {
    pub origin: Url,
    pub remote_data_patterns: Vec<String>,
    pub model_patterns: Vec<String>,
}

impl ClassifierRules {
    pub fn new(origin: Url) -> Self {
        Self { origin, remote_data_patterns: Vec::new(), model_patterns: Vec::new() }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            origin: config.origin_url()?,
            remote_data_patterns: lowercase_all(&config.remote_data_patterns),
            model_patterns: lowercase_all(&config.model_patterns),
        })
    }
}

fn lowercase_all(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| p.to_ascii_lowercase())
        .collect()
}

/// Assign a category to `request`.
pub fn classify(request: &Request, rules: &ClassifierRules) -> ResourceCategory {
    let href = request.url.as_str().to_ascii_lowercase();
    let host = request.url.host_str().unwrap_or_default().to_ascii_lowercase();
    let path = request.url.path().to_ascii_lowercase();

    if rules
        .remote_data_patterns
        .iter()
        .any(|p| host.contains(p.as_str()) || href.contains(p.as_str()))
    {
        return ResourceCategory::RemoteDataApi;
    }

    if !request.is_same_origin(&rules.origin) {
        return ResourceCategory::CrossOriginCdn;
    }

    if request.mode == RequestMode::Navigate || request.accepts("text/html") {
        return ResourceCategory::NavigationDocument;
    }

    if STATIC_ACCEPT.iter().any(|a| request.accepts(a)) || path.contains("font") || has_static_extension(&path) {
        return ResourceCategory::StaticAsset;
    }

    if rules.model_patterns.iter().any(|p| href.contains(p.as_str()))
        || path.ends_with(".bin")
        || request.accepts("application/octet-stream")
    {
        return ResourceCategory::LargeModelAsset;
    }

    ResourceCategory::Uncategorized
}

fn has_static_extension(path: &str) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.ends_with('/') && STATIC_EXTENSIONS.contains(&ext))
}
