//! Network access for the fetch interception engine.
//!
//! ### Network seam
//! - [`Network`] is the only way the engine reaches the network, so hosts
//!   and tests can substitute their own transport.
//! - Any HTTP status is a successful fetch; only transport failures are
//!   errors. Strategies decide what a 404 means.
//!
//! ### FetchClient
//! - reqwest with rustls, gzip/brotli/deflate
//! - Max redirects: 5
//! - Max body bytes: configurable (model weights are large)
//! - Response type: `basic` for the serving origin, `cors` otherwise

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, header};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, resolve};

use swcache_core::{AppConfig, Error, Request, Response, ResponseType};

/// Transport used by the engine.
#[async_trait]
pub trait Network: Send + Sync {
    /// Issue `request`, returning whatever response the server produced.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "swcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 50MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Serving origin, used to tell `basic` from `cors` responses.
    pub origin: Option<::url::Url>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "swcache/0.1".to_string(),
            max_bytes: 50 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            origin: None,
        }
    }
}

impl FetchConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            origin: config.origin_url().ok(),
            ..Default::default()
        }
    }
}

/// reqwest-backed [`Network`].
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Shared reqwest client, for collaborators that POST.
    pub fn http(&self) -> &Client {
        &self.http
    }

    fn response_type(&self, final_url: &::url::Url) -> ResponseType {
        match &self.config.origin {
            Some(origin) if origin.origin() != final_url.origin() => ResponseType::Cors,
            _ => ResponseType::Basic,
        }
    }
}

/// Whether a declared body length is over `max`. Lengths that do not fit
/// in `usize` always are.
fn exceeds_limit(len: u64, max: usize) -> bool {
    usize::try_from(len).map_or(true, |len| len > max)
}

fn map_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() { Error::FetchTimeout(err.to_string()) } else { Error::Network(err.to_string()) }
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {e}", request.method)))?;

        let mut builder = self.http.request(method, request.url.as_str());
        if let Some(accept) = &request.accept {
            builder = builder.header(header::ACCEPT, accept);
        }

        let response = builder.send().await.map_err(map_transport_error)?;

        if let Some(len) = response.content_length()
            && exceeds_limit(len, self.config.max_bytes)
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let status = response.status().as_u16();
        let response_type = self.response_type(response.url());
        let headers = response.headers().clone();

        let bytes = response.bytes().await.map_err(map_transport_error)?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        let mut out = Response::new(status, bytes).with_type(response_type);
        for (name, value) in headers.iter() {
            if let Ok(value) = value.to_str() {
                out.headers.append(name.as_str(), value);
            }
        }

        tracing::debug!(
            url = %request.url,
            status,
            bytes = out.body().len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "network fetch"
        );

        Ok(out)
    }
}
