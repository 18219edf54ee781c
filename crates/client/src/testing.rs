//! Scripted network and fixtures for unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use swcache_core::{AppConfig, Error, Request, Response, ResponseType};

use crate::fetch::Network;

pub(crate) const ORIGIN: &str = "https://absensi.test";

pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        version: "1".into(),
        origin: ORIGIN.into(),
        precache_urls: vec![
            "/".into(),
            "/index.html".into(),
            "/app.js".into(),
            "/styles.css".into(),
            "/icons/icon-192x192.png".into(),
        ],
        ..Default::default()
    }
}

#[derive(Clone)]
enum Route {
    Respond { status: u16, body: String, content_type: Option<String> },
    Fail,
}

/// In-memory network. Unrouted URLs fail like a dropped connection.
pub(crate) struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Self {
        Self { routes: Mutex::new(HashMap::new()), calls: Mutex::new(Vec::new()), delay: Duration::ZERO }
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Self::new() }
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Route::Respond { status, body: body.to_string(), content_type: None });
    }

    pub(crate) fn respond_typed(&self, url: &str, status: u16, body: &str, content_type: &str) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Route::Respond { status, body: body.to_string(), content_type: Some(content_type.to_string()) },
        );
    }

    pub(crate) fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Route::Fail);
    }

    /// Drop every route, as if the device went offline.
    pub(crate) fn go_offline(&self) {
        self.routes.lock().unwrap().clear();
    }

    pub(crate) fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| u.as_str() == url).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let route = self.routes.lock().unwrap().get(&url).cloned();
        match route {
            Some(Route::Respond { status, body, content_type }) => {
                let response_type =
                    if url.starts_with(ORIGIN) { ResponseType::Basic } else { ResponseType::Cors };
                let mut response = Response::new(status, body).with_type(response_type);
                if let Some(ct) = content_type {
                    response.headers.insert("content-type", ct);
                }
                Ok(response)
            }
            Some(Route::Fail) | None => Err(Error::Network(format!("connection refused: {url}"))),
        }
    }
}
