//! Fetch interception: classify, then serve by the category's strategy.
//!
//! | Category | Strategy | Writes to |
//! |---|---|---|
//! | RemoteDataApi | NetworkOnly | - |
//! | CrossOriginCdn | CacheFirstWithBackgroundRefresh | runtime |
//! | NavigationDocument | NetworkFirstWithCacheFallback (+ offline page) | runtime |
//! | StaticAsset | CacheFirstWithBackgroundRefresh | precache |
//! | LargeModelAsset | CacheFirstNoRefresh | precache |
//! | Uncategorized | NetworkFirstWithCacheFallback | runtime |
//!
//! Only cacheable responses (200, not `error`) are written, and always as
//! a duplicate of the response handed back to the page.

use std::sync::Arc;

use swcache_core::{CachingStrategy, Error, Request, ResourceCategory, Response, classify};

use super::ServiceWorker;
use super::offline::offline_response;
use super::writer::StoreWriter;
use crate::fetch::Network;

const CDN_UNAVAILABLE: &str = "Offline - CDN unavailable";
const ASSET_UNAVAILABLE: &str = "Offline - asset unavailable";

impl ServiceWorker {
    /// Serve one intercepted request.
    ///
    /// # Errors
    ///
    /// Network failures propagate for `NetworkOnly`, `CacheFirstNoRefresh`
    /// and uncategorized requests with no cached fallback. Every other
    /// path resolves to a response.
    pub async fn handle_fetch(&self, request: Request) -> Result<Response, Error> {
        let category = classify(&request, &self.rules);
        let strategy = category.strategy();
        tracing::debug!(url = %request.url, category = category.as_str(), ?strategy, "intercepted fetch");

        let scope = match (strategy, category.store_scope()) {
            (CachingStrategy::NetworkOnly, _) | (_, None) => return self.ctx.network.fetch(&request).await,
            (_, Some(scope)) => scope,
        };
        let store = self.writer(scope);

        match strategy {
            CachingStrategy::CacheFirstWithBackgroundRefresh => {
                let unavailable =
                    if category == ResourceCategory::CrossOriginCdn { CDN_UNAVAILABLE } else { ASSET_UNAVAILABLE };
                Ok(self.stale_while_revalidate(request, store, unavailable).await)
            }
            CachingStrategy::NetworkFirstWithCacheFallback => {
                self.network_first(request, store, category == ResourceCategory::NavigationDocument)
                    .await
            }
            CachingStrategy::CacheFirstNoRefresh => self.cache_first(request, store).await,
            CachingStrategy::NetworkOnly => self.ctx.network.fetch(&request).await,
        }
    }

    /// Cache lookup across every store. Read failures count as a miss.
    async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.ctx.storage.match_any(request).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "cache read failed");
                None
            }
        }
    }

    async fn stale_while_revalidate(&self, request: Request, store: StoreWriter, unavailable: &str) -> Response {
        if let Some(cached) = self.lookup(&request).await {
            tracing::debug!(url = %request.url, "cache hit, refreshing in background");
            spawn_refresh(Arc::clone(&self.ctx.network), request, store);
            return cached;
        }

        match self.ctx.network.fetch(&request).await {
            Ok(response) => {
                store_copy(&store, &request, &response).await;
                response
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "no cache and no network");
                Response::synthetic(503, "text/plain; charset=utf-8", unavailable.to_string())
            }
        }
    }

    async fn network_first(&self, request: Request, store: StoreWriter, offline_page: bool) -> Result<Response, Error> {
        match self.ctx.network.fetch(&request).await {
            Ok(response) => {
                store_copy(&store, &request, &response).await;
                Ok(response)
            }
            Err(e) => {
                if let Some(cached) = self.lookup(&request).await {
                    tracing::debug!(
                        url = %request.url, error = %e, offline = e.is_network(), "network failed, serving cache"
                    );
                    return Ok(cached);
                }
                if offline_page {
                    tracing::info!(url = %request.url, "serving offline document");
                    return Ok(offline_response());
                }
                Err(e)
            }
        }
    }

    async fn cache_first(&self, request: Request, store: StoreWriter) -> Result<Response, Error> {
        if let Some(cached) = self.lookup(&request).await {
            return Ok(cached);
        }

        let response = self.ctx.network.fetch(&request).await?;
        store_copy(&store, &request, &response).await;
        Ok(response)
    }
}

/// Write a duplicate of `response` if it may be cached. Failures are logged.
async fn store_copy(store: &StoreWriter, request: &Request, response: &Response) {
    if !response.is_cacheable() {
        tracing::debug!(url = %request.url, status = response.status, "not caching response");
        return;
    }
    match store.put(request, response.duplicate()).await {
        Ok(()) => {}
        Err(Error::StoreRetired(_)) => {
            tracing::debug!(url = %request.url, store = store.name(), "version superseded, dropping cache write");
        }
        Err(e) => tracing::warn!(url = %request.url, store = store.name(), error = %e, "cache write failed"),
    }
}

/// Detached refresh of a cache entry; never awaited by the response path.
fn spawn_refresh(network: Arc<dyn Network>, request: Request, store: StoreWriter) {
    tokio::spawn(async move {
        match network.fetch(&request).await {
            Ok(response) => store_copy(&store, &request, &response).await,
            Err(e) => tracing::debug!(url = %request.url, error = %e, "background refresh failed"),
        }
    });
}
