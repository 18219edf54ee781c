//! Control messages posted to the worker by its pages.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use url::Url;

use swcache_core::Error;
use swcache_core::cache::StoreInfo;
use swcache_core::classify::StoreScope;

use super::ServiceWorker;
use super::clients::ClientMessage;
use super::writer::StoreWriter;

/// Inbound control message, dispatched on its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    SkipWaiting,
    CacheUrls { urls: Vec<String> },
    ClearCache,
    GetCacheInfo,
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Parse a raw payload. Anything unrecognized (including a payload
    /// with no `type`) becomes [`ControlMessage::Unknown`].
    pub fn from_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or(ControlMessage::Unknown)
    }
}

/// Reply to `GET_CACHE_INFO`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub cache_info: Vec<StoreInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    SkipWaitingRequested,
    Cached { cached: usize, failed: Vec<String> },
    Cleared { deleted: Vec<String> },
    CacheInfo(CacheInfo),
    Ignored,
}

impl ServiceWorker {
    /// Handle one control message.
    ///
    /// `reply` is only used by `GET_CACHE_INFO`; a dropped port is logged.
    pub async fn handle_message(
        &self, message: ControlMessage, reply: Option<oneshot::Sender<CacheInfo>>,
    ) -> Result<MessageOutcome, Error> {
        tracing::debug!(?message, "control message");

        match message {
            ControlMessage::SkipWaiting => {
                self.skip_waiting();
                Ok(MessageOutcome::SkipWaitingRequested)
            }
            ControlMessage::CacheUrls { urls } => self.cache_urls(&urls).await,
            ControlMessage::ClearCache => {
                let deleted = self.clear_all().await?;
                Ok(MessageOutcome::Cleared { deleted })
            }
            ControlMessage::GetCacheInfo => {
                let info = CacheInfo { cache_info: self.ctx.storage.store_info().await? };
                if let Some(port) = reply
                    && port.send(info.clone()).is_err()
                {
                    tracing::warn!("GET_CACHE_INFO reply port dropped");
                }
                Ok(MessageOutcome::CacheInfo(info))
            }
            ControlMessage::Unknown => {
                tracing::debug!("ignoring unknown control message");
                Ok(MessageOutcome::Ignored)
            }
        }
    }

    async fn cache_urls(&self, urls: &[String]) -> Result<MessageOutcome, Error> {
        let store = self.writer(StoreScope::Precache);

        let mut failed = Vec::new();
        let mut targets = Vec::with_capacity(urls.len());
        for input in urls {
            match self.request_for(input) {
                Ok(request) => targets.push((input, request.url)),
                Err(e) => {
                    tracing::warn!(url = %input, error = %e, "skipping unresolvable url");
                    failed.push(input.clone());
                }
            }
        }

        let attempts = join_all(targets.iter().map(|(_, url)| self.cache_one(&store, url.clone()))).await;

        let mut cached = 0;
        for ((input, url), result) in targets.into_iter().zip(attempts) {
            match result {
                Ok(()) => cached += 1,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "failed to cache url");
                    failed.push(input.clone());
                }
            }
        }

        if cached > 0 {
            self.ctx.clients.post_message(ClientMessage::CacheUpdated { cached });
        }

        Ok(MessageOutcome::Cached { cached, failed })
    }

    async fn cache_one(&self, store: &StoreWriter, url: Url) -> Result<(), Error> {
        let (request, response) = self.fetch_cacheable(url).await?;
        store.put(&request, response).await
    }

    /// Delete every store, including other versions'.
    async fn clear_all(&self) -> Result<Vec<String>, Error> {
        let names = self.ctx.storage.list_store_names().await?;
        let results = join_all(names.iter().map(|name| self.ctx.storage.delete_store(name))).await;

        let mut deleted = Vec::with_capacity(names.len());
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(true) => deleted.push(name),
                Ok(false) => tracing::debug!(store = %name, "cache already gone"),
                Err(e) => tracing::warn!(store = %name, error = %e, "failed to delete cache"),
            }
        }
        tracing::info!(deleted = deleted.len(), "cleared all caches");
        Ok(deleted)
    }
}
