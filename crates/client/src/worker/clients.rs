//! Open client pages and the broadcast channel to them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, broadcast};

const CHANNEL_CAPACITY: usize = 64;

/// Messages posted from the worker to every open page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// A new version installed and is waiting for SKIP_WAITING.
    UpdateAvailable { version: String },
    /// A background sync task completed.
    SyncSuccess { tag: String, message: String },
    /// CACHE_URLS stored new entries.
    CacheUpdated { cached: usize },
}

pub type ClientId = u64;

/// An open page and the worker version controlling it, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ClientPage {
    pub id: ClientId,
    pub url: String,
    pub controller: Option<String>,
}

struct ClientsInner {
    pages: RwLock<BTreeMap<ClientId, ClientPage>>,
    next_id: AtomicU64,
    tx: broadcast::Sender<ClientMessage>,
}

/// Registry of client pages, shared by every worker of a registration.
#[derive(Clone)]
pub struct Clients {
    inner: Arc<ClientsInner>,
}

impl Default for Clients {
    fn default() -> Self {
        Self::new()
    }
}

impl Clients {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { inner: Arc::new(ClientsInner { pages: RwLock::new(BTreeMap::new()), next_id: AtomicU64::new(1), tx }) }
    }

    /// Track a newly opened page. It starts uncontrolled until a claim.
    pub async fn open(&self, url: impl Into<String>) -> ClientId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let page = ClientPage { id, url: url.into(), controller: None };
        self.inner.pages.write().await.insert(id, page);
        id
    }

    pub async fn close(&self, id: ClientId) -> bool {
        self.inner.pages.write().await.remove(&id).is_some()
    }

    pub async fn match_all(&self) -> Vec<ClientPage> {
        self.inner.pages.read().await.values().cloned().collect()
    }

    /// Put every open page under `version`'s control.
    ///
    /// Returns the number of pages claimed.
    pub async fn claim(&self, version: &str) -> usize {
        let mut pages = self.inner.pages.write().await;
        for page in pages.values_mut() {
            page.controller = Some(version.to_string());
        }
        pages.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.inner.tx.subscribe()
    }

    /// Broadcast `message`. Returns how many listeners received it.
    pub fn post_message(&self, message: ClientMessage) -> usize {
        match self.inner.tx.send(message) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(message)) => {
                tracing::debug!(?message, "no client listening");
                0
            }
        }
    }
}
