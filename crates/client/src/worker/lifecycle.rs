//! Install and activate transitions.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use url::Url;

use swcache_core::{CacheStore, Error, Request, Response};

use super::{ServiceWorker, WorkerState};

/// Settlement of every precache attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct InstallReport {
    pub cached: Vec<String>,
    pub failed: Vec<String>,
}

/// Stores pruned and kept by an activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    pub retained: Vec<String>,
    pub claimed_clients: usize,
}

impl ServiceWorker {
    /// Precache the manifest into this version's precache store.
    ///
    /// Every URL settles independently: a failed fetch, a non-200 status
    /// or a failed write is logged and reported, never fatal.
    ///
    /// # Errors
    ///
    /// Returns `Error::InstallFailed` only if the precache store cannot be
    /// opened; the worker becomes redundant.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.set_state(WorkerState::Installing);
        tracing::info!(version = %self.version, urls = self.manifest.len(), "installing");

        let store = match self.ctx.storage.open_store(&self.names.precache).await {
            Ok(store) => store,
            Err(e) => {
                tracing::error!(version = %self.version, error = %e, "install failed");
                self.set_state(WorkerState::Redundant);
                return Err(Error::InstallFailed(e.to_string()));
            }
        };

        let attempts = join_all(self.manifest.iter().map(|url| self.add_to_store(&store, url.clone()))).await;

        let mut report = InstallReport::default();
        for (url, result) in self.manifest.iter().zip(attempts) {
            match result {
                Ok(()) => report.cached.push(url.to_string()),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "failed to precache");
                    report.failed.push(url.to_string());
                }
            }
        }

        tracing::info!(
            version = %self.version,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "precache complete"
        );

        self.set_state(WorkerState::Installed);
        if self.skip_waiting_on_install {
            self.skip_waiting();
        }

        Ok(report)
    }

    /// Drop every store outside this version's allow-list, then claim
    /// open clients.
    ///
    /// Pruning is awaited in full before the claim so a claimed page never
    /// reads from a store that is about to disappear. From the moment
    /// activation starts, serve-path writes of other versions are refused,
    /// so a pruned store stays gone.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        self.set_state(WorkerState::Activating);
        *self.ctx.activated.write().await = Some(self.names.clone());

        let names = self.ctx.storage.list_store_names().await?;
        let (retained, stale): (Vec<String>, Vec<String>) =
            names.into_iter().partition(|name| self.names.is_current(name));

        let deletions = join_all(stale.iter().map(|name| self.ctx.storage.delete_store(name))).await;

        let mut report = ActivationReport { retained, ..Default::default() };
        for (name, result) in stale.into_iter().zip(deletions) {
            match result {
                Ok(true) => {
                    tracing::info!(store = %name, "deleted old cache");
                    report.deleted.push(name);
                }
                Ok(false) => tracing::debug!(store = %name, "old cache already gone"),
                Err(e) => tracing::warn!(store = %name, error = %e, "failed to delete old cache"),
            }
        }

        report.claimed_clients = self.ctx.clients.claim(&self.version).await;
        self.set_state(WorkerState::Activated);

        tracing::info!(
            version = %self.version,
            deleted = report.deleted.len(),
            claimed = report.claimed_clients,
            "activated"
        );

        Ok(report)
    }

    /// Fetch `url` and store it if the response is a complete 200.
    async fn add_to_store(&self, store: &CacheStore, url: Url) -> Result<(), Error> {
        let (request, response) = self.fetch_cacheable(url).await?;
        store.put(&request, response).await
    }

    /// GET `url`, rejecting anything that may not be cached.
    pub(crate) async fn fetch_cacheable(&self, url: Url) -> Result<(Request, Response), Error> {
        let request = Request::get(url);
        let response = self.ctx.network.fetch(&request).await?;
        if !response.is_cacheable() {
            return Err(Error::HttpError(format!("status {}", response.status)));
        }
        Ok((request, response))
    }
}
