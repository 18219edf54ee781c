//! Registration: the active and waiting workers of one scope.
//!
//! A newly registered worker installs, then activates straight away only
//! if nothing is active yet or it asked to skip waiting. Otherwise it
//! waits, pages are told an update is available, and a `SKIP_WAITING`
//! message promotes it. Update checks poll an [`UpdateFeed`] and register
//! a worker for any release that differs from the active and waiting ones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use swcache_core::cache::StoreInfo;
use swcache_core::cache::hash::digest_bytes;
use swcache_core::{AppConfig, Error, Request, Response};

use super::clients::{ClientMessage, ClientPage};
use super::lifecycle::{ActivationReport, InstallReport};
use super::messages::{CacheInfo, ControlMessage, MessageOutcome};
use super::sync::{PendingSync, SyncOutcome};
use super::{ServiceWorker, WorkerContext, WorkerState};
use crate::fetch::Network;

/// A deployable release as advertised by an update feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Release {
    pub version: String,
    pub digest: String,
}

/// Source of the latest release.
#[async_trait]
pub trait UpdateFeed: Send + Sync {
    async fn latest(&self) -> Result<Release, Error>;
}

/// Update feed backed by a JSON document with a `version` field.
///
/// The release digest is the SHA-256 of the raw document, so any change
/// to it counts as a new release.
pub struct ManifestFeed {
    network: Arc<dyn Network>,
    url: Url,
}

#[derive(Deserialize)]
struct ManifestDocument {
    version: String,
}

impl ManifestFeed {
    pub fn new(network: Arc<dyn Network>, url: Url) -> Self {
        Self { network, url }
    }
}

#[async_trait]
impl UpdateFeed for ManifestFeed {
    async fn latest(&self) -> Result<Release, Error> {
        let response = self.network.fetch(&Request::get(self.url.clone())).await?;
        if !response.ok() {
            return Err(Error::HttpError(format!("update feed returned {}", response.status)));
        }

        let body = response.into_body();
        let document: ManifestDocument =
            serde_json::from_slice(&body).map_err(|e| Error::InvalidInput(format!("update feed: {e}")))?;
        Ok(Release { version: document.version, digest: digest_bytes(&body) })
    }
}

/// What happened to a registered worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegisterOutcome {
    Activated { version: String, install: InstallReport, activation: ActivationReport },
    Waiting { version: String, install: InstallReport },
}

/// Version, state and release digest of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct WorkerSummary {
    pub version: String,
    pub state: WorkerState,
    pub digest: Option<String>,
}

impl From<&ServiceWorker> for WorkerSummary {
    fn from(worker: &ServiceWorker) -> Self {
        Self {
            version: worker.version().to_string(),
            state: worker.state(),
            digest: worker.release_digest().map(str::to_string),
        }
    }
}

/// Snapshot of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RegistrationStatus {
    pub active: Option<WorkerSummary>,
    pub waiting: Option<WorkerSummary>,
    pub clients: Vec<ClientPage>,
    pub pending_sync: Vec<PendingSync>,
    pub caches: Vec<StoreInfo>,
}

pub struct Registration {
    config: AppConfig,
    ctx: WorkerContext,
    active: RwLock<Option<Arc<ServiceWorker>>>,
    waiting: RwLock<Option<Arc<ServiceWorker>>>,
}

impl Registration {
    pub fn new(config: AppConfig, ctx: WorkerContext) -> Self {
        Self { config, ctx, active: RwLock::new(None), waiting: RwLock::new(None) }
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Register the worker for the configured version.
    pub async fn start(&self) -> Result<RegisterOutcome, Error> {
        let worker = ServiceWorker::new(&self.config, self.ctx.clone())?;
        self.register(worker).await
    }

    pub async fn active(&self) -> Option<Arc<ServiceWorker>> {
        self.active.read().await.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<ServiceWorker>> {
        self.waiting.read().await.clone()
    }

    /// Install `worker`, then activate it or leave it waiting.
    ///
    /// # Errors
    ///
    /// Install and activation errors propagate; a worker that fails to
    /// install is never made active or waiting.
    pub async fn register(&self, worker: ServiceWorker) -> Result<RegisterOutcome, Error> {
        let worker = Arc::new(worker);
        let install = worker.install().await?;
        let version = worker.version().to_string();

        let has_active = self.active.read().await.is_some();
        if !has_active || worker.skip_waiting_requested() {
            let superseded = self.waiting.write().await.take();
            if let Some(stale) = superseded {
                stale.set_state(WorkerState::Redundant);
            }
            let activation = self.promote(worker).await?;
            return Ok(RegisterOutcome::Activated { version, install, activation });
        }

        let previous = self.waiting.write().await.replace(worker);
        if let Some(previous) = previous {
            previous.set_state(WorkerState::Redundant);
        }
        tracing::info!(version = %version, "new version waiting");
        self.ctx.clients.post_message(ClientMessage::UpdateAvailable { version: version.clone() });

        Ok(RegisterOutcome::Waiting { version, install })
    }

    /// Activate `worker` and make it the controller, retiring the previous one.
    ///
    /// Callers hand over sole ownership of `worker`: a waiting worker is
    /// taken out of the waiting slot before it gets here.
    async fn promote(&self, worker: Arc<ServiceWorker>) -> Result<ActivationReport, Error> {
        let activation = match worker.activate().await {
            Ok(activation) => activation,
            Err(e) => {
                tracing::error!(version = %worker.version(), error = %e, "activation failed");
                worker.set_state(WorkerState::Redundant);
                return Err(e);
            }
        };

        let previous = self.active.write().await.replace(Arc::clone(&worker));
        if let Some(previous) = previous
            && !Arc::ptr_eq(&previous, &worker)
        {
            previous.set_state(WorkerState::Redundant);
        }
        Ok(activation)
    }

    /// Serve `request` through the active worker, or straight from the
    /// network when nothing controls the scope yet.
    pub async fn fetch(&self, request: Request) -> Result<Response, Error> {
        match self.active().await {
            Some(worker) => worker.handle_fetch(request).await,
            None => {
                tracing::debug!(url = %request.url, "no active worker, passing through");
                self.ctx.network.fetch(&request).await
            }
        }
    }

    /// Deliver a control message.
    ///
    /// `SKIP_WAITING` goes to the waiting worker and promotes it; every
    /// other message goes to the active worker. The waiting worker is
    /// taken before promotion, so of several concurrent `SKIP_WAITING`
    /// messages only one promotes it and the rest reach the active worker.
    pub async fn post_message(
        &self, message: ControlMessage, reply: Option<oneshot::Sender<CacheInfo>>,
    ) -> Result<MessageOutcome, Error> {
        if message == ControlMessage::SkipWaiting {
            let waiting = self.waiting.write().await.take();
            if let Some(waiting) = waiting {
                let outcome = waiting.handle_message(message, reply).await?;
                self.promote(waiting).await?;
                return Ok(outcome);
            }
        }

        let worker = self.active().await.ok_or(Error::NoActiveWorker)?;
        worker.handle_message(message, reply).await
    }

    /// Register (if needed) and fire the sync event for `tag`.
    pub async fn sync(&self, tag: &str) -> Result<SyncOutcome, Error> {
        if self.active().await.is_none() {
            return Err(Error::NoActiveWorker);
        }
        self.ctx.sync.register(tag).await;
        self.ctx.sync.trigger(tag).await
    }

    pub async fn status(&self) -> Result<RegistrationStatus, Error> {
        let active = self.active().await.map(|w| WorkerSummary::from(w.as_ref()));
        let waiting = self.waiting().await.map(|w| WorkerSummary::from(w.as_ref()));
        Ok(RegistrationStatus {
            active,
            waiting,
            clients: self.ctx.clients.match_all().await,
            pending_sync: self.ctx.sync.pending().await,
            caches: self.ctx.storage.store_info().await?,
        })
    }

    /// Compare the feed's latest release with the active and waiting
    /// workers and register a new worker if it differs from both.
    ///
    /// Workers without a release digest are compared by version.
    /// Returns whether a new worker was registered.
    pub async fn check_for_update(&self, feed: &dyn UpdateFeed) -> Result<bool, Error> {
        let release = feed.latest().await?;

        let known = [self.active().await, self.waiting().await];
        let already_known = known.iter().flatten().any(|worker| match worker.release_digest() {
            Some(digest) => digest == release.digest,
            None => worker.version() == release.version,
        });
        if already_known {
            tracing::debug!(version = %release.version, "no update");
            return Ok(false);
        }

        tracing::info!(version = %release.version, digest = %release.digest, "update found");
        let config = self.config.with_version(&release.version);
        let worker = ServiceWorker::new(&config, self.ctx.clone())?.with_release_digest(release.digest);
        self.register(worker).await?;
        Ok(true)
    }

    /// Poll `feed` every `every`, starting immediately.
    pub fn spawn_update_checks(self: Arc<Self>, feed: Arc<dyn UpdateFeed>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = self.check_for_update(feed.as_ref()).await {
                    tracing::warn!(error = %e, "update check failed");
                }
            }
        })
    }
}
