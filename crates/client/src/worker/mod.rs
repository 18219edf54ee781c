//! The service worker: lifecycle controller and fetch interception engine.
//!
//! ### Lifecycle
//! `Parsed → Installing → Installed → Activating → Activated`, or
//! `Redundant` once replaced or failed. Install precaches the manifest
//! with per-URL failure tolerance; activate prunes every store whose name
//! is not one of this version's, then claims open clients.
//!
//! ### Events
//! Hosts hand the worker [`WorkerEvent`]s and await the returned
//! [`EventOutcome`]; an event is settled when its future resolves.
//!
//! ### Shared state
//! Everything process-wide lives on [`ServiceWorker`] or the
//! [`WorkerContext`] it shares with its registration. There are no
//! module-level globals.

pub mod clients;
pub mod intercept;
pub mod lifecycle;
pub mod messages;
pub mod offline;
pub mod registration;
pub mod sync;
mod writer;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{oneshot, watch};
use url::Url;

use swcache_core::classify::StoreScope;
use swcache_core::{AppConfig, CacheNames, CacheStorage, ClassifierRules, Error, Request, Response};

use crate::fetch::{Network, resolve};
use writer::{ActivatedNames, StoreWriter};

pub use clients::{ClientId, ClientMessage, ClientPage, Clients};
pub use lifecycle::{ActivationReport, InstallReport};
pub use messages::{CacheInfo, ControlMessage, MessageOutcome};
pub use registration::{
    ManifestFeed, RegisterOutcome, Registration, RegistrationStatus, Release, UpdateFeed, WorkerSummary,
};
pub use sync::{ATTENDANCE_SYNC_TAG, AttendanceSync, PendingSync, SyncManager, SyncOutcome, SyncTask};

/// Lifecycle state of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed and waiting for activation.
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// Collaborators shared by every worker of one registration.
#[derive(Clone)]
pub struct WorkerContext {
    pub storage: CacheStorage,
    pub network: Arc<dyn Network>,
    pub clients: Clients,
    pub sync: SyncManager,
    activated: ActivatedNames,
}

impl WorkerContext {
    pub fn new(storage: CacheStorage, network: Arc<dyn Network>) -> Self {
        let clients = Clients::new();
        let sync = SyncManager::new(clients.clone());
        Self { storage, network, clients, sync, activated: ActivatedNames::default() }
    }
}

/// Inbound event routed by [`ServiceWorker::dispatch`].
#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Message { message: ControlMessage, reply: Option<oneshot::Sender<CacheInfo>> },
    Sync { tag: String },
}

/// Settled result of a [`WorkerEvent`].
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    Response(Response),
    Message(MessageOutcome),
    Synced(SyncOutcome),
}

/// One deployed version of the worker.
pub struct ServiceWorker {
    version: String,
    names: CacheNames,
    manifest: Vec<Url>,
    rules: ClassifierRules,
    release_digest: Option<String>,
    skip_waiting_on_install: bool,
    ctx: WorkerContext,
    state: watch::Sender<WorkerState>,
    skip_waiting: AtomicBool,
}

impl fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("version", &self.version)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ServiceWorker {
    /// Build the worker for `config.version`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an unusable origin and
    /// `Error::InvalidUrl` for a manifest entry that does not resolve.
    pub fn new(config: &AppConfig, ctx: WorkerContext) -> Result<Self, Error> {
        let rules = ClassifierRules::from_config(config).map_err(|e| Error::InvalidInput(e.to_string()))?;
        let manifest = precache_manifest(&rules.origin, &config.precache_urls)?;
        let (state, _) = watch::channel(WorkerState::Parsed);

        Ok(Self {
            version: config.version.clone(),
            names: CacheNames::new(&config.app_name, &config.version),
            manifest,
            rules,
            release_digest: None,
            skip_waiting_on_install: config.skip_waiting_on_install,
            ctx,
            state,
            skip_waiting: AtomicBool::new(false),
        })
    }

    /// Tag the worker with the digest of the release it was built from.
    pub fn with_release_digest(mut self, digest: impl Into<String>) -> Self {
        self.release_digest = Some(digest.into());
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn cache_names(&self) -> &CacheNames {
        &self.names
    }

    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    pub fn release_digest(&self) -> Option<&str> {
        self.release_digest.as_deref()
    }

    pub fn origin(&self) -> &Url {
        &self.rules.origin
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, next: WorkerState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::info!(version = %self.version, from = %prev, to = %next, "worker state");
        }
    }

    /// Ask to be activated without waiting for existing clients to close.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Writer for this version's store of `scope`.
    pub(crate) fn writer(&self, scope: StoreScope) -> StoreWriter {
        let name = match scope {
            StoreScope::Precache => &self.names.precache,
            StoreScope::Runtime => &self.names.runtime,
        };
        StoreWriter::new(self.ctx.storage.clone(), name, self.names.clone(), Arc::clone(&self.ctx.activated))
    }

    /// Resolve `input` against this worker's origin into a GET request.
    pub fn request_for(&self, input: &str) -> Result<Request, Error> {
        let url = resolve(&self.rules.origin, input).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Request::get(url))
    }

    /// Route `event` to its handler.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, Error> {
        match event {
            WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => self.handle_fetch(request).await.map(EventOutcome::Response),
            WorkerEvent::Message { message, reply } => {
                self.handle_message(message, reply).await.map(EventOutcome::Message)
            }
            WorkerEvent::Sync { tag } => self.ctx.sync.trigger(&tag).await.map(EventOutcome::Synced),
        }
    }
}

/// Resolve and de-duplicate the precache list, keeping first occurrences.
fn precache_manifest(origin: &Url, entries: &[String]) -> Result<Vec<Url>, Error> {
    let mut manifest: Vec<Url> = Vec::with_capacity(entries.len());
    for entry in entries {
        let url = resolve(origin, entry).map_err(|e| Error::InvalidUrl(format!("{entry}: {e}")))?;
        if !manifest.contains(&url) {
            manifest.push(url);
        }
    }
    Ok(manifest)
}
