//! Cache writes made while serving requests.
//!
//! Activation prunes every store outside the new version's names. A write
//! from an older worker that lands afterwards, such as a detached refresh,
//! must not bring its store back. Writers therefore check the activated
//! names under the lock activation takes to switch them.

use std::sync::Arc;
use tokio::sync::RwLock;

use swcache_core::{CacheNames, CacheStorage, Error, Request, Response};

/// Store names of the most recently activated version of a registration.
pub(crate) type ActivatedNames = Arc<RwLock<Option<CacheNames>>>;

/// Write access to one store of one worker version.
#[derive(Clone)]
pub(crate) struct StoreWriter {
    storage: CacheStorage,
    name: String,
    owner: CacheNames,
    activated: ActivatedNames,
}

impl StoreWriter {
    pub(crate) fn new(storage: CacheStorage, name: &str, owner: CacheNames, activated: ActivatedNames) -> Self {
        Self { storage, name: name.to_string(), owner, activated }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Store `response` under `request`, reopening the store if a cache
    /// clear removed it.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreRetired` once a different version has activated.
    /// Nothing is written and no store is created in that case.
    pub(crate) async fn put(&self, request: &Request, response: Response) -> Result<(), Error> {
        let activated = self.activated.read().await;
        if activated.as_ref().is_some_and(|names| *names != self.owner) {
            return Err(Error::StoreRetired(self.name.clone()));
        }

        let store = self.storage.open_store(&self.name).await?;
        store.put(request, response).await
    }
}
