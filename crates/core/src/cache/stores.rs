//! Store lifecycle operations: open, enumerate, delete.
//!
//! Stores are listed in creation order, which is also the order
//! [`CacheStorage::match_any`] searches them in.

use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::connection::CacheStorage;
use super::entries::{CacheStore, StoredEntry};
use super::hash::request_key;
use crate::{Error, Request, Response};

/// Name and entry count of one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StoreInfo {
    pub name: String,
    pub size: u64,
}

impl CacheStorage {
    /// Open (creating if absent) the store called `name`.
    pub async fn open_store(&self, name: &str) -> Result<CacheStore, Error> {
        let owned = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO stores (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
                    params![owned, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(CacheStore::new(self.clone(), name))
    }

    /// Handle to `name` without touching the database. Writes through it
    /// fail until the store is opened.
    pub fn store(&self, name: &str) -> CacheStore {
        CacheStore::new(self.clone(), name)
    }

    /// Whether a store called `name` exists.
    pub async fn has_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists =
                    conn.query_row("SELECT EXISTS(SELECT 1 FROM stores WHERE name = ?1)", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every store, oldest first.
    pub async fn list_store_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY id ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the store called `name` together with its entries.
    ///
    /// Returns false if no such store existed.
    pub async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM stores WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Every store with its entry count, oldest first.
    pub async fn store_info(&self) -> Result<Vec<StoreInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<StoreInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT s.name, COUNT(e.request_key)
                     FROM stores s LEFT JOIN entries e ON e.store_id = s.id
                     GROUP BY s.id ORDER BY s.id ASC",
                )?;
                let info = stmt
                    .query_map([], |row| Ok(StoreInfo { name: row.get(0)?, size: row.get::<_, i64>(1)? as u64 }))?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(info)
            })
            .await
            .map_err(Error::from)
    }

    /// First entry matching `request` across all stores.
    pub async fn match_any(&self, request: &Request) -> Result<Option<Response>, Error> {
        let key = request_key(request);
        let entry = self
            .conn
            .call(move |conn| -> Result<Option<StoredEntry>, Error> {
                let entry = conn
                    .query_row(
                        "SELECT e.status, e.response_type, e.headers_json, e.body
                         FROM entries e JOIN stores s ON s.id = e.store_id
                         WHERE e.request_key = ?1
                         ORDER BY s.id ASC LIMIT 1",
                        params![key],
                        StoredEntry::from_row,
                    )
                    .optional()?;
                Ok(entry)
            })
            .await
            .map_err(Error::from)?;

        entry.map(StoredEntry::into_response).transpose()
    }
}
