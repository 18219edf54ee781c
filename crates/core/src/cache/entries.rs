//! Entry operations on a single named store.

use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::connection::CacheStorage;
use super::hash::request_key;
use crate::{Error, Headers, Request, Response, ResponseSource, ResponseType};

/// Handle to one named store.
///
/// A handle never creates its store: only [`CacheStorage::open_store`]
/// does. Writes through a handle whose store was deleted fail.
#[derive(Clone, Debug)]
pub struct CacheStore {
    storage: CacheStorage,
    name: String,
}

/// Row shape shared by the per-store and cross-store lookups.
pub(crate) struct StoredEntry {
    status: u16,
    response_type: String,
    headers_json: String,
    body: Vec<u8>,
}

impl StoredEntry {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self { status: row.get(0)?, response_type: row.get(1)?, headers_json: row.get(2)?, body: row.get(3)? })
    }

    pub(crate) fn into_response(self) -> Result<Response, Error> {
        let headers: Headers = serde_json::from_str(&self.headers_json)?;
        let response_type = ResponseType::parse(&self.response_type)
            .ok_or_else(|| Error::CorruptEntry(format!("unknown response type {}", self.response_type)))?;

        let mut response = Response::new(self.status, self.body)
            .with_type(response_type)
            .with_source(ResponseSource::Cache);
        response.headers = headers;
        Ok(response)
    }
}

impl CacheStore {
    pub(crate) fn new(storage: CacheStorage, name: &str) -> Self {
        Self { storage, name: name.to_string() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store `response` under `request`, overwriting any previous entry.
    ///
    /// Takes the response by value: callers that also return it must pass
    /// a [`Response::duplicate`].
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreMissing` if the store no longer exists.
    pub async fn put(&self, request: &Request, response: Response) -> Result<(), Error> {
        let name = self.name.clone();
        let key = request_key(request);
        let method = request.method.clone();
        let url = request.url.to_string();
        let headers_json = serde_json::to_string(&response.headers)?;
        let status = response.status;
        let response_type = response.response_type.as_str();
        let body = response.into_body();
        let now = chrono::Utc::now().to_rfc3339();

        self.storage
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                let store_id: Option<i64> = tx
                    .query_row("SELECT id FROM stores WHERE name = ?1", params![name], |row| row.get(0))
                    .optional()?;
                let Some(store_id) = store_id else {
                    return Err(Error::StoreMissing(name));
                };
                tx.execute(
                    "INSERT INTO entries (
                        store_id, request_key, method, url, status, response_type,
                        headers_json, body, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(store_id, request_key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        response_type = excluded.response_type,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![store_id, key, method, url, status, response_type, headers_json, &body[..], now],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Entry stored under `request` in this store.
    pub async fn match_request(&self, request: &Request) -> Result<Option<Response>, Error> {
        let name = self.name.clone();
        let key = request_key(request);
        let entry = self
            .storage
            .conn
            .call(move |conn| -> Result<Option<StoredEntry>, Error> {
                let entry = conn
                    .query_row(
                        "SELECT e.status, e.response_type, e.headers_json, e.body
                         FROM entries e JOIN stores s ON s.id = e.store_id
                         WHERE s.name = ?1 AND e.request_key = ?2",
                        params![name, key],
                        StoredEntry::from_row,
                    )
                    .optional()?;
                Ok(entry)
            })
            .await
            .map_err(Error::from)?;

        entry.map(StoredEntry::into_response).transpose()
    }

    /// Remove the entry for `request`. Returns false if none existed.
    pub async fn delete(&self, request: &Request) -> Result<bool, Error> {
        let name = self.name.clone();
        let key = request_key(request);
        self.storage
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries
                     WHERE store_id = (SELECT id FROM stores WHERE name = ?1) AND request_key = ?2",
                    params![name, key],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs stored in this store, in insertion order.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let name = self.name.clone();
        self.storage
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT e.url FROM entries e JOIN stores s ON s.id = e.store_id
                     WHERE s.name = ?1 ORDER BY e.rowid ASC",
                )?;
                let urls = stmt
                    .query_map(params![name], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in this store.
    pub async fn len(&self) -> Result<u64, Error> {
        let name = self.name.clone();
        self.storage
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries e JOIN stores s ON s.id = e.store_id WHERE s.name = ?1",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }
}
