//! Background sync: tag-named deferred tasks with at-least-once delivery.
//!
//! A registered tag stays pending until its task succeeds. Failed runs
//! return `Error::SyncFailed` and leave the tag in place for the host to
//! retrigger, so tasks must tolerate being run more than once.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use swcache_core::cache::hash::digest_bytes;
use swcache_core::{AppConfig, Error};

use super::clients::{ClientMessage, Clients};
use crate::fetch::resolve;

/// Tag for the attendance upload task.
pub const ATTENDANCE_SYNC_TAG: &str = "sync-attendance";

const SYNC_SUCCESS_MESSAGE: &str = "Attendance data synchronized";

/// A deferred operation bound to a sync tag.
#[async_trait]
pub trait SyncTask: Send + Sync {
    async fn run(&self) -> Result<(), Error>;
}

/// An outstanding tag and how many runs it has already had.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PendingSync {
    pub tag: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The task ran and the tag was cleared.
    Completed,
    /// Nothing registered under the tag.
    NotPending,
    /// Pending, but no task is bound to the tag.
    Unhandled,
}

/// Bookkeeping for one pending tag.
#[derive(Debug, Default)]
struct TagState {
    attempts: u32,
    running: bool,
    /// Registered again while a run was in flight.
    rerun: bool,
}

struct SyncInner {
    tasks: RwLock<HashMap<String, Arc<dyn SyncTask>>>,
    pending: Mutex<BTreeMap<String, TagState>>,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    clients: Clients,
}

/// Registry of sync tasks and pending tags.
///
/// Runs of one tag never overlap: a trigger that arrives while the tag is
/// running waits for that run to settle. A tag registered again mid-run
/// stays pending after the run succeeds, so work queued meanwhile gets a
/// run of its own.
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<SyncInner>,
}

impl SyncManager {
    pub fn new(clients: Clients) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                tasks: RwLock::new(HashMap::new()),
                pending: Mutex::new(BTreeMap::new()),
                gates: Mutex::new(HashMap::new()),
                clients,
            }),
        }
    }

    /// Bind `task` to `tag`, replacing any previous binding.
    pub async fn bind(&self, tag: impl Into<String>, task: Arc<dyn SyncTask>) {
        self.inner.tasks.write().await.insert(tag.into(), task);
    }

    /// Mark `tag` as pending. Registering an already pending tag is a no-op
    /// unless it is running, in which case it is run once more afterwards.
    pub async fn register(&self, tag: impl Into<String>) {
        let tag = tag.into();
        tracing::debug!(tag = %tag, "sync registered");
        let mut pending = self.inner.pending.lock().await;
        let state = pending.entry(tag).or_default();
        if state.running {
            state.rerun = true;
        }
    }

    pub async fn pending(&self) -> Vec<PendingSync> {
        self.inner
            .pending
            .lock()
            .await
            .iter()
            .map(|(tag, state)| PendingSync { tag: tag.clone(), attempts: state.attempts })
            .collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    async fn gate(&self, tag: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.inner.gates.lock().await.entry(tag.to_string()).or_default())
    }

    /// Run the task for `tag` if it is pending.
    ///
    /// # Errors
    ///
    /// Returns `Error::SyncFailed` when the task fails; the tag stays
    /// pending.
    pub async fn trigger(&self, tag: &str) -> Result<SyncOutcome, Error> {
        let gate = self.gate(tag).await;
        let _running = gate.lock().await;

        if !self.inner.pending.lock().await.contains_key(tag) {
            tracing::debug!(tag, "sync not pending");
            return Ok(SyncOutcome::NotPending);
        }

        let Some(task) = self.inner.tasks.read().await.get(tag).cloned() else {
            tracing::warn!(tag, "no task bound to sync tag");
            return Ok(SyncOutcome::Unhandled);
        };

        let attempt = {
            let mut pending = self.inner.pending.lock().await;
            let state = pending.entry(tag.to_string()).or_default();
            state.attempts += 1;
            state.running = true;
            state.rerun = false;
            state.attempts
        };
        tracing::info!(tag, attempt, "running background sync");

        let result = task.run().await;

        let mut pending = self.inner.pending.lock().await;
        match result {
            Ok(()) => {
                let rerun = pending.get(tag).is_some_and(|state| state.rerun);
                if rerun {
                    pending.insert(tag.to_string(), TagState::default());
                } else {
                    pending.remove(tag);
                }
                drop(pending);

                self.inner.clients.post_message(ClientMessage::SyncSuccess {
                    tag: tag.to_string(),
                    message: SYNC_SUCCESS_MESSAGE.to_string(),
                });
                tracing::info!(tag, attempt, rerun, "sync successful");
                Ok(SyncOutcome::Completed)
            }
            Err(e) => {
                if let Some(state) = pending.get_mut(tag) {
                    state.running = false;
                    state.rerun = false;
                }
                tracing::warn!(tag, attempt, error = %e, "sync failed, will retry");
                Err(Error::SyncFailed { tag: tag.to_string(), reason: e.to_string() })
            }
        }
    }

    /// Trigger every pending tag in order.
    pub async fn trigger_all(&self) -> Vec<(String, Result<SyncOutcome, Error>)> {
        let tags: Vec<String> = self.inner.pending.lock().await.keys().cloned().collect();
        let mut results = Vec::with_capacity(tags.len());
        for tag in tags {
            let result = self.trigger(&tag).await;
            results.push((tag, result));
        }
        results
    }
}

/// Uploads queued attendance records to the sync endpoint.
///
/// Each upload carries a `batchId` derived from its records, so a batch
/// retried after a lost acknowledgement can be recognized server-side.
/// Records leave the queue only after a 2xx for a batch that contained
/// them; uploads never overlap.
pub struct AttendanceSync {
    http: reqwest::Client,
    endpoint: Url,
    queue: Mutex<Vec<QueuedRecord>>,
    next_id: AtomicU64,
    upload: Mutex<()>,
}

struct QueuedRecord {
    id: u64,
    record: serde_json::Value,
}

impl AttendanceSync {
    pub fn new(http: reqwest::Client, endpoint: Url) -> Self {
        Self { http, endpoint, queue: Mutex::new(Vec::new()), next_id: AtomicU64::new(0), upload: Mutex::new(()) }
    }

    /// Resolve `config.sync_endpoint` against the origin.
    pub fn from_config(config: &AppConfig, http: reqwest::Client) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidInput(e.to_string()))?;
        let endpoint = resolve(&origin, &config.sync_endpoint).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::new(http, endpoint))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn enqueue(&self, record: serde_json::Value) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.queue.lock().await.push(QueuedRecord { id, record });
    }

    pub async fn queued(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[async_trait]
impl SyncTask for AttendanceSync {
    async fn run(&self) -> Result<(), Error> {
        let _upload = self.upload.lock().await;

        let (ids, records): (HashSet<u64>, Vec<serde_json::Value>) = {
            let queue = self.queue.lock().await;
            queue.iter().map(|queued| (queued.id, queued.record.clone())).unzip()
        };
        if records.is_empty() {
            tracing::debug!(endpoint = %self.endpoint, "no attendance records queued");
            return Ok(());
        }

        let sent = records.len();
        let encoded = serde_json::to_vec(&records).map_err(|e| Error::InvalidInput(e.to_string()))?;
        let batch_id = digest_bytes(&encoded);
        let body = serde_json::json!({ "batchId": batch_id, "records": records });

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpError(format!("sync endpoint returned {}", status.as_u16())));
        }

        self.queue.lock().await.retain(|queued| !ids.contains(&queued.id));
        tracing::debug!(endpoint = %self.endpoint, batch = %batch_id, records = sent, "attendance uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Applies a fixed batch, failing the first `fail_first` runs.
    struct IdempotentLedger {
        batch: String,
        fail_first: u32,
        runs: AtomicU32,
        applied: std::sync::Mutex<HashSet<String>>,
        effects: AtomicU32,
    }

    impl IdempotentLedger {
        fn new(batch: &str, fail_first: u32) -> Self {
            Self {
                batch: batch.to_string(),
                fail_first,
                runs: AtomicU32::new(0),
                applied: std::sync::Mutex::new(HashSet::new()),
                effects: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SyncTask for IdempotentLedger {
        async fn run(&self) -> Result<(), Error> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if run <= self.fail_first {
                return Err(Error::Network("offline".into()));
            }
            if self.applied.lock().unwrap().insert(self.batch.clone()) {
                self.effects.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_sync_retried_and_applied_once() {
        let clients = Clients::new();
        let mut rx = clients.subscribe();
        let manager = SyncManager::new(clients);
        let ledger = Arc::new(IdempotentLedger::new("batch-1", 1));
        manager.bind(ATTENDANCE_SYNC_TAG, ledger.clone()).await;
        manager.register(ATTENDANCE_SYNC_TAG).await;

        let first = manager.trigger(ATTENDANCE_SYNC_TAG).await;
        assert!(matches!(first, Err(Error::SyncFailed { ref tag, .. }) if tag == ATTENDANCE_SYNC_TAG));
        assert_eq!(manager.pending().await, vec![PendingSync { tag: ATTENDANCE_SYNC_TAG.into(), attempts: 1 }]);

        let second = manager.trigger(ATTENDANCE_SYNC_TAG).await.unwrap();
        assert_eq!(second, SyncOutcome::Completed);
        assert_eq!(manager.pending_count().await, 0);
        assert_eq!(ledger.runs.load(Ordering::SeqCst), 2);
        assert_eq!(ledger.effects.load(Ordering::SeqCst), 1);

        match rx.recv().await.unwrap() {
            ClientMessage::SyncSuccess { tag, .. } => assert_eq!(tag, ATTENDANCE_SYNC_TAG),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_delivery_applies_effect_once() {
        let manager = SyncManager::new(Clients::new());
        let ledger = Arc::new(IdempotentLedger::new("batch-7", 0));
        manager.bind(ATTENDANCE_SYNC_TAG, ledger.clone()).await;

        for _ in 0..3 {
            manager.register(ATTENDANCE_SYNC_TAG).await;
            manager.trigger(ATTENDANCE_SYNC_TAG).await.unwrap();
        }

        assert_eq!(ledger.runs.load(Ordering::SeqCst), 3);
        assert_eq!(ledger.effects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_trigger_not_pending_and_unhandled() {
        let manager = SyncManager::new(Clients::new());
        assert_eq!(manager.trigger("sync-photos").await.unwrap(), SyncOutcome::NotPending);

        manager.register("sync-photos").await;
        manager.register("sync-photos").await;
        assert_eq!(manager.trigger("sync-photos").await.unwrap(), SyncOutcome::Unhandled);
        assert_eq!(manager.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_trigger_all_reports_each_tag() {
        let manager = SyncManager::new(Clients::new());
        manager.bind("a", Arc::new(IdempotentLedger::new("a", 0))).await;
        manager.bind("b", Arc::new(IdempotentLedger::new("b", 5))).await;
        manager.register("a").await;
        manager.register("b").await;

        let results = manager.trigger_all().await;
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], (ref tag, Ok(SyncOutcome::Completed)) if tag == "a"));
        assert!(matches!(results[1], (ref tag, Err(_)) if tag == "b"));
        assert_eq!(manager.pending().await[0].tag, "b");
    }

    /// Counts runs and notes whether two ever overlapped.
    #[derive(Default)]
    struct SlowTask {
        runs: AtomicU32,
        active: AtomicU32,
        overlapped: AtomicBool,
    }

    #[async_trait]
    impl SyncTask for SlowTask {
        async fn run(&self) -> Result<(), Error> {
            if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_concurrent_triggers_run_once() {
        let manager = SyncManager::new(Clients::new());
        let task = Arc::new(SlowTask::default());
        manager.bind(ATTENDANCE_SYNC_TAG, task.clone()).await;
        manager.register(ATTENDANCE_SYNC_TAG).await;

        let (a, b) = tokio::join!(manager.trigger(ATTENDANCE_SYNC_TAG), manager.trigger(ATTENDANCE_SYNC_TAG));
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| *o != SyncOutcome::Completed);

        assert_eq!(outcomes, vec![SyncOutcome::Completed, SyncOutcome::NotPending]);
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
        assert!(!task.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_registration_during_run_gets_its_own_run() {
        let manager = SyncManager::new(Clients::new());
        let task = Arc::new(SlowTask::default());
        manager.bind(ATTENDANCE_SYNC_TAG, task.clone()).await;
        manager.register(ATTENDANCE_SYNC_TAG).await;

        let first = tokio::spawn({
            let manager = manager.clone();
            async move { manager.trigger(ATTENDANCE_SYNC_TAG).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        manager.register(ATTENDANCE_SYNC_TAG).await;
        let second = manager.trigger(ATTENDANCE_SYNC_TAG).await.unwrap();

        assert_eq!(first.await.unwrap().unwrap(), SyncOutcome::Completed);
        assert_eq!(second, SyncOutcome::Completed);
        assert_eq!(task.runs.load(Ordering::SeqCst), 2);
        assert!(!task.overlapped.load(Ordering::SeqCst));
        assert_eq!(manager.pending_count().await, 0);
    }

    /// HTTP endpoint answering `requests` connections in turn with `status`,
    /// each after `delay`; returns the raw requests.
    async fn serve(status: u16, delay: Duration, requests: usize) -> (Url, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut seen = Vec::with_capacity(requests);
            for _ in 0..requests {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 16 * 1024];
                let mut raw = String::new();
                loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    raw.push_str(&String::from_utf8_lossy(&buf[..n]));
                    if let Some((head, body)) = raw.split_once("\r\n\r\n") {
                        let length = head
                            .lines()
                            .map(str::to_ascii_lowercase)
                            .find_map(|l| {
                                l.strip_prefix("content-length:").and_then(|v| v.trim().parse::<usize>().ok())
                            })
                            .unwrap_or(0);
                        if body.len() >= length {
                            break;
                        }
                    }
                }
                tokio::time::sleep(delay).await;
                let reply = format!("HTTP/1.1 {status} X\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                socket.write_all(reply.as_bytes()).await.unwrap();
                seen.push(raw);
            }
            seen
        });
        (Url::parse(&format!("http://{addr}/api/sync-attendance")).unwrap(), handle)
    }

    async fn serve_once(status: u16) -> (Url, tokio::task::JoinHandle<Vec<String>>) {
        serve(status, Duration::ZERO, 1).await
    }

    #[tokio::test]
    async fn test_attendance_sync_posts_batch_and_drains_queue() {
        let (endpoint, server) = serve_once(200).await;
        let sync = AttendanceSync::new(reqwest::Client::new(), endpoint);
        sync.enqueue(serde_json::json!({"employeeId": "E-17", "type": "check-in"})).await;

        sync.run().await.unwrap();
        assert_eq!(sync.queued().await, 0);

        let raw = server.await.unwrap().remove(0);
        assert!(raw.starts_with("POST /api/sync-attendance"));
        assert!(raw.contains("\"batchId\""));
        assert!(raw.contains("E-17"));
    }

    #[tokio::test]
    async fn test_attendance_sync_keeps_queue_on_server_error() {
        let (endpoint, server) = serve_once(503).await;
        let sync = AttendanceSync::new(reqwest::Client::new(), endpoint);
        sync.enqueue(serde_json::json!({"employeeId": "E-17"})).await;

        let result = sync.run().await;
        assert!(matches!(result, Err(Error::HttpError(_))));
        assert_eq!(sync.queued().await, 1);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_overlapping_runs_keep_records_queued_mid_flight() {
        let (endpoint, server) = serve(200, Duration::from_millis(200), 2).await;
        let sync = Arc::new(AttendanceSync::new(reqwest::Client::new(), endpoint));
        sync.enqueue(serde_json::json!({"employeeId": "E-01"})).await;

        let first = tokio::spawn({
            let sync = Arc::clone(&sync);
            async move { sync.run().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        sync.enqueue(serde_json::json!({"employeeId": "E-02"})).await;

        sync.run().await.unwrap();
        first.await.unwrap().unwrap();
        assert_eq!(sync.queued().await, 0);

        let requests = server.await.unwrap();
        assert!(requests[0].contains("E-01"));
        assert!(!requests[0].contains("E-02"));
        assert!(requests[1].contains("E-02"));
        assert!(!requests[1].contains("E-01"));
    }

    #[tokio::test]
    async fn test_run_with_empty_queue_skips_upload() {
        let endpoint = Url::parse("http://127.0.0.1:9/api/sync-attendance").unwrap();
        let sync = AttendanceSync::new(reqwest::Client::new(), endpoint);
        sync.run().await.unwrap();
    }

    #[test]
    fn test_from_config_resolves_endpoint() {
        let config = AppConfig { origin: "https://absensi.test".into(), ..Default::default() };
        let sync = AttendanceSync::from_config(&config, reqwest::Client::new()).unwrap();
        assert_eq!(sync.endpoint().as_str(), "https://absensi.test/api/sync-attendance");
    }
}
