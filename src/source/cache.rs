//! Reflector cache
//!
//! Keeps a local copy of the live workflows by listing once and then following the
//! watch feed. The background task re-lists after every resync period and whenever the
//! watch ends. The server owns the reflector and drives `start`/`stop`.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ListOptions, ListWatch, LiveSource};
use crate::error::{ApiError, SubstrateError};
use crate::query::ListQuery;
use crate::workflow::{EventType, ListMeta, WatchEvent, Workflow, WorkflowList};

pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(20 * 60);

/// Pause before re-listing after a failed list or a closed watch
const RELIST_BACKOFF: Duration = Duration::from_millis(500);

type CacheStore = Arc<RwLock<BTreeMap<String, Workflow>>>;

pub struct WorkflowReflector {
    list_watch: Arc<dyn ListWatch>,
    resync_period: Duration,
    store: CacheStore,
    last_sync_resource_version: Arc<RwLock<String>>,
    synced: Arc<AtomicBool>,
    running: Arc<RwLock<bool>>,
    cancel: RwLock<CancellationToken>,
    worker: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl WorkflowReflector {
    pub fn new(list_watch: Arc<dyn ListWatch>, resync_period: Duration) -> Self {
        Self {
            list_watch,
            resync_period,
            store: Arc::new(RwLock::new(BTreeMap::new())),
            last_sync_resource_version: Arc::new(RwLock::new(String::new())),
            synced: Arc::new(AtomicBool::new(false)),
            running: Arc::new(RwLock::new(false)),
            cancel: RwLock::new(CancellationToken::new()),
            worker: RwLock::new(None),
        }
    }

    /// Start the background list/watch task
    pub fn start(&self) -> Result<(), ApiError> {
        let mut running = self.running.write();
        if *running {
            return Ok(());
        }
        *running = true;
        drop(running);

        let cancel = CancellationToken::new();
        *self.cancel.write() = cancel.clone();

        let list_watch = Arc::clone(&self.list_watch);
        let store = Arc::clone(&self.store);
        let last_sync = Arc::clone(&self.last_sync_resource_version);
        let synced = Arc::clone(&self.synced);
        let resync_period = self.resync_period;

        let handle = tokio::spawn(async move {
            Self::run(list_watch, store, last_sync, synced, resync_period, cancel).await;
        });
        *self.worker.write() = Some(handle);

        info!(
            resync_period_secs = self.resync_period.as_secs(),
            "Started workflow reflector"
        );
        Ok(())
    }

    /// Stop the background task and wait for it to exit
    pub async fn stop(&self) -> Result<(), ApiError> {
        let mut running = self.running.write();
        if !*running {
            return Ok(());
        }
        *running = false;
        drop(running);

        self.cancel.read().cancel();
        let worker = self.worker.write().take();
        if let Some(handle) = worker {
            let _ = handle.await;
        }
        // a stopped cache no longer follows the substrate
        self.synced.store(false, Ordering::SeqCst);

        info!("Stopped workflow reflector");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    /// Wait until the first list has been applied
    pub async fn wait_for_sync(&self, timeout: Duration) -> Result<(), ApiError> {
        let start = Instant::now();
        while !self.has_synced() {
            if start.elapsed() >= timeout {
                return Err(ApiError::Status(crate::error::Status::deadline_exceeded(
                    "timed out waiting for the workflow cache to sync",
                )));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }

    pub fn last_sync_resource_version(&self) -> String {
        self.last_sync_resource_version.read().clone()
    }

    pub fn snapshot(&self) -> Vec<Workflow> {
        self.store.read().values().cloned().collect()
    }

    async fn run(
        list_watch: Arc<dyn ListWatch>,
        store: CacheStore,
        last_sync: Arc<RwLock<String>>,
        synced: Arc<AtomicBool>,
        resync_period: Duration,
        cancel: CancellationToken,
    ) {
        while !cancel.is_cancelled() {
            let resource_version = match Self::relist(&*list_watch, &store, &last_sync).await {
                Ok(version) => {
                    synced.store(true, Ordering::SeqCst);
                    version
                }
                Err(e) => {
                    warn!(error = %e, "Workflow cache list failed");
                    if Self::backoff(&cancel).await {
                        return;
                    }
                    continue;
                }
            };

            let options = ListOptions {
                resource_version,
                ..Default::default()
            };
            let mut stream = match list_watch.watch(&options).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "Workflow cache watch failed");
                    if Self::backoff(&cancel).await {
                        return;
                    }
                    continue;
                }
            };

            let resync = tokio::time::sleep(resync_period);
            tokio::pin!(resync);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = &mut resync => {
                        debug!("Workflow cache resync");
                        break;
                    }
                    next = stream.next() => match next {
                        Some(Ok(event)) => Self::apply(&store, &last_sync, event),
                        Some(Err(e)) => {
                            warn!(error = %e, "Workflow cache watch error");
                            break;
                        }
                        None => {
                            debug!("Workflow cache watch closed");
                            if Self::backoff(&cancel).await {
                                return;
                            }
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Sleep before the next attempt; true when cancelled meanwhile
    async fn backoff(cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(RELIST_BACKOFF) => false,
        }
    }

    async fn relist(
        list_watch: &dyn ListWatch,
        store: &CacheStore,
        last_sync: &RwLock<String>,
    ) -> Result<String, SubstrateError> {
        let list = list_watch.list(&ListOptions::default()).await?;
        let items: BTreeMap<String, Workflow> =
            list.items.into_iter().map(|wf| (wf.key(), wf)).collect();
        let count = items.len();
        *store.write() = items;
        *last_sync.write() = list.metadata.resource_version.clone();
        debug!(
            workflows = count,
            resource_version = %list.metadata.resource_version,
            "Workflow cache listed"
        );
        Ok(list.metadata.resource_version)
    }

    fn apply(store: &CacheStore, last_sync: &RwLock<String>, event: WatchEvent<Workflow>) {
        let version = event.object.metadata.resource_version.clone();
        match event.event_type {
            EventType::Added | EventType::Modified => {
                store.write().insert(event.object.key(), event.object);
            }
            EventType::Deleted => {
                store.write().remove(&event.object.key());
            }
            EventType::Bookmark => {}
        }
        if !version.is_empty() {
            *last_sync.write() = version;
        }
    }
}

/// Live source answering count/list from the reflector cache
pub struct CachedLiveSource {
    reflector: Arc<WorkflowReflector>,
}

impl CachedLiveSource {
    pub fn new(reflector: Arc<WorkflowReflector>) -> Self {
        Self { reflector }
    }

    pub fn reflector(&self) -> &Arc<WorkflowReflector> {
        &self.reflector
    }
}

#[async_trait]
impl LiveSource for CachedLiveSource {
    async fn count_workflows(&self, query: &ListQuery) -> Result<usize, ApiError> {
        let items = self.reflector.snapshot();
        Ok(query.count(items.iter()))
    }

    async fn list_workflows(&self, query: &ListQuery) -> Result<WorkflowList, ApiError> {
        let items = self.reflector.snapshot();
        Ok(WorkflowList {
            metadata: ListMeta {
                resource_version: self.reflector.last_sync_resource_version(),
                ..Default::default()
            },
            items: query.select(items.iter()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemorySubstrate, NamespacedListWatch, WorkflowClient};

    async fn wait_until<F: Fn() -> bool>(check: F) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_reflector_follows_substrate() {
        let substrate = Arc::new(MemorySubstrate::new());
        substrate.insert_workflow(Workflow::new("ns1", "first"));

        let client: Arc<dyn WorkflowClient> = substrate.clone();
        let reflector = Arc::new(WorkflowReflector::new(
            Arc::new(NamespacedListWatch::new(client.clone(), "ns1")),
            DEFAULT_RESYNC_PERIOD,
        ));
        reflector.start().unwrap();
        reflector.wait_for_sync(Duration::from_secs(2)).await.unwrap();
        assert_eq!(reflector.snapshot().len(), 1);

        substrate.insert_workflow(Workflow::new("ns1", "second"));
        substrate.insert_workflow(Workflow::new("ns2", "elsewhere"));
        let r = reflector.clone();
        wait_until(move || r.snapshot().len() == 2).await;

        client
            .delete("ns1", "first", Default::default())
            .await
            .unwrap();
        let r = reflector.clone();
        wait_until(move || r.snapshot().len() == 1).await;
        assert_eq!(reflector.snapshot()[0].name(), "second");
        assert!(!reflector.last_sync_resource_version().is_empty());

        reflector.stop().await.unwrap();
        assert!(!reflector.is_running());
        assert!(!reflector.has_synced());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let substrate = Arc::new(MemorySubstrate::new());
        let reflector = WorkflowReflector::new(
            Arc::new(NamespacedListWatch::new(substrate, "")),
            DEFAULT_RESYNC_PERIOD,
        );
        reflector.stop().await.unwrap();
        reflector.start().unwrap();
        reflector.start().unwrap();
        reflector.stop().await.unwrap();
        reflector.stop().await.unwrap();
    }
}
