use crate::cache::key::*;
use crate::error::SyncResult;
use chrono::Utc;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

/// Source of query payloads; the cache calls it at most once per key at a time
pub trait QueryFetcher: Send + Sync {
    fn fetch(&self, key: QueryKey) -> BoxFuture<'static, SyncResult<QueryData>>;
}

struct CacheEntry {
    state: QueryState,
    freshness: Freshness,
    /// Id of the outstanding fetch; completions carrying another id are dropped
    in_flight: Option<u64>,
    /// Invalidated while a fetch was outstanding
    refetch_requested: bool,
    sender: watch::Sender<QueryState>,
}

impl CacheEntry {
    fn new() -> Self {
        let (sender, _) = watch::channel(QueryState::idle());
        Self {
            state: QueryState::idle(),
            freshness: Freshness::Stale,
            in_flight: None,
            refetch_requested: false,
            sender,
        }
    }

    fn subscribers(&self) -> usize {
        self.sender.receiver_count()
    }

    fn needs_fetch(&self, stale_after: Option<Duration>) -> bool {
        match self.freshness {
            Freshness::Fetching => false,
            Freshness::Stale => true,
            Freshness::Fresh => match (stale_after, self.state.fetched_at) {
                (Some(limit), Some(fetched_at)) => Utc::now()
                    .signed_duration_since(fetched_at)
                    .to_std()
                    .map(|age| age >= limit)
                    .unwrap_or(false),
                _ => false,
            },
        }
    }

    fn publish(&mut self, status: QueryStatus) {
        self.state.status = status;
        self.sender.send_replace(self.state.clone());
    }
}

/// Point-in-time view of one entry, for diagnostics and tests
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub freshness: Freshness,
    pub status: QueryStatus,
    pub subscribers: usize,
}

/// Keyed, tag-invalidatable cache with single-flight fetching.
///
/// All entry mutation happens under one lock that is never held across a
/// fetch; fetches run on spawned tasks and report back through `complete`.
pub struct QueryCache {
    fetcher: Arc<dyn QueryFetcher>,
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    stale_after: Option<Duration>,
    fetch_seq: AtomicU64,
}

impl QueryCache {
    pub fn new(fetcher: Arc<dyn QueryFetcher>, stale_after: Option<Duration>) -> Self {
        Self {
            fetcher,
            entries: Mutex::new(HashMap::new()),
            stale_after,
            fetch_seq: AtomicU64::new(0),
        }
    }

    /// Subscribe to `key`, fetching it if it is absent or stale.
    ///
    /// Attaches to an outstanding fetch instead of starting another one.
    pub async fn read(self: &Arc<Self>, key: QueryKey) -> Subscription {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.clone()).or_insert_with(CacheEntry::new);
        let receiver = entry.sender.subscribe();

        if entry.needs_fetch(self.stale_after) {
            self.start_fetch(&key, entry);
        } else {
            debug!("Cache hit for {} ({:?})", key, entry.freshness);
        }

        Subscription { key, receiver }
    }

    /// Mark every entry under `tag` stale.
    ///
    /// Subscribed entries refetch now; an entry whose fetch is outstanding
    /// refetches when that fetch lands; the rest refetch on next read.
    pub async fn invalidate(self: &Arc<Self>, tag: Tag) -> usize {
        let mut entries = self.entries.lock().await;
        let mut marked = 0;

        for (key, entry) in entries.iter_mut().filter(|(key, _)| key.has_tag(tag)) {
            marked += 1;
            match entry.freshness {
                Freshness::Fetching => entry.refetch_requested = true,
                Freshness::Fresh | Freshness::Stale => {
                    entry.freshness = Freshness::Stale;
                    if entry.subscribers() > 0 {
                        self.start_fetch(key, entry);
                    }
                }
            }
        }

        debug!("Invalidated {} entries tagged {}", marked, tag);
        marked
    }

    /// Drop every entry under `tags`, discarding outstanding fetches.
    ///
    /// Subscribers see `Idle`. Only session teardown calls this.
    pub async fn purge(&self, tags: &[Tag]) -> usize {
        let mut entries = self.entries.lock().await;
        let mut purged = 0;

        entries.retain(|key, entry| {
            if !tags.iter().any(|tag| key.has_tag(*tag)) {
                return true;
            }
            purged += 1;
            if entry.subscribers() == 0 {
                return false;
            }
            entry.in_flight = None;
            entry.refetch_requested = false;
            entry.freshness = Freshness::Stale;
            entry.state = QueryState::idle();
            entry.sender.send_replace(QueryState::idle());
            true
        });

        info!("Purged {} cache entries", purged);
        purged
    }

    /// Current state of `key` without subscribing or fetching
    pub async fn peek(&self, key: &QueryKey) -> Option<QueryState> {
        self.entries.lock().await.get(key).map(|entry| entry.state.clone())
    }

    pub async fn entry_info(&self, key: &QueryKey) -> Option<EntryInfo> {
        self.entries.lock().await.get(key).map(|entry| EntryInfo {
            freshness: entry.freshness,
            status: entry.state.status,
            subscribers: entry.subscribers(),
        })
    }

    fn start_fetch(self: &Arc<Self>, key: &QueryKey, entry: &mut CacheEntry) {
        let fetch_id = self.fetch_seq.fetch_add(1, Ordering::Relaxed) + 1;
        entry.in_flight = Some(fetch_id);
        entry.freshness = Freshness::Fetching;
        entry.publish(QueryStatus::Pending);

        debug!("Fetching {} (fetch #{})", key, fetch_id);
        let fetch = self.fetcher.fetch(key.clone());
        let cache = Arc::clone(self);
        let key = key.clone();
        tokio::spawn(async move {
            let result = fetch.await;
            cache.complete(key, fetch_id, result).await;
        });
    }

    async fn complete(self: &Arc<Self>, key: QueryKey, fetch_id: u64, result: SyncResult<QueryData>) {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(&key) else {
            debug!("Discarding fetch #{} for purged {}", fetch_id, key);
            return;
        };
        if entry.in_flight != Some(fetch_id) {
            debug!("Discarding superseded fetch #{} for {}", fetch_id, key);
            return;
        }
        entry.in_flight = None;
        let refetch = std::mem::take(&mut entry.refetch_requested);

        match result {
            Ok(data) => {
                entry.state.data = Some(Arc::new(data));
                entry.state.error = None;
                entry.state.fetched_at = Some(Utc::now());

                if refetch && entry.subscribers() > 0 {
                    debug!("{} was invalidated mid-flight, refetching", key);
                    self.start_fetch(&key, entry);
                } else if refetch {
                    entry.freshness = Freshness::Stale;
                    entry.publish(QueryStatus::Resolved);
                } else {
                    entry.freshness = Freshness::Fresh;
                    entry.publish(QueryStatus::Resolved);
                }
            }
            Err(error) => {
                debug!("Fetch #{} for {} failed: {}", fetch_id, key, error);
                entry.state.error = Some(error);
                entry.freshness = Freshness::Stale;
                if refetch && entry.subscribers() > 0 {
                    debug!("{} was invalidated mid-flight, refetching after failure", key);
                    self.start_fetch(&key, entry);
                } else {
                    entry.publish(QueryStatus::Errored);
                }
            }
        }
    }
}

/// Interest in one cache key.
///
/// Dropping it withdraws interest only; an outstanding fetch still completes
/// and populates the cache.
pub struct Subscription {
    key: QueryKey,
    receiver: watch::Receiver<QueryState>,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn current(&self) -> QueryState {
        self.receiver.borrow().clone()
    }

    /// Next state transition, or `None` once the entry is gone
    pub async fn changed(&mut self) -> Option<QueryState> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until the entry leaves `Pending` and return its payload
    pub async fn settled(&mut self) -> SyncResult<Arc<QueryData>> {
        let state = match self.receiver.wait_for(QueryState::is_settled).await {
            Ok(state) => state.clone(),
            Err(_) => return Err(crate::error::SyncError::Discarded),
        };
        state.into_result()
    }
}
