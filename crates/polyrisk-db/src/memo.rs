//! Optional in-process LRU layer in front of any [`StatsCache`].
//!
//! Only validated stats that the inner cache returned or accepted are
//! memoized, so results with the layer match results without it.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use lru::LruCache;
use tracing::debug;

use polyrisk_common::{CacheEntry, ReferenceStats, StatsRequest};

use crate::cache::{StatsCache, StatsMap};
use crate::error::Result;

type Memo = Arc<Mutex<LruCache<String, ReferenceStats>>>;

pub struct MemoizedStatsCache<C> {
    inner: C,
    memo: Option<Memo>,
}

impl<C: StatsCache> MemoizedStatsCache<C> {
    /// A capacity of 0 disables memoization; every call goes to `inner`.
    pub fn new(inner: C, capacity: usize) -> Self {
        let memo = NonZeroUsize::new(capacity).map(|cap| Arc::new(Mutex::new(LruCache::new(cap))));
        Self { inner, memo }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn is_enabled(&self) -> bool {
        self.memo.is_some()
    }

    pub fn memoized_len(&self) -> usize {
        self.memo.as_ref().map_or(0, |m| lock(m).len())
    }

    pub fn clear(&self) {
        if let Some(memo) = &self.memo {
            lock(memo).clear();
        }
    }

    fn remember(&self, key: String, stats: &ReferenceStats) {
        if let Some(memo) = &self.memo {
            lock(memo).put(key, stats.clone());
        }
    }
}

/// The memo holds no invariants a panicking holder could break, so a
/// poisoned lock is still usable.
fn lock(memo: &Memo) -> MutexGuard<'_, LruCache<String, ReferenceStats>> {
    memo.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl<C: StatsCache> StatsCache for MemoizedStatsCache<C> {
    async fn get(&self, req: &StatsRequest) -> Result<Option<ReferenceStats>> {
        let key = req.cache_key();
        let memoized = self.memo.as_ref().and_then(|m| lock(m).get(&key).cloned());
        if let Some(hit) = memoized {
            debug!(key = %key, "Memo hit");
            return Ok(Some(hit));
        }

        let found = self.inner.get(req).await?;
        if let Some(stats) = &found {
            self.remember(key, stats);
        }
        Ok(found)
    }

    async fn get_batch(&self, reqs: &[StatsRequest]) -> Result<StatsMap> {
        let Some(memo) = &self.memo else {
            return self.inner.get_batch(reqs).await;
        };

        let mut found = StatsMap::new();
        let mut pending = Vec::new();
        {
            let mut guard = lock(memo);
            for req in reqs {
                let key = req.cache_key();
                match guard.get(&key) {
                    Some(stats) => {
                        found.insert(key, stats.clone());
                    }
                    None => pending.push(req.clone()),
                }
            }
        }

        debug!(memo_hits = found.len(), pending = pending.len(), "Memo batch lookup");
        if pending.is_empty() {
            return Ok(found);
        }

        let fetched = self.inner.get_batch(&pending).await?;
        {
            let mut guard = lock(memo);
            for (key, stats) in &fetched {
                guard.put(key.clone(), stats.clone());
            }
        }
        found.extend(fetched);
        Ok(found)
    }

    async fn store(&self, req: &StatsRequest, stats: &ReferenceStats) -> Result<()> {
        self.inner.store(req, stats).await?;
        self.remember(req.cache_key(), stats);
        Ok(())
    }

    async fn store_batch(&self, entries: &[CacheEntry]) -> Result<()> {
        self.inner.store_batch(entries).await?;
        for entry in entries {
            self.remember(entry.request.cache_key(), &entry.stats);
        }
        Ok(())
    }
}
