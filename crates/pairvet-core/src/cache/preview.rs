//! Bounded LRU cache for preview byte payloads.
//!
//! Keyed by item blob id plus requested size bucket; payloads are opaque
//! bytes (the engine never decodes images). Source images are immutable,
//! so writes never invalidate this tier; entries age out by TTL counted
//! from insertion, and capacity pressure evicts the least recently used
//! entry.
//!
//! The order queue stores `(key, tick)` pairs so that a key touched again
//! later leaves a ghost behind; ghosts are detected by tick mismatch and
//! skipped during eviction. A working set smaller than the capacity never
//! reaches eviction, so the queue is also swept whenever ghosts outnumber
//! live entries by [`ORDER_SLACK`], keeping it proportional to the
//! capacity rather than to the hit count.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::store::BlobId;

/// Ghost order entries tolerated per capacity slot before a compaction
/// sweep rebuilds the queue from live entries.
const ORDER_SLACK: usize = 4;

/// Cache key: one item at one target size.
///
/// `max_side: None` addresses the untransformed original bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewKey {
    /// Source image blob.
    pub blob: BlobId,
    /// Requested bounding size, if the payload was downscaled.
    pub max_side: Option<u32>,
}

/// Bounded LRU + TTL cache of preview bytes.
pub struct PreviewCache {
    capacity: usize,
    ttl: Duration,
    state: Mutex<PreviewState>,
}

#[derive(Default)]
struct PreviewState {
    entries: HashMap<PreviewKey, PreviewEntry>,
    order: VecDeque<OrderEntry>,
    tick: u64,
}

struct PreviewEntry {
    bytes: Bytes,
    inserted_at: Instant,
    touched_tick: u64,
}

struct OrderEntry {
    key: PreviewKey,
    tick: u64,
}

impl PreviewCache {
    /// Creates a cache holding at most `capacity` entries for up to `ttl`
    /// each.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            state: Mutex::new(PreviewState::default()),
        }
    }

    /// Returns the cached payload and refreshes its recency.
    ///
    /// Expired entries count as misses and are dropped on access.
    #[must_use]
    pub fn get(&self, key: &PreviewKey) -> Option<Bytes> {
        let mut state = self.lock();
        let expired = state
            .entries
            .get(key)
            .is_some_and(|e| e.inserted_at.elapsed() >= self.ttl);
        if expired {
            state.entries.remove(key);
            return None;
        }
        state.tick += 1;
        let tick = state.tick;
        let entry = state.entries.get_mut(key)?;
        entry.touched_tick = tick;
        let bytes = entry.bytes.clone();
        state.order.push_back(OrderEntry {
            key: key.clone(),
            tick,
        });
        Self::compact_order(&mut state, self.capacity);
        Some(bytes)
    }

    /// Inserts a payload, evicting expired entries first and then the
    /// least recently used until the new entry fits.
    pub fn insert(&self, key: PreviewKey, bytes: Bytes) {
        let mut state = self.lock();
        Self::evict_expired(&mut state, self.ttl);
        if !state.entries.contains_key(&key) {
            while state.entries.len() >= self.capacity {
                if !Self::evict_lru(&mut state) {
                    break;
                }
            }
        }
        state.tick += 1;
        let tick = state.tick;
        state.order.push_back(OrderEntry {
            key: key.clone(),
            tick,
        });
        state.entries.insert(
            key,
            PreviewEntry {
                bytes,
                inserted_at: Instant::now(),
                touched_tick: tick,
            },
        );
        Self::compact_order(&mut state, self.capacity);
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn evict_expired(state: &mut PreviewState, ttl: Duration) {
        state.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
    }

    /// Drops every ghost from the order queue once ghosts exceed
    /// [`ORDER_SLACK`] per capacity slot. Relative order of the surviving
    /// entries is preserved, so LRU order is unchanged.
    fn compact_order(state: &mut PreviewState, capacity: usize) {
        if state.order.len() <= capacity.saturating_mul(ORDER_SLACK) {
            return;
        }
        let PreviewState { entries, order, .. } = state;
        order.retain(|o| {
            entries
                .get(&o.key)
                .is_some_and(|e| e.touched_tick == o.tick)
        });
    }

    /// Pops order entries until a live one is found and evicts it.
    /// Returns `false` when the queue is exhausted.
    fn evict_lru(state: &mut PreviewState) -> bool {
        while let Some(order) = state.order.pop_front() {
            let live = state
                .entries
                .get(&order.key)
                .is_some_and(|e| e.touched_tick == order.tick);
            if live {
                state.entries.remove(&order.key);
                tracing::trace!(blob = %order.key.blob, "evicted preview cache entry");
                return true;
            }
        }
        false
    }

    fn lock(&self) -> MutexGuard<'_, PreviewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(blob: &str, max_side: Option<u32>) -> PreviewKey {
        PreviewKey {
            blob: BlobId::from(blob),
            max_side,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hit_returns_inserted_bytes() {
        let cache = PreviewCache::new(8, Duration::from_secs(3600));
        cache.insert(key("img-1", Some(900)), Bytes::from_static(b"jpeg"));
        assert_eq!(
            cache.get(&key("img-1", Some(900))),
            Some(Bytes::from_static(b"jpeg"))
        );
        assert_eq!(cache.get(&key("img-1", None)), None, "size buckets differ");
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evicts_least_recently_used() {
        let cache = PreviewCache::new(2, Duration::from_secs(3600));
        cache.insert(key("a", None), Bytes::from_static(b"A"));
        cache.insert(key("b", None), Bytes::from_static(b"B"));

        // Touch "a" so "b" is the least recently used.
        assert!(cache.get(&key("a", None)).is_some());

        cache.insert(key("c", None), Bytes::from_static(b"C"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("a", None)).is_some());
        assert!(cache.get(&key("b", None)).is_none());
        assert!(cache.get(&key("c", None)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_by_ttl() {
        let cache = PreviewCache::new(8, Duration::from_secs(60));
        cache.insert(key("a", None), Bytes::from_static(b"A"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get(&key("a", None)), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hits_do_not_extend_ttl() {
        let cache = PreviewCache::new(8, Duration::from_secs(60));
        cache.insert(key("a", None), Bytes::from_static(b"A"));

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(cache.get(&key("a", None)).is_some());

        tokio::time::advance(Duration::from_secs(25)).await;
        assert_eq!(cache.get(&key("a", None)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_hits_keep_the_order_queue_bounded() {
        let cache = PreviewCache::new(8, Duration::from_secs(3600));
        cache.insert(key("a", None), Bytes::from_static(b"A"));

        for _ in 0..10_000 {
            assert!(cache.get(&key("a", None)).is_some());
        }

        let queued = cache.lock().order.len();
        assert!(
            queued <= 8 * ORDER_SLACK,
            "one live entry left {queued} order entries behind"
        );
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_order_survives_a_compaction_sweep() {
        let cache = PreviewCache::new(2, Duration::from_secs(3600));
        cache.insert(key("a", None), Bytes::from_static(b"A"));
        cache.insert(key("b", None), Bytes::from_static(b"B"));

        // Enough touches of "a" to force at least one sweep.
        for _ in 0..32 {
            assert!(cache.get(&key("a", None)).is_some());
        }

        cache.insert(key("c", None), Bytes::from_static(b"C"));
        assert!(cache.get(&key("a", None)).is_some());
        assert!(cache.get(&key("b", None)).is_none(), "b was least recent");
        assert!(cache.get(&key("c", None)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reinserting_a_key_does_not_grow_the_cache() {
        let cache = PreviewCache::new(2, Duration::from_secs(3600));
        cache.insert(key("a", None), Bytes::from_static(b"A1"));
        cache.insert(key("a", None), Bytes::from_static(b"A2"));
        cache.insert(key("b", None), Bytes::from_static(b"B"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("a", None)), Some(Bytes::from_static(b"A2")));
    }
}
