//! L1: in-memory LRU tier bounded by total byte size rather than entry
//! count, since audio payloads vary widely in length. `lru::LruCache`
//! gives us recency order; we pop from the back until back under budget.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::model::AudioData;

#[derive(Default)]
pub struct L1Stats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

pub struct L1Cache {
    inner: Mutex<LruCache<String, Arc<AudioData>>>,
    current_bytes: Mutex<u64>,
    capacity_bytes: u64,
    stats: L1Stats,
}

impl L1Cache {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            // Unbounded by count; byte budget is enforced manually below.
            inner: Mutex::new(LruCache::new(NonZeroUsize::new(usize::MAX).unwrap())),
            current_bytes: Mutex::new(0),
            capacity_bytes,
            stats: L1Stats::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<AudioData>> {
        let mut inner = self.inner.lock();
        match inner.get(key) {
            Some(audio) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(audio))
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: String, audio: Arc<AudioData>) {
        let size = audio.bytes().len() as u64;
        if size > self.capacity_bytes {
            // Larger than the whole tier: never admit it.
            return;
        }
        let mut inner = self.inner.lock();
        let mut bytes = self.current_bytes.lock();

        if let Some(old) = inner.put(key, audio) {
            *bytes = bytes.saturating_sub(old.bytes().len() as u64);
        }
        *bytes += size;

        while *bytes > self.capacity_bytes {
            match inner.pop_lru() {
                Some((_, evicted)) => {
                    *bytes = bytes.saturating_sub(evicted.bytes().len() as u64);
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }

    pub fn remove(&self, key: &str) {
        let mut inner = self.inner.lock();
        let mut bytes = self.current_bytes.lock();
        if let Some(removed) = inner.pop(key) {
            *bytes = bytes.saturating_sub(removed.bytes().len() as u64);
        }
    }

    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.hits.load(Ordering::Relaxed),
            self.stats.misses.load(Ordering::Relaxed),
            self.stats.evictions.load(Ordering::Relaxed),
        )
    }
}
