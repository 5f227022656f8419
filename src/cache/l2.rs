//! L2: on-disk tier. Each entry is a file named `<key>.cache` under the
//! cache directory, written atomically (temp file + rename) so a crash
//! mid-write never leaves a corrupt entry visible. A persisted index
//! (`cache.index`, bincode-encoded) tracks size, compression, and hit
//! metadata without needing to stat every file tier-wide.
//!
//! Entries larger than 1KiB are zstd-compressed when that actually shrinks
//! them; smaller entries are stored raw, since compression overhead would
//! dominate the saving.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ErrorKind, TtsError};

const COMPRESSION_THRESHOLD_BYTES: usize = 1024;
const INDEX_FILE_NAME: &str = "cache.index";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct L2Entry {
    stored_size: u64,
    original_size: u64,
    compressed: bool,
    created_at_secs: u64,
    last_hit_at_secs: u64,
    hits: u32,
}

impl L2Entry {
    fn score(&self, now_secs: u64) -> f64 {
        let age_hours = (now_secs.saturating_sub(self.created_at_secs)) as f64 / 3600.0;
        let size_mb = self.stored_size as f64 / (1024.0 * 1024.0);
        age_hours * size_mb / (self.hits as f64 + 1.0)
    }
}

pub struct L2Cache {
    dir: PathBuf,
    index: Mutex<HashMap<String, L2Entry>>,
    capacity_bytes: u64,
    compression_level: i32,
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

impl L2Cache {
    pub fn open(dir: PathBuf, capacity_bytes: u64, compression_level: i32) -> Result<Self, TtsError> {
        std::fs::create_dir_all(&dir).map_err(|e| {
            TtsError::new(ErrorKind::Dependency, format!("failed to create cache dir {}: {e}", dir.display()))
                .with_component("cache.l2")
        })?;

        let index_path = dir.join(INDEX_FILE_NAME);
        let index = match std::fs::read(&index_path) {
            Ok(bytes) => bincode::deserialize::<HashMap<String, L2Entry>>(&bytes).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };

        let cache = Self { dir, index: Mutex::new(index), capacity_bytes, compression_level };
        cache.self_heal();
        Ok(cache)
    }

    /// Drops index entries whose backing file is missing, and rebuilds
    /// stored sizes against what's actually on disk.
    fn self_heal(&self) {
        let mut index = self.index.lock();
        let stale: Vec<String> = index
            .iter()
            .filter(|(key, _)| !self.entry_path(key).exists())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            index.remove(key);
        }
        if !stale.is_empty() {
            warn!(count = stale.len(), "dropped stale L2 cache index entries");
        }
        drop(index);
        self.persist_index();
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.cache"))
    }

    fn persist_index(&self) {
        let index = self.index.lock();
        let Ok(bytes) = bincode::serialize(&*index) else { return };
        let index_path = self.dir.join(INDEX_FILE_NAME);
        if let Err(e) = write_atomic(&self.dir, &index_path, &bytes) {
            warn!("failed to persist L2 cache index: {e}");
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let meta = {
            let index = self.index.lock();
            index.get(key).cloned()
        }?;

        let raw = match std::fs::read(self.entry_path(key)) {
            Ok(bytes) => bytes,
            Err(_) => {
                self.index.lock().remove(key);
                self.persist_index();
                return None;
            }
        };

        let bytes = if meta.compressed {
            match zstd::decode_all(raw.as_slice()) {
                Ok(decoded) => decoded,
                Err(_) => {
                    self.index.lock().remove(key);
                    self.persist_index();
                    return None;
                }
            }
        } else {
            raw
        };

        {
            let mut index = self.index.lock();
            if let Some(entry) = index.get_mut(key) {
                entry.hits += 1;
                entry.last_hit_at_secs = now_secs();
            }
        }
        self.persist_index();

        Some(bytes)
    }

    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<(), TtsError> {
        let (stored, compressed) = if bytes.len() > COMPRESSION_THRESHOLD_BYTES {
            match zstd::encode_all(bytes, self.compression_level) {
                Ok(compressed_bytes) if compressed_bytes.len() < bytes.len() => (compressed_bytes, true),
                _ => (bytes.to_vec(), false),
            }
        } else {
            (bytes.to_vec(), false)
        };

        let path = self.entry_path(key);
        write_atomic(&self.dir, &path, &stored).map_err(|e| {
            TtsError::new(ErrorKind::Dependency, format!("failed to write cache entry: {e}")).with_component("cache.l2")
        })?;

        let now = now_secs();
        {
            let mut index = self.index.lock();
            index.insert(
                key.to_string(),
                L2Entry {
                    stored_size: stored.len() as u64,
                    original_size: bytes.len() as u64,
                    compressed,
                    created_at_secs: now,
                    last_hit_at_secs: now,
                    hits: 0,
                },
            );
        }
        self.persist_index();
        self.evict_if_over_capacity();
        Ok(())
    }

    fn total_bytes(&self) -> u64 {
        self.index.lock().values().map(|e| e.stored_size).sum()
    }

    /// Evicts entries by ascending eviction score (lowest score evicted
    /// first, per the composite `age_hours * size_mb / (hits + 1)` formula)
    /// until the tier is at or under 90% of capacity, the same target the
    /// periodic cleanup sweep uses. Runs as a backstop on every write too,
    /// so a tier that somehow skipped a sweep interval still can't grow
    /// unbounded.
    fn evict_if_over_capacity(&self) {
        let target = self.capacity_bytes * 9 / 10;
        if self.total_bytes() <= self.capacity_bytes {
            return;
        }
        let now = now_secs();
        loop {
            let victim = {
                let index = self.index.lock();
                if index.values().map(|e| e.stored_size).sum::<u64>() <= target {
                    None
                } else {
                    index
                        .iter()
                        .min_by(|a, b| a.1.score(now).partial_cmp(&b.1.score(now)).unwrap_or(std::cmp::Ordering::Equal))
                        .map(|(k, _)| k.clone())
                }
            };
            match victim {
                Some(key) => self.remove(&key),
                None => break,
            }
        }
    }

    pub fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.entry_path(key));
        self.index.lock().remove(key);
        self.persist_index();
    }

    /// Periodic cleanup sweep (§4.3): deletes entries older than `ttl`.
    pub fn sweep_expired(&self, ttl_secs: u64) {
        let now = now_secs();
        let expired: Vec<String> = {
            let index = self.index.lock();
            index
                .iter()
                .filter(|(_, e)| now.saturating_sub(e.created_at_secs) > ttl_secs)
                .map(|(k, _)| k.clone())
                .collect()
        };
        for key in expired {
            self.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.index.lock().len()
    }
}

fn write_atomic(dir: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
