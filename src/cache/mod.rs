//! The cache façade (§3, §4.3): a two-level durable cache (L1 memory, L2
//! disk) plus an ephemeral session tier, presented as a single Get/Put
//! surface to the controller. A tier is never queried while another
//! tier's lock is held — each lookup method below finishes with one tier
//! before touching the next.

pub mod key;
pub mod l1;
pub mod l2;
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::CacheConfig;
use crate::error::TtsError;
use crate::model::{AudioData, Speed};

use l1::L1Cache;
use l2::L2Cache;
use session::SessionCache;

pub use key::derive_cache_key;

/// Where a `Put` should land. `Durable` entries are promoted through both
/// L1 and L2; `Ephemeral` entries (speculative lookahead that's unlikely
/// to be replayed) go to the session tier only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    Durable,
    Ephemeral,
}

pub struct AudioCache {
    l1: L1Cache,
    l2: L2Cache,
    session: SessionCache,
}

impl AudioCache {
    pub fn open(config: &CacheConfig) -> Result<Self, TtsError> {
        let l2_dir = PathBuf::from(&config.dir).join("l2");
        Ok(Self {
            l1: L1Cache::new(config.l1_capacity_bytes),
            l2: L2Cache::open(l2_dir, config.l2_capacity_bytes, config.compression_level)?,
            session: SessionCache::new(config.session_capacity_bytes, Duration::from_secs(config.session_ttl_secs)),
        })
    }

    pub fn get(&self, text: &str, voice: &str, speed: Speed) -> Option<Arc<AudioData>> {
        let key = derive_cache_key(text, voice, speed);

        if let Some(audio) = self.l1.get(&key) {
            debug!(%key, tier = "l1", "cache hit");
            return Some(audio);
        }

        if let Some(bytes) = self.l2.get(&key) {
            debug!(%key, tier = "l2", "cache hit, promoting to l1");
            let audio = Arc::new(AudioData::from_pcm_bytes(bytes));
            self.l1.put(key, Arc::clone(&audio));
            return Some(audio);
        }

        if let Some(bytes) = self.session.get(&key) {
            debug!(%key, tier = "session", "cache hit");
            return Some(Arc::new(AudioData::from_pcm_bytes(bytes)));
        }

        debug!(%key, "cache miss");
        None
    }

    pub fn put(&self, text: &str, voice: &str, speed: Speed, audio: Arc<AudioData>, durability: Durability) -> Result<(), TtsError> {
        let key = derive_cache_key(text, voice, speed);
        match durability {
            Durability::Durable => {
                self.l2.put(&key, audio.bytes())?;
                self.l1.put(key, audio);
            }
            Durability::Ephemeral => {
                self.session.put(key, audio.into_bytes());
            }
        }
        Ok(())
    }

    /// Periodic maintenance sweep (§4.3): drops durable entries past
    /// their TTL. Run from a dedicated low-priority thread, never inline
    /// with a synthesis request.
    pub fn run_cleanup_sweep(&self, ttl_secs: u64) {
        self.l2.sweep_expired(ttl_secs);
    }
}
