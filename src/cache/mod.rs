//! # Adaptive Cache
//!
//! In-process cache for rules (or any serializable value) with:
//! - TTL expiry, checked lazily on read
//! - A hard entry-count bound enforced by priority/recency scored eviction
//! - Gzip compression of values whose JSON form exceeds a byte threshold
//! - Usage-based warming that prunes the cache to its most used entries
//!
//! # Thread Safety
//! Every public operation runs inside one `parking_lot::Mutex` section.
//! Reads and writes are not distinguished: `get` mutates access statistics,
//! and eviction and warming need a consistent view of every entry.

pub mod codec;
pub mod config;
mod entry;
pub mod metrics;

pub use config::{CacheConfig, EvictionPolicy, WarmingStrategy, DEFAULT_COMPRESSION_THRESHOLD};
pub use metrics::CacheMetrics;

use log::{debug, info};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;

use crate::rule::Rule;
use entry::{CacheEntry, Payload};

/// Cache errors. Ordinary misses are never errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    #[error("Invalid cache configuration: {0}")]
    Config(String),

    #[error("Cache integrity error: {0}")]
    Compression(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Default priority for `set`
pub const DEFAULT_ENTRY_PRIORITY: u32 = 1;

// ============================================================================
// Internal State
// ============================================================================

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    dropped_inserts: u64,
    next_seq: u64,
}

impl<V> CacheState<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            evictions: 0,
            dropped_inserts: 0,
            next_seq: 0,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Free one slot for an incoming entry of the given priority.
    ///
    /// Entries are ranked by base priority, then eviction score, then age of
    /// insertion. The lowest ranked entry is evicted when the incoming
    /// priority is at least its priority; otherwise the second lowest is
    /// evicted. Returns false when nothing could be evicted.
    fn make_room(&mut self, incoming_priority: u32, now: Instant) -> bool {
        let mut ranked: Vec<(&String, u32, f64, u64)> = self
            .entries
            .iter()
            .map(|(key, e)| (key, e.priority, e.eviction_score(now), e.seq))
            .collect();

        ranked.sort_by(|a, b| {
            a.1.cmp(&b.1)
                .then_with(|| a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal))
                .then_with(|| a.3.cmp(&b.3))
        });

        let victim = match ranked.first() {
            Some(lowest) if incoming_priority >= lowest.1 => Some(lowest.0.clone()),
            Some(_) => ranked.get(1).map(|second| second.0.clone()),
            None => None,
        };

        match victim {
            Some(key) => {
                self.entries.remove(&key);
                self.evictions += 1;
                debug!("Evicted cache entry {}", key);
                true
            }
            None => false,
        }
    }

    fn compression_ratio(&self) -> f64 {
        let (compressed, original) = self
            .entries
            .values()
            .filter_map(|e| match &e.payload {
                Payload::Compressed { bytes, original_size } => Some((bytes.len(), *original_size)),
                Payload::Plain(_) => None,
            })
            .fold((0usize, 0usize), |(c, o), (bc, bo)| (c + bc, o + bo));

        if original == 0 {
            0.0
        } else {
            compressed as f64 / original as f64
        }
    }
}

// ============================================================================
// Adaptive Cache
// ============================================================================

/// Size-bounded TTL cache with compression and usage-based warming.
///
/// Construct one instance per logical namespace and share it behind an
/// `Arc`.
pub struct AdaptiveCache<V = Rule> {
    config: CacheConfig,
    state: Mutex<CacheState<V>>,
}

impl<V> AdaptiveCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Create a cache, rejecting a zero TTL or zero capacity.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        info!(
            "Creating adaptive cache: ttl={}s max_size={} compression_threshold={}B warming={:?}",
            config.ttl.as_secs_f64(),
            config.max_size,
            config.compression_threshold,
            config.warming_strategy
        );
        Ok(Self {
            config,
            state: Mutex::new(CacheState::new()),
        })
    }

    /// Create a cache with the default configuration.
    pub fn with_defaults() -> Result<Self, CacheError> {
        Self::new(CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a value. Absent and expired keys are misses; expired entries
    /// are dropped on the way.
    pub fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = Instant::now();

        let expired = match state.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                state.misses += 1;
                return Ok(None);
            }
        };

        if expired {
            state.entries.remove(key);
            state.misses += 1;
            debug!("Cache entry {} expired", key);
            return Ok(None);
        }

        let Some(entry) = state.entries.get_mut(key) else {
            return Ok(None);
        };

        // A payload that fails to decode is neither a hit nor an access.
        let value = match &entry.payload {
            Payload::Plain(value) => value.clone(),
            Payload::Compressed { bytes, .. } => {
                let raw = codec::decompress(bytes)?;
                serde_json::from_slice(&raw).map_err(|e| {
                    CacheError::Compression(format!("Failed to decode entry {}: {}", key, e))
                })?
            }
        };

        entry.touch(now);
        state.hits += 1;
        Ok(Some(value))
    }

    /// Insert a value with the default priority.
    pub fn set(&self, key: impl Into<String>, value: V) -> Result<(), CacheError> {
        self.set_with_priority(key, value, DEFAULT_ENTRY_PRIORITY)
    }

    /// Insert a value with an explicit priority (higher = kept longer).
    ///
    /// When the cache is full and `key` is new, one entry is evicted first.
    /// If no entry can be evicted the insert is skipped.
    pub fn set_with_priority(
        &self,
        key: impl Into<String>,
        value: V,
        priority: u32,
    ) -> Result<(), CacheError> {
        let key = key.into();
        let serialized =
            serde_json::to_vec(&value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let original_size = serialized.len();

        let (payload, size_bytes) = if original_size > self.config.compression_threshold {
            let bytes = codec::compress(&serialized)?;
            let size = bytes.len();
            debug!(
                "Compressed cache entry {}: {} -> {} bytes (ratio {:.3})",
                key,
                original_size,
                size,
                size as f64 / original_size as f64
            );
            (Payload::Compressed { bytes, original_size }, size)
        } else {
            (Payload::Plain(value), original_size)
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = Instant::now();

        if !state.entries.contains_key(&key)
            && state.entries.len() >= self.config.max_size
            && !state.make_room(priority, now)
        {
            state.dropped_inserts += 1;
            debug!("Cache full, dropping insert of {} (priority {})", key, priority);
            return Ok(());
        }

        let seq = state.next_seq();
        state.entries.insert(
            key,
            CacheEntry::new(payload, size_bytes, priority, self.config.ttl, seq),
        );
        Ok(())
    }

    /// Remove a key. Returns true if it was resident.
    pub fn delete(&self, key: &str) -> bool {
        self.state.lock().entries.remove(key).is_some()
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Non-mutating presence check; does not count as a hit or miss.
    pub fn contains_key(&self, key: &str) -> bool {
        let state = self.state.lock();
        state
            .entries
            .get(key)
            .map(|e| !e.is_expired(Instant::now()))
            .unwrap_or(false)
    }

    /// Number of resident entries, expired ones included until touched.
    pub fn size(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.lock();
        let now = Instant::now();
        let before = state.entries.len();
        state.entries.retain(|_, e| !e.is_expired(now));
        before - state.entries.len()
    }

    /// Usage-based warming pass.
    ///
    /// Expired and never-accessed entries are dropped. Of the rest, the top
    /// 20% by `access_count * priority` (rounded up, at least two when two
    /// qualify) are kept with a fresh TTL and an access count of 1.
    /// Does nothing unless the warming strategy is `UsageBased`.
    /// Returns the number of resident entries afterwards.
    pub fn warm(&self) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if self.config.warming_strategy != WarmingStrategy::UsageBased {
            return state.entries.len();
        }

        let now = Instant::now();
        let before = state.entries.len();

        let mut scored: Vec<(String, CacheEntry<V>, u64)> = state
            .entries
            .drain()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(key, e)| {
                let score = e.usage_score();
                (key, e, score)
            })
            .filter(|(_, _, score)| *score > 0)
            .collect();

        scored.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.1.seq.cmp(&b.1.seq)));

        let qualifying = scored.len();
        let mut keep = (qualifying + 4) / 5;
        if qualifying >= 2 {
            keep = keep.max(2);
        }
        scored.truncate(keep.min(qualifying));

        for (key, mut entry, _) in scored {
            entry.expires_at = now + self.config.ttl;
            entry.access_count = 1;
            entry.seq = state.next_seq();
            state.entries.insert(key, entry);
        }

        let after = state.entries.len();
        info!(
            "Cache warming retained {} of {} entries ({} qualifying)",
            after, before, qualifying
        );
        after
    }

    /// Snapshot of the counters and the current compression ratio.
    pub fn metrics(&self) -> CacheMetrics {
        let state = self.state.lock();
        CacheMetrics {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            dropped_inserts: state.dropped_inserts,
            compression_ratio: state.compression_ratio(),
            entries: state.entries.len(),
        }
    }

    /// Whether the entry under `key` is stored compressed.
    pub fn is_compressed(&self, key: &str) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|e| e.is_compressed())
            .unwrap_or(false)
    }

    /// Total stored bytes across resident entries.
    pub fn stored_bytes(&self) -> usize {
        self.state.lock().entries.values().map(|e| e.size_bytes).sum()
    }
}
