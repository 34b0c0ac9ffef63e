//! Cache entry bookkeeping.

use std::time::{Duration, Instant};

/// Stored form of a cached value
#[derive(Debug, Clone)]
pub(crate) enum Payload<V> {
    /// Value kept as-is
    Plain(V),
    /// Gzipped JSON of the value
    Compressed {
        bytes: Vec<u8>,
        /// Serialized size before compression
        original_size: usize,
    },
}

/// A single resident entry
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<V> {
    pub payload: Payload<V>,
    pub expires_at: Instant,
    /// Base priority (higher = kept longer)
    pub priority: u32,
    pub access_count: u64,
    pub last_accessed: Instant,
    /// Stored size in bytes (compressed size when compressed)
    pub size_bytes: usize,
    /// Insertion sequence, breaks ranking ties in insertion order
    pub seq: u64,
}

impl<V> CacheEntry<V> {
    pub fn new(payload: Payload<V>, size_bytes: usize, priority: u32, ttl: Duration, seq: u64) -> Self {
        let now = Instant::now();
        Self {
            payload,
            expires_at: now + ttl,
            priority,
            access_count: 0,
            last_accessed: now,
            size_bytes,
            seq,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.payload, Payload::Compressed { .. })
    }

    /// Record a hit.
    pub fn touch(&mut self, now: Instant) {
        self.access_count += 1;
        self.last_accessed = now;
    }

    /// Recency-weighted score used as the eviction tiebreak:
    /// `(access_count / max(1, age_secs)) * priority`, age measured from the
    /// last access.
    pub fn eviction_score(&self, now: Instant) -> f64 {
        let age_secs = now.saturating_duration_since(self.last_accessed).as_secs_f64();
        (self.access_count as f64 / age_secs.max(1.0)) * self.priority as f64
    }

    /// Usage score used by warming: `access_count * priority`.
    pub fn usage_score(&self) -> u64 {
        self.access_count.saturating_mul(self.priority as u64)
    }
}
