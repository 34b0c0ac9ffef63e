use serde::{Deserialize, Serialize};

/// Snapshot of cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to respect the capacity bound
    pub evictions: u64,
    /// Inserts skipped because no entry could be evicted
    pub dropped_inserts: u64,
    /// Compressed size over original size of compressed entries, 0.0 when none are compressed
    pub compression_ratio: f64,
    /// Resident entries
    pub entries: usize,
}

impl CacheMetrics {
    /// Hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let mut metrics = CacheMetrics::default();
        assert_eq!(metrics.hit_rate(), 0.0);

        metrics.hits = 3;
        metrics.misses = 1;
        assert_eq!(metrics.hit_rate(), 0.75);
    }
}
