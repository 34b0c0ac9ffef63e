//! Scheduled cache warming - background task driving `AdaptiveCache::warm`.
//!
//! The cache never schedules itself; owners spawn this scheduler next to the
//! cache instance they want pruned periodically.

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::cache::AdaptiveCache;

/// Configuration for the warming scheduler.
#[derive(Debug, Clone)]
pub struct WarmingSchedulerConfig {
    /// Interval between warming passes
    pub interval: Duration,
    /// Whether the scheduler is enabled
    pub enabled: bool,
}

impl Default for WarmingSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            enabled: true,
        }
    }
}

/// Periodic driver for cache warming.
pub struct WarmingScheduler<V> {
    cache: Arc<AdaptiveCache<V>>,
    config: WarmingSchedulerConfig,
    /// Time of the last completed pass
    last_run_at: RwLock<Option<DateTime<Utc>>>,
    runs: AtomicU64,
}

impl<V> WarmingScheduler<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new(cache: Arc<AdaptiveCache<V>>, config: WarmingSchedulerConfig) -> Self {
        Self {
            cache,
            config,
            last_run_at: RwLock::new(None),
            runs: AtomicU64::new(0),
        }
    }

    /// Timestamp of the last warming pass, if any ran.
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        *self.last_run_at.read()
    }

    /// Number of completed passes.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Starts the scheduler loop.
    ///
    /// Runs indefinitely; spawn it as a tokio task. The first pass happens
    /// one full interval after start.
    pub async fn start(self: Arc<Self>) {
        if !self.config.enabled {
            info!("Scheduled cache warming is disabled, skipping");
            return;
        }

        info!(
            "Starting scheduled cache warming with {}-second interval",
            self.config.interval.as_secs_f64()
        );

        let mut ticker = interval(self.config.interval);
        // interval() fires immediately; skip that tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.run_once();
        }
    }

    /// Executes one warming pass and returns the resident entry count.
    pub fn run_once(&self) -> usize {
        let before = self.cache.size();
        let retained = self.cache.warm();
        *self.last_run_at.write() = Some(Utc::now());
        self.runs.fetch_add(1, Ordering::Relaxed);
        debug!("Warming pass: {} -> {} entries", before, retained);
        retained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::rule::Rule;

    fn populated_cache() -> Arc<AdaptiveCache<Rule>> {
        let cache = AdaptiveCache::new(CacheConfig::new(Duration::from_secs(60), 10)).unwrap();
        cache.set("a", Rule::new("a", "A", "style", "x: 1")).unwrap();
        cache.set("b", Rule::new("b", "B", "style", "x: 2")).unwrap();
        cache.set("c", Rule::new("c", "C", "style", "x: 3")).unwrap();
        cache.get("a").unwrap();
        cache.get("b").unwrap();
        Arc::new(cache)
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = WarmingSchedulerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval.as_secs(), 300);
    }

    #[test]
    fn test_run_once_warms_cache() {
        let cache = populated_cache();
        let scheduler = WarmingScheduler::new(Arc::clone(&cache), WarmingSchedulerConfig::default());
        assert!(scheduler.last_run().is_none());

        assert_eq!(scheduler.run_once(), 2);
        assert_eq!(cache.size(), 2);
        assert_eq!(scheduler.runs(), 1);
        assert!(scheduler.last_run().is_some());
    }

    #[tokio::test]
    async fn test_disabled_scheduler_returns_immediately() {
        let cache = populated_cache();
        let scheduler = Arc::new(WarmingScheduler::new(
            Arc::clone(&cache),
            WarmingSchedulerConfig {
                interval: Duration::from_millis(10),
                enabled: false,
            },
        ));

        scheduler.clone().start().await;
        assert_eq!(scheduler.runs(), 0);
        assert_eq!(cache.size(), 3);
    }

    #[tokio::test]
    async fn test_scheduler_runs_periodically() {
        let cache = populated_cache();
        let scheduler = Arc::new(WarmingScheduler::new(
            Arc::clone(&cache),
            WarmingSchedulerConfig {
                interval: Duration::from_millis(20),
                enabled: true,
            },
        ));

        let handle = tokio::spawn(Arc::clone(&scheduler).start());
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();

        assert!(scheduler.runs() >= 1);
        assert_eq!(cache.size(), 2);
    }
}
