//! Cache configuration.
//!
//! `warming_strategy` and `eviction_policy` are carried for interface
//! compatibility. Only [`WarmingStrategy::UsageBased`] changes behavior; every
//! eviction uses the same priority/recency scoring whatever policy is selected.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::CacheError;

/// Default byte size above which cached values are compressed
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

/// Strategy used by `AdaptiveCache::warm`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmingStrategy {
    /// Keep only the most used entries and refresh their TTL
    UsageBased,
    /// Not wired up: warming is a no-op
    TimeBased,
    /// Warming is a no-op
    Disabled,
}

impl Default for WarmingStrategy {
    fn default() -> Self {
        WarmingStrategy::UsageBased
    }
}

/// Eviction policy selector (informational only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    Lru,
    Lfu,
    Priority,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        EvictionPolicy::Lru
    }
}

/// Configuration for an `AdaptiveCache`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time before an entry is considered stale
    #[serde(rename = "ttl_secs", with = "duration_secs")]
    pub ttl: Duration,
    /// Maximum number of resident entries
    pub max_size: usize,
    /// Serialized size (bytes) above which a value is compressed
    pub compression_threshold: usize,
    pub warming_strategy: WarmingStrategy,
    pub eviction_policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_size: 1000,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            warming_strategy: WarmingStrategy::default(),
            eviction_policy: EvictionPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Create a config with the given TTL and capacity, other fields default.
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            ttl,
            max_size,
            ..Self::default()
        }
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        let config: CacheConfig =
            serde_json::from_str(json).map_err(|e| CacheError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_compression_threshold(mut self, threshold: usize) -> Self {
        self.compression_threshold = threshold;
        self
    }

    pub fn with_warming_strategy(mut self, strategy: WarmingStrategy) -> Self {
        self.warming_strategy = strategy;
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Reject non-positive TTL or capacity.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.ttl.is_zero() {
            return Err(CacheError::Config("ttl must be greater than zero".to_string()));
        }
        if self.max_size == 0 {
            return Err(CacheError::Config(
                "max_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serialize a Duration as whole or fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("ttl_secs must be a non-negative number"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert_eq!(config.max_size, 1000);
        assert_eq!(config.compression_threshold, 1024);
        assert_eq!(config.warming_strategy, WarmingStrategy::UsageBased);
        assert_eq!(config.eviction_policy, EvictionPolicy::Lru);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let zero_ttl = CacheConfig::new(Duration::ZERO, 10);
        assert!(matches!(zero_ttl.validate(), Err(CacheError::Config(_))));

        let zero_size = CacheConfig::new(Duration::from_secs(1), 0);
        assert!(matches!(zero_size.validate(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_from_json_partial() {
        let config = CacheConfig::from_json(
            r#"{"ttl_secs": 30, "max_size": 5, "eviction_policy": "lfu"}"#,
        )
        .unwrap();

        assert_eq!(config.ttl, Duration::from_secs(30));
        assert_eq!(config.max_size, 5);
        assert_eq!(config.eviction_policy, EvictionPolicy::Lfu);
        assert_eq!(config.compression_threshold, DEFAULT_COMPRESSION_THRESHOLD);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(CacheConfig::from_json(r#"{"max_size": 0}"#).is_err());
        assert!(CacheConfig::from_json(r#"{"ttl_secs": -1}"#).is_err());
        assert!(CacheConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_builder_setters() {
        let config = CacheConfig::default()
            .with_ttl(Duration::from_millis(250))
            .with_max_size(3)
            .with_compression_threshold(64)
            .with_warming_strategy(WarmingStrategy::Disabled)
            .with_eviction_policy(EvictionPolicy::Priority);

        assert_eq!(config.ttl, Duration::from_millis(250));
        assert_eq!(config.max_size, 3);
        assert_eq!(config.compression_threshold, 64);
        assert_eq!(config.warming_strategy, WarmingStrategy::Disabled);
        assert_eq!(config.eviction_policy, EvictionPolicy::Priority);
    }
}
