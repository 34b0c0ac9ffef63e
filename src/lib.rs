//! # Rule Core
//!
//! Rule composition and adaptive in-process caching for rule-management
//! backends.

pub mod rule;
pub mod composer;
pub mod cache;
pub mod warming;
pub mod store;
pub mod service;

pub use rule::{Rule, RuleBuilder, RuleId};

pub use composer::{
    compose,                // Compose with a default composer
    ComposeError,           // Empty input / invalid rule / cycle
    CompositionReport,      // Composed rule with order and conflicts
    DependencyGraph,        // depends-on adjacency and cycle search
    RuleComposer,           // Stateless composer
    SettingConflict,        // Conflicting setting and its resolution
};

pub use cache::{
    AdaptiveCache,          // TTL + eviction + compression + warming
    CacheConfig,            // Cache configuration
    CacheError,             // Configuration and integrity errors
    CacheMetrics,           // Hits, misses, compression ratio
    EvictionPolicy,         // Eviction selector (informational)
    WarmingStrategy,        // Warming selector
};

pub use warming::{WarmingScheduler, WarmingSchedulerConfig};

pub use store::{InMemoryRuleStore, RuleStore, StoreError};

pub use service::{RuleService, ServiceError};
