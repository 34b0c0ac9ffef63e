//! # Rule Service
//!
//! Tool-layer facade over the store, the cache and the composer.
//!
//! - Reads go cache first, then the store, populating the cache on a miss
//! - Compositions are cached under a fingerprint of the requested ids and
//!   invalidated whenever one of their contributors changes
//! - Writes go to the store and invalidate cached copies

use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::cache::{AdaptiveCache, CacheError, CacheMetrics};
use crate::composer::{ComposeError, RuleComposer};
use crate::rule::{Rule, RuleId};
use crate::store::{RuleStore, StoreError};

const RULE_KEY_PREFIX: &str = "rule:";
const COMPOSED_KEY_PREFIX: &str = "composed:";

/// Service errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Rule {0} not found")]
    RuleNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Maps a rule priority (smaller = more important) onto a cache priority
/// (larger = kept longer). Priorities outside 1..=10 are clamped.
pub fn cache_priority(rule_priority: i32) -> u32 {
    (11 - rule_priority.clamp(1, 10)) as u32
}

/// Cache key of a composition over the given ids, in request order.
pub fn composed_cache_key(ids: &[RuleId]) -> String {
    let mut hasher = Sha256::new();
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            hasher.update(b",");
        }
        hasher.update(id.as_str().as_bytes());
    }
    format!("{}{:x}", COMPOSED_KEY_PREFIX, hasher.finalize())
}

fn rule_cache_key(id: &RuleId) -> String {
    format!("{}{}", RULE_KEY_PREFIX, id)
}

/// Rule service wiring store, cache and composer together
///
/// # Thread Safety
/// Cache population (rule reads on a miss, compositions) runs under the read
/// side of `write_gate`; store writes and the matching invalidation run under
/// its write side. A write therefore never lands between reading a
/// contributor and caching what was built from it.
pub struct RuleService<S: RuleStore> {
    store: Arc<S>,
    cache: Arc<AdaptiveCache<Rule>>,
    composer: RuleComposer,
    write_gate: RwLock<()>,
    /// contributor id -> composed cache keys built from it
    compositions: Mutex<HashMap<RuleId, HashSet<String>>>,
}

impl<S: RuleStore> RuleService<S> {
    pub fn new(store: Arc<S>, cache: Arc<AdaptiveCache<Rule>>) -> Self {
        Self {
            store,
            cache,
            composer: RuleComposer::new(),
            write_gate: RwLock::new(()),
            compositions: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<AdaptiveCache<Rule>> {
        &self.cache
    }

    /// Fetch a rule through the cache.
    pub fn get_rule(&self, id: &RuleId) -> Result<Option<Rule>, ServiceError> {
        let _gate = self.write_gate.read();
        self.load_rule(id)
    }

    /// Persist a rule and drop any cached copy or composition using it.
    pub fn save_rule(&self, mut rule: Rule) -> Result<(), ServiceError> {
        rule.touch();
        let id = rule.id.clone();
        let _gate = self.write_gate.write();
        self.store.put(rule)?;
        self.invalidate(&id);
        Ok(())
    }

    /// Delete a rule from the store and the cache.
    pub fn delete_rule(&self, id: &RuleId) -> Result<Rule, ServiceError> {
        let _gate = self.write_gate.write();
        let removed = self.store.delete(id).map_err(|e| match e {
            StoreError::NotFound(id) => ServiceError::RuleNotFound(id),
            other => ServiceError::Store(other),
        })?;
        self.invalidate(id);
        Ok(removed)
    }

    /// Compose the given rules, serving repeated requests from the cache.
    pub fn compose_rules(&self, ids: &[RuleId]) -> Result<Rule, ServiceError> {
        let _gate = self.write_gate.read();

        let key = composed_cache_key(ids);
        if let Some(composed) = self.cache.get(&key)? {
            debug!("Serving composition {} from cache", key);
            return Ok(composed);
        }

        let mut rules = Vec::with_capacity(ids.len());
        for id in ids {
            let rule = self
                .load_rule(id)?
                .ok_or_else(|| ServiceError::RuleNotFound(id.to_string()))?;
            rules.push(rule);
        }

        let composed = self.composer.compose(&rules)?;
        self.cache
            .set_with_priority(key.clone(), composed.clone(), cache_priority(composed.priority))?;

        let mut compositions = self.compositions.lock();
        for id in ids {
            compositions.entry(id.clone()).or_default().insert(key.clone());
        }
        self.prune_compositions(&mut compositions);

        info!("Composed {} rules into {}", ids.len(), composed.id);
        Ok(composed)
    }

    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }

    /// Run one warming pass on the underlying cache.
    pub fn warm_cache(&self) -> usize {
        let retained = self.cache.warm();
        self.prune_compositions(&mut self.compositions.lock());
        retained
    }

    /// Number of distinct composed keys tracked for invalidation.
    pub fn tracked_compositions(&self) -> usize {
        let compositions = self.compositions.lock();
        compositions
            .values()
            .flatten()
            .collect::<HashSet<_>>()
            .len()
    }

    /// Cache-then-store lookup. Callers hold the read side of `write_gate`.
    fn load_rule(&self, id: &RuleId) -> Result<Option<Rule>, ServiceError> {
        let key = rule_cache_key(id);
        if let Some(rule) = self.cache.get(&key)? {
            return Ok(Some(rule));
        }

        let Some(rule) = self.store.get(id)? else {
            return Ok(None);
        };
        debug!("Cache miss for rule {}, loaded from store", id);
        self.cache
            .set_with_priority(key, rule.clone(), cache_priority(rule.priority))?;
        Ok(Some(rule))
    }

    /// Drop tracked keys the cache no longer holds (evicted, expired, warmed out).
    fn prune_compositions(&self, compositions: &mut HashMap<RuleId, HashSet<String>>) {
        compositions.retain(|_, keys| {
            keys.retain(|key| self.cache.contains_key(key));
            !keys.is_empty()
        });
    }

    /// Callers hold the write side of `write_gate`.
    fn invalidate(&self, id: &RuleId) {
        self.cache.delete(&rule_cache_key(id));
        if let Some(keys) = self.compositions.lock().remove(id) {
            for key in keys {
                self.cache.delete(&key);
            }
        }
    }
}
