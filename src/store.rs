// Rule storage seam.
//
// The backing store (relational database, file ingestion, ...) lives outside
// this crate. `RuleStore` is the interface the service layer consumes;
// `InMemoryRuleStore` is the in-process implementation used for embedding
// and tests.

use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

use crate::rule::{Rule, RuleId};

/// Store errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Rule {0} not found")]
    NotFound(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Source of persisted rules
pub trait RuleStore: Send + Sync {
    /// Fetch a rule by id; `Ok(None)` when absent.
    fn get(&self, id: &RuleId) -> Result<Option<Rule>, StoreError>;

    /// Insert or replace a rule.
    fn put(&self, rule: Rule) -> Result<(), StoreError>;

    /// Delete a rule, returning it.
    fn delete(&self, id: &RuleId) -> Result<Rule, StoreError>;

    /// All rules, ordered by id.
    fn list(&self) -> Result<Vec<Rule>, StoreError>;
}

/// HashMap-backed rule store
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<RuleId, Rule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with rules.
    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let map = rules.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            rules: RwLock::new(map),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

impl RuleStore for InMemoryRuleStore {
    fn get(&self, id: &RuleId) -> Result<Option<Rule>, StoreError> {
        Ok(self.rules.read().get(id).cloned())
    }

    fn put(&self, rule: Rule) -> Result<(), StoreError> {
        if rule.id.is_empty() {
            return Err(StoreError::InvalidRule("Rule ID cannot be empty".to_string()));
        }
        if rule.name.is_empty() {
            return Err(StoreError::InvalidRule(format!(
                "Rule {} has an empty name",
                rule.id
            )));
        }
        self.rules.write().insert(rule.id.clone(), rule);
        Ok(())
    }

    fn delete(&self, id: &RuleId) -> Result<Rule, StoreError> {
        self.rules
            .write()
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<Rule>, StoreError> {
        let mut rules: Vec<Rule> = self.rules.read().values().cloned().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rules)
    }
}
