// Core rule entity shared by the composer and the cache.
//
// A rule is a tagged, prioritized text document. Lower priority numbers
// carry higher precedence. The content body is free-form text that may
// carry `depends-on: <id>` directives and `key: value` settings which the
// composer interprets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    /// Creates a rule id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        RuleId(id.into())
    }

    /// Creates a random rule id.
    pub fn generate() -> Self {
        RuleId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for RuleId {
    fn from(s: String) -> Self {
        RuleId(s)
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        RuleId(s.to_string())
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Rule
// ============================================================================

/// A rule document with its metadata.
///
/// `priority` follows the "smaller wins" convention: a rule with priority 1
/// takes precedence over a rule with priority 5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Unique identifier
    pub id: RuleId,
    /// Display name
    pub name: String,
    /// Domain or category (free-form)
    #[serde(rename = "type")]
    pub rule_type: String,
    /// Free text, may be empty
    #[serde(default)]
    pub description: String,
    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
    /// Precedence (lower = higher precedence)
    pub priority: i32,
    /// Rule body
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Creates a rule with default priority, no tags and fresh timestamps.
    pub fn new(
        id: impl Into<RuleId>,
        name: impl Into<String>,
        rule_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Rule {
            id: id.into(),
            name: name.into(),
            rule_type: rule_type.into(),
            description: String::new(),
            tags: Vec::new(),
            priority: 1,
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a builder for finer control over construction.
    pub fn builder() -> RuleBuilder {
        RuleBuilder::default()
    }

    /// Returns the first required field that is empty, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.id.is_empty() {
            Some("id")
        } else if self.rule_type.is_empty() {
            Some("type")
        } else if self.name.is_empty() {
            Some("name")
        } else if self.content.is_empty() {
            Some("content")
        } else {
            None
        }
    }

    /// True when id, type, name and content are all non-empty.
    pub fn is_composable(&self) -> bool {
        self.missing_field().is_none()
    }

    /// True if this rule carries the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Refreshes the update timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for creating a Rule step by step.
#[derive(Debug, Default)]
pub struct RuleBuilder {
    id: Option<RuleId>,
    name: Option<String>,
    rule_type: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    priority: Option<i32>,
    content: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl RuleBuilder {
    pub fn new() -> Self {
        RuleBuilder::default()
    }
    ///Sets the rule id
    pub fn id(mut self, id: impl Into<RuleId>) -> Self {
        self.id = Some(id.into());
        self
    }
    ///Sets the display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
    ///Sets the rule type
    pub fn rule_type(mut self, rule_type: impl Into<String>) -> Self {
        self.rule_type = Some(rule_type.into());
        self
    }
    ///Sets the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
    ///Adds a tag, ignoring duplicates
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }
    ///Sets the priority value
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
    ///Sets the content body
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
    ///Sets the creation timestamp
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Builds the Rule. Missing text fields stay empty so that structural
    /// validation can reject them later.
    pub fn build(self) -> Rule {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        Rule {
            id: self.id.unwrap_or_else(RuleId::generate),
            name: self.name.unwrap_or_default(),
            rule_type: self.rule_type.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            tags: self.tags,
            priority: self.priority.unwrap_or(1),
            content: self.content.unwrap_or_default(),
            created_at,
            updated_at: created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_defaults() {
        let rule = Rule::builder()
            .name("Formatting")
            .rule_type("style")
            .content("indent: 4")
            .build();

        assert!(!rule.id.is_empty());
        assert_eq!(rule.priority, 1);
        assert_eq!(rule.created_at, rule.updated_at);
        assert!(rule.is_composable());
    }

    #[test]
    fn test_builder_deduplicates_tags() {
        let rule = Rule::builder()
            .id("r1")
            .tag("rust")
            .tag("lint")
            .tag("rust")
            .build();

        assert_eq!(rule.tags, vec!["rust".to_string(), "lint".to_string()]);
        assert!(rule.has_tag("lint"));
        assert!(!rule.has_tag("python"));
    }

    #[test]
    fn test_missing_field_order() {
        let mut rule = Rule::new("r1", "name", "type", "body");
        assert_eq!(rule.missing_field(), None);

        rule.content.clear();
        assert_eq!(rule.missing_field(), Some("content"));

        rule.rule_type.clear();
        assert_eq!(rule.missing_field(), Some("type"));

        rule.id = RuleId::new("");
        assert_eq!(rule.missing_field(), Some("id"));
        assert!(!rule.is_composable());
    }

    #[test]
    fn test_touch_moves_updated_at_forward() {
        let mut rule = Rule::new("r1", "name", "type", "body");
        let before = rule.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        rule.touch();
        assert!(rule.updated_at > before);
        assert_eq!(rule.created_at, before);
    }

    #[test]
    fn test_serde_field_names() {
        let rule = Rule::new("r1", "Naming", "convention", "case: snake");
        let value = serde_json::to_value(&rule).unwrap();

        assert_eq!(value["id"], json!("r1"));
        assert_eq!(value["type"], json!("convention"));
        assert!(value.get("createdAt").is_some());
        assert!(value.get("updatedAt").is_some());

        let parsed: Rule = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, rule);
    }
}
