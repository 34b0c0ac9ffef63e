// Rule composition: merge several rules into one synthetic rule.
//
// Composition pipeline:
// 1. Structural validation (id, type, name, content must be non-empty)
// 2. Dependency graph from `depends-on:` directives, rejected on any cycle
// 3. Ordering by descending priority number, so the highest-precedence
//    rule (smallest number) is concatenated last
// 4. Setting extraction (`key: value` lines) and conflict tracking
// 5. Content assembly with per-rule headers and a conflict resolution section
//
// A single input rule bypasses steps 2-5: its content is passed through
// verbatim, only identity, description and timestamps are rewritten.
//
// The composer holds no state between calls and can be shared freely.

use chrono::Utc;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

use crate::rule::{Rule, RuleId};

/// Prefix of every composed rule id
pub const COMPOSED_ID_PREFIX: &str = "composed-rule-";

/// Rule type used when the inputs disagree on their type
pub const COMPOSITE_TYPE: &str = "composite";

const DEPENDS_ON_DIRECTIVE: &str = "depends-on:";
const DEPENDS_ON_KEY: &str = "depends-on";

/// Composition errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ComposeError {
    #[error("No rules provided for composition")]
    EmptyInput,

    #[error("Invalid rule {rule_id}: missing required field '{missing}'")]
    InvalidRule { rule_id: String, missing: &'static str },

    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

// ============================================================================
// Dependency Graph
// ============================================================================

/// Adjacency list of `depends-on:` edges among a set of rules.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Node ids in insertion order (drives traversal order)
    nodes: Vec<String>,
    /// rule id -> ids it depends on
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph by scanning each rule's content once.
    pub fn from_rules(rules: &[Rule]) -> Self {
        let mut graph = DependencyGraph::default();
        for rule in rules {
            let from = rule.id.as_str().to_string();
            if !graph.edges.contains_key(&from) {
                graph.nodes.push(from.clone());
            }
            let targets = graph.edges.entry(from).or_default();
            targets.extend(parse_dependencies(&rule.content));
        }
        graph
    }

    /// Ids the given rule depends on.
    pub fn dependencies(&self, rule_id: &str) -> &[String] {
        self.edges.get(rule_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Returns the first cycle found, as a path whose last id repeats the
    /// id that closed the loop.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        // white = unseen, gray = in_progress, black = explored
        let mut explored: HashSet<&str> = HashSet::new();
        let mut in_progress: HashSet<&str> = HashSet::new();
        // Explicit DFS stack of (node, index of the next dependency to visit)
        let mut stack: Vec<(&str, usize)> = Vec::new();

        for root in &self.nodes {
            if explored.contains(root.as_str()) {
                continue;
            }
            in_progress.insert(root.as_str());
            stack.push((root.as_str(), 0));

            while let Some(&(node, next)) = stack.last() {
                let deps = self.dependencies(node);
                let Some(dep) = deps.get(next).map(String::as_str) else {
                    stack.pop();
                    in_progress.remove(node);
                    explored.insert(node);
                    continue;
                };
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }

                if in_progress.contains(dep) {
                    let start = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[start..].iter().map(|(n, _)| n.to_string()).collect();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                if !explored.contains(dep) {
                    in_progress.insert(dep);
                    stack.push((dep, 0));
                }
            }
        }
        None
    }
}

/// Extract `depends-on:` targets from rule content. Empty values are skipped.
fn parse_dependencies(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let start = line.find(DEPENDS_ON_DIRECTIVE)?;
            let target = line[start + DEPENDS_ON_DIRECTIVE.len()..].trim();
            if target.is_empty() {
                None
            } else {
                Some(target.to_string())
            }
        })
        .collect()
}

/// Extract `key: value` settings. A line qualifies only when it holds a
/// single colon with non-empty text on both sides.
fn parse_settings(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            if value.contains(':') {
                return None;
            }
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() || key == DEPENDS_ON_KEY {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

// ============================================================================
// Conflicts
// ============================================================================

/// A setting key defined with more than one distinct value
#[derive(Debug, Clone, PartialEq)]
pub struct SettingConflict {
    /// Setting key
    pub key: String,
    /// Contributed values in composition order
    pub values: Vec<(RuleId, String)>,
    /// Winning value (from the highest-precedence contributor)
    pub resolved: String,
}

/// Tracks setting values per key in first-seen key order.
#[derive(Debug, Default)]
struct SettingTracker {
    order: Vec<String>,
    values: HashMap<String, Vec<(RuleId, String)>>,
}

impl SettingTracker {
    fn record(&mut self, rule_id: &RuleId, key: String, value: String) {
        let entry = self.values.entry(key.clone()).or_insert_with(|| {
            self.order.push(key);
            Vec::new()
        });
        entry.push((rule_id.clone(), value));
    }

    fn conflicts(mut self) -> Vec<SettingConflict> {
        let mut conflicts = Vec::new();
        for key in self.order {
            let Some(values) = self.values.remove(&key) else {
                continue;
            };
            let distinct: HashSet<&str> = values.iter().map(|(_, v)| v.as_str()).collect();
            if distinct.len() < 2 {
                continue;
            }
            let resolved = values.last().map(|(_, v)| v.clone()).unwrap_or_default();
            conflicts.push(SettingConflict { key, values, resolved });
        }
        conflicts
    }
}

// ============================================================================
// Composer
// ============================================================================

/// Result of a composition with its provenance
#[derive(Debug, Clone)]
pub struct CompositionReport {
    /// The synthetic composed rule
    pub rule: Rule,
    /// Contributor ids in concatenation order
    pub order: Vec<RuleId>,
    /// Setting conflicts and their resolutions
    pub conflicts: Vec<SettingConflict>,
}

/// Stateless rule composer
#[derive(Debug, Clone, Default)]
pub struct RuleComposer;

impl RuleComposer {
    pub fn new() -> Self {
        RuleComposer
    }

    /// Compose rules into one new rule.
    pub fn compose(&self, rules: &[Rule]) -> Result<Rule, ComposeError> {
        self.compose_with_report(rules).map(|report| report.rule)
    }

    /// Compose rules and return the ordering and conflicts alongside.
    pub fn compose_with_report(&self, rules: &[Rule]) -> Result<CompositionReport, ComposeError> {
        if rules.is_empty() {
            return Err(ComposeError::EmptyInput);
        }

        for rule in rules {
            Self::validate_structure(rule)?;
        }

        if let [single] = rules {
            return Ok(CompositionReport {
                rule: Self::passthrough(single),
                order: vec![single.id.clone()],
                conflicts: Vec::new(),
            });
        }

        let graph = DependencyGraph::from_rules(rules);
        if let Some(cycle) = graph.find_cycle() {
            warn!("Rejecting composition, dependency cycle: {}", cycle.join(" -> "));
            return Err(ComposeError::CircularDependency { cycle });
        }

        let sorted = Self::sort_by_precedence(rules);

        let mut tracker = SettingTracker::default();
        for rule in &sorted {
            for (key, value) in parse_settings(&rule.content) {
                tracker.record(&rule.id, key, value);
            }
        }
        let conflicts = tracker.conflicts();

        let content = Self::build_content(&sorted, &conflicts);
        let rule = Self::build_rule(&sorted, content, conflicts.len());

        debug!(
            "Composed {} rules into {} ({} edges, {} conflicts)",
            sorted.len(),
            rule.id,
            graph.edge_count(),
            conflicts.len()
        );

        Ok(CompositionReport {
            rule,
            order: sorted.iter().map(|r| r.id.clone()).collect(),
            conflicts,
        })
    }

    fn validate_structure(rule: &Rule) -> Result<(), ComposeError> {
        match rule.missing_field() {
            Some(missing) => Err(ComposeError::InvalidRule {
                rule_id: rule.id.as_str().to_string(),
                missing,
            }),
            None => Ok(()),
        }
    }

    /// Single-rule composition keeps content untouched.
    fn passthrough(rule: &Rule) -> Rule {
        let now = Utc::now();
        let mut composed = rule.clone();
        composed.id = new_composed_id();
        composed.description = "Composed from 1 rule".to_string();
        composed.created_at = now;
        composed.updated_at = now;
        composed
    }

    /// Largest priority number first, so the highest-precedence rule lands
    /// last. Stable for equal priorities.
    fn sort_by_precedence(rules: &[Rule]) -> Vec<&Rule> {
        let mut sorted: Vec<&Rule> = rules.iter().collect();
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
        sorted
    }

    fn build_content(sorted: &[&Rule], conflicts: &[SettingConflict]) -> String {
        let mut content = sorted
            .iter()
            .map(|rule| format!("# Rule: {} (Priority: {})\n{}", rule.id, rule.priority, rule.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        if !conflicts.is_empty() {
            content.push_str("\n\n# Conflict Resolution\n");
            for conflict in conflicts {
                content.push_str(&format!("\n## {}\n", conflict.key));
                for (rule_id, value) in &conflict.values {
                    content.push_str(&format!("- {}: {} (from {})\n", conflict.key, value, rule_id));
                }
                content.push_str(&format!(
                    "Resolved: {}: {} (last value, highest precedence)\n",
                    conflict.key, conflict.resolved
                ));
            }
        }
        content
    }

    fn build_rule(sorted: &[&Rule], content: String, conflict_count: usize) -> Rule {
        let count = sorted.len();

        let mut tags: Vec<String> = Vec::new();
        for rule in sorted {
            for tag in &rule.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }

        let priority = sorted.iter().map(|r| r.priority).min().unwrap_or(1);

        let first_type = sorted.first().map(|r| r.rule_type.as_str()).unwrap_or(COMPOSITE_TYPE);
        let rule_type = if sorted.iter().all(|r| r.rule_type == first_type) {
            first_type.to_string()
        } else {
            COMPOSITE_TYPE.to_string()
        };

        let now = Utc::now();
        Rule {
            id: new_composed_id(),
            name: format!("Composed Rule ({} rules)", count),
            rule_type,
            description: format!(
                "Composed from {} rules with {} conflicts resolved",
                count, conflict_count
            ),
            tags,
            priority,
            content,
            created_at: now,
            updated_at: now,
        }
    }
}

fn new_composed_id() -> RuleId {
    RuleId::new(format!("{}{}", COMPOSED_ID_PREFIX, Uuid::new_v4()))
}

/// Compose rules with a default composer.
pub fn compose(rules: &[Rule]) -> Result<Rule, ComposeError> {
    RuleComposer::new().compose(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, priority: i32, content: &str) -> Rule {
        Rule::builder()
            .id(id)
            .name(format!("Rule {}", id))
            .rule_type("style")
            .priority(priority)
            .content(content)
            .build()
    }

    #[test]
    fn test_empty_input_rejected() {
        assert_eq!(compose(&[]), Err(ComposeError::EmptyInput));
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let good = rule("a", 1, "x: 1");
        let mut bad = rule("b", 2, "y: 2");
        bad.name.clear();

        let err = compose(&[good, bad]).unwrap_err();
        assert_eq!(
            err,
            ComposeError::InvalidRule {
                rule_id: "b".to_string(),
                missing: "name"
            }
        );
    }

    #[test]
    fn test_single_rule_passthrough() {
        let mut original = rule("only", 3, "line one\nindent: 2");
        original.tags = vec!["fmt".to_string()];

        let composed = compose(&[original.clone()]).unwrap();

        assert_eq!(composed.content, original.content);
        assert!(composed.id.as_str().starts_with(COMPOSED_ID_PREFIX));
        assert_ne!(composed.id, original.id);
        assert_eq!(composed.description, "Composed from 1 rule");
        assert_eq!(composed.priority, 3);
        assert_eq!(composed.tags, original.tags);
        assert!(composed.created_at >= original.created_at);
    }

    #[test]
    fn test_single_rule_still_validated() {
        let mut only = rule("only", 1, "body");
        only.content.clear();
        assert!(matches!(compose(&[only]), Err(ComposeError::InvalidRule { .. })));
    }

    #[test]
    fn test_mutual_dependency_is_cycle() {
        let a = rule("a", 1, "depends-on: b");
        let b = rule("b", 2, "depends-on: a");

        match compose(&[a, b]) {
            Err(ComposeError::CircularDependency { cycle }) => {
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.contains(&"a".to_string()));
                assert!(cycle.contains(&"b".to_string()));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let a = rule("a", 1, "depends-on: a");
        let b = rule("b", 2, "z: 1");
        assert!(matches!(
            compose(&[a, b]),
            Err(ComposeError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_longer_cycle_detected() {
        let rules = vec![
            rule("a", 1, "depends-on: b"),
            rule("b", 2, "depends-on: c"),
            rule("c", 3, "depends-on: a"),
        ];
        let graph = DependencyGraph::from_rules(&rules);
        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_deep_dependency_chain() {
        let n = 100_000;
        let mut rules: Vec<Rule> = (0..n - 1)
            .map(|i| rule(&format!("r{}", i), 1, &format!("depends-on: r{}", i + 1)))
            .collect();
        rules.push(rule(&format!("r{}", n - 1), 1, "x: 1"));
        assert!(DependencyGraph::from_rules(&rules).find_cycle().is_none());

        rules[n - 1] = rule(&format!("r{}", n - 1), 1, "depends-on: r0");
        let cycle = DependencyGraph::from_rules(&rules).find_cycle().unwrap();
        assert_eq!(cycle.len(), n + 1);
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn test_acyclic_and_dangling_dependencies_allowed() {
        let rules = vec![
            rule("a", 1, "depends-on: b\ndepends-on: external"),
            rule("b", 2, "depends-on: c"),
            rule("c", 3, "depends-on:   \nplain text"),
        ];
        let graph = DependencyGraph::from_rules(&rules);
        assert_eq!(graph.dependencies("a"), ["b".to_string(), "external".to_string()]);
        assert!(graph.dependencies("c").is_empty());
        assert!(graph.find_cycle().is_none());
        assert!(compose(&rules).is_ok());
    }

    #[test]
    fn test_conflict_resolution_prefers_lowest_priority_number() {
        let a = rule("a", 1, "x: 1");
        let b = rule("b", 2, "x: 2");

        let report = RuleComposer::new().compose_with_report(&[a, b]).unwrap();
        let content = &report.rule.content;

        let pos_two = content.find("x: 2").unwrap();
        let pos_one = content.find("x: 1").unwrap();
        assert!(pos_one > pos_two);

        let section = content.split("# Conflict Resolution").nth(1).unwrap();
        assert!(section.contains("Resolved: x: 1"));

        assert_eq!(report.order, vec![RuleId::new("b"), RuleId::new("a")]);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].resolved, "1");
        assert!(report.rule.description.contains("1 conflicts"));
    }

    #[test]
    fn test_no_conflict_section_for_identical_values() {
        let a = rule("a", 1, "x: 1");
        let b = rule("b", 2, "x: 1");
        let composed = compose(&[a, b]).unwrap();
        assert!(!composed.content.contains("Conflict Resolution"));
        assert!(composed.description.contains("0 conflicts"));
    }

    #[test]
    fn test_content_headers_and_order() {
        let rules = vec![
            rule("high", 1, "alpha"),
            rule("low", 10, "omega"),
            rule("mid", 5, "middle"),
        ];
        let composed = compose(&rules).unwrap();

        assert_eq!(
            composed.content,
            "# Rule: low (Priority: 10)\nomega\n\n\
             # Rule: mid (Priority: 5)\nmiddle\n\n\
             # Rule: high (Priority: 1)\nalpha"
        );
        assert_eq!(composed.name, "Composed Rule (3 rules)");
    }

    #[test]
    fn test_priority_tags_and_type_of_composed_rule() {
        let mut a = rule("a", 4, "a");
        a.tags = vec!["one".into(), "two".into()];
        let mut b = rule("b", 7, "b");
        b.tags = vec!["two".into(), "three".into()];
        b.rule_type = "naming".into();

        let composed = compose(&[a, b]).unwrap();
        assert_eq!(composed.priority, 4);
        // b sorts first (priority 7)
        assert_eq!(composed.tags, vec!["two", "three", "one"]);
        assert_eq!(composed.rule_type, COMPOSITE_TYPE);
        assert!(composed.id.as_str().starts_with(COMPOSED_ID_PREFIX));
    }

    #[test]
    fn test_settings_parsing() {
        let settings = parse_settings(
            "indent: 4\nurl: http://example.com\n: empty\nkey:\ndepends-on: a\n  quotes :  double  ",
        );
        assert_eq!(
            settings,
            vec![
                ("indent".to_string(), "4".to_string()),
                ("quotes".to_string(), "double".to_string()),
            ]
        );
    }

    #[test]
    fn test_equal_priorities_keep_input_order() {
        let rules = vec![rule("first", 2, "k: a"), rule("second", 2, "k: b")];
        let report = RuleComposer::new().compose_with_report(&rules).unwrap();
        assert_eq!(report.order, vec![RuleId::new("first"), RuleId::new("second")]);
        assert_eq!(report.conflicts[0].resolved, "b");
    }
}
