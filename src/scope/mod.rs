//! Hierarchical access and fair-use-policy scope trees.
//!
//! Scopes are recursive mappings from path segments to either a subtree or a
//! leaf value. Access scopes use boolean / string leaves and produce a
//! [`ScopeVerdict`]; FUP scopes use numeric leaves and produce per-period
//! limits. A key prefixed with `r#` is a regex alternative consulted only
//! after the literal lookup at the same level fails; alternatives are tried
//! in sorted key order, so evaluation is deterministic for a fixed tree.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Prefix marking a scope key as a regex alternative.
const REGEX_KEY_PREFIX: &str = "r#";

/// Default hierarchy separator for access-scope keys.
pub const DEFAULT_ACCESS_SEPARATOR: &str = "|";

/// Hierarchy separator for FUP-scope keys (period names are always the final
/// `.`-joined segment).
pub const FUP_SEPARATOR: &str = ".";

/// One node of a scope tree: either a leaf value or a nested subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeNode {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Subtree(BTreeMap<String, ScopeNode>),
}

/// Outcome of evaluating an access scope, plus the FUP-layer `Unlimited`
/// marker meaning "no applicable limit".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeVerdict {
    Accessible,
    OnBehalf,
    Forbidden,
    Unlimited,
}

impl ScopeVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeVerdict::Accessible => "true",
            ScopeVerdict::OnBehalf => "on-behalf",
            ScopeVerdict::Forbidden => "false",
            ScopeVerdict::Unlimited => "unlimited",
        }
    }
}

impl Display for ScopeVerdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Compiled regexes are memoized per pattern; an invalid pattern is cached as
// None so the warning fires once.
static REGEX_CACHE: Lazy<DashMap<String, Option<Regex>>> = Lazy::new(DashMap::new);

fn compiled(pattern: &str) -> Option<Regex> {
    if let Some(hit) = REGEX_CACHE.get(pattern) {
        return hit.clone();
    }
    let compiled = match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(pattern, error = %err, "skipping invalid regex scope key");
            None
        }
    };
    REGEX_CACHE.insert(pattern.to_string(), compiled.clone());
    compiled
}

/// Look up `segment` in `level`: literal key first, then `r#` alternatives
/// in sorted key order.
fn lookup<'a>(level: &'a BTreeMap<String, ScopeNode>, segment: &str) -> Option<&'a ScopeNode> {
    if let Some(node) = level.get(segment) {
        return Some(node);
    }
    for (key, node) in level {
        let Some(pattern) = key.strip_prefix(REGEX_KEY_PREFIX) else {
            continue;
        };
        if let Some(re) = compiled(pattern) {
            if re.is_match(segment) {
                return Some(node);
            }
        }
    }
    None
}

/// Access policy tree: leaves are `true`, `false`, or `"on-behalf"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessScope(pub BTreeMap<String, ScopeNode>);

impl AccessScope {
    /// Evaluate the accessibility of `key`, split by `separator` (the
    /// default `|` when empty).
    ///
    /// A leaf is only meaningful at the final segment: `true`/`"true"` is
    /// Accessible, `"on-behalf"` is OnBehalf, everything else, including a
    /// leaf reached before the final segment, a path deeper than the tree,
    /// or a final segment resting on a subtree, is Forbidden.
    pub fn accessibility(&self, key: &str, separator: &str) -> ScopeVerdict {
        let separator = if separator.is_empty() { DEFAULT_ACCESS_SEPARATOR } else { separator };
        let segments: Vec<&str> = key.split(separator).collect();
        let mut level = &self.0;
        for (index, segment) in segments.iter().enumerate() {
            let last = index == segments.len() - 1;
            match lookup(level, segment) {
                Some(ScopeNode::Subtree(subtree)) => {
                    if last {
                        return ScopeVerdict::Forbidden;
                    }
                    level = subtree;
                }
                Some(ScopeNode::Bool(value)) => {
                    if last && *value {
                        return ScopeVerdict::Accessible;
                    }
                    return ScopeVerdict::Forbidden;
                }
                Some(ScopeNode::Text(value)) => {
                    if last {
                        if value == ScopeVerdict::Accessible.as_str() {
                            return ScopeVerdict::Accessible;
                        }
                        if value == ScopeVerdict::OnBehalf.as_str() {
                            return ScopeVerdict::OnBehalf;
                        }
                    }
                    return ScopeVerdict::Forbidden;
                }
                _ => return ScopeVerdict::Forbidden,
            }
        }
        ScopeVerdict::Forbidden
    }
}

/// Fair-use-policy tree: limits per period nested under a path, e.g.
/// `{"/status": {"hourly": 10}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FupScope(pub BTreeMap<String, ScopeNode>);

impl FupScope {
    /// Resolve the numeric limit at `key` (segments joined by `.`).
    /// Float leaves are truncated; non-numeric leaves and partial paths
    /// yield no limit.
    pub fn limit(&self, key: &str) -> Option<i64> {
        let segments: Vec<&str> = key.split(FUP_SEPARATOR).collect();
        let mut level = &self.0;
        for (index, segment) in segments.iter().enumerate() {
            let last = index == segments.len() - 1;
            match lookup(level, segment) {
                Some(ScopeNode::Subtree(subtree)) => {
                    if last {
                        return None;
                    }
                    level = subtree;
                }
                Some(ScopeNode::Int(value)) => {
                    return last.then_some(*value);
                }
                Some(ScopeNode::Float(value)) => {
                    return last.then_some(*value as i64);
                }
                _ => return None,
            }
        }
        None
    }

    /// True when the subtree rooted at `key` exists, irrespective of the
    /// period leaves beneath it.
    pub fn has_limit(&self, key: &str) -> bool {
        let segments: Vec<&str> = key.split(FUP_SEPARATOR).collect();
        let mut level = &self.0;
        for (index, segment) in segments.iter().enumerate() {
            let last = index == segments.len() - 1;
            match lookup(level, segment) {
                Some(ScopeNode::Subtree(subtree)) => {
                    if last {
                        return true;
                    }
                    level = subtree;
                }
                _ => return false,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn access(value: serde_json::Value) -> AccessScope {
        serde_json::from_value(value).unwrap()
    }

    fn fup(value: serde_json::Value) -> FupScope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn empty_scope_is_forbidden() {
        let scope = AccessScope::default();
        assert_eq!(scope.accessibility("/ping", "|"), ScopeVerdict::Forbidden);
    }

    #[test]
    fn boolean_leaves() {
        let scope = access(json!({"/ping": true, "/admin": false}));
        assert_eq!(scope.accessibility("/ping", "|"), ScopeVerdict::Accessible);
        assert_eq!(scope.accessibility("/admin", "|"), ScopeVerdict::Forbidden);
        assert_eq!(scope.accessibility("/missing", "|"), ScopeVerdict::Forbidden);
    }

    #[test]
    fn string_leaves() {
        let scope = access(json!({"/a": "true", "/b": "on-behalf", "/c": "nonsense"}));
        assert_eq!(scope.accessibility("/a", "|"), ScopeVerdict::Accessible);
        assert_eq!(scope.accessibility("/b", "|"), ScopeVerdict::OnBehalf);
        assert_eq!(scope.accessibility("/c", "|"), ScopeVerdict::Forbidden);
    }

    #[test]
    fn hierarchical_traversal() {
        let scope = access(json!({"articles": {"list": true, "detail": "on-behalf"}}));
        assert_eq!(scope.accessibility("articles|list", "|"), ScopeVerdict::Accessible);
        assert_eq!(scope.accessibility("articles|detail", "|"), ScopeVerdict::OnBehalf);
        // Final segment resting on a subtree is not a leaf.
        assert_eq!(scope.accessibility("articles", "|"), ScopeVerdict::Forbidden);
        // Path deeper than the tree.
        assert_eq!(scope.accessibility("articles|list|extra", "|"), ScopeVerdict::Forbidden);
    }

    #[test]
    fn empty_separator_falls_back_to_default() {
        let scope = access(json!({"articles": {"list": true}}));
        assert_eq!(scope.accessibility("articles|list", ""), ScopeVerdict::Accessible);
    }

    #[test]
    fn regex_keys_match_when_no_literal_does() {
        let scope = access(json!({"r#^/items/\\d+$": true}));
        assert_eq!(scope.accessibility("/items/42", "|"), ScopeVerdict::Accessible);
        assert_eq!(scope.accessibility("/items/abc", "|"), ScopeVerdict::Forbidden);
    }

    #[test]
    fn literal_wins_over_regex() {
        let scope = access(json!({"/items": false, "r#^/items$": true}));
        assert_eq!(scope.accessibility("/items", "|"), ScopeVerdict::Forbidden);
    }

    #[test]
    fn invalid_regex_keys_are_skipped() {
        let scope = access(json!({"r#([unclosed": true, "r#^/ok$": "on-behalf"}));
        assert_eq!(scope.accessibility("/ok", "|"), ScopeVerdict::OnBehalf);
        assert_eq!(scope.accessibility("([unclosed", "|"), ScopeVerdict::Forbidden);
    }

    #[test]
    fn regex_subtrees_descend() {
        let scope = access(json!({"r#^v\\d+$": {"status": true}}));
        assert_eq!(scope.accessibility("v2|status", "|"), ScopeVerdict::Accessible);
        assert_eq!(scope.accessibility("v2|other", "|"), ScopeVerdict::Forbidden);
    }

    #[test]
    fn fup_limits() {
        let scope = fup(json!({"/status": {"hourly": 10, "daily": 100.9}}));
        assert_eq!(scope.limit("/status.hourly"), Some(10));
        // Float leaves truncate.
        assert_eq!(scope.limit("/status.daily"), Some(100));
        assert_eq!(scope.limit("/status.weekly"), None);
        assert_eq!(scope.limit("/missing.hourly"), None);
        // A subtree is not a limit.
        assert_eq!(scope.limit("/status"), None);
    }

    #[test]
    fn fup_has_limit_requires_subtree() {
        let scope = fup(json!({"/status": {"hourly": 10}, "*": {"minutely": 5}}));
        assert!(scope.has_limit("/status"));
        assert!(scope.has_limit("*"));
        // A leaf is not a subtree.
        assert!(!scope.has_limit("/status.hourly"));
        assert!(!scope.has_limit("/missing"));
    }

    #[test]
    fn scope_round_trips_through_json() {
        let value = json!({"articles": {"list": true, "r#^\\d+$": "on-behalf"}});
        let scope = access(value.clone());
        assert_eq!(serde_json::to_value(&scope).unwrap(), value);
    }
}
