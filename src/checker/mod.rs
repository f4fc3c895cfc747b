//! Access-scope checkers.
//!
//! A checker derives the scope key from the request and evaluates it against
//! the principal's [`AccessScope`]. Both built-in checkers default to the
//! `|` hierarchy separator; override it when scope trees are keyed
//! differently.

use crate::request::RequestInfo;
use crate::scope::{AccessScope, ScopeVerdict, DEFAULT_ACCESS_SEPARATOR};

/// Scope evaluation seam consulted by the authenticator for both the client
/// and (on-behalf) user scopes.
pub trait AccessScopeChecker: Send + Sync {
    fn check(&self, scope: Option<&AccessScope>, request: &RequestInfo) -> ScopeVerdict;
}

/// Evaluates the lowercased URL path against the scope.
#[derive(Debug, Clone)]
pub struct PathChecker {
    separator: String,
}

impl PathChecker {
    pub fn new() -> Self {
        Self { separator: DEFAULT_ACCESS_SEPARATOR.to_string() }
    }

    pub fn with_separator(separator: impl Into<String>) -> Self {
        Self { separator: separator.into() }
    }
}

impl Default for PathChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessScopeChecker for PathChecker {
    fn check(&self, scope: Option<&AccessScope>, request: &RequestInfo) -> ScopeVerdict {
        let Some(scope) = scope else {
            return ScopeVerdict::Forbidden;
        };
        scope.accessibility(&request.path.to_lowercase(), &self.separator)
    }
}

/// Evaluates `{method}:{path}` (lowercased) against the scope, so scopes can
/// grant e.g. `get:/articles` while denying `post:/articles`.
#[derive(Debug, Clone)]
pub struct PathAndMethodChecker {
    separator: String,
}

impl PathAndMethodChecker {
    pub fn new() -> Self {
        Self { separator: DEFAULT_ACCESS_SEPARATOR.to_string() }
    }

    pub fn with_separator(separator: impl Into<String>) -> Self {
        Self { separator: separator.into() }
    }
}

impl Default for PathAndMethodChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessScopeChecker for PathAndMethodChecker {
    fn check(&self, scope: Option<&AccessScope>, request: &RequestInfo) -> ScopeVerdict {
        let Some(scope) = scope else {
            return ScopeVerdict::Forbidden;
        };
        let key =
            format!("{}:{}", request.method.to_lowercase(), request.path.to_lowercase());
        scope.accessibility(&key, &self.separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope(value: serde_json::Value) -> AccessScope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn path_checker_matches_lowercased_path() {
        let checker = PathChecker::new();
        let scope = scope(json!({"/ping": true}));
        assert_eq!(
            checker.check(Some(&scope), &RequestInfo::new("GET", "/PING")),
            ScopeVerdict::Accessible
        );
        assert_eq!(
            checker.check(Some(&scope), &RequestInfo::new("GET", "/admin")),
            ScopeVerdict::Forbidden
        );
    }

    #[test]
    fn missing_scope_is_forbidden() {
        let checker = PathChecker::new();
        assert_eq!(checker.check(None, &RequestInfo::new("GET", "/ping")), ScopeVerdict::Forbidden);
    }

    #[test]
    fn path_and_method_checker_distinguishes_methods() {
        let checker = PathAndMethodChecker::new();
        let scope = scope(json!({"get:/articles": true, "post:/articles": "on-behalf"}));
        assert_eq!(
            checker.check(Some(&scope), &RequestInfo::new("GET", "/articles")),
            ScopeVerdict::Accessible
        );
        assert_eq!(
            checker.check(Some(&scope), &RequestInfo::new("POST", "/articles")),
            ScopeVerdict::OnBehalf
        );
        assert_eq!(
            checker.check(Some(&scope), &RequestInfo::new("DELETE", "/articles")),
            ScopeVerdict::Forbidden
        );
    }

    #[test]
    fn custom_separator_walks_hierarchy() {
        let checker = PathChecker::with_separator("/");
        let scope = scope(json!({"": {"articles": {"list": true}}}));
        assert_eq!(
            checker.check(Some(&scope), &RequestInfo::new("GET", "/articles/list")),
            ScopeVerdict::Accessible
        );
    }
}
