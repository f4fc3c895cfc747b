//! Cookie-keyed FUP checker.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CacheDriver;
use crate::errors::{AuthError, ErrorCode};
use crate::fup::{check_limits, FupChecker, FupScopeLimits, COOKIE_GROUP};
use crate::request::RequestInfo;
use crate::scope::FupScope;

/// Default cookie consulted when none is configured.
pub const DEFAULT_FUP_COOKIE: &str = "api-warden-fup";

/// Accounts usage per value of a configured cookie under the `per-cookie`
/// scope group. Anonymous requests (no cookie) are not limited.
#[derive(Debug, Clone)]
pub struct CookieFupChecker {
    cookie_name: String,
}

impl CookieFupChecker {
    pub fn new() -> Self {
        Self { cookie_name: DEFAULT_FUP_COOKIE.to_string() }
    }

    pub fn with_cookie_name(cookie_name: impl Into<String>) -> Self {
        Self { cookie_name: cookie_name.into() }
    }
}

impl Default for CookieFupChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FupChecker for CookieFupChecker {
    async fn check(
        &self,
        scope: Option<&FupScope>,
        request: &RequestInfo,
        key: &str,
        cache: Option<&Arc<dyn CacheDriver>>,
    ) -> FupScopeLimits {
        let cookie = request.cookie(&self.cookie_name);
        if let Some("") = cookie {
            // A present-but-empty cookie cannot discriminate callers.
            return FupScopeLimits::from_error(AuthError::internal_error(
                ErrorCode::InvalidFupCookie,
                None,
            ));
        }
        let (Some(scope), Some(cookie)) = (scope, cookie) else {
            // No limitations by default.
            return FupScopeLimits::unlimited();
        };
        if !scope.has_limit(COOKIE_GROUP) {
            return FupScopeLimits::unlimited();
        }
        let Some(cache) = cache else {
            return FupScopeLimits::from_error(AuthError::internal_error(
                ErrorCode::FupCacheDisabled,
                None,
            ));
        };
        match check_limits(scope, key, cookie, COOKIE_GROUP, cache).await {
            Ok(limits) => FupScopeLimits::accessible(limits),
            Err(outcome) => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheDriver;
    use crate::scope::ScopeVerdict;
    use serde_json::json;

    fn scope() -> FupScope {
        serde_json::from_value(json!({"per-cookie": {"minutely": 1}})).unwrap()
    }

    fn cache() -> Arc<dyn CacheDriver> {
        let mut driver = InMemoryCacheDriver::new();
        CacheDriver::init(&mut driver, "t:", std::time::Duration::from_secs(60));
        Arc::new(driver)
    }

    fn request_with_cookie(name: &str, value: &str) -> RequestInfo {
        let mut request = RequestInfo::new("GET", "/x");
        request.cookies.insert(name.to_string(), value.to_string());
        request
    }

    #[tokio::test]
    async fn cookieless_requests_are_not_limited() {
        let checker = CookieFupChecker::new();
        let outcome =
            checker.check(Some(&scope()), &RequestInfo::new("GET", "/x"), "key", None).await;
        assert_eq!(outcome.accessibility, ScopeVerdict::Unlimited);
    }

    #[tokio::test]
    async fn cookie_values_discriminate_budgets() {
        let checker = CookieFupChecker::new();
        let cache = cache();
        let scope = scope();

        let request = request_with_cookie(DEFAULT_FUP_COOKIE, "session-a");
        let first = checker.check(Some(&scope), &request, "key", Some(&cache)).await;
        assert_eq!(first.accessibility, ScopeVerdict::Accessible);
        let second = checker.check(Some(&scope), &request, "key", Some(&cache)).await;
        assert_eq!(second.accessibility, ScopeVerdict::Forbidden);

        let other = request_with_cookie(DEFAULT_FUP_COOKIE, "session-b");
        let outcome = checker.check(Some(&scope), &other, "key", Some(&cache)).await;
        assert_eq!(outcome.accessibility, ScopeVerdict::Accessible);
    }

    #[tokio::test]
    async fn configured_cookie_name_is_honored() {
        let checker = CookieFupChecker::with_cookie_name("visitor");
        let request = request_with_cookie("visitor", "v-1");
        let outcome = checker.check(Some(&scope()), &request, "key", Some(&cache())).await;
        assert_eq!(outcome.accessibility, ScopeVerdict::Accessible);
    }

    #[tokio::test]
    async fn empty_cookie_values_are_invalid() {
        let checker = CookieFupChecker::new();
        let request = request_with_cookie(DEFAULT_FUP_COOKIE, "");
        let outcome = checker.check(Some(&scope()), &request, "key", Some(&cache())).await;
        assert_eq!(outcome.error.unwrap().code, ErrorCode::InvalidFupCookie);
    }
}
