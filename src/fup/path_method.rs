//! Method-and-path-keyed FUP checker.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CacheDriver;
use crate::fup::{check, FupChecker, FupScopeLimits};
use crate::request::RequestInfo;
use crate::scope::FupScope;

/// Accounts usage per `{method}:{path}` (lowercased), so e.g. writes can be
/// limited more tightly than reads on the same path.
#[derive(Debug, Clone, Default)]
pub struct PathAndMethodFupChecker;

impl PathAndMethodFupChecker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FupChecker for PathAndMethodFupChecker {
    async fn check(
        &self,
        scope: Option<&FupScope>,
        request: &RequestInfo,
        key: &str,
        cache: Option<&Arc<dyn CacheDriver>>,
    ) -> FupScopeLimits {
        let Some(scope) = scope else {
            return FupScopeLimits::unlimited();
        };
        let combined =
            format!("{}:{}", request.method.to_lowercase(), request.path.to_lowercase());
        check(&combined, scope, key, cache).await
    }
}
