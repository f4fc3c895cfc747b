//! Path-keyed FUP checker.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CacheDriver;
use crate::fup::{check, FupChecker, FupScopeLimits};
use crate::request::RequestInfo;
use crate::scope::FupScope;

/// Accounts usage per lowercased URL path (plus the `*` wildcard group).
#[derive(Debug, Clone, Default)]
pub struct PathFupChecker;

impl PathFupChecker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FupChecker for PathFupChecker {
    async fn check(
        &self,
        scope: Option<&FupScope>,
        request: &RequestInfo,
        key: &str,
        cache: Option<&Arc<dyn CacheDriver>>,
    ) -> FupScopeLimits {
        let Some(scope) = scope else {
            // No limitations by default.
            return FupScopeLimits::unlimited();
        };
        let path = request.path.to_lowercase();
        check(&path, scope, key, cache).await
    }
}
