//! Client-IP-keyed FUP checker.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CacheDriver;
use crate::errors::{AuthError, ErrorCode};
use crate::fup::{check_limits, FupChecker, FupScopeLimits, IP_GROUP};
use crate::request::RequestInfo;
use crate::scope::FupScope;

/// Accounts usage per client IP under the `per-ip` scope group.
#[derive(Debug, Clone, Default)]
pub struct IpFupChecker;

impl IpFupChecker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FupChecker for IpFupChecker {
    async fn check(
        &self,
        scope: Option<&FupScope>,
        request: &RequestInfo,
        key: &str,
        cache: Option<&Arc<dyn CacheDriver>>,
    ) -> FupScopeLimits {
        let (Some(scope), Some(ip)) = (scope, request.client_ip.as_deref()) else {
            // No limitations by default.
            return FupScopeLimits::unlimited();
        };
        if ip.is_empty() || !scope.has_limit(IP_GROUP) {
            return FupScopeLimits::unlimited();
        }
        let Some(cache) = cache else {
            return FupScopeLimits::from_error(AuthError::internal_error(
                ErrorCode::FupCacheDisabled,
                None,
            ));
        };
        match check_limits(scope, key, ip, IP_GROUP, cache).await {
            Ok(limits) => FupScopeLimits::accessible(limits),
            Err(outcome) => outcome,
        }
    }
}
