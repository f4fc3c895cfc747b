//! Chained FUP checkers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CacheDriver;
use crate::fup::{merge_limits, FupChecker, FupScopeLimits};
use crate::request::RequestInfo;
use crate::scope::{FupScope, ScopeVerdict};

/// Runs several checkers in order. Forbidden verdicts and carried errors
/// short-circuit; Accessible results merge per period (tightest remaining
/// budget wins); Unlimited is the unit.
pub struct ChainFupChecker {
    checkers: Vec<Arc<dyn FupChecker>>,
}

impl ChainFupChecker {
    pub fn new(checkers: Vec<Arc<dyn FupChecker>>) -> Self {
        Self { checkers }
    }
}

#[async_trait]
impl FupChecker for ChainFupChecker {
    async fn check(
        &self,
        scope: Option<&FupScope>,
        request: &RequestInfo,
        key: &str,
        cache: Option<&Arc<dyn CacheDriver>>,
    ) -> FupScopeLimits {
        let mut merged = FupScopeLimits::unlimited();
        for checker in &self.checkers {
            let outcome = checker.check(scope, request, key, cache).await;
            if outcome.error.is_some() || outcome.accessibility == ScopeVerdict::Forbidden {
                return outcome;
            }
            if !outcome.limits.is_empty() || outcome.accessibility == ScopeVerdict::Accessible {
                merged.limits = merge_limits(
                    std::mem::take(&mut merged.limits),
                    outcome.limits,
                );
                merged.accessibility = outcome.accessibility;
            }
        }
        merged
    }
}
