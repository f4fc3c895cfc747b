//! Fair-use-policy engine.
//!
//! Usage is accounted per principal and per discriminator (path, IP, cookie)
//! in period-bucketed counters persisted through the cache driver. Limits
//! come from the principal's [`FupScope`]; the tightest binding constraint
//! across limit sources wins. A missing or negative limit means "no limit
//! for that period".

mod chain;
mod cookie;
mod ip;
mod path;
mod path_method;
mod period;

pub use chain::ChainFupChecker;
pub use cookie::CookieFupChecker;
pub use ip::IpFupChecker;
pub use path::PathFupChecker;
pub use path_method::PathAndMethodFupChecker;
pub use period::{Period, PERIODS};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheDriver;
use crate::errors::{AuthError, ErrorCode};
use crate::request::RequestInfo;
use crate::scope::{FupScope, ScopeVerdict};

/// Wildcard group applying a per-principal total across all paths.
pub const WILDCARD_GROUP: &str = "*";

/// Group key for IP-based limits.
pub const IP_GROUP: &str = "per-ip";

/// Group key for cookie-based limits.
pub const COOKIE_GROUP: &str = "per-cookie";

/// Persisted usage counters for one (principal, discriminator) pair.
///
/// `used[p]` counts the requests whose bucket for period `p` equals the
/// bucket of `updated_at`; stale periods are lazily reset on increment, so
/// entries never expire through the cache driver itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FupCacheEntry {
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    pub used: BTreeMap<Period, i64>,
}

impl Default for FupCacheEntry {
    fn default() -> Self {
        Self { updated_at: DateTime::<Utc>::UNIX_EPOCH, used: BTreeMap::new() }
    }
}

impl FupCacheEntry {
    pub fn get_used(&self, period: Period) -> i64 {
        self.used.get(&period).copied().unwrap_or(0)
    }

    /// Count the current request against every period: counters in the same
    /// bucket as `updated_at` advance, rolled-over buckets reset to 1.
    pub fn increment(&mut self, now: DateTime<Utc>) {
        for period in PERIODS {
            let same_bucket = period.bucket_key(self.updated_at) == period.bucket_key(now);
            let counter = self.used.entry(period).or_insert(0);
            if same_bucket {
                *counter += 1;
            } else {
                *counter = 1;
            }
        }
        self.updated_at = now;
    }
}

/// The `{limit, used}` pair applied to one period of the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FupLimits {
    pub limit: i64,
    pub used: i64,
}

impl FupLimits {
    fn remaining(&self) -> i64 {
        self.limit - self.used
    }
}

/// Outcome of a FUP check: a verdict, the per-period limits that applied,
/// and an optional carried-over error.
#[derive(Debug, Clone)]
pub struct FupScopeLimits {
    pub accessibility: ScopeVerdict,
    pub limits: BTreeMap<Period, FupLimits>,
    pub error: Option<AuthError>,
}

impl FupScopeLimits {
    pub fn unlimited() -> Self {
        Self { accessibility: ScopeVerdict::Unlimited, limits: BTreeMap::new(), error: None }
    }

    pub fn accessible(limits: BTreeMap<Period, FupLimits>) -> Self {
        Self { accessibility: ScopeVerdict::Accessible, limits, error: None }
    }

    pub fn forbidden(period: Period, limits: FupLimits) -> Self {
        Self {
            accessibility: ScopeVerdict::Forbidden,
            limits: BTreeMap::from([(period, limits)]),
            error: None,
        }
    }

    pub fn from_error(error: AuthError) -> Self {
        Self { accessibility: ScopeVerdict::Forbidden, limits: BTreeMap::new(), error: Some(error) }
    }

    /// JSON rendering for the `X-Client-FUP-Limits` / `X-User-FUP-Limits`
    /// headers; `None` when no limit applied.
    pub fn limits_header(&self) -> Option<String> {
        if self.limits.is_empty() {
            return None;
        }
        serde_json::to_string(&self.limits).ok()
    }
}

/// Seconds until the exceeded period resets, or -1 when the verdict is not a
/// single-period depletion.
pub fn retry_after(limits: &FupScopeLimits) -> i64 {
    if limits.accessibility != ScopeVerdict::Forbidden || limits.limits.len() != 1 {
        return -1;
    }
    let now = Utc::now();
    limits
        .limits
        .keys()
        .next()
        .map(|period| (period.reset_time(now) - now).num_seconds())
        .unwrap_or(-1)
}

/// Composable FUP limit source. Implementations derive a discriminator from
/// the request and account usage against the principal's scope.
#[async_trait]
pub trait FupChecker: Send + Sync {
    async fn check(
        &self,
        scope: Option<&FupScope>,
        request: &RequestInfo,
        key: &str,
        cache: Option<&Arc<dyn CacheDriver>>,
    ) -> FupScopeLimits;
}

fn fup_cache_disabled() -> FupScopeLimits {
    FupScopeLimits::from_error(AuthError::internal_error(ErrorCode::FupCacheDisabled, None))
}

/// Fetch-increment-persist, then compare each period's counter against the
/// limits found under `group_key`. The first exceeded period wins.
pub(crate) async fn check_limits(
    scope: &FupScope,
    key: &str,
    discriminator: &str,
    group_key: &str,
    cache: &Arc<dyn CacheDriver>,
) -> Result<BTreeMap<Period, FupLimits>, FupScopeLimits> {
    let cache_key = format!("fup_{}_{}", key, discriminator.replace('/', "-"));
    let mut entry = match cache.get_fup_entry(&cache_key).await {
        Ok(entry) => entry,
        Err(err) => return Err(FupScopeLimits::from_error(err)),
    };
    entry.increment(Utc::now());
    if let Err(err) = cache.set_fup_entry(&cache_key, &entry).await {
        return Err(FupScopeLimits::from_error(err));
    }

    let mut limits = BTreeMap::new();
    for period in PERIODS {
        let limit = match scope.limit(&format!("{}.{}", group_key, period.as_str())) {
            // No limitations by default; negative limits are an explicit opt-out.
            None => continue,
            Some(limit) if limit < 0 => continue,
            Some(limit) => limit,
        };
        let used = entry.get_used(period);
        if limit < used {
            return Err(FupScopeLimits::forbidden(period, FupLimits { limit, used }));
        }
        limits.insert(period, FupLimits { limit, used });
    }
    Ok(limits)
}

/// Merge two limit sets, keeping per period the pair with the smallest
/// remaining budget.
pub(crate) fn merge_limits(
    mut limits: BTreeMap<Period, FupLimits>,
    other: BTreeMap<Period, FupLimits>,
) -> BTreeMap<Period, FupLimits> {
    for (period, candidate) in other {
        match limits.get(&period) {
            Some(existing) if candidate.remaining() >= existing.remaining() => {}
            _ => {
                limits.insert(period, candidate);
            }
        }
    }
    limits
}

/// Check the per-principal wildcard group and the path group, merging the
/// results. Returns `Unlimited` when the scope constrains neither.
pub(crate) async fn check(
    path: &str,
    scope: &FupScope,
    key: &str,
    cache: Option<&Arc<dyn CacheDriver>>,
) -> FupScopeLimits {
    let has_root_limit = scope.has_limit(WILDCARD_GROUP);
    let has_path_limit = scope.has_limit(path);
    if !has_root_limit && !has_path_limit {
        // No limitations by default.
        return FupScopeLimits::unlimited();
    }

    let Some(cache) = cache else {
        return fup_cache_disabled();
    };

    let mut limits = BTreeMap::new();
    if has_root_limit {
        match check_limits(scope, key, WILDCARD_GROUP, WILDCARD_GROUP, cache).await {
            Ok(root_limits) => limits = root_limits,
            Err(outcome) => return outcome,
        }
    }
    if has_path_limit {
        match check_limits(scope, key, path, path, cache).await {
            Ok(path_limits) => limits = merge_limits(limits, path_limits),
            Err(outcome) => return outcome,
        }
    }

    FupScopeLimits::accessible(limits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn fresh_entry_counts_zero() {
        let entry = FupCacheEntry::default();
        for period in PERIODS {
            assert_eq!(entry.get_used(period), 0);
        }
    }

    #[test]
    fn increment_advances_within_bucket() {
        let mut entry = FupCacheEntry::default();
        entry.increment(at("2024-03-15T14:45:10Z"));
        entry.increment(at("2024-03-15T14:45:40Z"));
        assert_eq!(entry.get_used(Period::Minutely), 2);
        assert_eq!(entry.get_used(Period::Monthly), 2);
    }

    #[test]
    fn increment_resets_rolled_over_buckets() {
        let mut entry = FupCacheEntry::default();
        entry.increment(at("2024-03-15T14:45:59Z"));
        // Next minute: minutely resets, the coarser periods keep counting.
        entry.increment(at("2024-03-15T14:46:00Z"));
        assert_eq!(entry.get_used(Period::Minutely), 1);
        assert_eq!(entry.get_used(Period::Hourly), 2);
        assert_eq!(entry.get_used(Period::Daily), 2);
    }

    #[test]
    fn entry_round_trips_through_json() {
        let mut entry = FupCacheEntry::default();
        entry.increment(at("2024-03-15T14:45:10Z"));
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: FupCacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
        assert!(json.contains("\"updatedAt\""));
        assert!(json.contains("\"minutely\":1"));
    }

    #[test]
    fn merge_keeps_smallest_remaining() {
        let a = BTreeMap::from([
            (Period::Hourly, FupLimits { limit: 2, used: 0 }),
            (Period::Daily, FupLimits { limit: 20, used: 18 }),
        ]);
        let b = BTreeMap::from([
            (Period::Hourly, FupLimits { limit: 3, used: 2 }),
            (Period::Daily, FupLimits { limit: 30, used: 25 }),
            (Period::Weekly, FupLimits { limit: 100, used: 1 }),
        ]);
        let merged = merge_limits(a, b);
        assert_eq!(merged[&Period::Hourly], FupLimits { limit: 3, used: 2 });
        assert_eq!(merged[&Period::Daily], FupLimits { limit: 20, used: 18 });
        assert_eq!(merged[&Period::Weekly], FupLimits { limit: 100, used: 1 });
    }

    #[test]
    fn merge_from_empty_takes_everything() {
        let b = BTreeMap::from([(Period::Hourly, FupLimits { limit: 3, used: 2 })]);
        let merged = merge_limits(BTreeMap::new(), b.clone());
        assert_eq!(merged, b);
    }

    #[test]
    fn retry_after_requires_single_period_depletion() {
        let depleted = FupScopeLimits::forbidden(Period::Hourly, FupLimits { limit: 2, used: 3 });
        let seconds = retry_after(&depleted);
        assert!((0..=3600).contains(&seconds), "got {seconds}");
        assert_eq!(retry_after(&FupScopeLimits::unlimited()), -1);
        assert_eq!(retry_after(&FupScopeLimits::accessible(BTreeMap::new())), -1);
    }

    #[test]
    fn limits_header_renders_period_map() {
        let limits = FupScopeLimits::accessible(BTreeMap::from([(
            Period::Hourly,
            FupLimits { limit: 2, used: 1 },
        )]));
        assert_eq!(limits.limits_header().unwrap(), r#"{"hourly":{"limit":2,"used":1}}"#);
        assert!(FupScopeLimits::unlimited().limits_header().is_none());
    }
}
