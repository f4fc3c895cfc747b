//! Cache drivers fronting the principal providers and FUP counters.
//!
//! Keys are namespaced as `{configPrefix}{group}_{id}` with the `auth` and
//! `fup` groups, so identity caches and usage counters cannot collide.
//! One-off tokens interpose a `-one_off-` marker between the group prefix
//! and the token value.

mod memory;
mod redis;

pub use memory::InMemoryCacheDriver;
pub use redis::RedisCacheDriver;

use std::time::Duration;

use async_trait::async_trait;

use crate::entity::{ApiClient, ApiUser, OneOffToken};
use crate::errors::Result;
use crate::fup::FupCacheEntry;

/// Key namespace groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheGroup {
    Auth,
    Fup,
}

impl CacheGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheGroup::Auth => "auth",
            CacheGroup::Fup => "fup",
        }
    }
}

/// Join the configured prefix with a group prefix, underscore-terminating
/// the group unless it is empty or already ends with `_`.
pub fn get_prefix(prefix: &str, group: &str) -> String {
    if group.is_empty() || group.ends_with('_') {
        return format!("{prefix}{group}");
    }
    format!("{prefix}{group}_")
}

pub(crate) fn one_off_key(prefix: &str, token: &str) -> String {
    format!("{}-one_off-{}", get_prefix(prefix, CacheGroup::Auth.as_str()), token)
}

/// Pluggable key/value store with TTL used for principals, FUP counters and
/// one-off tokens. All operations return typed errors.
///
/// FUP entries are stored without a driver-level TTL; staleness is handled
/// by bucket-key comparison in the FUP engine. Unknown-key misses are not
/// errors: principal reads yield `None` and FUP reads a zero-valued entry.
#[async_trait]
pub trait CacheDriver: Send + Sync {
    /// Configure the key prefix and entry TTL. Called once before the driver
    /// is shared.
    fn init(&mut self, prefix: &str, ttl: Duration);

    async fn get_client_by_id_and_secret(
        &self,
        id: &str,
        secret: &str,
    ) -> Result<Option<ApiClient>>;
    async fn set_client_by_id_and_secret(
        &self,
        id: &str,
        secret: &str,
        client: &ApiClient,
    ) -> Result<()>;

    async fn get_client_by_api_key(&self, api_key: &str) -> Result<Option<ApiClient>>;
    async fn set_client_by_api_key(&self, api_key: &str, client: &ApiClient) -> Result<()>;

    async fn get_client_by_one_off_token(&self, token: &str) -> Result<Option<ApiClient>>;
    /// Store a one-off resolution with TTL `expires - now`.
    async fn set_client_by_one_off_token(
        &self,
        token: &OneOffToken,
        client: &ApiClient,
    ) -> Result<()>;
    async fn delete_client_by_one_off_token(&self, token: &str) -> Result<()>;

    /// Atomically resolve and consume a one-off token where the backend
    /// allows it. The default get-then-delete is best-effort: two racing
    /// requests may both observe the token before either deletes it.
    async fn take_client_by_one_off_token(&self, token: &str) -> Result<Option<ApiClient>> {
        let client = self.get_client_by_one_off_token(token).await?;
        if client.is_some() {
            self.delete_client_by_one_off_token(token).await?;
        }
        Ok(client)
    }

    async fn get_user_by_token(&self, token: &str) -> Result<Option<ApiUser>>;
    async fn set_user_by_token(&self, token: &str, user: &ApiUser) -> Result<()>;

    /// Fetch FUP counters; missing keys yield a zero-valued entry.
    async fn get_fup_entry(&self, key: &str) -> Result<FupCacheEntry>;
    async fn set_fup_entry(&self, key: &str, entry: &FupCacheEntry) -> Result<()>;

    /// Drop a cached user token (token invalidation).
    async fn invalidate_token(&self, token: &str) -> Result<()>;
}
