//! In-process cache driver.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::cache::{get_prefix, one_off_key, CacheDriver, CacheGroup};
use crate::entity::{ApiClient, ApiUser, OneOffToken};
use crate::errors::Result;
use crate::fup::FupCacheEntry;

#[derive(Debug, Clone)]
struct MemoryEntry<T> {
    value: T,
    /// `None` for entries that never expire (FUP counters).
    expire_at: Option<DateTime<Utc>>,
}

impl<T> MemoryEntry<T> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at.is_some_and(|expire_at| expire_at <= now)
    }
}

/// The simplest implementation of [`CacheDriver`]: concurrent maps with lazy
/// expiry on read. Do not use this driver for multi-instance applications:
/// counters and one-off tokens would not be shared.
pub struct InMemoryCacheDriver {
    clients: DashMap<String, MemoryEntry<ApiClient>>,
    users: DashMap<String, MemoryEntry<ApiUser>>,
    fup: DashMap<String, FupCacheEntry>,
    prefix: String,
    ttl: Duration,
}

impl InMemoryCacheDriver {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            users: DashMap::new(),
            fup: DashMap::new(),
            prefix: String::new(),
            ttl: Duration::from_secs(3600),
        }
    }

    fn auth_prefix(&self) -> String {
        get_prefix(&self.prefix, CacheGroup::Auth.as_str())
    }

    fn fup_prefix(&self) -> String {
        get_prefix(&self.prefix, CacheGroup::Fup.as_str())
    }

    fn get_client(&self, key: &str) -> Option<ApiClient> {
        let now = Utc::now();
        if let Some(hit) = self.clients.get(key) {
            if !hit.is_expired(now) {
                return Some(hit.value.clone());
            }
        }
        // Lazy expiry: drop the stale entry outside the read guard.
        self.clients.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    fn put_client(&self, key: String, client: &ApiClient) {
        self.clients.insert(
            key,
            MemoryEntry { value: client.clone(), expire_at: Some(Utc::now() + self.ttl) },
        );
    }
}

impl Default for InMemoryCacheDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheDriver for InMemoryCacheDriver {
    fn init(&mut self, prefix: &str, ttl: Duration) {
        self.prefix = prefix.to_string();
        self.ttl = ttl;
    }

    async fn get_client_by_id_and_secret(
        &self,
        id: &str,
        secret: &str,
    ) -> Result<Option<ApiClient>> {
        Ok(self.get_client(&format!("{}{}{}", self.auth_prefix(), id, secret)))
    }

    async fn set_client_by_id_and_secret(
        &self,
        id: &str,
        secret: &str,
        client: &ApiClient,
    ) -> Result<()> {
        self.put_client(format!("{}{}{}", self.auth_prefix(), id, secret), client);
        Ok(())
    }

    async fn get_client_by_api_key(&self, api_key: &str) -> Result<Option<ApiClient>> {
        Ok(self.get_client(&format!("{}{}", self.auth_prefix(), api_key)))
    }

    async fn set_client_by_api_key(&self, api_key: &str, client: &ApiClient) -> Result<()> {
        self.put_client(format!("{}{}", self.auth_prefix(), api_key), client);
        Ok(())
    }

    async fn get_client_by_one_off_token(&self, token: &str) -> Result<Option<ApiClient>> {
        Ok(self.get_client(&one_off_key(&self.prefix, token)))
    }

    async fn set_client_by_one_off_token(
        &self,
        token: &OneOffToken,
        client: &ApiClient,
    ) -> Result<()> {
        self.clients.insert(
            one_off_key(&self.prefix, &token.value),
            MemoryEntry { value: client.clone(), expire_at: Some(token.expires) },
        );
        Ok(())
    }

    async fn delete_client_by_one_off_token(&self, token: &str) -> Result<()> {
        self.clients.remove(&one_off_key(&self.prefix, token));
        Ok(())
    }

    async fn take_client_by_one_off_token(&self, token: &str) -> Result<Option<ApiClient>> {
        // The map removal is atomic, closing the get/delete race.
        let removed = self.clients.remove(&one_off_key(&self.prefix, token));
        Ok(removed.and_then(|(_, entry)| {
            (!entry.is_expired(Utc::now())).then_some(entry.value)
        }))
    }

    async fn get_user_by_token(&self, token: &str) -> Result<Option<ApiUser>> {
        let key = format!("{}{}", self.auth_prefix(), token);
        let now = Utc::now();
        if let Some(hit) = self.users.get(&key) {
            if !hit.is_expired(now) {
                return Ok(Some(hit.value.clone()));
            }
        }
        self.users.remove_if(&key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn set_user_by_token(&self, token: &str, user: &ApiUser) -> Result<()> {
        self.users.insert(
            format!("{}{}", self.auth_prefix(), token),
            MemoryEntry { value: user.clone(), expire_at: Some(Utc::now() + self.ttl) },
        );
        Ok(())
    }

    async fn get_fup_entry(&self, key: &str) -> Result<FupCacheEntry> {
        let entry_key = format!("{}{}", self.fup_prefix(), key);
        Ok(self.fup.get(&entry_key).map(|hit| hit.clone()).unwrap_or_default())
    }

    async fn set_fup_entry(&self, key: &str, entry: &FupCacheEntry) -> Result<()> {
        self.fup.insert(format!("{}{}", self.fup_prefix(), key), entry.clone());
        Ok(())
    }

    async fn invalidate_token(&self, token: &str) -> Result<()> {
        self.users.remove(&format!("{}{}", self.auth_prefix(), token));
        Ok(())
    }
}
