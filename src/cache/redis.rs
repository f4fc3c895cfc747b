//! Redis cache driver for multi-instance deployments.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{get_prefix, one_off_key, CacheDriver, CacheGroup};
use crate::entity::{ApiClient, ApiUser, OneOffToken};
use crate::errors::{AuthError, Result};
use crate::fup::FupCacheEntry;

/// [`CacheDriver`] backed by a shared Redis instance. Values are stored as
/// JSON records; one-off tokens are consumed with `GETDEL`, so single-use is
/// atomic across instances.
pub struct RedisCacheDriver {
    client: redis::Client,
    prefix: String,
    ttl: Duration,
}

impl RedisCacheDriver {
    /// Create a driver from a connection URL (`redis://...`). Connections
    /// are established lazily per operation through a multiplexed handle.
    pub fn new(dsn: &str) -> Result<Self> {
        let client = redis::Client::open(dsn).map_err(|err| AuthError::cache(err.to_string()))?;
        Ok(Self { client, prefix: String::new(), ttl: Duration::from_secs(3600) })
    }

    fn auth_prefix(&self) -> String {
        get_prefix(&self.prefix, CacheGroup::Auth.as_str())
    }

    fn fup_prefix(&self) -> String {
        get_prefix(&self.prefix, CacheGroup::Fup.as_str())
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| AuthError::cache(err.to_string()))
    }

    async fn get_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection().await?;
        let value: Option<String> =
            conn.get(key).await.map_err(|err| AuthError::cache(err.to_string()))?;
        match value {
            Some(raw) => {
                let record =
                    serde_json::from_str(&raw).map_err(|err| AuthError::marshalling(&err))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn set_record<T: Serialize>(&self, key: &str, record: &T, ttl: Duration) -> Result<()> {
        let raw = serde_json::to_string(record).map_err(|err| AuthError::marshalling(&err))?;
        let mut conn = self.connection().await?;
        if ttl.is_zero() {
            conn.set::<_, _, ()>(key, raw)
                .await
                .map_err(|err| AuthError::cache(err.to_string()))?;
        } else {
            conn.set_ex::<_, _, ()>(key, raw, ttl.as_secs())
                .await
                .map_err(|err| AuthError::cache(err.to_string()))?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await.map_err(|err| AuthError::cache(err.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl CacheDriver for RedisCacheDriver {
    fn init(&mut self, prefix: &str, ttl: Duration) {
        self.prefix = prefix.to_string();
        self.ttl = ttl;
    }

    async fn get_client_by_id_and_secret(
        &self,
        id: &str,
        secret: &str,
    ) -> Result<Option<ApiClient>> {
        self.get_record(&format!("{}{}{}", self.auth_prefix(), id, secret)).await
    }

    async fn set_client_by_id_and_secret(
        &self,
        id: &str,
        secret: &str,
        client: &ApiClient,
    ) -> Result<()> {
        self.set_record(&format!("{}{}{}", self.auth_prefix(), id, secret), client, self.ttl).await
    }

    async fn get_client_by_api_key(&self, api_key: &str) -> Result<Option<ApiClient>> {
        self.get_record(&format!("{}{}", self.auth_prefix(), api_key)).await
    }

    async fn set_client_by_api_key(&self, api_key: &str, client: &ApiClient) -> Result<()> {
        self.set_record(&format!("{}{}", self.auth_prefix(), api_key), client, self.ttl).await
    }

    async fn get_client_by_one_off_token(&self, token: &str) -> Result<Option<ApiClient>> {
        self.get_record(&one_off_key(&self.prefix, token)).await
    }

    async fn set_client_by_one_off_token(
        &self,
        token: &OneOffToken,
        client: &ApiClient,
    ) -> Result<()> {
        let remaining = token.expires - Utc::now();
        let Ok(ttl) = remaining.to_std() else {
            // Already expired; nothing worth storing.
            return Ok(());
        };
        self.set_record(&one_off_key(&self.prefix, &token.value), client, ttl.max(Duration::from_secs(1)))
            .await
    }

    async fn delete_client_by_one_off_token(&self, token: &str) -> Result<()> {
        self.delete(&one_off_key(&self.prefix, token)).await
    }

    async fn take_client_by_one_off_token(&self, token: &str) -> Result<Option<ApiClient>> {
        // GETDEL resolves and consumes in one round trip, closing the race
        // between two requests presenting the same token.
        let mut conn = self.connection().await?;
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(one_off_key(&self.prefix, token))
            .query_async(&mut conn)
            .await
            .map_err(|err| AuthError::cache(err.to_string()))?;
        match value {
            Some(raw) => {
                let client =
                    serde_json::from_str(&raw).map_err(|err| AuthError::marshalling(&err))?;
                Ok(Some(client))
            }
            None => Ok(None),
        }
    }

    async fn get_user_by_token(&self, token: &str) -> Result<Option<ApiUser>> {
        self.get_record(&format!("{}{}", self.auth_prefix(), token)).await
    }

    async fn set_user_by_token(&self, token: &str, user: &ApiUser) -> Result<()> {
        self.set_record(&format!("{}{}", self.auth_prefix(), token), user, self.ttl).await
    }

    async fn get_fup_entry(&self, key: &str) -> Result<FupCacheEntry> {
        let entry: Option<FupCacheEntry> =
            self.get_record(&format!("{}{}", self.fup_prefix(), key)).await?;
        Ok(entry.unwrap_or_default())
    }

    async fn set_fup_entry(&self, key: &str, entry: &FupCacheEntry) -> Result<()> {
        // Counters never expire through Redis; rollover handles staleness.
        self.set_record(&format!("{}{}", self.fup_prefix(), key), entry, Duration::ZERO).await
    }

    async fn invalidate_token(&self, token: &str) -> Result<()> {
        self.delete(&format!("{}{}", self.auth_prefix(), token)).await
    }
}
