//! Principal providers.
//!
//! Providers are the identity-store seam: they resolve API clients and users
//! by their various credentials. The cache driver fronts them on the hot
//! path; the provider remains the source of truth.

mod memory;

pub use memory::{InMemoryClientProvider, InMemoryUserProvider};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::cache::CacheDriver;
use crate::entity::{ApiClient, ApiUser};
use crate::errors::Result;
use crate::token::{AlphanumericTokenFactory, TokenFactory};

/// Resolves API clients.
#[async_trait]
pub trait ApiClientProvider: Send + Sync {
    /// Resolve by the primary id + secret pair; `ClientNotFound` otherwise.
    async fn by_id_and_secret(&self, id: &str, secret: &str) -> Result<ApiClient>;

    /// Resolve by API key. Implementations supporting additional keys attach
    /// the matched key as the client's current key, so downstream scope and
    /// FUP lookups use the key's policies, and fail with `ApiKeyExpired`
    /// when the matched key is past its expiration.
    async fn by_api_key(&self, api_key: &str) -> Result<ApiClient>;

    /// Persist client changes.
    async fn save(&self, client: &ApiClient) -> Result<()>;
}

/// Resolves and maintains API users.
#[async_trait]
pub trait ApiUserProvider: Send + Sync {
    /// Resolve by login and verify the password through the encoder. Any
    /// mismatch, unknown login included, is the generic
    /// `InvalidCredentials`.
    async fn by_login_and_password(&self, login: &str, password: &str) -> Result<ApiUser>;

    async fn by_login(&self, login: &str) -> Result<ApiUser>;

    /// Resolve by bearer token. An expired token is reported distinctly
    /// (`UserTokenExpired`) from a missing one (`UserTokenNotFound`), and an
    /// inactive user is rejected (`UserNotActive`) even with a valid token.
    async fn by_token(&self, token: &str) -> Result<ApiUser>;

    /// Resolve by confirmation token, enforcing `expiration` from the
    /// confirmation request timestamp (`ConfirmationTokenExpired`).
    async fn by_confirmation_token(&self, token: &str, expiration: Duration) -> Result<ApiUser>;

    /// Resolve by reset token, enforcing `expiration` from the reset request
    /// timestamp (`ResetTokenExpired`).
    async fn by_reset_token(&self, token: &str, expiration: Duration) -> Result<ApiUser>;

    /// Persist user changes.
    async fn save(&self, user: &ApiUser) -> Result<()>;

    /// Build a fresh, inactive user carrying a generated confirmation token.
    fn provide_new(
        &self,
        login: &str,
        encrypted_password: &str,
        confirmation_token_length: usize,
    ) -> ApiUser {
        let factory = AlphanumericTokenFactory;
        ApiUser {
            id: Uuid::new_v4().to_string(),
            login: login.to_string(),
            password: encrypted_password.to_string(),
            active: false,
            confirmation_token: Some(factory.generate(confirmation_token_length)),
            confirmation_requested_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Expire every live token of `user`, persist the user, then drop the
    /// tokens' cache entries. Persistence failures abort; cache deletions
    /// are best-effort.
    async fn invalidate_tokens(
        &self,
        user: &mut ApiUser,
        cache: Option<&Arc<dyn CacheDriver>>,
    ) -> Result<()> {
        let now = Utc::now();
        let mut invalidated = BTreeSet::new();
        for token in &mut user.api_tokens {
            if !token.is_expired(now) {
                token.expiration_date = now;
                invalidated.insert(token.token.clone());
            }
        }
        if let Some(current) = &mut user.current_token {
            if !current.is_expired(now) {
                current.expiration_date = now;
                invalidated.insert(current.token.clone());
            }
        }

        // Persist before touching caches so a failed save leaves no
        // half-invalidated state behind.
        self.save(user).await?;

        if let Some(cache) = cache {
            for token in invalidated {
                if let Err(err) = cache.invalidate_token(&token).await {
                    warn!(error = %err, "failed to drop cached token during invalidation");
                }
            }
        }
        Ok(())
    }
}
