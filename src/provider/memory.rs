//! In-memory reference providers.
//!
//! The simplest implementations of the provider traits, backed by vectors
//! handed over at construction. Useful for tests and small deployments
//! where principals are provisioned statically.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::encoder;
use crate::entity::{ApiClient, ApiUser};
use crate::errors::{AuthError, ErrorCode, Result};
use crate::provider::{ApiClientProvider, ApiUserProvider};

/// Static client catalogue.
pub struct InMemoryClientProvider {
    clients: Vec<ApiClient>,
    with_additional_keys: bool,
}

impl InMemoryClientProvider {
    pub fn new(clients: Vec<ApiClient>) -> Self {
        Self { clients, with_additional_keys: false }
    }

    /// Also match additional keys during API-key resolution.
    pub fn with_additional_keys(clients: Vec<ApiClient>) -> Self {
        Self { clients, with_additional_keys: true }
    }
}

#[async_trait]
impl ApiClientProvider for InMemoryClientProvider {
    async fn by_id_and_secret(&self, id: &str, secret: &str) -> Result<ApiClient> {
        self.clients
            .iter()
            .find(|client| client.client_id == id && client.client_secret == secret)
            .cloned()
            .ok_or_else(|| AuthError::auth_error(ErrorCode::ClientNotFound, None))
    }

    async fn by_api_key(&self, api_key: &str) -> Result<ApiClient> {
        if let Some(client) = self.clients.iter().find(|client| client.api_key == api_key) {
            return Ok(client.clone());
        }
        if self.with_additional_keys {
            for client in &self.clients {
                let Some(key) = client.additional_keys.iter().find(|key| key.key == api_key)
                else {
                    continue;
                };
                if key.is_expired(Utc::now()) {
                    return Err(AuthError::auth_error(ErrorCode::ApiKeyExpired, None));
                }
                let mut resolved = client.clone();
                resolved.current_api_key = Some(key.clone());
                return Ok(resolved);
            }
        }
        Err(AuthError::auth_error(ErrorCode::ClientNotFound, None))
    }

    async fn save(&self, _client: &ApiClient) -> Result<()> {
        // Principals live in memory; nothing to persist.
        Ok(())
    }
}

/// Static user catalogue.
pub struct InMemoryUserProvider {
    users: Vec<ApiUser>,
}

impl InMemoryUserProvider {
    pub fn new(users: Vec<ApiUser>) -> Self {
        Self { users }
    }

    fn find<F: Fn(&ApiUser) -> bool>(&self, predicate: F) -> Option<ApiUser> {
        self.users.iter().find(|user| predicate(user)).cloned()
    }
}

#[async_trait]
impl ApiUserProvider for InMemoryUserProvider {
    async fn by_login_and_password(&self, login: &str, password: &str) -> Result<ApiUser> {
        // Unknown login and wrong password are indistinguishable on purpose.
        let user = self
            .find(|user| user.login == login)
            .ok_or_else(|| AuthError::auth_error(ErrorCode::InvalidCredentials, None))?;
        encoder::compare_password(&user, password)?;
        Ok(user)
    }

    async fn by_login(&self, login: &str) -> Result<ApiUser> {
        self.find(|user| user.login == login)
            .ok_or_else(|| AuthError::auth_error(ErrorCode::UserNotFound, None))
    }

    async fn by_token(&self, token: &str) -> Result<ApiUser> {
        let mut matched = None;
        for user in &self.users {
            let hit = user
                .current_token
                .iter()
                .chain(user.api_tokens.iter())
                .find(|candidate| candidate.token == token);
            if let Some(hit) = hit {
                matched = Some((user.clone(), hit.clone()));
                break;
            }
        }
        let Some((mut user, token)) = matched else {
            return Err(AuthError::auth_error(ErrorCode::UserTokenNotFound, None));
        };
        if token.is_expired(Utc::now()) {
            return Err(AuthError::auth_error(
                ErrorCode::UserTokenExpired,
                Some(serde_json::json!({ "expiredAt": token.expiration_date })),
            ));
        }
        if !user.active {
            return Err(AuthError::forbidden_error(ErrorCode::UserNotActive, None));
        }
        user.current_token = Some(token);
        Ok(user)
    }

    async fn by_confirmation_token(&self, token: &str, expiration: Duration) -> Result<ApiUser> {
        let user = self
            .find(|user| user.confirmation_token.as_deref() == Some(token))
            .ok_or_else(|| AuthError::auth_error(ErrorCode::UserNotFound, None))?;
        let requested_at = user
            .confirmation_requested_at
            .ok_or_else(|| AuthError::auth_error(ErrorCode::ConfirmationTokenExpired, None))?;
        if requested_at + expiration <= Utc::now() {
            return Err(AuthError::auth_error(ErrorCode::ConfirmationTokenExpired, None));
        }
        Ok(user)
    }

    async fn by_reset_token(&self, token: &str, expiration: Duration) -> Result<ApiUser> {
        let user = self
            .find(|user| user.reset_token.as_deref() == Some(token))
            .ok_or_else(|| AuthError::auth_error(ErrorCode::UserNotFound, None))?;
        let requested_at = user
            .reset_requested_at
            .ok_or_else(|| AuthError::auth_error(ErrorCode::ResetTokenExpired, None))?;
        if requested_at + expiration <= Utc::now() {
            return Err(AuthError::auth_error(ErrorCode::ResetTokenExpired, None));
        }
        Ok(user)
    }

    async fn save(&self, _user: &ApiUser) -> Result<()> {
        // Principals live in memory; nothing to persist.
        Ok(())
    }
}
