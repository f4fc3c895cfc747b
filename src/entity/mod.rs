//! Principal and credential records.
//!
//! These are the concrete shapes the providers resolve and the cache driver
//! serializes. Scope accessors on [`ApiClient`] prefer the current
//! additional key's policies over the primary ones, so a request
//! authenticated via an additional key is governed by that key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scope::{AccessScope, FupScope};

/// An API client: the primary principal of every authenticated request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiClient {
    pub client_id: String,
    pub client_secret: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_keys: Vec<ApiClientKey>,
    /// Set when the request authenticated through an additional key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_api_key: Option<ApiClientKey>,
    #[serde(rename = "clientScope")]
    pub access_scope: Option<AccessScope>,
    #[serde(rename = "fupConfig")]
    pub fup_scope: Option<FupScope>,
}

impl ApiClient {
    /// The access scope governing this request: the current additional
    /// key's, when one is attached.
    pub fn client_scope(&self) -> Option<&AccessScope> {
        match &self.current_api_key {
            Some(key) => key.access_scope.as_ref(),
            None => self.access_scope.as_ref(),
        }
    }

    /// The FUP scope governing this request, with the same preference.
    pub fn client_fup_scope(&self) -> Option<&FupScope> {
        match &self.current_api_key {
            Some(key) => key.fup_scope.as_ref(),
            None => self.fup_scope.as_ref(),
        }
    }

    /// Accounting key for FUP counters; additional keys get their own
    /// buckets.
    pub fn fup_key(&self) -> String {
        match &self.current_api_key {
            Some(key) => format!("{}:{}", self.client_id, key.key),
            None => self.client_id.clone(),
        }
    }
}

/// A secondary credential bound to an existing client, with its own scope,
/// FUP policy and expiration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiClientKey {
    pub key: String,
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(rename = "clientScope")]
    pub access_scope: Option<AccessScope>,
    #[serde(rename = "fupConfig")]
    pub fup_scope: Option<FupScope>,
}

impl ApiClientKey {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|expires| expires <= now)
    }
}

/// An API user acting behind a client in the on-behalf access mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUser {
    pub id: String,
    pub login: String,
    /// Password hash (PHC string or legacy bcrypt); never a plaintext.
    pub password: String,
    #[serde(rename = "token")]
    pub current_token: Option<ApiUserToken>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_tokens: Vec<ApiUserToken>,
    #[serde(rename = "userScope")]
    pub user_scope: Option<AccessScope>,
    #[serde(rename = "fupConfig")]
    pub fup_scope: Option<FupScope>,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_requested_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_requested_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl Default for ApiUser {
    fn default() -> Self {
        Self {
            id: String::new(),
            login: String::new(),
            password: String::new(),
            current_token: None,
            api_tokens: Vec::new(),
            user_scope: None,
            fup_scope: None,
            active: true,
            confirmation_token: None,
            confirmation_requested_at: None,
            reset_token: None,
            reset_requested_at: None,
            last_login_at: None,
        }
    }
}

impl ApiUser {
    /// Attach a freshly persisted token as the current one.
    pub fn add_api_token(&mut self, token: ApiUserToken) {
        self.api_tokens.push(token.clone());
        self.current_token = Some(token);
    }
}

/// Bearer token pairing a user with an expiry instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUserToken {
    pub token: String,
    pub expiration_date: DateTime<Utc>,
}

impl ApiUserToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date <= now
    }
}

/// Short-lived single-use client credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneOffToken {
    #[serde(rename = "token")]
    pub value: String,
    pub expires: DateTime<Utc>,
}
