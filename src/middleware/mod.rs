//! The per-request authentication pipeline and its axum glue.
//!
//! [`Authenticator`] implements the pipeline over a [`RequestInfo`] snapshot
//! so it stays testable without a server; [`api_auth_middleware`] adapts it
//! to `axum::middleware::from_fn_with_state`. Resolved principals are
//! attached to the request extensions ([`ApiClient`], and [`ApiUser`] for
//! on-behalf requests); failures abort with the typed error body.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info_span, warn};

use crate::config::{ApiAuthConfig, ConfigProvider};
use crate::entity::{ApiClient, ApiUser};
use crate::errors::{AuthError, ErrorCode};
use crate::extractor::{extract_credentials, Credentials};
use crate::fup::{retry_after, FupScopeLimits};
use crate::request::RequestInfo;
use crate::scope::ScopeVerdict;

/// Response header carrying the client FUP limits that applied.
pub const CLIENT_FUP_LIMITS_HEADER: &str = "X-Client-FUP-Limits";

/// Response header carrying the user FUP limits that applied.
pub const USER_FUP_LIMITS_HEADER: &str = "X-User-FUP-Limits";

const RETRY_AFTER_HEADER: &str = "Retry-After";

/// Successful pipeline outcome: the resolved principals and any rate
/// headers to attach to the response.
#[derive(Debug, Default)]
pub struct AuthOutcome {
    pub client: Option<ApiClient>,
    pub user: Option<ApiUser>,
    pub response_headers: Vec<(String, String)>,
}

/// Aborted pipeline outcome: the typed error plus headers that belong on
/// the error response (`Retry-After` on depletion).
#[derive(Debug)]
pub struct AuthFailure {
    pub error: AuthError,
    pub response_headers: Vec<(String, String)>,
}

impl From<AuthError> for AuthFailure {
    fn from(error: AuthError) -> Self {
        Self { error, response_headers: Vec::new() }
    }
}

type AuthResult = std::result::Result<AuthOutcome, AuthFailure>;

/// The request-evaluation pipeline. Cheap to clone; holds only the shared
/// configuration.
#[derive(Clone)]
pub struct Authenticator {
    config: Arc<ConfigProvider>,
}

impl Authenticator {
    pub fn new(config: Arc<ConfigProvider>) -> Self {
        Self { config }
    }

    /// Collapse an ingest configuration and build the authenticator in one
    /// step.
    pub fn from_config(config: ApiAuthConfig) -> Self {
        Self::new(Arc::new(ConfigProvider::init(config)))
    }

    pub fn config(&self) -> &Arc<ConfigProvider> {
        &self.config
    }

    /// Whether this request URL is subject to authentication: exclusions
    /// win, then an absent target list means everything, otherwise at least
    /// one target pattern must match.
    pub fn should_authenticate(&self, request: &RequestInfo) -> bool {
        if let Some(excludes) = self.config.exclude_handlers() {
            if excludes.iter().any(|pattern| pattern.is_match(&request.uri)) {
                return false;
            }
        }
        match self.config.target_handlers() {
            None => true,
            Some(targets) => targets.iter().any(|pattern| pattern.is_match(&request.uri)),
        }
    }

    /// Run the full pipeline for one request.
    pub async fn authenticate(&self, request: &RequestInfo, headers: &HeaderMap) -> AuthResult {
        if !self.should_authenticate(request) {
            return Ok(AuthOutcome::default());
        }
        if self.config.should_exclude_options_requests() && request.method == Method::OPTIONS.as_str()
        {
            return Ok(AuthOutcome::default());
        }
        if !self.config.is_client_id_and_secret_mode_enabled()
            && !self.config.is_api_key_mode_enabled()
            && !self.config.is_one_off_token_mode_enabled()
        {
            // Authentication is switched off entirely.
            return Ok(AuthOutcome::default());
        }

        let credentials = extract_credentials(headers, &self.config)
            .ok_or_else(|| AuthError::auth_error(ErrorCode::NoCredentialsProvided, None))?;
        let client = self.resolve_client(request, credentials).await?;

        if !self.config.is_client_scope_access_model_enabled() {
            return Ok(AuthOutcome { client: Some(client), ..Default::default() });
        }

        let mut response_headers = Vec::new();
        if let Some(fup_checker) = self.config.client_fup_checker() {
            let limits = fup_checker
                .check(
                    client.client_fup_scope(),
                    request,
                    &client.fup_key(),
                    self.config.cache_driver(),
                )
                .await;
            if let Some(header) = self.enforce_fup(&limits, CLIENT_FUP_LIMITS_HEADER)? {
                response_headers.push(header);
            }
        }

        let verdict = self.config.client_scope_checker().check(client.client_scope(), request);
        let outcome = AuthOutcome { client: Some(client), user: None, response_headers };
        match verdict {
            ScopeVerdict::Forbidden => {
                Err(AuthError::auth_error(ErrorCode::ClientForbidden, None).into())
            }
            ScopeVerdict::Accessible => Ok(outcome),
            ScopeVerdict::OnBehalf => self.authenticate_on_behalf(request, headers, outcome).await,
            other => Err(unknown_verdict(other).into()),
        }
    }

    /// On-behalf continuation: resolve the user behind the client and put
    /// it through the same FUP + scope gauntlet.
    async fn authenticate_on_behalf(
        &self,
        request: &RequestInfo,
        headers: &HeaderMap,
        mut outcome: AuthOutcome,
    ) -> AuthResult {
        let token = headers
            .get(self.config.user_token_header())
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AuthError::auth_error(ErrorCode::UserTokenRequired, None))?;

        let user = self.resolve_user(token).await?;

        if let Some(fup_checker) = self.config.user_fup_checker() {
            let limits = fup_checker
                .check(user.fup_scope.as_ref(), request, &user.login, self.config.cache_driver())
                .await;
            if let Some(header) = self.enforce_fup(&limits, USER_FUP_LIMITS_HEADER)? {
                outcome.response_headers.push(header);
            }
        }

        let verdict = self.config.user_scope_checker().check(user.user_scope.as_ref(), request);
        match verdict {
            ScopeVerdict::Accessible => {
                outcome.user = Some(user);
                Ok(outcome)
            }
            // No chained delegation: a user on-behalf verdict is a denial.
            ScopeVerdict::Forbidden | ScopeVerdict::OnBehalf => {
                Err(AuthError::auth_error(ErrorCode::UserForbidden, None).into())
            }
            other => Err(unknown_verdict(other).into()),
        }
    }

    /// Turn a FUP outcome into either a rate header or a depletion failure.
    fn enforce_fup(
        &self,
        limits: &FupScopeLimits,
        header_name: &str,
    ) -> std::result::Result<Option<(String, String)>, AuthFailure> {
        if let Some(error) = &limits.error {
            return Err(error.clone().into());
        }
        if limits.accessibility == ScopeVerdict::Forbidden {
            let payload = serde_json::to_value(&limits.limits).ok();
            let mut failure: AuthFailure =
                AuthError::fup_error(ErrorCode::RequestLimitDepleted, payload).into();
            let seconds = retry_after(limits);
            if seconds >= 0 {
                failure
                    .response_headers
                    .push((RETRY_AFTER_HEADER.to_string(), seconds.to_string()));
            }
            return Err(failure);
        }
        Ok(limits.limits_header().map(|value| (header_name.to_string(), value)))
    }

    async fn resolve_client(
        &self,
        request: &RequestInfo,
        credentials: Credentials,
    ) -> std::result::Result<ApiClient, AuthFailure> {
        match credentials {
            Credentials::OneOffToken(token) => self.resolve_by_one_off_token(request, &token).await,
            Credentials::ClientIdAndSecret { id, secret } => {
                Ok(self.resolve_by_id_and_secret(&id, &secret).await?)
            }
            Credentials::ApiKey(key) => Ok(self.resolve_by_api_key(&key).await?),
        }
    }

    /// Cache-first id + secret resolution; cache failures fall back to the
    /// provider.
    async fn resolve_by_id_and_secret(
        &self,
        id: &str,
        secret: &str,
    ) -> crate::errors::Result<ApiClient> {
        if let Some(cache) = self.config.cache_driver() {
            match cache.get_client_by_id_and_secret(id, secret).await {
                Ok(Some(client)) => {
                    debug!(client_id = id, "client resolved from cache");
                    return Ok(client);
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "client cache read failed"),
            }
        }
        let provider = self.config.client_provider().ok_or_else(client_provider_missing)?;
        let client = provider.by_id_and_secret(id, secret).await?;
        if let Some(cache) = self.config.cache_driver() {
            if let Err(err) = cache.set_client_by_id_and_secret(id, secret, &client).await {
                warn!(error = %err, "client cache write failed");
            }
        }
        Ok(client)
    }

    /// Cache-first API-key resolution with the same fallback policy.
    async fn resolve_by_api_key(&self, api_key: &str) -> crate::errors::Result<ApiClient> {
        if let Some(cache) = self.config.cache_driver() {
            match cache.get_client_by_api_key(api_key).await {
                Ok(Some(client)) => {
                    debug!("client resolved from cache by api key");
                    return Ok(client);
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "client cache read failed"),
            }
        }
        let provider = self.config.client_provider().ok_or_else(client_provider_missing)?;
        let client = provider.by_api_key(api_key).await?;
        if let Some(cache) = self.config.cache_driver() {
            if let Err(err) = cache.set_client_by_api_key(api_key, &client).await {
                warn!(error = %err, "client cache write failed");
            }
        }
        Ok(client)
    }

    /// One-off resolution. The cache is authoritative here: resolution
    /// consumes the token, and cache errors are fatal.
    async fn resolve_by_one_off_token(
        &self,
        request: &RequestInfo,
        token: &str,
    ) -> std::result::Result<ApiClient, AuthFailure> {
        if let Some(allowed) = self.config.target_one_off_token_handlers() {
            if !allowed.iter().any(|pattern| pattern.is_match(&request.uri)) {
                return Err(AuthError::auth_error(ErrorCode::OneOffTokenNotAllowed, None).into());
            }
        }
        let cache = self
            .config
            .cache_driver()
            .ok_or_else(|| AuthError::internal_error(ErrorCode::CacheDisabled, None))?;
        let client = cache.take_client_by_one_off_token(token).await.map_err(AuthFailure::from)?;
        client.ok_or_else(|| AuthError::auth_error(ErrorCode::InvalidOneOffToken, None).into())
    }

    /// Issue a fresh bearer token for `user` through the configured factory.
    ///
    /// The token is persisted before it is attached to the caller's copy, so
    /// a failed save never leaves an un-persisted token on an in-memory
    /// user. Intended for the host's authenticate endpoint.
    pub async fn issue_user_token(
        &self,
        user: &mut ApiUser,
    ) -> crate::errors::Result<crate::entity::ApiUserToken> {
        let provider = self
            .config
            .user_provider()
            .ok_or_else(|| AuthError::internal_error(ErrorCode::UserProviderNotConfigured, None))?;
        let token = crate::entity::ApiUserToken {
            token: self.config.user_token_factory().generate(crate::token::USER_TOKEN_LENGTH),
            expiration_date: chrono::Utc::now() + self.config.user_token_expiration(),
        };
        let mut persisted = user.clone();
        persisted.add_api_token(token.clone());
        provider.save(&persisted).await?;
        *user = persisted;
        Ok(token)
    }

    /// Cache-first user resolution; expiry and activity are re-validated
    /// even on cache hits.
    async fn resolve_user(&self, token: &str) -> crate::errors::Result<ApiUser> {
        let provider = self
            .config
            .user_provider()
            .ok_or_else(|| AuthError::internal_error(ErrorCode::UserProviderNotConfigured, None))?;

        let mut cached = None;
        if let Some(cache) = self.config.cache_driver() {
            match cache.get_user_by_token(token).await {
                Ok(hit) => cached = hit,
                Err(err) => warn!(error = %err, "user cache read failed"),
            }
        }

        let user = match cached {
            Some(user) => user,
            None => {
                let user = provider.by_token(token).await?;
                if let Some(cache) = self.config.cache_driver() {
                    if let Err(err) = cache.set_user_by_token(token, &user).await {
                        warn!(error = %err, "user cache write failed");
                    }
                }
                user
            }
        };

        let current = user
            .current_token
            .as_ref()
            .ok_or_else(|| AuthError::auth_error(ErrorCode::UserTokenNotFound, None))?;
        if current.is_expired(chrono::Utc::now()) {
            return Err(AuthError::auth_error(
                ErrorCode::UserTokenExpired,
                Some(serde_json::json!({ "expiredAt": current.expiration_date })),
            ));
        }
        if !user.active {
            return Err(AuthError::forbidden_error(ErrorCode::UserNotActive, None));
        }
        Ok(user)
    }
}

fn client_provider_missing() -> AuthError {
    AuthError::internal_error(
        ErrorCode::Unknown,
        Some(serde_json::json!({ "details": "client provider not configured" })),
    )
}

fn unknown_verdict(verdict: ScopeVerdict) -> AuthError {
    AuthError::auth_error(
        ErrorCode::UnknownScopeAccessibility,
        Some(serde_json::json!({ "accessibility": verdict.as_str() })),
    )
}

/// Middleware entry point for `axum::middleware::from_fn_with_state`.
pub async fn api_auth_middleware(
    State(authenticator): State<Arc<Authenticator>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let info = RequestInfo::from_request(&request);
    let span = info_span!(
        "api_auth.authenticate",
        http.method = %info.method,
        http.path = %info.path,
    );
    let _guard = span.enter();

    match authenticator.authenticate(&info, request.headers()).await {
        Ok(outcome) => {
            if let Some(client) = outcome.client {
                request.extensions_mut().insert(client);
            }
            if let Some(user) = outcome.user {
                request.extensions_mut().insert(user);
            }
            drop(_guard);
            let mut response = next.run(request).await;
            append_headers(response.headers_mut(), &outcome.response_headers);
            response
        }
        Err(failure) => {
            warn!(code = failure.error.code as u16, error = %failure.error, "authentication failed");
            let headers = failure.response_headers.clone();
            let mut response = failure.error.into_response();
            append_headers(response.headers_mut(), &headers);
            response
        }
    }
}

fn append_headers(target: &mut HeaderMap, headers: &[(String, String)]) {
    for (name, value) in headers {
        let parsed_name = HeaderName::from_bytes(name.as_bytes());
        let parsed_value = HeaderValue::from_str(value);
        if let (Ok(name), Ok(value)) = (parsed_name, parsed_value) {
            target.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheDriver;
    use crate::config::{CacheConfig, ClientConfig, ModeConfig};
    use crate::provider::InMemoryClientProvider;
    use serde_json::json;

    fn client(scope: serde_json::Value) -> ApiClient {
        ApiClient {
            client_id: "client".into(),
            client_secret: "secret".into(),
            access_scope: Some(serde_json::from_value(scope).unwrap()),
            ..Default::default()
        }
    }

    fn authenticator(config: ApiAuthConfig) -> Authenticator {
        Authenticator::from_config(config)
    }

    fn credential_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Client-Id", "client".parse().unwrap());
        headers.insert("X-Client-Secret", "secret".parse().unwrap());
        headers
    }

    #[test]
    fn should_authenticate_honors_targets_and_excludes() {
        let auth = authenticator(ApiAuthConfig {
            target_handlers: Some(vec!["^/api".to_string()]),
            exclude_handlers: Some(vec!["^/api/health".to_string()]),
            ..Default::default()
        });
        assert!(auth.should_authenticate(&RequestInfo::new("GET", "/api/items")));
        assert!(!auth.should_authenticate(&RequestInfo::new("GET", "/api/health")));
        assert!(!auth.should_authenticate(&RequestInfo::new("GET", "/metrics")));

        let authenticate_all = authenticator(ApiAuthConfig::default());
        assert!(authenticate_all.should_authenticate(&RequestInfo::new("GET", "/anything")));
    }

    #[tokio::test]
    async fn missing_credentials_fail_with_typed_error() {
        let auth = authenticator(ApiAuthConfig {
            client: ClientConfig {
                provider: Some(Arc::new(InMemoryClientProvider::new(vec![]))),
                ..Default::default()
            },
            ..Default::default()
        });
        let failure = auth
            .authenticate(&RequestInfo::new("GET", "/x"), &HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(failure.error.code, ErrorCode::NoCredentialsProvided);
    }

    #[tokio::test]
    async fn options_requests_can_bypass_authentication() {
        let auth = authenticator(ApiAuthConfig {
            exclude_options_requests: Some(true),
            ..Default::default()
        });
        let outcome = auth
            .authenticate(&RequestInfo::new("OPTIONS", "/x"), &HeaderMap::new())
            .await
            .unwrap();
        assert!(outcome.client.is_none());
    }

    #[tokio::test]
    async fn scope_model_disabled_stops_after_resolution() {
        let auth = authenticator(ApiAuthConfig {
            client: ClientConfig {
                provider: Some(Arc::new(InMemoryClientProvider::new(vec![client(
                    json!({"/x": false}),
                )]))),
                ..Default::default()
            },
            ..Default::default()
        });
        let outcome = auth
            .authenticate(&RequestInfo::new("GET", "/x"), &credential_headers())
            .await
            .unwrap();
        assert_eq!(outcome.client.unwrap().client_id, "client");
    }

    #[tokio::test]
    async fn forbidden_scope_aborts() {
        let auth = authenticator(ApiAuthConfig {
            client: ClientConfig {
                provider: Some(Arc::new(InMemoryClientProvider::new(vec![client(
                    json!({"/ping": true}),
                )]))),
                use_scope_access_model: Some(true),
                ..Default::default()
            },
            ..Default::default()
        });
        let failure = auth
            .authenticate(&RequestInfo::new("GET", "/admin"), &credential_headers())
            .await
            .unwrap_err();
        assert_eq!(failure.error.code, ErrorCode::ClientForbidden);
    }

    #[tokio::test]
    async fn on_behalf_without_user_provider_is_fatal() {
        let auth = authenticator(ApiAuthConfig {
            client: ClientConfig {
                provider: Some(Arc::new(InMemoryClientProvider::new(vec![client(
                    json!({"/x": "on-behalf"}),
                )]))),
                use_scope_access_model: Some(true),
                ..Default::default()
            },
            ..Default::default()
        });
        let mut headers = credential_headers();
        headers.insert("X-Api-User-Token", "token".parse().unwrap());
        let failure = auth
            .authenticate(&RequestInfo::new("GET", "/x"), &headers)
            .await
            .unwrap_err();
        assert_eq!(failure.error.code, ErrorCode::UserProviderNotConfigured);
        assert_eq!(failure.error.status, axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn on_behalf_requires_the_user_token_header() {
        let auth = authenticator(ApiAuthConfig {
            client: ClientConfig {
                provider: Some(Arc::new(InMemoryClientProvider::new(vec![client(
                    json!({"/x": "on-behalf"}),
                )]))),
                use_scope_access_model: Some(true),
                ..Default::default()
            },
            ..Default::default()
        });
        let failure = auth
            .authenticate(&RequestInfo::new("GET", "/x"), &credential_headers())
            .await
            .unwrap_err();
        assert_eq!(failure.error.code, ErrorCode::UserTokenRequired);
    }

    #[tokio::test]
    async fn one_off_tokens_respect_the_handler_allowlist() {
        let mut driver = InMemoryCacheDriver::new();
        crate::cache::CacheDriver::init(&mut driver, "t:", std::time::Duration::from_secs(60));
        let auth = authenticator(ApiAuthConfig {
            mode: Some(ModeConfig { one_off_token: Some(true), ..Default::default() }),
            cache: Some(CacheConfig { driver: Some(Box::new(driver)), ..Default::default() }),
            target_one_off_token_handlers: Some(vec!["^/allowed".to_string()]),
            ..Default::default()
        });
        let mut headers = HeaderMap::new();
        headers.insert("X-Token", "tok".parse().unwrap());
        let failure = auth
            .authenticate(&RequestInfo::new("GET", "/elsewhere"), &headers)
            .await
            .unwrap_err();
        assert_eq!(failure.error.code, ErrorCode::OneOffTokenNotAllowed);

        let failure =
            auth.authenticate(&RequestInfo::new("GET", "/allowed"), &headers).await.unwrap_err();
        assert_eq!(failure.error.code, ErrorCode::InvalidOneOffToken);
    }

    #[tokio::test]
    async fn one_off_mode_without_cache_is_fatal() {
        let auth = authenticator(ApiAuthConfig {
            mode: Some(ModeConfig { one_off_token: Some(true), ..Default::default() }),
            ..Default::default()
        });
        let mut headers = HeaderMap::new();
        headers.insert("X-Token", "tok".parse().unwrap());
        let failure =
            auth.authenticate(&RequestInfo::new("GET", "/x"), &headers).await.unwrap_err();
        assert_eq!(failure.error.code, ErrorCode::CacheDisabled);
    }

    #[tokio::test]
    async fn issued_user_tokens_are_persisted_then_attached() {
        use crate::entity::ApiUser;
        use crate::provider::InMemoryUserProvider;

        let auth = authenticator(ApiAuthConfig {
            user: Some(crate::config::UserConfig {
                provider: Some(Arc::new(InMemoryUserProvider::new(Vec::new()))),
                api_token_expiration_interval: Some(std::time::Duration::from_secs(3600)),
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut user = ApiUser { login: "u".into(), ..Default::default() };
        let token = auth.issue_user_token(&mut user).await.unwrap();
        assert_eq!(token.token.len(), 32);
        assert_eq!(user.current_token, Some(token.clone()));
        assert!(user.api_tokens.contains(&token));
        let lifetime = token.expiration_date - chrono::Utc::now();
        assert!(lifetime <= chrono::Duration::hours(1));
        assert!(lifetime > chrono::Duration::minutes(59));
    }

    #[tokio::test]
    async fn issuing_without_a_user_provider_is_fatal() {
        let auth = authenticator(ApiAuthConfig::default());
        let mut user = crate::entity::ApiUser::default();
        let err = auth.issue_user_token(&mut user).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UserProviderNotConfigured);
        assert!(user.current_token.is_none());
    }

    #[tokio::test]
    async fn cache_transparency_for_single_requests() {
        let scope = json!({"/ping": true});
        let provider = Arc::new(InMemoryClientProvider::new(vec![client(scope)]));

        let uncached = authenticator(ApiAuthConfig {
            client: ClientConfig {
                provider: Some(provider.clone()),
                use_scope_access_model: Some(true),
                ..Default::default()
            },
            ..Default::default()
        });
        let cached = authenticator(ApiAuthConfig {
            client: ClientConfig {
                provider: Some(provider),
                use_scope_access_model: Some(true),
                ..Default::default()
            },
            cache: Some(CacheConfig {
                driver: Some(Box::new(InMemoryCacheDriver::new())),
                ..Default::default()
            }),
            ..Default::default()
        });

        for auth in [&uncached, &cached] {
            let outcome = auth
                .authenticate(&RequestInfo::new("GET", "/ping"), &credential_headers())
                .await
                .unwrap();
            assert_eq!(outcome.client.unwrap().client_id, "client");
        }
    }
}
