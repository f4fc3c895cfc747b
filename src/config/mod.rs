//! # Configuration Management
//!
//! [`ApiAuthConfig`] is the ingest shape: every field is optional so callers
//! specify only what they change (tri-state at the wire: unspecified,
//! explicitly true, explicitly false). [`ConfigProvider::init`] merges it
//! over the defaults and collapses it into an immutable value with pure
//! accessors, which is then threaded through the middleware; there is no
//! process-wide singleton.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::warn;

use crate::cache::CacheDriver;
use crate::checker::{AccessScopeChecker, PathChecker};
use crate::fup::FupChecker;
use crate::provider::{ApiClientProvider, ApiUserProvider};
use crate::token::{AlphanumericTokenFactory, TokenFactory, DEFAULT_CONFIRMATION_TOKEN_LENGTH};

/// Default cache key prefix.
pub const DEFAULT_CACHE_PREFIX: &str = "api-warden:";

/// Credential mode toggles.
#[derive(Default)]
pub struct ModeConfig {
    /// Authenticate by API key (`Authorization` header) (default false).
    pub api_key: Option<bool>,
    /// Also match clients' additional API keys (default false).
    pub additional_api_keys: Option<bool>,
    /// Authenticate by client id + secret headers (default true).
    pub client_id_and_secret: Option<bool>,
    /// Accept single-use one-off tokens (default false).
    pub one_off_token: Option<bool>,
}

/// API client configuration. The provider is mandatory for the middleware
/// to resolve anything.
#[derive(Default)]
pub struct ClientConfig {
    pub provider: Option<Arc<dyn ApiClientProvider>>,
    /// Check the client scope before granting access (default false).
    pub use_scope_access_model: Option<bool>,
    /// Defaults to [`PathChecker`].
    pub access_scope_checker: Option<Arc<dyn AccessScopeChecker>>,
    /// When set, client FUP limits are enforced.
    pub fup_checker: Option<Arc<dyn FupChecker>>,
    /// Lifetime of minted one-off tokens (default 1 hour).
    pub one_off_token_expiration_interval: Option<Duration>,
}

/// API user configuration; omit it entirely and the on-behalf access mode
/// is unavailable.
#[derive(Default)]
pub struct UserConfig {
    pub provider: Option<Arc<dyn ApiUserProvider>>,
    /// Defaults to [`AlphanumericTokenFactory`].
    pub token_factory: Option<Arc<dyn TokenFactory>>,
    /// Bearer token lifetime (default 30 days).
    pub api_token_expiration_interval: Option<Duration>,
    /// Check the user scope before granting access (default false).
    pub use_scope_access_model: Option<bool>,
    /// Defaults to [`PathChecker`].
    pub access_scope_checker: Option<Arc<dyn AccessScopeChecker>>,
    /// Enable self-service registration on the collaborator endpoints
    /// (default false).
    pub with_registration: Option<bool>,
    /// Confirmation token validity window (default 12 hours).
    pub confirmation_token_expiration_interval: Option<Duration>,
    /// Length of generated confirmation tokens (default 32).
    pub confirmation_token_length: Option<usize>,
    /// When set, user FUP limits are enforced.
    pub fup_checker: Option<Arc<dyn FupChecker>>,
}

/// Cache configuration.
#[derive(Default)]
pub struct CacheConfig {
    /// The driver is handed over owned so it can be initialized with the
    /// collapsed prefix and TTL before being shared.
    pub driver: Option<Box<dyn CacheDriver>>,
    /// Key prefix (default `api-warden:`).
    pub prefix: Option<String>,
    /// Entry TTL (default 1 hour).
    pub ttl: Option<Duration>,
}

/// Inbound header names, all overridable.
#[derive(Default, Clone)]
pub struct HeaderConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_key: Option<String>,
    pub one_off_token: Option<String>,
    pub user_token: Option<String>,
}

/// Top-level ingest configuration.
#[derive(Default)]
pub struct ApiAuthConfig {
    pub mode: Option<ModeConfig>,
    pub client: ClientConfig,
    pub user: Option<UserConfig>,
    pub cache: Option<CacheConfig>,
    /// Regexes selecting which request URLs to authenticate; absent or
    /// empty means everything.
    pub target_handlers: Option<Vec<String>>,
    /// Regexes excluding request URLs from authentication; wins over
    /// `target_handlers`.
    pub exclude_handlers: Option<Vec<String>>,
    /// Regexes selecting the URLs one-off tokens may be used on; absent
    /// means anywhere.
    pub target_one_off_token_handlers: Option<Vec<String>>,
    /// Skip authentication for OPTIONS requests (default false).
    pub exclude_options_requests: Option<bool>,
    pub headers: Option<HeaderConfig>,
}

fn compile_handlers(patterns: Option<Vec<String>>) -> Option<Vec<Regex>> {
    let patterns = patterns?;
    let compiled: Vec<Regex> = patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                warn!(pattern, error = %err, "skipping invalid handler pattern");
                None
            }
        })
        .collect();
    if compiled.is_empty() {
        return None;
    }
    Some(compiled)
}

/// The collapsed, immutable configuration consulted by every component.
pub struct ConfigProvider {
    api_key_mode: bool,
    additional_api_keys_mode: bool,
    client_id_and_secret_mode: bool,
    one_off_token_mode: bool,

    client_provider: Option<Arc<dyn ApiClientProvider>>,
    client_scope_access_model: bool,
    client_scope_checker: Arc<dyn AccessScopeChecker>,
    client_fup_checker: Option<Arc<dyn FupChecker>>,
    one_off_token_expiration: Duration,

    user_provider: Option<Arc<dyn ApiUserProvider>>,
    user_token_factory: Arc<dyn TokenFactory>,
    user_token_expiration: Duration,
    user_scope_access_model: bool,
    user_scope_checker: Arc<dyn AccessScopeChecker>,
    user_fup_checker: Option<Arc<dyn FupChecker>>,
    with_registration: bool,
    confirmation_token_expiration: Duration,
    confirmation_token_length: usize,

    cache_driver: Option<Arc<dyn CacheDriver>>,

    target_handlers: Option<Vec<Regex>>,
    exclude_handlers: Option<Vec<Regex>>,
    target_one_off_token_handlers: Option<Vec<Regex>>,
    exclude_options_requests: bool,

    client_id_header: String,
    client_secret_header: String,
    api_key_header: String,
    one_off_token_header: String,
    user_token_header: String,
}

impl ConfigProvider {
    /// Merge `config` over the defaults and collapse every tri-state field.
    /// The cache driver, when present, is initialized with the collapsed
    /// prefix and TTL here.
    pub fn init(config: ApiAuthConfig) -> Self {
        let mode = config.mode.unwrap_or_default();
        let user = config.user.unwrap_or_default();
        let cache = config.cache.unwrap_or_default();
        let headers = config.headers.unwrap_or_default();

        let cache_prefix = cache.prefix.unwrap_or_else(|| DEFAULT_CACHE_PREFIX.to_string());
        let cache_ttl = cache.ttl.unwrap_or(Duration::from_secs(3600));
        let cache_driver = cache.driver.map(|mut driver| {
            driver.init(&cache_prefix, cache_ttl);
            Arc::from(driver)
        });

        Self {
            api_key_mode: mode.api_key.unwrap_or(false),
            additional_api_keys_mode: mode.additional_api_keys.unwrap_or(false),
            client_id_and_secret_mode: mode.client_id_and_secret.unwrap_or(true),
            one_off_token_mode: mode.one_off_token.unwrap_or(false),

            client_provider: config.client.provider,
            client_scope_access_model: config.client.use_scope_access_model.unwrap_or(false),
            client_scope_checker: config
                .client
                .access_scope_checker
                .unwrap_or_else(|| Arc::new(PathChecker::new())),
            client_fup_checker: config.client.fup_checker,
            one_off_token_expiration: config
                .client
                .one_off_token_expiration_interval
                .unwrap_or(Duration::from_secs(3600)),

            user_provider: user.provider,
            user_token_factory: user
                .token_factory
                .unwrap_or_else(|| Arc::new(AlphanumericTokenFactory)),
            user_token_expiration: user
                .api_token_expiration_interval
                .unwrap_or(Duration::from_secs(30 * 24 * 3600)),
            user_scope_access_model: user.use_scope_access_model.unwrap_or(false),
            user_scope_checker: user
                .access_scope_checker
                .unwrap_or_else(|| Arc::new(PathChecker::new())),
            user_fup_checker: user.fup_checker,
            with_registration: user.with_registration.unwrap_or(false),
            confirmation_token_expiration: user
                .confirmation_token_expiration_interval
                .unwrap_or(Duration::from_secs(12 * 3600)),
            confirmation_token_length: user
                .confirmation_token_length
                .unwrap_or(DEFAULT_CONFIRMATION_TOKEN_LENGTH),

            cache_driver,

            target_handlers: compile_handlers(config.target_handlers),
            exclude_handlers: compile_handlers(config.exclude_handlers),
            target_one_off_token_handlers: compile_handlers(config.target_one_off_token_handlers),
            exclude_options_requests: config.exclude_options_requests.unwrap_or(false),

            client_id_header: headers.client_id.unwrap_or_else(|| "X-Client-Id".to_string()),
            client_secret_header: headers
                .client_secret
                .unwrap_or_else(|| "X-Client-Secret".to_string()),
            api_key_header: headers.api_key.unwrap_or_else(|| "Authorization".to_string()),
            one_off_token_header: headers.one_off_token.unwrap_or_else(|| "X-Token".to_string()),
            user_token_header: headers
                .user_token
                .unwrap_or_else(|| "X-Api-User-Token".to_string()),
        }
    }

    pub fn is_api_key_mode_enabled(&self) -> bool {
        self.api_key_mode
    }

    pub fn is_additional_api_keys_mode_enabled(&self) -> bool {
        self.additional_api_keys_mode
    }

    pub fn is_client_id_and_secret_mode_enabled(&self) -> bool {
        self.client_id_and_secret_mode
    }

    pub fn is_one_off_token_mode_enabled(&self) -> bool {
        self.one_off_token_mode
    }

    pub fn client_provider(&self) -> Option<&Arc<dyn ApiClientProvider>> {
        self.client_provider.as_ref()
    }

    pub fn is_client_scope_access_model_enabled(&self) -> bool {
        self.client_scope_access_model
    }

    pub fn client_scope_checker(&self) -> &Arc<dyn AccessScopeChecker> {
        &self.client_scope_checker
    }

    pub fn client_fup_checker(&self) -> Option<&Arc<dyn FupChecker>> {
        self.client_fup_checker.as_ref()
    }

    pub fn one_off_token_expiration(&self) -> Duration {
        self.one_off_token_expiration
    }

    pub fn user_provider(&self) -> Option<&Arc<dyn ApiUserProvider>> {
        self.user_provider.as_ref()
    }

    pub fn user_token_factory(&self) -> &Arc<dyn TokenFactory> {
        &self.user_token_factory
    }

    pub fn user_token_expiration(&self) -> Duration {
        self.user_token_expiration
    }

    pub fn is_user_scope_access_model_enabled(&self) -> bool {
        self.user_scope_access_model
    }

    pub fn user_scope_checker(&self) -> &Arc<dyn AccessScopeChecker> {
        &self.user_scope_checker
    }

    pub fn user_fup_checker(&self) -> Option<&Arc<dyn FupChecker>> {
        self.user_fup_checker.as_ref()
    }

    pub fn is_registration_enabled(&self) -> bool {
        self.with_registration
    }

    pub fn confirmation_token_expiration(&self) -> Duration {
        self.confirmation_token_expiration
    }

    pub fn confirmation_token_length(&self) -> usize {
        self.confirmation_token_length
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.cache_driver.is_some()
    }

    pub fn cache_driver(&self) -> Option<&Arc<dyn CacheDriver>> {
        self.cache_driver.as_ref()
    }

    pub fn target_handlers(&self) -> Option<&[Regex]> {
        self.target_handlers.as_deref()
    }

    pub fn exclude_handlers(&self) -> Option<&[Regex]> {
        self.exclude_handlers.as_deref()
    }

    pub fn target_one_off_token_handlers(&self) -> Option<&[Regex]> {
        self.target_one_off_token_handlers.as_deref()
    }

    pub fn should_exclude_options_requests(&self) -> bool {
        self.exclude_options_requests
    }

    pub fn client_id_header(&self) -> &str {
        &self.client_id_header
    }

    pub fn client_secret_header(&self) -> &str {
        &self.client_secret_header
    }

    pub fn api_key_header(&self) -> &str {
        &self.api_key_header
    }

    pub fn one_off_token_header(&self) -> &str {
        &self.one_off_token_header
    }

    pub fn user_token_header(&self) -> &str {
        &self.user_token_header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_collapse_as_documented() {
        let provider = ConfigProvider::init(ApiAuthConfig::default());
        assert!(!provider.is_api_key_mode_enabled());
        assert!(!provider.is_additional_api_keys_mode_enabled());
        assert!(provider.is_client_id_and_secret_mode_enabled());
        assert!(!provider.is_one_off_token_mode_enabled());
        assert!(!provider.is_client_scope_access_model_enabled());
        assert!(!provider.is_user_scope_access_model_enabled());
        assert!(!provider.is_registration_enabled());
        assert!(!provider.is_cache_enabled());
        assert!(!provider.should_exclude_options_requests());
        assert_eq!(provider.one_off_token_expiration(), Duration::from_secs(3600));
        assert_eq!(provider.user_token_expiration(), Duration::from_secs(30 * 24 * 3600));
        assert_eq!(provider.confirmation_token_expiration(), Duration::from_secs(12 * 3600));
        assert_eq!(provider.confirmation_token_length(), 32);
        assert_eq!(provider.client_id_header(), "X-Client-Id");
        assert_eq!(provider.client_secret_header(), "X-Client-Secret");
        assert_eq!(provider.api_key_header(), "Authorization");
        assert_eq!(provider.one_off_token_header(), "X-Token");
        assert_eq!(provider.user_token_header(), "X-Api-User-Token");
        assert!(provider.target_handlers().is_none());
        assert!(provider.exclude_handlers().is_none());
    }

    #[test]
    fn specified_fields_override_defaults() {
        let provider = ConfigProvider::init(ApiAuthConfig {
            mode: Some(ModeConfig {
                api_key: Some(true),
                client_id_and_secret: Some(false),
                ..Default::default()
            }),
            exclude_options_requests: Some(true),
            headers: Some(HeaderConfig {
                api_key: Some("X-Api-Key".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(provider.is_api_key_mode_enabled());
        assert!(!provider.is_client_id_and_secret_mode_enabled());
        assert!(provider.should_exclude_options_requests());
        assert_eq!(provider.api_key_header(), "X-Api-Key");
        // Unspecified toggles keep their defaults.
        assert!(!provider.is_one_off_token_mode_enabled());
    }

    #[test]
    fn invalid_handler_patterns_are_dropped() {
        let provider = ConfigProvider::init(ApiAuthConfig {
            target_handlers: Some(vec!["^/api".to_string(), "([".to_string()]),
            exclude_handlers: Some(vec!["([".to_string()]),
            ..Default::default()
        });
        assert_eq!(provider.target_handlers().unwrap().len(), 1);
        // A list that collapses to nothing behaves as absent.
        assert!(provider.exclude_handlers().is_none());
    }

    #[test]
    fn cache_driver_is_initialized_with_prefix_and_ttl() {
        use crate::cache::InMemoryCacheDriver;

        let provider = ConfigProvider::init(ApiAuthConfig {
            cache: Some(CacheConfig {
                driver: Some(Box::new(InMemoryCacheDriver::new())),
                prefix: Some("custom:".to_string()),
                ttl: Some(Duration::from_secs(10)),
            }),
            ..Default::default()
        });
        assert!(provider.is_cache_enabled());
    }
}
