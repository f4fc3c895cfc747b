//! Credential extraction.
//!
//! Inspects the request headers and picks exactly one credential mode,
//! honoring the configured toggles. Decision order: one-off token, then
//! client id + secret, then API key. `Basic` Authorization values are left
//! alone: that form is reserved for user login on the authenticate
//! endpoint.

use axum::http::HeaderMap;

use crate::config::ConfigProvider;

/// The credential mode selected for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    OneOffToken(String),
    ClientIdAndSecret { id: String, secret: String },
    ApiKey(String),
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok()).filter(|value| !value.is_empty())
}

/// Pick the credential mode for this request, or `None` when no enabled
/// mode has its headers present.
pub fn extract_credentials(headers: &HeaderMap, config: &ConfigProvider) -> Option<Credentials> {
    if config.is_one_off_token_mode_enabled() {
        if let Some(token) = header_value(headers, config.one_off_token_header()) {
            return Some(Credentials::OneOffToken(token.to_string()));
        }
    }
    if config.is_client_id_and_secret_mode_enabled() {
        let id = header_value(headers, config.client_id_header());
        let secret = header_value(headers, config.client_secret_header());
        if let (Some(id), Some(secret)) = (id, secret) {
            return Some(Credentials::ClientIdAndSecret {
                id: id.to_string(),
                secret: secret.to_string(),
            });
        }
    }
    if config.is_api_key_mode_enabled() {
        if let Some(key) = header_value(headers, config.api_key_header()) {
            if !key.starts_with("Basic ") {
                return Some(Credentials::ApiKey(key.to_string()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiAuthConfig, ModeConfig};

    fn config(api_key: bool, id_secret: bool, one_off: bool) -> ConfigProvider {
        ConfigProvider::init(ApiAuthConfig {
            mode: Some(ModeConfig {
                api_key: Some(api_key),
                client_id_and_secret: Some(id_secret),
                one_off_token: Some(one_off),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        headers
    }

    #[test]
    fn id_and_secret_requires_both_headers() {
        let config = config(false, true, false);
        assert_eq!(
            extract_credentials(&headers(&[("X-Client-Id", "c"), ("X-Client-Secret", "s")]), &config),
            Some(Credentials::ClientIdAndSecret { id: "c".into(), secret: "s".into() })
        );
        assert_eq!(extract_credentials(&headers(&[("X-Client-Id", "c")]), &config), None);
    }

    #[test]
    fn one_off_token_wins_over_other_modes() {
        let config = config(true, true, true);
        let extracted = extract_credentials(
            &headers(&[
                ("X-Token", "one-off"),
                ("X-Client-Id", "c"),
                ("X-Client-Secret", "s"),
                ("Authorization", "key"),
            ]),
            &config,
        );
        assert_eq!(extracted, Some(Credentials::OneOffToken("one-off".into())));
    }

    #[test]
    fn id_and_secret_wins_over_api_key() {
        let config = config(true, true, false);
        let extracted = extract_credentials(
            &headers(&[("X-Client-Id", "c"), ("X-Client-Secret", "s"), ("Authorization", "key")]),
            &config,
        );
        assert!(matches!(extracted, Some(Credentials::ClientIdAndSecret { .. })));
    }

    #[test]
    fn disabled_modes_are_ignored() {
        let config = config(true, false, false);
        let extracted = extract_credentials(
            &headers(&[("X-Client-Id", "c"), ("X-Client-Secret", "s"), ("Authorization", "key")]),
            &config,
        );
        assert_eq!(extracted, Some(Credentials::ApiKey("key".into())));
    }

    #[test]
    fn basic_authorization_is_reserved() {
        let config = config(true, false, false);
        assert_eq!(
            extract_credentials(&headers(&[("Authorization", "Basic dXNlcjpwYXNz")]), &config),
            None
        );
    }

    #[test]
    fn no_credentials_yields_none() {
        let config = config(true, true, true);
        assert_eq!(extract_credentials(&headers(&[]), &config), None);
    }
}
