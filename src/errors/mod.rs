//! # Error Handling
//!
//! Typed errors for the whole authentication pipeline. Every fallible
//! operation in this crate returns an [`AuthError`] carrying a stable
//! integer [`ErrorCode`], a human-readable message, an optional structured
//! payload and the HTTP status class the middleware responds with.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::ser::Serializer;
use serde::Serialize;

/// Custom result type for api-warden operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Stable error codes surfaced in the `code` field of error responses.
///
/// The integer values are part of the wire contract and must never be
/// reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    Unknown = 0,
    Unauthorized = 1,
    ClientNotFound = 2,
    UserNotFound = 3,
    NoCredentialsProvided = 4,
    UserTokenRequired = 5,
    UserTokenNotFound = 6,
    UserTokenExpired = 7,
    ClientForbidden = 8,
    UserForbidden = 9,
    UnknownScopeAccessibility = 10,
    UserProviderNotConfigured = 11,
    DatabaseError = 12,
    InvalidCredentials = 13,
    InvalidRequest = 14,
    UserAlreadyExists = 15,
    EncryptionError = 16,
    UserNotActive = 17,
    ConfirmationTokenExpired = 18,
    ResettingAlreadyRequested = 19,
    ResetTokenExpired = 20,
    CacheError = 21,
    MarshallingError = 22,
    FupCacheDisabled = 23,
    RequestLimitDepleted = 24,
    OneOffTokenNotAllowed = 25,
    InvalidOneOffToken = 26,
    ApiKeyExpired = 27,
    CacheDisabled = 28,
    InvalidFupCookie = 29,
}

impl ErrorCode {
    /// Default message attached to errors created through the factory
    /// constructors.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::Unknown => "unknown error",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::ClientNotFound => "client not found",
            ErrorCode::UserNotFound => "user not found",
            ErrorCode::NoCredentialsProvided => "no credentials provided",
            ErrorCode::UserTokenRequired => "user token required but not provided",
            ErrorCode::UserTokenNotFound => "user token not found",
            ErrorCode::UserTokenExpired => "user token expired",
            ErrorCode::ClientForbidden => "client access forbidden",
            ErrorCode::UserForbidden => "user access forbidden",
            ErrorCode::UnknownScopeAccessibility => "unknown scope accessibility",
            ErrorCode::UserProviderNotConfigured => "user provider not configured",
            ErrorCode::DatabaseError => "database error",
            ErrorCode::InvalidCredentials => "invalid credentials",
            ErrorCode::InvalidRequest => "invalid request",
            ErrorCode::UserAlreadyExists => "user already exists",
            ErrorCode::EncryptionError => "encryption error",
            ErrorCode::UserNotActive => "user not active",
            ErrorCode::ConfirmationTokenExpired => "confirmation token expired",
            ErrorCode::ResettingAlreadyRequested => "resetting already requested",
            ErrorCode::ResetTokenExpired => "reset token expired",
            ErrorCode::CacheError => "cache error",
            ErrorCode::MarshallingError => "marshalling error",
            ErrorCode::FupCacheDisabled => {
                "cache driver needs to be configured for the FUP checker to work"
            }
            ErrorCode::RequestLimitDepleted => "request limit depleted",
            ErrorCode::OneOffTokenNotAllowed => "one-off token not allowed for this handler",
            ErrorCode::InvalidOneOffToken => "invalid one-off token",
            ErrorCode::ApiKeyExpired => "api key expired",
            ErrorCode::CacheDisabled => "cache driver needs to be configured",
            ErrorCode::InvalidFupCookie => "invalid FUP cookie",
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u16(*self as u16)
    }
}

/// Error type threaded through the authentication pipeline.
///
/// Payloads carry structured context (exceeded limits, expiry instants).
/// Sensitive material (passwords, hashes) must never be placed in a payload.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    pub code: ErrorCode,
    pub message: String,
    pub payload: Option<serde_json::Value>,
    pub status: StatusCode,
}

impl AuthError {
    fn with_status(code: ErrorCode, payload: Option<serde_json::Value>, status: StatusCode) -> Self {
        Self { code, message: code.message().to_string(), payload, status }
    }

    /// Create an authentication error (HTTP 401).
    pub fn auth_error(code: ErrorCode, payload: Option<serde_json::Value>) -> Self {
        Self::with_status(code, payload, StatusCode::UNAUTHORIZED)
    }

    /// Create a forbidden error (HTTP 403) for inactive principals.
    pub fn forbidden_error(code: ErrorCode, payload: Option<serde_json::Value>) -> Self {
        Self::with_status(code, payload, StatusCode::FORBIDDEN)
    }

    /// Create a fair-use-policy error (HTTP 429).
    pub fn fup_error(code: ErrorCode, payload: Option<serde_json::Value>) -> Self {
        Self::with_status(code, payload, StatusCode::TOO_MANY_REQUESTS)
    }

    /// Create an internal error (HTTP 500) for fail-closed conditions.
    pub fn internal_error(code: ErrorCode, payload: Option<serde_json::Value>) -> Self {
        Self::with_status(code, payload, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Create a validation error (HTTP 422) for malformed input on the
    /// collaborator endpoints.
    pub fn validation_error(code: ErrorCode, payload: Option<serde_json::Value>) -> Self {
        Self::with_status(code, payload, StatusCode::UNPROCESSABLE_ENTITY)
    }

    /// Wrap a serialization failure.
    pub fn marshalling(err: &serde_json::Error) -> Self {
        Self::internal_error(
            ErrorCode::MarshallingError,
            Some(serde_json::json!({ "details": err.to_string() })),
        )
    }

    /// Wrap a cache-layer failure.
    pub fn cache(details: impl Into<String>) -> Self {
        Self::internal_error(
            ErrorCode::CacheError,
            Some(serde_json::json!({ "details": details.into() })),
        )
    }
}

/// JSON error body written on aborted requests.
#[derive(Serialize)]
struct ErrorBody {
    code: ErrorCode,
    message: String,
    payload: Option<serde_json::Value>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status;
        let body = ErrorBody { code: self.code, message: self.message, payload: self.payload };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_integers() {
        assert_eq!(ErrorCode::Unknown as u16, 0);
        assert_eq!(ErrorCode::NoCredentialsProvided as u16, 4);
        assert_eq!(ErrorCode::UnknownScopeAccessibility as u16, 10);
        assert_eq!(ErrorCode::RequestLimitDepleted as u16, 24);
        assert_eq!(ErrorCode::InvalidFupCookie as u16, 29);
    }

    #[test]
    fn factory_status_classes() {
        assert_eq!(
            AuthError::auth_error(ErrorCode::ClientNotFound, None).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::forbidden_error(ErrorCode::UserNotActive, None).status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::fup_error(ErrorCode::RequestLimitDepleted, None).status,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthError::internal_error(ErrorCode::CacheError, None).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AuthError::validation_error(ErrorCode::InvalidRequest, None).status,
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn error_body_serializes_code_as_integer() {
        let err = AuthError::auth_error(
            ErrorCode::UserTokenExpired,
            Some(serde_json::json!({ "expiredAt": "2024-01-01T00:00:00Z" })),
        );
        let body = serde_json::to_value(ErrorBody {
            code: err.code,
            message: err.message.clone(),
            payload: err.payload.clone(),
        })
        .unwrap();
        assert_eq!(body["code"], 7);
        assert_eq!(body["message"], "user token expired");
        assert_eq!(body["payload"]["expiredAt"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn default_messages_match_codes() {
        let err = AuthError::auth_error(ErrorCode::InvalidCredentials, None);
        assert_eq!(err.message, "invalid credentials");
        assert_eq!(err.to_string(), "invalid credentials");
    }
}
