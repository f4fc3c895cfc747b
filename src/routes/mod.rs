//! Built-in handlers.
//!
//! Only the one-off-token minting endpoint lives in the core; registration
//! and password-reset choreography belong to the host application.

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::Json;
use chrono::Utc;
use tracing::info;

use crate::entity::{ApiClient, OneOffToken};
use crate::errors::{AuthError, ErrorCode, Result};
use crate::middleware::Authenticator;
use crate::token::{AlphanumericTokenFactory, TokenFactory, ONE_OFF_TOKEN_LENGTH};

/// Mint a single-use token for the already-authenticated client.
///
/// Mount behind the auth middleware, e.g.
/// `router.route("/token", post(generate_one_off_token))`. Responds with
/// the token value and its expiry; the token is consumed on first use.
pub async fn generate_one_off_token(
    State(authenticator): State<Arc<Authenticator>>,
    client: Option<Extension<ApiClient>>,
) -> Result<Json<OneOffToken>> {
    let config = authenticator.config();
    let Some(cache) = config.cache_driver() else {
        return Err(AuthError::internal_error(ErrorCode::CacheDisabled, None));
    };
    let Some(Extension(client)) = client else {
        return Err(AuthError::auth_error(ErrorCode::Unauthorized, None));
    };

    let token = OneOffToken {
        value: AlphanumericTokenFactory.generate(ONE_OFF_TOKEN_LENGTH),
        expires: Utc::now() + config.one_off_token_expiration(),
    };
    cache.set_client_by_one_off_token(&token, &client).await?;

    info!(client_id = %client.client_id, "one-off token minted");
    Ok(Json(token))
}
