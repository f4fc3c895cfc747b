//! # api-warden
//!
//! api-warden is an authentication, authorization and fair-use-policy (FUP)
//! middleware for axum-based HTTP APIs. It decides, before the business
//! handler runs, whether the caller is identified, whether its access scope
//! permits the requested operation, and whether its usage budget for the
//! current period is exhausted.
//!
//! ## Architecture
//!
//! ```text
//! Request → Credential Extractor → Principal Resolution (cache → provider)
//!             ↓                          ↓
//!         Scope Evaluation ← FUP Accounting (period buckets, cache-backed)
//!             ↓
//!         Accessible / On-Behalf (user chain) / typed 401, 403, 429, 500
//! ```
//!
//! ## Core Components
//!
//! - **Scope Evaluator**: hierarchical, regex-capable access and FUP scope
//!   trees with three-valued verdicts
//! - **Cache Driver**: prefixed key/value with TTL for principals, FUP
//!   counters and one-off tokens (in-process and Redis implementations)
//! - **FUP Engine**: period-bucketed counters with composable limit sources
//! - **Authenticator**: the per-request pipeline, mounted as axum middleware

pub mod cache;
pub mod checker;
pub mod config;
pub mod encoder;
pub mod entity;
pub mod errors;
pub mod extractor;
pub mod fup;
pub mod middleware;
pub mod provider;
pub mod request;
pub mod routes;
pub mod scope;
pub mod token;

// Re-export commonly used types and traits
pub use config::{ApiAuthConfig, ConfigProvider};
pub use errors::{AuthError, ErrorCode, Result};
pub use middleware::{api_auth_middleware, Authenticator};
pub use scope::{AccessScope, FupScope, ScopeVerdict};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
