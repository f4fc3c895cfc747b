//! Token value generation.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of generated one-off tokens.
pub const ONE_OFF_TOKEN_LENGTH: usize = 32;

/// Length of generated user bearer tokens.
pub const USER_TOKEN_LENGTH: usize = 32;

/// Default length of generated confirmation tokens.
pub const DEFAULT_CONFIRMATION_TOKEN_LENGTH: usize = 32;

/// Source of opaque token values (user bearer tokens, one-off tokens,
/// confirmation tokens).
pub trait TokenFactory: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

/// Generates uniformly random alphanumeric tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlphanumericTokenFactory;

impl TokenFactory for AlphanumericTokenFactory {
    fn generate(&self, length: usize) -> String {
        rand::thread_rng().sample_iter(&Alphanumeric).take(length).map(char::from).collect()
    }
}
