//! Password hashing and verification.
//!
//! New hashes use Argon2id in PHC string format. Verification also accepts
//! legacy bcrypt hashes so existing principals keep working through one
//! rehash transition. Mismatches always surface as the generic
//! `InvalidCredentials`; callers never learn whether the login exists.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::entity::ApiUser;
use crate::errors::{AuthError, ErrorCode, Result};

/// Create an Argon2 hasher with recommended parameters.
///
/// Memory cost 768 KiB with a single iteration keeps verification under the
/// request latency budget while staying memory-hard.
pub fn password_hasher() -> Argon2<'static> {
    const MEMORY_COST_KIB: u32 = 768;
    const ITERATIONS: u32 = 1;
    const PARALLELISM: u32 = 1;
    let params = Params::new(MEMORY_COST_KIB, ITERATIONS, PARALLELISM, Some(32))
        .expect("valid Argon2 parameters");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Hash a plaintext password into a PHC format string.
pub fn encrypt_password(plain_password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = password_hasher()
        .hash_password(plain_password.as_bytes(), &salt)
        .map_err(|_| AuthError::internal_error(ErrorCode::EncryptionError, None))?;
    Ok(hash.to_string())
}

/// Verify a candidate password against the user's stored hash.
///
/// PHC-format hashes are verified with Argon2; anything else falls back to
/// bcrypt (legacy hashes from before the Argon2 migration).
pub fn compare_password(user: &ApiUser, password: &str) -> Result<()> {
    let stored = &user.password;
    match PasswordHash::new(stored) {
        Ok(parsed) => {
            if password_hasher().verify_password(password.as_bytes(), &parsed).is_ok() {
                return Ok(());
            }
        }
        Err(_) => {
            if bcrypt::verify(password, stored).unwrap_or(false) {
                return Ok(());
            }
        }
    }
    Err(AuthError::auth_error(ErrorCode::InvalidCredentials, None))
}
