/// Password Hashing and Verification
///
/// Thin wrapper over bcrypt. The salt is generated per hash and embedded in
/// the resulting string, so the store only keeps one opaque column.

use bcrypt::{hash, verify};

use crate::error::AppError;

/// Hash a password using bcrypt at the given cost
///
/// # Errors
/// Returns error if bcrypt rejects the cost or fails to hash
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// A malformed stored hash is treated as a mismatch rather than a server
/// error; the caller reports both as invalid credentials.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match verify(password, hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::error!("Password verification failed: {}", e);
            false
        }
    }
}
