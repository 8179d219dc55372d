/// Authentication module
///
/// Token issuance/verification, password hashing, and the session engine
/// that rotates refresh tokens.

mod claims;
mod jwt;
mod password;
mod session;

pub use claims::{AccessClaims, RefreshClaims};
pub use jwt::{TokenIssuer, TokenPair};
pub use password::{hash_password, verify_password};
pub use session::{Session, SessionEngine};
