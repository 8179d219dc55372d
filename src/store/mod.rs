//! Credential store
//!
//! Persists users together with the single refresh token that is currently
//! valid for each of them. The session engine only talks to the
//! [`CredentialStore`] trait; [`PgCredentialStore`] backs production and
//! [`InMemoryCredentialStore`] backs tests and local runs.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

/// A persisted user
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    /// Last refresh token minted for this user; `None` when no session is active
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create a user and return its new id
    ///
    /// # Errors
    /// `ConflictError::EmailTaken` if the email is already registered
    async fn create(&self, email: &str, password_hash: &str) -> Result<Uuid, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError>;

    /// Overwrite the refresh token slot; `None` clears it
    async fn update_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), AppError>;

    /// Replace the refresh token only if the slot still holds `expected`
    ///
    /// Returns `false` when another write got there first.
    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> Result<bool, AppError>;
}
