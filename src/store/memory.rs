use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{CredentialStore, UserRecord};
use crate::error::{AppError, ConflictError};

/// In-process credential store
///
/// State lives only as long as the process; used by tests and local runs
/// without a database.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: Mutex<HashMap<Uuid, UserRecord>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> Result<MutexGuard<'_, HashMap<Uuid, UserRecord>>, AppError> {
        self.users
            .lock()
            .map_err(|_| AppError::Internal("credential store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<Uuid, AppError> {
        let mut users = self.users()?;

        if users.values().any(|user| user.email == email) {
            return Err(ConflictError::EmailTaken.into());
        }

        let id = Uuid::new_v4();
        users.insert(
            id,
            UserRecord {
                id,
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                refresh_token: None,
                created_at: Utc::now(),
            },
        );

        Ok(id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        Ok(self.users()?.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        Ok(self.users()?.get(&id).cloned())
    }

    async fn update_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), AppError> {
        if let Some(user) = self.users()?.get_mut(&id) {
            user.refresh_token = token.map(str::to_string);
        }
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> Result<bool, AppError> {
        let mut users = self.users()?;
        match users.get_mut(&id) {
            Some(user) if user.refresh_token.as_deref() == Some(expected) => {
                user.refresh_token = Some(next.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_find() {
        let store = InMemoryCredentialStore::new();
        let id = store.create("a@x.com", "hash").await.unwrap();

        let by_id = store.find_by_id(id).await.unwrap().expect("user by id");
        let by_email = store.find_by_email("a@x.com").await.unwrap().expect("user by email");

        assert_eq!(by_id, by_email);
        assert_eq!(by_id.password_hash, "hash");
        assert!(by_id.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryCredentialStore::new();
        store.create("a@x.com", "hash").await.unwrap();

        let result = store.create("a@x.com", "other").await;
        assert!(matches!(result, Err(AppError::Conflict(ConflictError::EmailTaken))));
    }

    #[tokio::test]
    async fn test_missing_user() {
        let store = InMemoryCredentialStore::new();
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.find_by_email("nobody@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_clear_refresh_token() {
        let store = InMemoryCredentialStore::new();
        let id = store.create("a@x.com", "hash").await.unwrap();

        store.update_refresh_token(id, Some("r1")).await.unwrap();
        let user = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.refresh_token.as_deref(), Some("r1"));

        store.update_refresh_token(id, None).await.unwrap();
        let user = store.find_by_id(id).await.unwrap().unwrap();
        assert!(user.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_rotate_only_when_expected_matches() {
        let store = InMemoryCredentialStore::new();
        let id = store.create("a@x.com", "hash").await.unwrap();
        store.update_refresh_token(id, Some("r1")).await.unwrap();

        assert!(store.rotate_refresh_token(id, "r1", "r2").await.unwrap());
        assert!(!store.rotate_refresh_token(id, "r1", "r3").await.unwrap());

        let user = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.refresh_token.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_rotate_fails_on_cleared_slot() {
        let store = InMemoryCredentialStore::new();
        let id = store.create("a@x.com", "hash").await.unwrap();

        assert!(!store.rotate_refresh_token(id, "r1", "r2").await.unwrap());
    }
}
