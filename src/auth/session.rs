/// Session rotation
///
/// Each user has at most one live refresh token, kept in the credential
/// store. Register and login overwrite it; renew swaps it for a new one.
/// Presenting anything other than the current token revokes the session:
///
/// ```text
/// NO_SESSION --register/login--> ACTIVE(T) --renew(T)--> ACTIVE(T')
///                                    |
///                                    +--renew(stale)--> REVOKED --login--> ACTIVE
/// ```

use std::sync::Arc;
use uuid::Uuid;

use crate::auth::jwt::{TokenIssuer, TokenPair};
use crate::auth::password::{hash_password, verify_password};
use crate::error::{AppError, AuthError, DatabaseError};
use crate::store::{CredentialStore, UserRecord};
use crate::validators::{is_valid_email, is_valid_password};

/// Result of a successful register/login/renew
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub tokens: TokenPair,
}

pub struct SessionEngine {
    store: Arc<dyn CredentialStore>,
    issuer: TokenIssuer,
    hash_cost: u32,
}

impl SessionEngine {
    pub fn new(store: Arc<dyn CredentialStore>, issuer: TokenIssuer, hash_cost: u32) -> Self {
        Self {
            store,
            issuer,
            hash_cost,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Create a user and open their first session
    ///
    /// # Errors
    /// - `ValidationError` if email or password is missing, empty or malformed
    /// - `ConflictError` if the email is already registered
    pub async fn register(
        &self,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<Session, AppError> {
        let email = is_valid_email(email)?;
        let password = is_valid_password(password)?;
        let password_hash = hash_password(password, self.hash_cost)?;

        let user_id = self.store.create(&email, &password_hash).await?;
        let session = self.open_session(user_id).await?;

        tracing::info!(user_id = %user_id, "User registered");
        Ok(session)
    }

    /// Authenticate with email and password, replacing any prior session
    ///
    /// Unknown email, wrong password and missing fields all fail with the
    /// same `AuthError::InvalidCredentials`.
    pub async fn login(
        &self,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<Session, AppError> {
        let (email, password) = match (email, password) {
            (Some(email), Some(password)) => (email.trim(), password),
            _ => return Err(AuthError::InvalidCredentials.into()),
        };

        let user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials.into());
        }

        let session = self.open_session(user.id).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(session)
    }

    /// Exchange the current refresh token for a new pair
    ///
    /// # Errors
    /// - `MissingToken` if no token was presented
    /// - `InvalidToken` if the signature or expiry check fails
    /// - `UnknownUser` if the token names a user that does not exist
    /// - `SessionInvalidated` if the token is not the user's current one; the
    ///   stored token is cleared so the user has to log in again. A renew that
    ///   loses a rotation race to another renew fails the same way but keeps
    ///   the winner's token.
    pub async fn renew(&self, presented: Option<&str>) -> Result<Session, AppError> {
        let presented = presented
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let user_id = self.issuer.verify_refresh_token(presented)?;

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UnknownUser)?;

        if user.refresh_token.as_deref() != Some(presented) {
            return Err(self.revoke(user_id).await);
        }

        let tokens = self.issuer.issue(user_id)?;

        // A concurrent renew may have rotated the slot since it was read. The
        // first write wins; the loser leaves the winner's token in place.
        let rotated = self
            .store
            .rotate_refresh_token(user_id, presented, &tokens.refresh_token)
            .await?;
        if !rotated {
            tracing::warn!(user_id = %user_id, "Lost refresh rotation race");
            return Err(AuthError::SessionInvalidated.into());
        }

        tracing::info!(user_id = %user_id, "Refresh token rotated");
        Ok(Session { user_id, tokens })
    }

    /// Stateless access token check for protected routes
    pub fn verify_access_token(&self, token: &str) -> Result<Uuid, AppError> {
        self.issuer.verify_access_token(token)
    }

    /// Load the user an access token was issued to
    pub async fn current_user(&self, user_id: Uuid) -> Result<UserRecord, AppError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("user".to_string()).into())
    }

    async fn open_session(&self, user_id: Uuid) -> Result<Session, AppError> {
        let tokens = self.issuer.issue(user_id)?;
        self.store
            .update_refresh_token(user_id, Some(&tokens.refresh_token))
            .await?;
        Ok(Session { user_id, tokens })
    }

    async fn revoke(&self, user_id: Uuid) -> AppError {
        tracing::warn!(user_id = %user_id, "Stale refresh token presented, revoking session");

        match self.store.update_refresh_token(user_id, None).await {
            Ok(()) => AuthError::SessionInvalidated.into(),
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::JwtSettings;
    use crate::error::{ConflictError, ValidationError};
    use crate::store::InMemoryCredentialStore;

    const TEST_COST: u32 = 4;

    fn jwt_settings() -> JwtSettings {
        JwtSettings {
            access_token_secret: "test-access-secret-at-least-32-characters".to_string(),
            refresh_token_secret: "test-refresh-secret-at-least-32-characters".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: None,
            issuer: "test".to_string(),
        }
    }

    fn engine() -> (SessionEngine, Arc<InMemoryCredentialStore>) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let engine = SessionEngine::new(store.clone(), TokenIssuer::new(&jwt_settings()), TEST_COST);
        (engine, store)
    }

    async fn stored_token(store: &InMemoryCredentialStore, user_id: Uuid) -> Option<String> {
        store.find_by_id(user_id).await.unwrap().unwrap().refresh_token
    }

    fn assert_auth_error(result: Result<Session, AppError>, expected: AuthError) {
        match result {
            Err(AppError::Auth(actual)) => assert_eq!(actual, expected),
            other => panic!("expected {:?}, got {:?}", expected, other),
        }
    }

    #[tokio::test]
    async fn register_stores_refresh_token() {
        let (engine, store) = engine();

        let session = engine.register(Some("a@x.com"), Some("p1")).await.unwrap();

        assert_eq!(
            stored_token(&store, session.user_id).await,
            Some(session.tokens.refresh_token.clone())
        );
        let user = store.find_by_id(session.user_id).await.unwrap().unwrap();
        assert_ne!(user.password_hash, "p1");
    }

    #[tokio::test]
    async fn register_rejects_empty_password_without_persisting() {
        let (engine, store) = engine();

        let result = engine.register(Some("a@x.com"), Some("")).await;

        assert!(matches!(
            result,
            Err(AppError::Validation(ValidationError::EmptyField(_)))
        ));
        assert!(store.find_by_email("a@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn register_rejects_missing_email() {
        let (engine, _) = engine();

        let result = engine.register(None, Some("p1")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn register_twice_conflicts() {
        let (engine, _) = engine();

        engine.register(Some("a@x.com"), Some("p1")).await.unwrap();
        let result = engine.register(Some("a@x.com"), Some("p2")).await;

        assert!(matches!(
            result,
            Err(AppError::Conflict(ConflictError::EmailTaken))
        ));
    }

    #[tokio::test]
    async fn login_issues_distinct_token_and_supersedes_previous() {
        let (engine, store) = engine();

        let registered = engine.register(Some("a@x.com"), Some("p1")).await.unwrap();
        let logged_in = engine.login(Some("a@x.com"), Some("p1")).await.unwrap();

        assert_eq!(registered.user_id, logged_in.user_id);
        assert_ne!(registered.tokens.refresh_token, logged_in.tokens.refresh_token);
        assert_eq!(
            stored_token(&store, logged_in.user_id).await,
            Some(logged_in.tokens.refresh_token.clone())
        );

        assert_auth_error(
            engine.renew(Some(&registered.tokens.refresh_token)).await,
            AuthError::SessionInvalidated,
        );
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let (engine, _) = engine();
        engine.register(Some("a@x.com"), Some("p1")).await.unwrap();

        assert_auth_error(
            engine.login(Some("a@x.com"), Some("wrong")).await,
            AuthError::InvalidCredentials,
        );
        assert_auth_error(
            engine.login(Some("nobody@x.com"), Some("p1")).await,
            AuthError::InvalidCredentials,
        );
        assert_auth_error(
            engine.login(None, Some("p1")).await,
            AuthError::InvalidCredentials,
        );
    }

    #[tokio::test]
    async fn renew_rotates_token() {
        let (engine, store) = engine();
        let registered = engine.register(Some("a@x.com"), Some("p1")).await.unwrap();

        let renewed = engine
            .renew(Some(&registered.tokens.refresh_token))
            .await
            .unwrap();

        assert_eq!(renewed.user_id, registered.user_id);
        assert_ne!(renewed.tokens.refresh_token, registered.tokens.refresh_token);
        assert_eq!(
            stored_token(&store, renewed.user_id).await,
            Some(renewed.tokens.refresh_token.clone())
        );
    }

    #[tokio::test]
    async fn replayed_token_revokes_session_until_login() {
        let (engine, store) = engine();

        let r1 = engine.register(Some("a@x.com"), Some("p1")).await.unwrap();
        let user_id = r1.user_id;

        let r2 = engine.renew(Some(&r1.tokens.refresh_token)).await.unwrap();
        assert_eq!(stored_token(&store, user_id).await, Some(r2.tokens.refresh_token.clone()));

        assert_auth_error(
            engine.renew(Some(&r1.tokens.refresh_token)).await,
            AuthError::SessionInvalidated,
        );
        assert_eq!(stored_token(&store, user_id).await, None);

        // The token issued before the replay is dead too
        assert_auth_error(
            engine.renew(Some(&r2.tokens.refresh_token)).await,
            AuthError::SessionInvalidated,
        );

        let r3 = engine.login(Some("a@x.com"), Some("p1")).await.unwrap();
        assert_eq!(stored_token(&store, user_id).await, Some(r3.tokens.refresh_token.clone()));
        assert!(engine.renew(Some(&r3.tokens.refresh_token)).await.is_ok());
    }

    /// Serves one pre-recorded `find_by_id` result, as if the read happened
    /// before a concurrent renew rotated the slot.
    struct StaleReadStore {
        inner: Arc<InMemoryCredentialStore>,
        stale: std::sync::Mutex<Option<UserRecord>>,
    }

    #[async_trait::async_trait]
    impl CredentialStore for StaleReadStore {
        async fn create(&self, email: &str, password_hash: &str) -> Result<Uuid, AppError> {
            self.inner.create(email, password_hash).await
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
            self.inner.find_by_email(email).await
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
            let stale = self.stale.lock().unwrap().take();
            match stale {
                Some(record) => Ok(Some(record)),
                None => self.inner.find_by_id(id).await,
            }
        }

        async fn update_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), AppError> {
            self.inner.update_refresh_token(id, token).await
        }

        async fn rotate_refresh_token(
            &self,
            id: Uuid,
            expected: &str,
            next: &str,
        ) -> Result<bool, AppError> {
            self.inner.rotate_refresh_token(id, expected, next).await
        }
    }

    #[tokio::test]
    async fn losing_rotation_race_keeps_winner_session() {
        let (winner_engine, store) = engine();
        let r1 = winner_engine.register(Some("a@x.com"), Some("p1")).await.unwrap();
        let before_rotation = store.find_by_id(r1.user_id).await.unwrap().unwrap();

        let r2 = winner_engine
            .renew(Some(&r1.tokens.refresh_token))
            .await
            .unwrap();

        let racing_store = Arc::new(StaleReadStore {
            inner: store.clone(),
            stale: std::sync::Mutex::new(Some(before_rotation)),
        });
        let loser_engine =
            SessionEngine::new(racing_store, TokenIssuer::new(&jwt_settings()), TEST_COST);

        assert_auth_error(
            loser_engine.renew(Some(&r1.tokens.refresh_token)).await,
            AuthError::SessionInvalidated,
        );
        assert_eq!(
            stored_token(&store, r1.user_id).await,
            Some(r2.tokens.refresh_token.clone())
        );

        assert!(winner_engine.renew(Some(&r2.tokens.refresh_token)).await.is_ok());
    }

    #[tokio::test]
    async fn renew_requires_token() {
        let (engine, _) = engine();

        assert_auth_error(engine.renew(None).await, AuthError::MissingToken);
        assert_auth_error(engine.renew(Some("")).await, AuthError::MissingToken);
    }

    #[tokio::test]
    async fn renew_rejects_bad_signature() {
        let (engine, _) = engine();
        let registered = engine.register(Some("a@x.com"), Some("p1")).await.unwrap();

        assert_auth_error(
            engine.renew(Some("not.a.token")).await,
            AuthError::InvalidToken,
        );
        // An access token is signed with the other secret
        assert_auth_error(
            engine.renew(Some(&registered.tokens.access_token)).await,
            AuthError::InvalidToken,
        );
    }

    #[tokio::test]
    async fn renew_rejects_unknown_user() {
        let (engine, _) = engine();
        let orphan = engine.issuer().issue(Uuid::new_v4()).unwrap();

        assert_auth_error(
            engine.renew(Some(&orphan.refresh_token)).await,
            AuthError::UnknownUser,
        );
    }

    #[tokio::test]
    async fn access_token_round_trip() {
        let (engine, _) = engine();
        let session = engine.register(Some("a@x.com"), Some("p1")).await.unwrap();

        let user_id = engine.verify_access_token(&session.tokens.access_token).unwrap();
        assert_eq!(user_id, session.user_id);

        let user = engine.current_user(user_id).await.unwrap();
        assert_eq!(user.email, "a@x.com");
    }

    #[tokio::test]
    async fn current_user_missing() {
        let (engine, _) = engine();

        let result = engine.current_user(Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::Database(DatabaseError::NotFound(_)))));
    }
}
