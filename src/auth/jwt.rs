/// Token issuance and verification
///
/// Mints access/refresh token pairs and verifies them. The issuer never
/// touches the credential store; whether a refresh token is still the
/// current one is decided by the session engine.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, RefreshClaims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// A freshly minted pair of bearer tokens
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs and verifies tokens with independent access/refresh secrets
#[derive(Clone)]
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_token_expiry: i64,
    refresh_token_expiry: Option<i64>,
    issuer: String,
}

impl TokenIssuer {
    pub fn new(config: &JwtSettings) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            access_token_expiry: config.access_token_expiry,
            refresh_token_expiry: config.refresh_token_expiry,
            issuer: config.issuer.clone(),
        }
    }

    /// Access token lifetime in seconds
    pub fn access_token_expiry(&self) -> i64 {
        self.access_token_expiry
    }

    /// Mint a new token pair for an already persisted user
    ///
    /// # Errors
    /// Returns an internal error if signing fails
    pub fn issue(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        let access_claims = AccessClaims::new(user_id, self.access_token_expiry, self.issuer.clone());
        let refresh_claims = RefreshClaims::new(user_id, self.refresh_token_expiry, self.issuer.clone());

        Ok(TokenPair {
            access_token: sign(&access_claims, &self.access_encoding)?,
            refresh_token: sign(&refresh_claims, &self.refresh_encoding)?,
        })
    }

    /// Verify an access token and return the user it was issued to
    ///
    /// # Errors
    /// `AuthError::InvalidToken` if the signature, issuer or expiry check fails
    pub fn verify_access_token(&self, token: &str) -> Result<Uuid, AppError> {
        let validation = self.validation(true);
        let claims: AccessClaims = verify(token, &self.access_decoding, &validation)?;
        claims.user_id()
    }

    /// Verify a refresh token's signature and return the user it names
    ///
    /// Expiry is only checked when the token carries an `exp` claim.
    pub fn verify_refresh_token(&self, token: &str) -> Result<Uuid, AppError> {
        let validation = self.validation(false);
        let claims: RefreshClaims = verify(token, &self.refresh_decoding, &validation)?;
        claims.user_id()
    }

    fn validation(&self, require_exp: bool) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        if !require_exp {
            validation.required_spec_claims.clear();
        }
        validation
    }
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, AppError> {
    encode(&Header::default(), claims, key)
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

fn verify<T: DeserializeOwned>(
    token: &str,
    key: &DecodingKey,
    validation: &Validation,
) -> Result<T, AppError> {
    decode::<T>(token, key, validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::warn!("JWT validation error: {}", e);
            AppError::Auth(AuthError::InvalidToken)
        })
}
