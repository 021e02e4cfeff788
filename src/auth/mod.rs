pub mod password;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;

/// Payload of both access and refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub idx: i64,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token generation failed: {0}")]
    Generation(String),
}

/// Access and refresh token pair returned by sign-in, sign-up and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedTokens {
    pub access_token: String,
    #[serde(skip)]
    pub refresh_token: String,
}

struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime_secs: i64,
}

impl TokenKeys {
    fn new(secret: &str, lifetime_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime_secs: i64::try_from(lifetime_secs).unwrap_or(i64::MAX),
        }
    }
}

/// Issues and verifies HS256 tokens. Access and refresh tokens use separate
/// secrets so one can never be replayed as the other.
pub struct TokenService {
    access: TokenKeys,
    refresh: TokenKeys,
    validation: Validation,
}

impl TokenService {
    pub fn new(security: &SecurityConfig) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);

        Self {
            access: TokenKeys::new(&security.jwt_access_secret, security.jwt_access_expires_secs),
            refresh: TokenKeys::new(&security.jwt_refresh_secret, security.jwt_refresh_expires_secs),
            validation,
        }
    }

    pub fn refresh_lifetime_secs(&self) -> i64 {
        self.refresh.lifetime_secs
    }

    pub fn issue(&self, idx: i64) -> Result<IssuedTokens, TokenError> {
        let now = Utc::now();
        Ok(IssuedTokens {
            access_token: Self::sign(&self.access, idx, now)?,
            refresh_token: Self::sign(&self.refresh, idx, now)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(&self.access, token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(&self.refresh, token)
    }

    fn sign(keys: &TokenKeys, idx: i64, now: DateTime<Utc>) -> Result<String, TokenError> {
        let iat = now.timestamp();
        let claims = Claims {
            idx,
            iat,
            exp: iat.saturating_add(keys.lifetime_secs),
        };
        encode(&Header::default(), &claims, &keys.encoding).map_err(|e| TokenError::Generation(e.to_string()))
    }

    fn verify(&self, keys: &TokenKeys, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &keys.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }
}

/// A token issued before the last password change is stale. Comparison is in
/// whole seconds, so a token issued in the same second as the change survives.
pub fn is_token_fresh(iat: i64, password_updated_at: Option<DateTime<Utc>>) -> bool {
    match password_updated_at {
        Some(updated_at) => iat >= updated_at.timestamp(),
        None => true,
    }
}
