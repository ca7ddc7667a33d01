//! Token signing and verification (HMAC-SHA256).
//!
//! User tokens carry the user id and the token version; bumping
//! `users.token_version` invalidates every token issued before.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::config::CredentialsConfig;
use crate::{AppError, AppResult};

/// Claims of a user session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    /// User id (hex).
    pub u: String,
    /// Token version the user had when the token was issued.
    pub v: i32,
    /// Issuer.
    pub iss: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

/// Claims of a CSRF state token used during account linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfClaims {
    /// Random state value.
    pub s: String,
    /// Created at (unix millis).
    pub at: i64,
    /// Object id the flow is bound to (hex).
    pub bind: String,
    /// Whether the flow binds to an existing account.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub old: bool,
    /// Issuer.
    pub iss: String,
    /// Expiry (unix seconds).
    pub exp: i64,
}

/// Signs and verifies tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
}

impl TokenSigner {
    /// Create a signer from credentials configuration.
    #[must_use]
    pub fn new(config: &CredentialsConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
        }
    }

    /// Issue a user token valid for `ttl`.
    pub fn sign_user(&self, user_id: &str, token_version: i32, ttl: Duration) -> AppResult<String> {
        let now = Utc::now();
        let claims = UserClaims {
            u: user_id.to_string(),
            v: token_version,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        self.sign(&claims)
    }

    /// Issue a CSRF token valid for `ttl`.
    pub fn sign_csrf(&self, state: &str, bind: &str, old: bool, ttl: Duration) -> AppResult<String> {
        let now = Utc::now();
        let claims = CsrfClaims {
            s: state.to_string(),
            at: now.timestamp_millis(),
            bind: bind.to_string(),
            old,
            iss: self.issuer.clone(),
            exp: (now + ttl).timestamp(),
        };
        self.sign(&claims)
    }

    /// Verify a user token's signature, issuer and expiry.
    pub fn verify_user(&self, token: &str) -> AppResult<UserClaims> {
        self.verify(token)
    }

    /// Verify a CSRF token.
    pub fn verify_csrf(&self, token: &str) -> AppResult<CsrfClaims> {
        self.verify(token)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> AppResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(AppError::internal)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> AppResult<T> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        decode::<T>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthorized)
    }
}

/// Reject a user token whose version no longer matches the user's.
pub fn check_token_version(claims: &UserClaims, current_version: i32) -> AppResult<()> {
    if claims.v == current_version {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}
