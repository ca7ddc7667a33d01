//! Session token verification.

use std::sync::Arc;
use std::time::Duration;

use bson::oid::ObjectId;
use tracing::debug;

use emotes_common::jwt::check_token_version;
use emotes_common::{AppError, AppResult, TokenSigner};
use emotes_db::structures::User;

use crate::queries::Query;

/// Resolves session tokens to users.
pub struct Authenticator {
    signer: TokenSigner,
    query: Arc<Query>,
}

impl Authenticator {
    /// Create an authenticator.
    #[must_use]
    pub const fn new(signer: TokenSigner, query: Arc<Query>) -> Self {
        Self { signer, query }
    }

    /// Issue a session token for `user` bound to its current token version.
    pub fn issue(&self, user: &User, ttl: Duration) -> AppResult<String> {
        self.signer
            .sign_user(&user.id.to_hex(), user.token_version, chrono_ttl(ttl)?)
    }

    /// Verify a session token and load its user with resolved roles.
    ///
    /// Unknown users and outdated token versions are unauthorized.
    pub async fn authenticate(&self, token: &str) -> AppResult<User> {
        let claims = self.signer.verify_user(token)?;
        let id = ObjectId::parse_str(&claims.u).map_err(|_| AppError::Unauthorized)?;

        let Some(user) = self.query.user(id).await? else {
            debug!(user_id = %id, "Token for unknown user");
            return Err(AppError::Unauthorized);
        };
        check_token_version(&claims, user.token_version)?;
        Ok(user)
    }
}

fn chrono_ttl(ttl: Duration) -> AppResult<chrono::Duration> {
    chrono::Duration::from_std(ttl).map_err(AppError::internal)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use emotes_common::config::CredentialsConfig;
    use emotes_common::{Cache, KeyScheme, MemoryKeyValueCache};
    use emotes_db::Collection;
    use emotes_db::test_utils::MemoryStore;

    fn authenticator(store: Arc<MemoryStore>) -> Authenticator {
        let cache = Cache::new(Arc::new(MemoryKeyValueCache::new()), KeyScheme::new("emotes", 1));
        let signer = TokenSigner::new(&CredentialsConfig {
            jwt_secret: "secret".into(),
            issuer: "emotes".into(),
        });
        Authenticator::new(signer, Arc::new(Query::new(store, cache)))
    }

    #[tokio::test]
    async fn test_authenticate_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let user = User::new(ObjectId::new(), "alice");
        store.seed_as(Collection::Users, &user).unwrap();
        let auth = authenticator(store);

        let token = auth.issue(&user, Duration::from_secs(60)).unwrap();
        let loaded = auth.authenticate(&token).await.unwrap();
        assert_eq!(loaded.id, user.id);
    }

    #[tokio::test]
    async fn test_bumped_token_version_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut user = User::new(ObjectId::new(), "alice");
        let auth = authenticator(store.clone());
        let token = auth.issue(&user, Duration::from_secs(60)).unwrap();

        user.token_version += 1;
        store.seed_as(Collection::Users, &user).unwrap();
        let err = auth.authenticate(&token).await.unwrap_err();
        assert_eq!(err.code(), 70401);
    }

    #[tokio::test]
    async fn test_unknown_user_is_rejected() {
        let auth = authenticator(Arc::new(MemoryStore::new()));
        let user = User::new(ObjectId::new(), "ghost");
        let token = auth.issue(&user, Duration::from_secs(60)).unwrap();
        assert!(matches!(
            auth.authenticate(&token).await,
            Err(AppError::Unauthorized)
        ));
    }
}
