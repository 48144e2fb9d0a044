//! Auth session: bearer tokens and the identity they carry.
//!
//! Tokens are issued by the backend; this module only stores them, reads the
//! unverified JWT payload to learn the user id and expiry, and refreshes the
//! access token when it has expired. Signature verification is the backend's
//! job.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use gameshop_core::UserId;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::cart::CartIdentity;
use crate::storage::{KeyValueStore, StorageError};

/// Storage key of the persisted token pair.
pub const AUTH_TOKENS_KEY: &str = "authTokens";

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The access token is not a decodable JWT.
    #[error("malformed access token: {0}")]
    MalformedToken(String),

    /// The refresh token was rejected; the shopper must log in again.
    #[error("session expired, please log in again")]
    SessionExpired,

    /// Refreshing failed for a reason other than rejection.
    #[error("token refresh failed: {0}")]
    Refresh(#[from] ApiError),

    /// Persisting the tokens failed.
    #[error("token storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Claims read from the access token payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    pub user_id: UserId,
    /// Expiry as a Unix timestamp.
    pub exp: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl TokenClaims {
    /// Decode the payload segment of a JWT without verifying it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedToken`] if the token does not have three
    /// segments or the payload is not base64url-encoded JSON claims.
    pub fn decode(token: &str) -> Result<Self, AuthError> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(AuthError::MalformedToken("expected three segments".to_string())),
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| AuthError::MalformedToken(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| AuthError::MalformedToken(e.to_string()))
    }

    /// Expiry as a timestamp, if representable.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Whether the token is expired (or within a second of expiring) at `now`.
    #[must_use]
    pub const fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp - now.timestamp() < 1
    }
}

/// Access/refresh token pair with the decoded access claims.
#[derive(Clone)]
pub struct AuthTokens {
    access: SecretString,
    refresh: SecretString,
    claims: TokenClaims,
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access", &"[REDACTED]")
            .field("refresh", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish()
    }
}

impl AuthTokens {
    /// Wrap a token pair, decoding the access token's claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedToken`] if the access token cannot be decoded.
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Result<Self, AuthError> {
        let access = access.into();
        let claims = TokenClaims::decode(&access)?;
        Ok(Self {
            access: SecretString::from(access),
            refresh: SecretString::from(refresh.into()),
            claims,
        })
    }

    /// Bearer token for authenticated requests.
    #[must_use]
    pub const fn access(&self) -> &SecretString {
        &self.access
    }

    /// Token used to obtain a new access token.
    #[must_use]
    pub const fn refresh(&self) -> &SecretString {
        &self.refresh
    }

    /// Decoded access token claims.
    #[must_use]
    pub const fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// The cart identity these tokens authenticate.
    #[must_use]
    pub const fn identity(&self) -> CartIdentity {
        CartIdentity::User(self.claims.user_id)
    }
}

/// Persisted form of [`AuthTokens`].
#[derive(Serialize, Deserialize)]
struct StoredTokens {
    access: String,
    refresh: String,
}

/// The current shopper's tokens, mirrored to storage.
pub struct AuthSession {
    storage: Arc<dyn KeyValueStore>,
    tokens: Option<AuthTokens>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Restore the persisted session, if any.
    ///
    /// Unreadable or malformed persisted tokens are discarded with a warning.
    #[must_use]
    pub fn restore(storage: Arc<dyn KeyValueStore>) -> Self {
        let tokens = match storage.get(AUTH_TOKENS_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<StoredTokens>(&raw)
                .map_err(|e| AuthError::MalformedToken(e.to_string()))
                .and_then(|stored| AuthTokens::new(stored.access, stored.refresh))
                .map_err(|e| {
                    warn!(error = %e, "Discarding unreadable persisted tokens");
                    if let Err(e) = storage.remove(AUTH_TOKENS_KEY) {
                        warn!(error = %e, "Failed to remove unreadable tokens");
                    }
                })
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted tokens");
                None
            }
        };
        Self { storage, tokens }
    }

    /// Current tokens, if logged in.
    #[must_use]
    pub const fn tokens(&self) -> Option<&AuthTokens> {
        self.tokens.as_ref()
    }

    /// Whether a shopper is logged in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    /// The identity whose cart should be active.
    #[must_use]
    pub fn identity(&self) -> CartIdentity {
        self.tokens
            .as_ref()
            .map_or(CartIdentity::Guest, AuthTokens::identity)
    }

    /// Store freshly issued tokens.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the tokens cannot be persisted. The
    /// previous session is kept in that case.
    pub fn login(&mut self, tokens: AuthTokens) -> Result<(), AuthError> {
        let user_id = tokens.claims.user_id;
        let previous = self.tokens.replace(tokens);
        if let Err(e) = self.persist() {
            warn!(user_id = %user_id, error = %e, "Failed to persist tokens, login rolled back");
            self.tokens = previous;
            return Err(e);
        }
        info!(user_id = %user_id, "Logged in");
        Ok(())
    }

    /// Forget the tokens, in memory and on disk.
    pub fn logout(&mut self) {
        if let Some(tokens) = self.tokens.take() {
            info!(user_id = %tokens.claims.user_id, "Logged out");
        }
        if let Err(e) = self.storage.remove(AUTH_TOKENS_KEY) {
            warn!(error = %e, "Failed to remove persisted tokens");
        }
    }

    /// A usable access token, refreshing it first if it has expired.
    ///
    /// Returns `Ok(None)` for guests.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SessionExpired`] (and logs out) if the refresh
    /// token is rejected, or [`AuthError::Refresh`] if the backend could not
    /// be asked.
    pub async fn fresh_access_token(
        &mut self,
        api: &ApiClient,
    ) -> Result<Option<SecretString>, AuthError> {
        self.fresh_access_token_at(api, Utc::now()).await
    }

    async fn fresh_access_token_at(
        &mut self,
        api: &ApiClient,
        now: DateTime<Utc>,
    ) -> Result<Option<SecretString>, AuthError> {
        let Some(tokens) = self.tokens.as_ref() else {
            return Ok(None);
        };
        if !tokens.claims.is_expired_at(now) {
            return Ok(Some(tokens.access.clone()));
        }

        debug!(user_id = %tokens.claims.user_id, "Access token expired, refreshing");
        let refreshed = match api.refresh_token(&tokens.refresh).await {
            Ok(refreshed) => refreshed,
            Err(ApiError::Unauthorized(reason)) => {
                warn!(reason = %reason, "Refresh token rejected");
                self.logout();
                return Err(AuthError::SessionExpired);
            }
            Err(e) => return Err(AuthError::Refresh(e)),
        };

        let refresh = refreshed
            .refresh
            .unwrap_or_else(|| tokens.refresh.expose_secret().to_string());
        let renewed = AuthTokens::new(refreshed.access, refresh)?;
        let access = renewed.access.clone();
        self.tokens = Some(renewed);
        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to persist refreshed tokens");
        }
        Ok(Some(access))
    }

    fn persist(&self) -> Result<(), AuthError> {
        match &self.tokens {
            Some(tokens) => {
                let stored = StoredTokens {
                    access: tokens.access.expose_secret().to_string(),
                    refresh: tokens.refresh.expose_secret().to_string(),
                };
                let json = serde_json::to_string(&stored)
                    .map_err(|e| AuthError::MalformedToken(e.to_string()))?;
                self.storage.set(AUTH_TOKENS_KEY, &json)?;
            }
            None => self.storage.remove(AUTH_TOKENS_KEY)?,
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::storage::tests::FaultyStore;

    /// Unsigned JWT carrying `user_id` and `exp`.
    pub(crate) fn jwt(user_id: i32, exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::json!({ "user_id": user_id, "exp": exp, "username": "player" })
                .to_string(),
        );
        format!("{header}.{payload}.signature")
    }

    fn far_future() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_decode_claims() {
        let claims = TokenClaims::decode(&jwt(42, 1_900_000_000)).unwrap();
        assert_eq!(claims.user_id, UserId::new(42));
        assert_eq!(claims.username.as_deref(), Some("player"));
        assert_eq!(claims.expires_at().unwrap().timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert!(matches!(
            TokenClaims::decode("not-a-jwt"),
            Err(AuthError::MalformedToken(_))
        ));
        assert!(matches!(
            TokenClaims::decode("a.!!!.c"),
            Err(AuthError::MalformedToken(_))
        ));
        assert!(matches!(
            TokenClaims::decode("a.b.c.d"),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_expiry_has_one_second_margin() {
        let now = DateTime::from_timestamp(1_000, 0).unwrap();
        let claims = |exp| TokenClaims {
            user_id: UserId::new(1),
            exp,
            username: None,
            email: None,
        };
        assert!(claims(1_000).is_expired_at(now));
        assert!(!claims(1_001).is_expired_at(now));
    }

    #[test]
    fn test_tokens_debug_redacts_secrets() {
        let tokens = AuthTokens::new(jwt(1, far_future()), "refresh-secret-value").unwrap();
        let debug_output = format!("{tokens:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("refresh-secret-value"));
    }

    #[test]
    fn test_login_persists_and_restore_recovers_identity() {
        let storage = Arc::new(MemoryStore::new());
        let mut session = AuthSession::restore(storage.clone());
        assert_eq!(session.identity(), CartIdentity::Guest);

        session
            .login(AuthTokens::new(jwt(42, far_future()), "r").unwrap())
            .unwrap();
        assert!(storage.get(AUTH_TOKENS_KEY).unwrap().is_some());

        let restored = AuthSession::restore(storage.clone());
        assert_eq!(restored.identity(), CartIdentity::User(UserId::new(42)));

        session.logout();
        assert!(!session.is_authenticated());
        assert_eq!(storage.get(AUTH_TOKENS_KEY).unwrap(), None);
    }

    #[test]
    fn test_unpersisted_login_is_rolled_back() {
        let storage = Arc::new(FaultyStore {
            unwritable: vec![AUTH_TOKENS_KEY],
            ..FaultyStore::default()
        });
        let mut session = AuthSession::restore(storage);

        let err = session
            .login(AuthTokens::new(jwt(42, far_future()), "r").unwrap())
            .unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
        assert!(!session.is_authenticated());
        assert_eq!(session.identity(), CartIdentity::Guest);
    }

    #[test]
    fn test_restore_discards_garbage() {
        let storage = Arc::new(MemoryStore::new());
        storage
            .set(AUTH_TOKENS_KEY, r#"{"access":"nope","refresh":"r"}"#)
            .unwrap();
        let session = AuthSession::restore(storage.clone());
        assert!(!session.is_authenticated());
        assert_eq!(storage.get(AUTH_TOKENS_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_fresh_token_skips_refresh_while_valid() {
        let storage = Arc::new(MemoryStore::new());
        let mut session = AuthSession::restore(storage);
        let access = jwt(3, far_future());
        session
            .login(AuthTokens::new(access.clone(), "r").unwrap())
            .unwrap();

        // Unroutable backend: any refresh attempt would fail.
        let config = crate::config::StorefrontConfig::with_api_url("http://127.0.0.1:9/api").unwrap();
        let api = ApiClient::new(&config).unwrap();

        let token = session.fresh_access_token(&api).await.unwrap().unwrap();
        assert_eq!(token.expose_secret(), access);
    }

    #[tokio::test]
    async fn test_fresh_token_for_guest_is_none() {
        let mut session = AuthSession::restore(Arc::new(MemoryStore::new()));
        let config = crate::config::StorefrontConfig::with_api_url("http://127.0.0.1:9/api").unwrap();
        let api = ApiClient::new(&config).unwrap();
        assert!(session.fresh_access_token(&api).await.unwrap().is_none());
    }
}
