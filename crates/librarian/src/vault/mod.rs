//! Credential vault: encrypted token storage and refresh.
//!
//! The vault is the only component that sees plaintext tokens. It guarantees
//! that every outbound remote call can carry a currently-valid access token:
//! proactively refreshing when the stored token expires within the lookahead
//! window, and reactively when a caller reports an authorization failure
//! (`force_refresh`, used at most once per remote call).

pub mod cipher;
pub mod store;

pub use cipher::{CipherError, TokenCipher};
pub use store::{CredentialStore, JsonCredentialStore, StoreError, UserCredential};

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use drive_api::ApiError;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::drive::TokenRefresher;

/// Failures producing a valid access token.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The delegated grant is gone (revoked, never completed, or the record
    /// is missing). The user must go back through the authorization
    /// handshake; callers must not retry.
    #[error("reauthentication required: {0}")]
    ReauthenticationRequired(String),

    /// Stored ciphertext failed authentication. Fatal for this credential;
    /// the only recovery is a new authorization handshake.
    #[error("credential cipher failure: {0}")]
    Integrity(#[from] CipherError),

    /// The refresh exchange failed for a retryable reason (timeout, 5xx).
    #[error("token refresh failed: {0}")]
    Refresh(ApiError),

    /// The credential record could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Produces currently-valid access tokens, refreshing as needed.
///
/// Refreshes for one user are serialized through a per-user async mutex, and
/// the record is re-read after the lock is acquired, so two concurrent
/// callers never perform two exchanges or persist an inconsistent pair.
pub struct CredentialVault<S, R> {
    cipher: TokenCipher,
    store: Arc<S>,
    refresher: R,
    lookahead: Duration,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: CredentialStore, R: TokenRefresher> CredentialVault<S, R> {
    /// Build a vault over a credential store and refresh exchanger.
    ///
    /// `lookahead` is the window before expiry inside which a token is
    /// refreshed proactively.
    pub fn new(cipher: TokenCipher, store: Arc<S>, refresher: R, lookahead: Duration) -> Self {
        Self {
            cipher,
            store,
            refresher,
            lookahead,
            refresh_locks: DashMap::new(),
        }
    }

    /// Return a currently-valid access token for the user, refreshing first
    /// if the stored one expires within the lookahead window.
    pub async fn access_token(&self, user_id: &str) -> Result<String, VaultError> {
        let credential = self.load(user_id)?;
        if !needs_refresh(&credential, self.lookahead) {
            return Ok(self.cipher.decrypt(&credential.encrypted_access_token)?);
        }
        self.refresh_serialized(user_id, false).await
    }

    /// Refresh unconditionally, bypassing the expiry check.
    ///
    /// Reactive path: a caller whose remote call was rejected with an
    /// authorization error asks for this once, then retries that call
    /// exactly once.
    pub async fn force_refresh(&self, user_id: &str) -> Result<String, VaultError> {
        self.refresh_serialized(user_id, true).await
    }

    fn load(&self, user_id: &str) -> Result<UserCredential, VaultError> {
        self.store.get(user_id)?.ok_or_else(|| {
            VaultError::ReauthenticationRequired("no stored credential for this user".to_string())
        })
    }

    async fn refresh_serialized(&self, user_id: &str, force: bool) -> Result<String, VaultError> {
        let lock = self
            .refresh_locks
            .entry(user_id.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        // Re-read under the lock: a concurrent caller may have refreshed
        // while we waited.
        let credential = self.load(user_id)?;
        if !force && !needs_refresh(&credential, self.lookahead) {
            return Ok(self.cipher.decrypt(&credential.encrypted_access_token)?);
        }

        let refresh_token = match &credential.encrypted_refresh_token {
            Some(sealed) => self.cipher.decrypt(sealed)?,
            None => {
                return Err(VaultError::ReauthenticationRequired(
                    "no refresh token on record; offline access must be granted again".to_string(),
                ))
            }
        };

        let grant = match self.refresher.refresh(&refresh_token).await {
            Ok(grant) => grant,
            Err(ApiError::GrantRevoked(detail)) => {
                return Err(VaultError::ReauthenticationRequired(format!(
                    "refresh grant rejected: {detail}"
                )))
            }
            Err(ApiError::Unauthorized) => {
                return Err(VaultError::ReauthenticationRequired(
                    "token endpoint rejected the refresh request".to_string(),
                ))
            }
            Err(other) => return Err(VaultError::Refresh(other)),
        };

        let mut updated = credential;
        updated.encrypted_access_token = self.cipher.encrypt(&grant.access_token)?;
        updated.access_token_expires_at =
            Some(SystemTime::now() + Duration::from_secs(grant.expires_in));
        // The authority rotates refresh tokens at its discretion; absence
        // means the stored one stays valid.
        if let Some(rotated) = &grant.refresh_token {
            updated.encrypted_refresh_token = Some(self.cipher.encrypt(rotated)?);
        }
        self.store.update(&updated)?;

        tracing::info!(user_id, forced = force, "access token refreshed");
        Ok(grant.access_token)
    }
}

/// Refresh when the expiry is unknown or falls inside the lookahead window.
fn needs_refresh(credential: &UserCredential, lookahead: Duration) -> bool {
    match credential.access_token_expires_at {
        None => true,
        Some(expiry) => expiry <= SystemTime::now() + lookahead,
    }
}
