//! Service facade exposed to the routing layer.
//!
//! One `LibraryService` owns the vault, the remote client, the scanner and
//! the download pipeline, and exposes the four operations the routing layer
//! maps to endpoints. User identifiers come from the authenticated session,
//! never from request payloads.
//!
//! Every remote operation follows the reactive retry contract: attempt with
//! a vault token, and on an authorization rejection force one refresh and
//! retry exactly once. The two attempts are written out as two states, so
//! the at-most-one-retry guarantee is visible in the control flow.

use std::sync::Arc;

use drive_api::{ApiError, NodeKind};
use thiserror::Error;

use crate::config::LibrarianConfig;
use crate::download::{DownloadError, DownloadPipeline, DownloadRecord};
use crate::drive::{DriveApi, TokenRefresher};
use crate::scan::{AbortReason, EligibleFile, ScanError, TreeScanner};
use crate::vault::{CredentialStore, CredentialVault, StoreError, TokenCipher, VaultError};

/// Failures surfaced to the routing layer.
///
/// The routing layer maps `ReauthenticationRequired` to an
/// authentication-required response, `ScanAborted` and `Validation` to
/// client-actionable errors, and the rest to retryable/generic failures
/// with no internal detail leaked.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The user must go back through the authorization handshake.
    #[error("reauthentication required: {0}")]
    ReauthenticationRequired(String),

    /// A scan bound was exceeded; no list was produced.
    #[error("scan aborted: {0}")]
    ScanAborted(AbortReason),

    /// The request was rejected before any work happened.
    #[error("{0}")]
    Validation(String),

    /// A remote call failed for a retryable reason.
    #[error("transient remote failure: {0}")]
    Remote(ApiError),

    /// Local persistence or filesystem failure.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<VaultError> for ServiceError {
    fn from(error: VaultError) -> Self {
        match error {
            VaultError::ReauthenticationRequired(msg) => Self::ReauthenticationRequired(msg),
            // A credential that fails authentication cannot be repaired;
            // the only way forward is a fresh handshake.
            VaultError::Integrity(e) => Self::ReauthenticationRequired(format!(
                "stored credential is unusable ({e}); sign in again"
            )),
            VaultError::Refresh(api) => Self::Remote(api),
            VaultError::Store(e) => Self::Storage(e.to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<ScanError> for ServiceError {
    fn from(error: ScanError) -> Self {
        match error {
            ScanError::Aborted(reason) => Self::ScanAborted(reason),
            ScanError::Api(api) => Self::Remote(api),
        }
    }
}

impl From<DownloadError> for ServiceError {
    fn from(error: DownloadError) -> Self {
        match error {
            DownloadError::BatchTooLarge { requested, limit } => Self::Validation(format!(
                "at most {limit} files per request, got {requested}"
            )),
            DownloadError::Scan(e) => e.into(),
            DownloadError::Io(e) => Self::Storage(e.to_string()),
        }
    }
}

/// The library core: root-folder selection, eligible-file listing, and
/// downloads for authenticated users.
pub struct LibraryService<S, R, D> {
    vault: CredentialVault<S, R>,
    drive: D,
    scanner: TreeScanner,
    pipeline: DownloadPipeline,
    store: Arc<S>,
}

impl<S, R, D> LibraryService<S, R, D>
where
    S: CredentialStore,
    R: TokenRefresher,
    D: DriveApi,
{
    /// Assemble the service from configuration and its collaborators.
    pub fn new(
        config: &LibrarianConfig,
        cipher: TokenCipher,
        store: Arc<S>,
        refresher: R,
        drive: D,
    ) -> Self {
        let vault = CredentialVault::new(
            cipher,
            Arc::clone(&store),
            refresher,
            config.vault.refresh_lookahead(),
        );
        let scanner = TreeScanner::new(&config.scan, config.download.max_file_size);
        let pipeline = DownloadPipeline::new(config.storage.root.clone(), &config.download);
        Self {
            vault,
            drive,
            scanner,
            pipeline,
            store,
        }
    }

    /// Store `folder_id` as the user's library root after confirming it
    /// exists, is reachable with the user's credential, and is a folder.
    ///
    /// A rejected id leaves the stored root untouched.
    pub async fn set_root_folder(&self, user_id: &str, folder_id: &str) -> Result<(), ServiceError> {
        let folder_id = folder_id.trim();
        if folder_id.is_empty() {
            return Err(ServiceError::Validation(
                "folder id cannot be empty".to_string(),
            ));
        }

        // First attempt with the current token, second after one forced
        // refresh if the token was rejected.
        let token = self.vault.access_token(user_id).await?;
        let node = match self.drive.get_node(&token, folder_id).await {
            Err(ApiError::Unauthorized) => {
                let token = self.vault.force_refresh(user_id).await?;
                self.drive.get_node(&token, folder_id).await
            }
            first => first,
        };

        let node = match node {
            Ok(node) => node,
            Err(ApiError::NotFound(_)) => {
                return Err(ServiceError::Validation(
                    "folder not found or not accessible; check the id and your storage access"
                        .to_string(),
                ))
            }
            Err(ApiError::Unauthorized) => {
                return Err(ServiceError::ReauthenticationRequired(
                    "access token rejected after a forced refresh".to_string(),
                ))
            }
            Err(e) => return Err(ServiceError::Remote(e)),
        };

        if node.kind() != NodeKind::Folder {
            return Err(ServiceError::Validation(
                "the id refers to a file, not a folder".to_string(),
            ));
        }

        let mut credential = self.store.get(user_id)?.ok_or_else(|| {
            ServiceError::ReauthenticationRequired("no stored credential for this user".to_string())
        })?;
        credential.root_folder_id = Some(folder_id.to_string());
        self.store.update(&credential)?;

        tracing::info!(user_id, folder_id, "library root set");
        Ok(())
    }

    /// The user's current library root, if one is set.
    pub fn root_folder(&self, user_id: &str) -> Result<Option<String>, ServiceError> {
        Ok(self
            .store
            .get(user_id)?
            .and_then(|credential| credential.root_folder_id))
    }

    /// Every eligible file under the user's root. Empty (without scanning)
    /// when no root is set.
    pub async fn list_eligible_files(
        &self,
        user_id: &str,
    ) -> Result<Vec<EligibleFile>, ServiceError> {
        let Some(root_id) = self.root_folder(user_id)? else {
            return Ok(Vec::new());
        };
        self.scan_with_retry(user_id, &root_id).await
    }

    /// Download the requested files into the user's storage namespace.
    ///
    /// Returns one record per requested id; invalid ids are rejected
    /// individually while the batch continues.
    pub async fn download_files(
        &self,
        user_id: &str,
        file_ids: &[String],
    ) -> Result<Vec<DownloadRecord>, ServiceError> {
        if file_ids.is_empty() {
            return Ok(Vec::new());
        }
        let Some(root_id) = self.root_folder(user_id)? else {
            return Err(ServiceError::Validation(
                "set a library root folder first".to_string(),
            ));
        };

        let token = self.vault.access_token(user_id).await?;
        let first = self
            .pipeline
            .download(&self.drive, &self.scanner, &token, user_id, &root_id, file_ids)
            .await;
        match first {
            Err(DownloadError::Scan(ScanError::Api(ApiError::Unauthorized))) => {
                let token = self.vault.force_refresh(user_id).await?;
                let second = self
                    .pipeline
                    .download(&self.drive, &self.scanner, &token, user_id, &root_id, file_ids)
                    .await;
                match second {
                    Err(DownloadError::Scan(ScanError::Api(ApiError::Unauthorized))) => {
                        Err(ServiceError::ReauthenticationRequired(
                            "access token rejected after a forced refresh".to_string(),
                        ))
                    }
                    other => other.map_err(Into::into),
                }
            }
            other => other.map_err(Into::into),
        }
    }

    /// Scan with the reactive one-retry contract.
    async fn scan_with_retry(
        &self,
        user_id: &str,
        root_id: &str,
    ) -> Result<Vec<EligibleFile>, ServiceError> {
        let token = self.vault.access_token(user_id).await?;
        match self.scanner.scan(&self.drive, &token, root_id).await {
            Err(ScanError::Api(ApiError::Unauthorized)) => {
                let token = self.vault.force_refresh(user_id).await?;
                match self.scanner.scan(&self.drive, &token, root_id).await {
                    Err(ScanError::Api(ApiError::Unauthorized)) => {
                        Err(ServiceError::ReauthenticationRequired(
                            "access token rejected after a forced refresh".to_string(),
                        ))
                    }
                    other => other.map_err(Into::into),
                }
            }
            other => other.map_err(Into::into),
        }
    }
}
