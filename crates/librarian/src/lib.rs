//! # Librarian Service Core
//!
//! This crate is the core of the librarian backend: it lets an
//! authenticated user pick a folder in their cloud storage as a "library
//! root", discovers the files under that root that are eligible for
//! processing (PDF, EPUB, DOCX under a size ceiling), and downloads the
//! selected ones into per-user local storage.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      LibraryService                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌────────────────┐  ┌──────────────┐  ┌────────────────┐   │
//! │  │  Credential    │  │    Tree      │  │   Download     │   │
//! │  │    Vault       │  │   Scanner    │  │   Pipeline     │   │
//! │  └────────────────┘  └──────────────┘  └────────────────┘   │
//! │          │                  │                  │            │
//! │  ┌───────┴─────────┐  ┌─────┴──────────────────┴────────┐   │
//! │  │ CredentialStore │  │        DriveApi / reqwest       │   │
//! │  └─────────────────┘  └─────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The vault keeps the delegated credential valid (and encrypted at rest),
//! the scanner walks the remote tree under strict bounds, and the pipeline
//! revalidates and streams content to disk. The HTTP routing layer that
//! calls into this crate, and the initial authorization handshake, live in
//! the embedding service.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use librarian::{HttpDriveClient, JsonCredentialStore, LibrarianConfig, LibraryService, TokenCipher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = LibrarianConfig::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     let cipher = TokenCipher::new(&config.vault.decoded_token_key()?)?;
//!     let store = Arc::new(JsonCredentialStore::open("credentials.json")?);
//!     let client = HttpDriveClient::new(&config)?;
//!     let service = LibraryService::new(&config, cipher, store, client.clone(), client);
//!
//!     let files = service.list_eligible_files("user-subject-id").await?;
//!     println!("{} eligible files", files.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: TOML configuration, validation, environment overrides
//! - [`vault`]: token encryption at rest, refresh, credential records
//! - [`drive`]: remote API traits and the HTTP client
//! - [`scan`]: bounded traversal of the remote tree
//! - [`download`]: revalidation, streaming, safe materialization
//! - [`service`]: the facade the routing layer consumes

pub mod config;
pub mod download;
pub mod drive;
pub mod scan;
pub mod service;
pub mod vault;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export wire types for convenience
pub use drive_api;

// Re-export config types for convenience
pub use config::LibrarianConfig;

// Re-export vault types for convenience
pub use vault::{
    CredentialStore, CredentialVault, JsonCredentialStore, TokenCipher, UserCredential, VaultError,
};

// Re-export drive types for convenience
pub use drive::{ByteStream, DriveApi, HttpDriveClient, TokenRefresher};

// Re-export scan types for convenience
pub use scan::{AbortReason, EligibleFile, ScanError, TreeScanner};

// Re-export download types for convenience
pub use download::{DownloadOutcome, DownloadPipeline, DownloadRecord};

// Re-export service types for convenience
pub use service::{LibraryService, ServiceError};
