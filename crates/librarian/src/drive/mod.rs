//! Remote storage API access.
//!
//! The traits here are the seam between the service core and the network:
//! [`DriveApi`] covers node metadata, folder listing, and content download;
//! [`TokenRefresher`] covers the OAuth refresh exchange. [`HttpDriveClient`]
//! implements both against the real service; tests substitute in-memory
//! fakes.

pub mod http;

use std::pin::Pin;

use bytes::Bytes;
use drive_api::{ApiError, NodePage, RemoteNode, TokenGrant};
use futures_util::Stream;

pub use http::HttpDriveClient;

/// Stream of content bytes from a remote download.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ApiError>> + Send>>;

/// Read access to the remote file tree.
///
/// Every method takes the access token explicitly; this crate never holds a
/// long-lived token, it asks the vault per operation.
#[allow(async_fn_in_trait)]
pub trait DriveApi: Send + Sync {
    /// Fetch metadata for a single node.
    async fn get_node(&self, access_token: &str, node_id: &str) -> Result<RemoteNode, ApiError>;

    /// List one page of a folder's direct children. Pass the previous
    /// page's continuation token to fetch the next page.
    async fn list_children(
        &self,
        access_token: &str,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<NodePage, ApiError>;

    /// Open a streaming download of a file's content.
    async fn download_content(
        &self,
        access_token: &str,
        file_id: &str,
    ) -> Result<ByteStream, ApiError>;
}

/// OAuth refresh exchange against the token endpoint.
#[allow(async_fn_in_trait)]
pub trait TokenRefresher: Send + Sync {
    /// Exchange a refresh token for a fresh access token grant.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError>;
}
