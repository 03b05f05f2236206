//! HTTP implementation of the remote API traits.
//!
//! One shared `reqwest` client serves metadata, listing, content, and token
//! requests. Every request carries an explicit timeout from configuration.
//! Wire-level outcomes are mapped into [`ApiError`] here, once, so the rest
//! of the crate never sees a status code.

use std::time::Duration;

use anyhow::{Context, Result};
use drive_api::{ApiError, NodePage, RemoteNode, TokenErrorBody, TokenGrant};
use futures_util::TryStreamExt;
use reqwest::{Client, Response, StatusCode};
use url::Url;

use super::{ByteStream, DriveApi, TokenRefresher};
use crate::config::LibrarianConfig;

/// Metadata fields requested for every node.
const NODE_FIELDS: &str = "id, name, mimeType, size, parents";

/// Fields requested per listing page.
const PAGE_FIELDS: &str = "nextPageToken, files(id, name, mimeType, size)";

/// Remote API client over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpDriveClient {
    http: Client,
    base_url: Url,
    token_url: Url,
    client_id: String,
    client_secret: String,
    request_timeout: Duration,
    stream_timeout: Duration,
}

impl HttpDriveClient {
    /// Build a client from the `[api]`, `[scan]` and `[download]` sections.
    pub fn new(config: &LibrarianConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.api.drive_base_url)
            .with_context(|| format!("invalid drive_base_url: {}", config.api.drive_base_url))?;
        anyhow::ensure!(
            base_url.path_segments().is_some(),
            "drive_base_url cannot be a base: {}",
            config.api.drive_base_url
        );
        // A trailing slash keeps later path pushes from clobbering the
        // version segment.
        if !base_url.path().ends_with('/') {
            let slashed = format!("{}/", base_url.path());
            base_url.set_path(&slashed);
        }

        let token_url = Url::parse(&config.api.token_url)
            .with_context(|| format!("invalid token_url: {}", config.api.token_url))?;

        let http = Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            token_url,
            client_id: config.api.client_id.clone(),
            client_secret: config.api.client_secret.clone(),
            request_timeout: config.scan.request_timeout(),
            stream_timeout: config.download.stream_timeout(),
        })
    }

    /// URL for one node, with the id percent-encoded as a single path
    /// segment so a hostile id cannot rewrite the path.
    fn node_url(&self, node_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("files").push(node_id);
        }
        url
    }

    fn files_url(&self) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("files");
        }
        url
    }
}

impl DriveApi for HttpDriveClient {
    async fn get_node(&self, access_token: &str, node_id: &str) -> Result<RemoteNode, ApiError> {
        let response = self
            .http
            .get(self.node_url(node_id))
            .bearer_auth(access_token)
            .query(&[("fields", NODE_FIELDS)])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response, node_id)?;
        decode_json(response).await
    }

    async fn list_children(
        &self,
        access_token: &str,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<NodePage, ApiError> {
        let mut params = vec![
            (
                "q",
                format!("'{folder_id}' in parents and trashed = false"),
            ),
            ("fields", PAGE_FIELDS.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let response = self
            .http
            .get(self.files_url())
            .bearer_auth(access_token)
            .query(&params)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response, folder_id)?;
        decode_json(response).await
    }

    async fn download_content(
        &self,
        access_token: &str,
        file_id: &str,
    ) -> Result<ByteStream, ApiError> {
        let response = self
            .http
            .get(self.node_url(file_id))
            .bearer_auth(access_token)
            .query(&[("alt", "media")])
            .timeout(self.stream_timeout)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response, file_id)?;

        let stream = response
            .bytes_stream()
            .map_err(|e| ApiError::Transient(format!("content stream failed: {e}")));
        Ok(Box::pin(stream))
    }
}

impl TokenRefresher for HttpDriveClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return decode_json(response).await;
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }

        // The endpoint reports grant problems in the body, usually with a
        // 400 status.
        match response.json::<TokenErrorBody>().await {
            Ok(body) if body.is_grant_rejection() => Err(ApiError::GrantRevoked(body.describe())),
            Ok(body) => Err(ApiError::Transient(format!(
                "token endpoint returned {status}: {}",
                body.describe()
            ))),
            Err(_) => Err(ApiError::Transient(format!(
                "token endpoint returned {status}"
            ))),
        }
    }
}

/// Map transport-level failures (timeout, connect, proxy) to the taxonomy.
fn transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Transient(format!("request timed out: {error}"))
    } else {
        ApiError::Transient(error.to_string())
    }
}

/// Map a non-success status to the taxonomy; pass success through.
fn check_status(response: Response, resource: &str) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::NOT_FOUND => ApiError::NotFound(resource.to_string()),
        s => ApiError::Transient(format!("remote service returned {s}")),
    })
}

async fn decode_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::Transient(format!("failed to read response body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpDriveClient {
        let mut config = LibrarianConfig::default();
        config.api.drive_base_url = "https://storage.example.test/drive/v3".to_string();
        HttpDriveClient::new(&config).unwrap()
    }

    #[test]
    fn test_node_url_keeps_version_segment() {
        let url = client().node_url("abc123");
        assert_eq!(
            url.as_str(),
            "https://storage.example.test/drive/v3/files/abc123"
        );
    }

    #[test]
    fn test_node_url_encodes_hostile_ids() {
        // An id with separators must stay a single path segment.
        let url = client().node_url("../../admin");
        assert_eq!(
            url.as_str(),
            "https://storage.example.test/drive/v3/files/..%2F..%2Fadmin"
        );
    }

    #[test]
    fn test_trailing_slash_base_is_accepted() {
        let mut config = LibrarianConfig::default();
        config.api.drive_base_url = "https://storage.example.test/drive/v3/".to_string();
        let client = HttpDriveClient::new(&config).unwrap();
        assert_eq!(
            client.files_url().as_str(),
            "https://storage.example.test/drive/v3/files"
        );
    }

    #[test]
    fn test_invalid_urls_are_rejected_at_construction() {
        let mut config = LibrarianConfig::default();
        config.api.drive_base_url = "not a url".to_string();
        assert!(HttpDriveClient::new(&config).is_err());

        let mut config = LibrarianConfig::default();
        config.api.token_url = ":::".to_string();
        assert!(HttpDriveClient::new(&config).is_err());
    }
}
