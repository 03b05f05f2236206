//! In-memory fakes shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use bytes::Bytes;
use drive_api::{ApiError, NodePage, RemoteNode, TokenGrant, FOLDER_MIME};
use futures_util::stream;

use crate::drive::{ByteStream, DriveApi, TokenRefresher};
use crate::vault::store::{CredentialStore, StoreError, UserCredential};

/// Credential store backed by a plain map, no file.
pub(crate) struct MemoryCredentialStore {
    records: RwLock<HashMap<String, UserCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, user_id: &str) -> Result<Option<UserCredential>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(user_id).cloned())
    }

    fn update(&self, credential: &UserCredential) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        records.insert(credential.user_id.clone(), credential.clone());
        Ok(())
    }
}

enum RefreshOutcome {
    Grant {
        access_token: String,
        rotated_refresh_token: Option<String>,
    },
    Revoked,
    Unavailable,
}

/// Scripted token refresher that counts exchanges.
pub(crate) struct FakeRefresher {
    calls: AtomicUsize,
    delay: Option<Duration>,
    outcome: RefreshOutcome,
}

impl FakeRefresher {
    pub fn granting(access_token: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: None,
            outcome: RefreshOutcome::Grant {
                access_token: access_token.to_string(),
                rotated_refresh_token: None,
            },
        }
    }

    pub fn rotating(access_token: &str, refresh_token: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: None,
            outcome: RefreshOutcome::Grant {
                access_token: access_token.to_string(),
                rotated_refresh_token: Some(refresh_token.to_string()),
            },
        }
    }

    pub fn revoked() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: None,
            outcome: RefreshOutcome::Revoked,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: None,
            outcome: RefreshOutcome::Unavailable,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenRefresher for FakeRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.outcome {
            RefreshOutcome::Grant {
                access_token,
                rotated_refresh_token,
            } => Ok(TokenGrant {
                access_token: access_token.clone(),
                expires_in: 3600,
                refresh_token: rotated_refresh_token.clone(),
            }),
            RefreshOutcome::Revoked => Err(ApiError::GrantRevoked("invalid_grant".to_string())),
            RefreshOutcome::Unavailable => {
                Err(ApiError::Transient("token endpoint unavailable".to_string()))
            }
        }
    }
}

/// In-memory remote tree with pagination and scripted failures.
pub(crate) struct FakeDrive {
    nodes: HashMap<String, RemoteNode>,
    children: HashMap<String, Vec<String>>,
    content: HashMap<String, Vec<u8>>,
    page_size: usize,
    chunk_size: usize,
    failing_folders: HashSet<String>,
    /// File id -> byte count after which the content stream errors out.
    broken_streams: HashMap<String, usize>,
    /// When set, any other bearer token is rejected with 401.
    accepted_tokens: Option<HashSet<String>>,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            children: HashMap::new(),
            content: HashMap::new(),
            page_size: 100,
            chunk_size: 8 * 1024,
            failing_folders: HashSet::new(),
            broken_streams: HashMap::new(),
            accepted_tokens: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn accepting_only(mut self, tokens: &[&str]) -> Self {
        self.accepted_tokens = Some(tokens.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn add_folder(&mut self, id: &str, name: &str, parent: Option<&str>) {
        self.nodes.insert(
            id.to_string(),
            RemoteNode {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: FOLDER_MIME.to_string(),
                size: None,
                parents: parent.map(|p| vec![p.to_string()]).unwrap_or_default(),
            },
        );
        self.children.entry(id.to_string()).or_default();
        if let Some(parent) = parent {
            self.attach(parent, id);
        }
    }

    pub fn add_file(&mut self, id: &str, name: &str, mime: &str, size: Option<u64>, parent: &str) {
        self.nodes.insert(
            id.to_string(),
            RemoteNode {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: mime.to_string(),
                size,
                parents: vec![parent.to_string()],
            },
        );
        self.attach(parent, id);
    }

    /// Link an existing node under an additional parent (shared folders).
    pub fn attach(&mut self, parent: &str, child: &str) {
        self.children
            .entry(parent.to_string())
            .or_default()
            .push(child.to_string());
    }

    pub fn set_content(&mut self, id: &str, content: Vec<u8>) {
        self.content.insert(id.to_string(), content);
    }

    pub fn fail_listing(&mut self, folder_id: &str) {
        self.failing_folders.insert(folder_id.to_string());
    }

    pub fn break_stream_after(&mut self, file_id: &str, bytes: usize) {
        self.broken_streams.insert(file_id.to_string(), bytes);
    }

    fn check_token(&self, access_token: &str) -> Result<(), ApiError> {
        match &self.accepted_tokens {
            Some(accepted) if !accepted.contains(access_token) => Err(ApiError::Unauthorized),
            _ => Ok(()),
        }
    }
}

impl DriveApi for FakeDrive {
    async fn get_node(&self, access_token: &str, node_id: &str) -> Result<RemoteNode, ApiError> {
        self.check_token(access_token)?;
        self.nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(node_id.to_string()))
    }

    async fn list_children(
        &self,
        access_token: &str,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<NodePage, ApiError> {
        self.check_token(access_token)?;
        if self.failing_folders.contains(folder_id) {
            return Err(ApiError::Transient("listing request timed out".to_string()));
        }
        let ids = self
            .children
            .get(folder_id)
            .ok_or_else(|| ApiError::NotFound(folder_id.to_string()))?;

        let offset: usize = match page_token {
            Some(token) => token
                .parse()
                .map_err(|_| ApiError::MalformedResponse("bad page token".to_string()))?,
            None => 0,
        };
        let end = (offset + self.page_size).min(ids.len());
        let files = ids[offset..end]
            .iter()
            .filter_map(|id| self.nodes.get(id).cloned())
            .collect();
        let next_page_token = (end < ids.len()).then(|| end.to_string());

        Ok(NodePage {
            files,
            next_page_token,
        })
    }

    async fn download_content(
        &self,
        access_token: &str,
        file_id: &str,
    ) -> Result<ByteStream, ApiError> {
        self.check_token(access_token)?;
        let content = self
            .content
            .get(file_id)
            .ok_or_else(|| ApiError::NotFound(file_id.to_string()))?;

        let mut items: Vec<Result<Bytes, ApiError>> = Vec::new();
        match self.broken_streams.get(file_id) {
            Some(&good_bytes) => {
                let good = &content[..good_bytes.min(content.len())];
                for chunk in good.chunks(self.chunk_size) {
                    items.push(Ok(Bytes::copy_from_slice(chunk)));
                }
                items.push(Err(ApiError::Transient(
                    "content stream interrupted".to_string(),
                )));
            }
            None => {
                for chunk in content.chunks(self.chunk_size) {
                    items.push(Ok(Bytes::copy_from_slice(chunk)));
                }
            }
        }
        Ok(Box::pin(stream::iter(items)))
    }
}
