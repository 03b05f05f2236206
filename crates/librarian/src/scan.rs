//! Bounded traversal of the remote library tree.
//!
//! The scanner walks an externally-owned folder tree the remote service
//! paginates, and reduces it to the files eligible for download. The tree is
//! adversarial input: it can be arbitrarily wide, deep, cyclic through
//! shared folders, or slow. Traversal is therefore iterative with an
//! explicit frontier, every bound is enforced fail-closed, and any listing
//! failure aborts the whole scan — a partial list is indistinguishable from
//! a complete one and would poison download revalidation.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use drive_api::{ApiError, NodeKind, RemoteNode};
use serde::Serialize;
use thiserror::Error;

use crate::config::ScanConfig;
use crate::drive::DriveApi;

/// Which bound a scan ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// More folders than `max_folders` would have been visited.
    FolderLimit(usize),
    /// More file nodes than `max_files` were observed, eligible or not.
    FileLimit(usize),
    /// A folder deeper than `max_depth` levels below the root was reached.
    DepthLimit(usize),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::FolderLimit(max) => write!(f, "more than {max} folders"),
            AbortReason::FileLimit(max) => write!(f, "more than {max} files"),
            AbortReason::DepthLimit(max) => write!(f, "folders nested deeper than {max} levels"),
        }
    }
}

/// Scan failures. Neither variant carries a partial file list.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A configured bound was exceeded.
    #[error("scan aborted: {0}")]
    Aborted(AbortReason),

    /// A page request failed or timed out.
    #[error("scan failed: {0}")]
    Api(#[from] ApiError),
}

/// A file that passed the eligibility predicate at scan time.
///
/// Eligibility is judged from declared metadata and is advisory: the
/// download pipeline re-checks the actual byte count during transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibleFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Declared size in bytes.
    pub size: u64,
}

/// Walks a folder tree and collects eligible files under strict bounds.
#[derive(Debug, Clone)]
pub struct TreeScanner {
    max_folders: usize,
    max_files: usize,
    max_depth: usize,
    eligible_mimes: HashSet<String>,
    max_file_size: u64,
}

impl TreeScanner {
    /// Build a scanner from the scan section plus the shared per-file size
    /// ceiling.
    pub fn new(scan: &ScanConfig, max_file_size: u64) -> Self {
        Self {
            max_folders: scan.max_folders,
            max_files: scan.max_files,
            max_depth: scan.max_depth,
            eligible_mimes: scan.eligible_mime_types.iter().cloned().collect(),
            max_file_size,
        }
    }

    /// Enumerate every eligible file under `root_id`.
    ///
    /// Folders are visited in FIFO order; within a folder, pages follow the
    /// service's continuation tokens. Bounds are checked after every page
    /// and folder. Returns the complete eligible list or an error — never a
    /// truncated list.
    pub async fn scan<D: DriveApi>(
        &self,
        drive: &D,
        access_token: &str,
        root_id: &str,
    ) -> Result<Vec<EligibleFile>, ScanError> {
        let mut frontier: VecDeque<(String, usize)> = VecDeque::new();
        frontier.push_back((root_id.to_string(), 0));
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(root_id.to_string());

        let mut eligible = Vec::new();
        let mut folders_visited = 0usize;
        let mut files_observed = 0usize;

        while let Some((folder_id, depth)) = frontier.pop_front() {
            if folders_visited >= self.max_folders {
                return Err(ScanError::Aborted(AbortReason::FolderLimit(
                    self.max_folders,
                )));
            }
            if depth > self.max_depth {
                return Err(ScanError::Aborted(AbortReason::DepthLimit(self.max_depth)));
            }
            folders_visited += 1;

            let mut page_token: Option<String> = None;
            loop {
                let page = drive
                    .list_children(access_token, &folder_id, page_token.as_deref())
                    .await?;

                for node in page.files {
                    match node.kind() {
                        NodeKind::Folder => {
                            // Shared folders can appear under several
                            // parents; visit each once.
                            if seen.insert(node.id.clone()) {
                                frontier.push_back((node.id, depth + 1));
                            }
                        }
                        NodeKind::File => {
                            files_observed += 1;
                            if let Some(file) = self.eligibility(&node) {
                                eligible.push(file);
                            }
                        }
                    }
                }

                if files_observed > self.max_files {
                    return Err(ScanError::Aborted(AbortReason::FileLimit(self.max_files)));
                }

                page_token = page.next_page_token;
                if page_token.is_none() {
                    break;
                }
            }
        }

        tracing::debug!(
            root_id,
            folders_visited,
            files_observed,
            eligible = eligible.len(),
            "scan complete"
        );
        Ok(eligible)
    }

    /// Accepted MIME type and a declared size within the ceiling. A file
    /// with no declared size cannot be bounded up front and is excluded.
    fn eligibility(&self, node: &RemoteNode) -> Option<EligibleFile> {
        if !self.eligible_mimes.contains(&node.mime_type) {
            return None;
        }
        let size = node.size?;
        if size > self.max_file_size {
            return None;
        }
        Some(EligibleFile {
            id: node.id.clone(),
            name: node.name.clone(),
            mime_type: node.mime_type.clone(),
            size,
        })
    }
}
