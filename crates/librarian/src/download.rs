//! Download pipeline: revalidation, streaming, safe materialization.
//!
//! Files are transferred only after their ids are revalidated against a
//! freshly recomputed eligible set, so a stale listing (or an id from
//! someone else's tree) can never reach disk. Content streams into a
//! temporary file in the destination directory while bytes are counted;
//! crossing the ceiling aborts that transfer and removes the partial file.
//! Completed transfers move into place with an atomic rename under a
//! sanitized, collision-suffixed name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::DownloadConfig;
use crate::drive::DriveApi;
use crate::scan::{EligibleFile, ScanError, TreeScanner};

/// Longest sanitized filename kept, in characters.
const MAX_NAME_CHARS: usize = 200;

/// Batch-level failures. Per-file failures live in [`DownloadOutcome`].
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request held more ids than the configured maximum; nothing was
    /// written.
    #[error("at most {limit} files per request, got {requested}")]
    BatchTooLarge { requested: usize, limit: usize },

    /// The revalidation scan did not complete; without a complete eligible
    /// set no id can be trusted.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The destination directory could not be prepared.
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// What happened to one requested file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Stored at `path` after a complete transfer.
    Saved { path: PathBuf, bytes_written: u64 },
    /// The id was not in the freshly recomputed eligible set.
    Rejected { reason: String },
    /// The stream crossed the size ceiling; the partial file was removed.
    SizeExceeded { limit: u64 },
    /// The transfer failed; nothing reached the destination.
    Failed { error: String },
}

/// Outcome of one requested file id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    pub file_id: String,
    pub outcome: DownloadOutcome,
}

/// Streams eligible files into per-user storage.
#[derive(Debug, Clone)]
pub struct DownloadPipeline {
    storage_root: PathBuf,
    max_batch: usize,
    max_file_size: u64,
}

impl DownloadPipeline {
    pub fn new(storage_root: PathBuf, download: &DownloadConfig) -> Self {
        Self {
            storage_root,
            max_batch: download.max_batch,
            max_file_size: download.max_file_size,
        }
    }

    /// Transfer the requested files into the user's storage namespace.
    ///
    /// Returns exactly one record per requested id. Individual failures do
    /// not abort the batch; batch-level failures write nothing.
    pub async fn download<D: DriveApi>(
        &self,
        drive: &D,
        scanner: &TreeScanner,
        access_token: &str,
        user_id: &str,
        root_id: &str,
        requested: &[String],
    ) -> Result<Vec<DownloadRecord>, DownloadError> {
        if requested.len() > self.max_batch {
            return Err(DownloadError::BatchTooLarge {
                requested: requested.len(),
                limit: self.max_batch,
            });
        }

        // Recompute eligibility now: the tree may have changed since the
        // caller listed it, and ids from outside this root must never
        // reach disk.
        let eligible = scanner.scan(drive, access_token, root_id).await?;
        let by_id: HashMap<&str, &EligibleFile> =
            eligible.iter().map(|f| (f.id.as_str(), f)).collect();

        let raw_dir = self.user_raw_dir(user_id);
        fs::create_dir_all(&raw_dir).await?;

        let mut records = Vec::with_capacity(requested.len());
        for file_id in requested {
            let outcome = match by_id.get(file_id.as_str()) {
                Some(file) => self.transfer(drive, access_token, file, &raw_dir).await,
                None => DownloadOutcome::Rejected {
                    reason: "not an eligible file under the current library root".to_string(),
                },
            };
            records.push(DownloadRecord {
                file_id: file_id.clone(),
                outcome,
            });
        }
        Ok(records)
    }

    /// Destination directory, derived solely from the authenticated user id.
    fn user_raw_dir(&self, user_id: &str) -> PathBuf {
        self.storage_root
            .join("users")
            .join(format!("user_{user_id}"))
            .join("drive")
            .join("raw")
    }

    async fn transfer<D: DriveApi>(
        &self,
        drive: &D,
        access_token: &str,
        file: &EligibleFile,
        raw_dir: &Path,
    ) -> DownloadOutcome {
        let mut stream = match drive.download_content(access_token, &file.id).await {
            Ok(stream) => stream,
            Err(e) => {
                return DownloadOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        // Temp file lives in the destination directory so the final move is
        // a same-filesystem atomic rename. The guard removes it on any exit
        // path that is not that rename, including cancellation.
        let temp_path = raw_dir.join(format!(".{}.part", Uuid::new_v4().simple()));
        let guard = TempFileGuard::new(temp_path.clone());
        let mut out = match fs::File::create(&temp_path).await {
            Ok(file) => file,
            Err(e) => {
                return DownloadOutcome::Failed {
                    error: format!("failed to create temp file: {e}"),
                }
            }
        };

        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    return DownloadOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            written += chunk.len() as u64;
            if written > self.max_file_size {
                // Declared metadata lied; the running count is the truth.
                tracing::warn!(
                    file_id = %file.id,
                    limit = self.max_file_size,
                    "transfer exceeded size ceiling, aborting"
                );
                return DownloadOutcome::SizeExceeded {
                    limit: self.max_file_size,
                };
            }
            if let Err(e) = out.write_all(&chunk).await {
                return DownloadOutcome::Failed {
                    error: format!("failed to write temp file: {e}"),
                };
            }
        }
        if let Err(e) = out.flush().await {
            return DownloadOutcome::Failed {
                error: format!("failed to flush temp file: {e}"),
            };
        }
        drop(out);

        let base_name = sanitize_filename(&file.name)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let destination = resolve_destination(raw_dir, &base_name).await;

        match fs::rename(&temp_path, &destination).await {
            Ok(()) => {
                guard.disarm();
                DownloadOutcome::Saved {
                    path: destination,
                    bytes_written: written,
                }
            }
            Err(e) => DownloadOutcome::Failed {
                error: format!("failed to move file into place: {e}"),
            },
        }
    }
}

/// Removes the temp file on drop unless disarmed by a successful rename.
struct TempFileGuard {
    path: PathBuf,
    armed: std::cell::Cell<bool>,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            armed: std::cell::Cell::new(true),
        }
    }

    fn disarm(&self) {
        self.armed.set(false);
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed.get() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to remove temp file");
                }
            }
        }
    }
}

/// Reduce a remote display name to something safe for the local filesystem.
///
/// Path separators, reserved characters, control characters, and whitespace
/// collapse to single underscores; the result is truncated to 200
/// characters. Returns `None` when nothing usable remains (empty input, or
/// only separators/dots), in which case the caller substitutes a generated
/// name.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let mut out = String::with_capacity(name.len());
    let mut last_was_substitute = false;
    for ch in name.chars() {
        let reserved = matches!(ch, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            || ch.is_whitespace()
            || ch.is_control();
        if reserved {
            if !last_was_substitute {
                out.push('_');
                last_was_substitute = true;
            }
        } else {
            out.push(ch);
            last_was_substitute = false;
        }
    }

    let out: String = out.chars().take(MAX_NAME_CHARS).collect();
    if out.chars().all(|c| matches!(c, '.' | '_')) {
        return None;
    }
    Some(out)
}

/// First free path for `base_name` in `dir`, appending `_1`, `_2`, … before
/// the extension until no existing file is in the way.
async fn resolve_destination(dir: &Path, base_name: &str) -> PathBuf {
    let candidate = dir.join(base_name);
    if fs::metadata(&candidate).await.is_err() {
        return candidate;
    }

    let (stem, extension) = match base_name.rsplit_once('.') {
        // A leading dot is a hidden-file marker, not an extension split.
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (base_name, None),
    };

    let mut counter = 1usize;
    loop {
        let name = match extension {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = dir.join(name);
        if fs::metadata(&candidate).await.is_err() {
            return candidate;
        }
        counter += 1;
    }
}
