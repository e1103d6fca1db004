//! Session-scoped document store backed by a single directory.
//!
//! Uploaded files live directly under the configured directory. The directory is emptied when the
//! server starts and again when it stops, so uploads never leak across sessions.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Errors raised by the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Upload carried no bytes.
    #[error("Uploaded file '{0}' is empty.")]
    EmptyUpload(String),
    /// Client-supplied filename has no usable characters once sanitized.
    #[error("Invalid file name: '{0}'")]
    InvalidFileName(String),
    /// Filesystem operation failed.
    #[error("Document store I/O failed for {path}: {source}")]
    Io {
        /// Path involved in the failing operation.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Directory holding the documents uploaded during the current session.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Create a store rooted at `root`. Nothing touches the filesystem until first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory backing this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure the directory exists and holds no documents.
    pub async fn reset(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|error| StoreError::io(&self.root, error))?;
        self.clear_all().await
    }

    /// Persist an upload under its sanitized name, overwriting any file with the same name.
    pub async fn store(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let sanitized = sanitize_file_name(file_name)
            .ok_or_else(|| StoreError::InvalidFileName(file_name.to_string()))?;
        if bytes.is_empty() {
            return Err(StoreError::EmptyUpload(sanitized));
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|error| StoreError::io(&self.root, error))?;
        let path = self.root.join(&sanitized);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|error| StoreError::io(&path, error))?;
        tracing::info!(
            file = %sanitized,
            bytes = bytes.len(),
            path = %path.display(),
            "Stored upload"
        );
        Ok(path)
    }

    /// Remove every file and sub-directory, leaving an empty directory behind.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(StoreError::io(&self.root, error)),
        };

        let mut removed = 0_usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| StoreError::io(&self.root, error))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|error| StoreError::io(&path, error))?;
            let result = if file_type.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            result.map_err(|error| StoreError::io(&path, error))?;
            removed += 1;
        }

        tracing::debug!(root = %self.root.display(), removed, "Cleared document store");
        Ok(())
    }

    /// List every stored PDF, recursively, sorted by path.
    pub async fn list_documents(&self) -> Result<Vec<PathBuf>, StoreError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || collect_pdfs(&root))
            .await
            .map_err(|error| StoreError::io(&self.root, std::io::Error::other(error)))?
    }
}

fn collect_pdfs(root: &Path) -> Result<Vec<PathBuf>, StoreError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|error| {
            let path = error.path().unwrap_or(root).to_path_buf();
            StoreError::io(&path, std::io::Error::other(error))
        })?;
        if entry.file_type().is_file() && is_pdf(entry.path()) {
            documents.push(entry.into_path());
        }
    }
    documents.sort();
    Ok(documents)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Only the final component survives (both `/` and `\` count as separators), characters outside
/// `[A-Za-z0-9._-]` become `_`, and leading dots are dropped. Returns `None` when nothing usable
/// remains.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        None
    } else {
        Some(cleaned.to_string())
    }
}
