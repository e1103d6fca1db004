//! In-memory embedding index with single-file persistence.
//!
//! The index is immutable once built: every embed run produces a fresh [`EmbeddingIndex`] that
//! replaces the previous one wholesale. Search is an exact cosine-similarity scan, which is
//! plenty for a handful of uploaded PDFs.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;

const FORMAT_VERSION: u32 = 1;

/// Errors raised while building, searching, or persisting the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Number of vectors does not match the number of chunks.
    #[error("Index build received {vectors} vectors for {chunks} chunks")]
    LengthMismatch {
        /// Chunk count.
        chunks: usize,
        /// Vector count.
        vectors: usize,
    },
    /// A vector does not have the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Index dimension.
        expected: usize,
        /// Offending vector dimension.
        actual: usize,
    },
    /// Persisted artifact was written by an incompatible version.
    #[error("Unsupported index format version {0}")]
    UnsupportedVersion(u32),
    /// Reading or writing the artifact failed.
    #[error("Index I/O failed for {path}: {source}")]
    Io {
        /// Artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Artifact could not be encoded or decoded.
    #[error("Index serialization failed for {path}: {source}")]
    Serde {
        /// Artifact path.
        path: PathBuf,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// A bounded slice of a page's text, ready to be embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Chunk text.
    pub text: String,
    /// Path of the source document.
    pub source: String,
    /// Zero-based page the chunk was cut from.
    pub page: usize,
}

/// A chunk stored in the index together with its vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// Chunk text and provenance.
    #[serde(flatten)]
    pub chunk: TextChunk,
    /// Embedding vector for the chunk text.
    pub vector: Vec<f32>,
}

/// A chunk returned by [`EmbeddingIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    /// Chunk text and provenance.
    pub chunk: TextChunk,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Immutable set of embedded chunks produced by one ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingIndex {
    version: u32,
    model: String,
    dimension: usize,
    document_count: usize,
    created_at: String,
    entries: Vec<IndexedChunk>,
}

impl EmbeddingIndex {
    /// Pair chunks with their vectors, validating counts and dimensions.
    pub fn build(
        model: impl Into<String>,
        dimension: usize,
        document_count: usize,
        chunks: Vec<TextChunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedChunk { chunk, vector })
            .collect();

        Ok(Self {
            version: FORMAT_VERSION,
            model: model.into(),
            dimension,
            document_count,
            created_at: current_timestamp_rfc3339(),
            entries,
        })
    }

    /// Number of chunks held by the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension shared by every entry.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embedding model that produced the vectors.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of documents ingested into this index.
    pub fn document_count(&self) -> usize {
        self.document_count
    }

    /// RFC3339 timestamp of the build.
    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    /// Iterate over the stored chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &TextChunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    /// Return the `top_k` chunks most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine_similarity(query, &entry.vector)))
            .collect();
        scored.sort_by(|first, second| second.1.partial_cmp(&first.1).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(position, score)| RetrievedChunk {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Write the index to `path`, replacing any previous artifact atomically.
    pub async fn save(&self, path: &Path) -> Result<(), IndexError> {
        let encoded = serde_json::to_vec(self).map_err(|source| IndexError::Serde {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| IndexError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let staging = staging_path(path);
        tokio::fs::write(&staging, &encoded)
            .await
            .map_err(|source| IndexError::Io {
                path: staging.clone(),
                source,
            })?;
        if let Err(source) = tokio::fs::rename(&staging, path).await {
            if let Err(error) = tokio::fs::remove_file(&staging).await {
                tracing::warn!(path = %staging.display(), %error, "Failed to remove staging file");
            }
            return Err(IndexError::Io {
                path: path.to_path_buf(),
                source,
            });
        }

        tracing::debug!(
            path = %path.display(),
            chunks = self.len(),
            bytes = encoded.len(),
            "Persisted embedding index"
        );
        Ok(())
    }

    /// Load a persisted index, returning `None` when no artifact exists.
    pub async fn load(path: &Path) -> Result<Option<Self>, IndexError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(IndexError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let index: Self = serde_json::from_slice(&bytes).map_err(|source| IndexError::Serde {
            path: path.to_path_buf(),
            source,
        })?;
        if index.version != FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion(index.version));
        }
        if let Some(bad) = index
            .entries
            .iter()
            .find(|entry| entry.vector.len() != index.dimension)
        {
            return Err(IndexError::DimensionMismatch {
                expected: index.dimension,
                actual: bad.vector.len(),
            });
        }
        Ok(Some(index))
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4()));
    path.with_file_name(name)
}

/// Cosine similarity; zero vectors score `0.0` against everything.
pub fn cosine_similarity(first: &[f32], second: &[f32]) -> f32 {
    let (mut dot, mut norm_first, mut norm_second) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (left, right) in first.iter().zip(second) {
        dot += left * right;
        norm_first += left * left;
        norm_second += right * right;
    }
    if norm_first == 0.0 || norm_second == 0.0 {
        return 0.0;
    }
    dot / (norm_first.sqrt() * norm_second.sqrt())
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(text: &str, page: usize) -> TextChunk {
        TextChunk {
            text: text.into(),
            source: "data/doc.pdf".into(),
            page,
        }
    }

    fn sample_index() -> EmbeddingIndex {
        EmbeddingIndex::build(
            "test-model",
            2,
            1,
            vec![chunk("east", 0), chunk("north", 1), chunk("north-east", 2)],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
        )
        .expect("index")
    }

    #[test]
    fn search_orders_by_similarity_and_truncates() {
        let index = sample_index();
        let hits = index.search(&[0.0, 2.0], 2).expect("search");

        let texts: Vec<_> = hits.iter().map(|hit| hit.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["north", "north-east"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let index = EmbeddingIndex::build(
            "m",
            2,
            1,
            vec![chunk("first", 0), chunk("second", 0)],
            vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .expect("index");

        let hits = index.search(&[1.0, 0.0], 2).expect("search");
        assert_eq!(hits[0].chunk.text, "first");
        assert_eq!(hits[1].chunk.text, "second");
    }

    #[test]
    fn build_rejects_mismatched_inputs() {
        let error = EmbeddingIndex::build("m", 2, 1, vec![chunk("a", 0)], vec![])
            .expect_err("length mismatch");
        assert!(matches!(
            error,
            IndexError::LengthMismatch {
                chunks: 1,
                vectors: 0
            }
        ));

        let error = EmbeddingIndex::build("m", 2, 1, vec![chunk("a", 0)], vec![vec![1.0]])
            .expect_err("dimension mismatch");
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn search_rejects_wrong_query_dimension() {
        let error = sample_index()
            .search(&[1.0, 0.0, 0.0], 1)
            .expect_err("dimension");
        assert!(matches!(error, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn cosine_similarity_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn save_then_load_preserves_search_results() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested/vector_store.json");
        let index = sample_index();
        index.save(&path).await.expect("save");

        let restored = EmbeddingIndex::load(&path)
            .await
            .expect("load")
            .expect("artifact present");

        assert_eq!(restored.len(), 3);
        assert_eq!(restored.model(), "test-model");
        assert_eq!(restored.created_at(), index.created_at());
        assert_eq!(
            restored.search(&[1.0, 0.2], 3).expect("search"),
            index.search(&[1.0, 0.2], 3).expect("search")
        );
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().expect("parent"))
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn failed_rename_removes_staging_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("vector_store.json");
        std::fs::create_dir(&path).expect("occupy target with a directory");
        std::fs::write(path.join("keep.txt"), b"x").expect("write");

        let error = sample_index().save(&path).await.expect_err("rename onto directory");

        assert!(matches!(error, IndexError::Io { .. }));
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["vector_store.json".to_string()]);
    }

    #[tokio::test]
    async fn load_missing_artifact_is_none() {
        let dir = TempDir::new().expect("tempdir");
        let loaded = EmbeddingIndex::load(&dir.path().join("absent.json"))
            .await
            .expect("load");
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn load_corrupt_artifact_is_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("vector_store.json");
        std::fs::write(&path, b"{not json").expect("write");

        let error = EmbeddingIndex::load(&path).await.expect_err("corrupt");
        assert!(matches!(error, IndexError::Serde { .. }));
    }
}
