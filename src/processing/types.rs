//! Core data types and error definitions for the ingestion and query pipeline.

use crate::{
    embedding::EmbeddingClientError,
    extract::ExtractionError,
    generation::CompletionClientError,
    index::{IndexError, RetrievedChunk},
    store::StoreError,
};
use anyhow::Error as TokenizerError;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while turning page text into bounded chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible length budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable.
    #[error("failed to initialize tokenizer: {source}")]
    Tokenizer {
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// How a failure should be reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller can fix the request.
    Input,
    /// Something failed on our side or in a collaborator.
    Unexpected,
}

/// Errors emitted by upload, embed and query operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Upload request carried no file.
    #[error("No file uploaded.")]
    MissingUpload,
    /// Embed was requested with an empty document store.
    #[error("No documents found in the document store. Please check the upload.")]
    NoDocuments,
    /// Documents were found but none produced any text.
    #[error("No text could be extracted from the documents. Please check the content of the PDF files.")]
    NoExtractableText,
    /// Query arrived before any successful embed.
    #[error("Vector store not created. Please call /embed first.")]
    IndexNotReady,
    /// Query text was blank.
    #[error("Question is required.")]
    EmptyQuestion,
    /// Embedding provider returned no vector for the question.
    #[error("Embedding provider returned no vector for the question")]
    EmptyEmbedding,
    /// Document store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A stored document could not be read or parsed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Chunking failed.
    #[error("Failed to chunk documents: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Completion provider failed.
    #[error(transparent)]
    Completion(#[from] CompletionClientError),
    /// Index build, search or persistence failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Blocking worker panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),
}

impl ServiceError {
    /// Classify the error for the HTTP layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingUpload
            | Self::NoDocuments
            | Self::NoExtractableText
            | Self::IndexNotReady
            | Self::EmptyQuestion
            | Self::Store(StoreError::EmptyUpload(_) | StoreError::InvalidFileName(_)) => {
                ErrorKind::Input
            }
            _ => ErrorKind::Unexpected,
        }
    }
}

/// Result of storing one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Sanitized name the file was stored under.
    pub file_name: String,
    /// Full path of the stored file.
    pub path: PathBuf,
}

/// Summary of a completed embed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbedOutcome {
    /// PDFs read from the document store.
    pub documents_processed: usize,
    /// Chunks held by the new index.
    pub text_chunks: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Whether an answer was produced without falling back to placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    /// Provider answered and retrieval returned context.
    Complete,
    /// Answer or context is a placeholder.
    Partial,
}

/// Answer plus the chunks it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnswer {
    /// Generated answer, or the no-answer placeholder.
    pub answer: String,
    /// Retrieved chunks, best first.
    pub context: Vec<RetrievedChunk>,
    /// Placeholder marker.
    pub status: AnswerStatus,
}

/// Description of the index currently serving queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    /// Embedding model that produced the vectors.
    pub model: String,
    /// Vector dimension.
    pub dimension: usize,
    /// Documents ingested by the run that built the index.
    pub documents: usize,
    /// Chunks held by the index.
    pub chunks: usize,
    /// RFC3339 build timestamp.
    pub created_at: String,
}
