//! PDF text extraction.
//!
//! Each PDF yields one [`DocumentPage`] per page, tagged with the source path and a zero-based
//! page number. Pages whose text cannot be decoded are logged and skipped; a file whose PDF
//! structure cannot be parsed at all is an error.

use lopdf::Document;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while turning a stored document into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// File could not be read from disk.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Document path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// File is not a parseable PDF.
    #[error("Failed to parse PDF {path}: {message}")]
    Parse {
        /// Document path.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
}

/// Text of a single page together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPage {
    /// Path of the document the page came from.
    pub source: String,
    /// Zero-based page number within the document.
    pub page: usize,
    /// Extracted text.
    pub text: String,
}

/// Converts a stored document into page texts.
pub trait TextExtractor: Send + Sync {
    /// Extract every page of the document at `path`.
    fn extract(&self, path: &Path) -> Result<Vec<DocumentPage>, ExtractionError>;
}

/// Extractor backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    /// Construct the extractor.
    pub const fn new() -> Self {
        Self
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<DocumentPage>, ExtractionError> {
        let bytes = std::fs::read(path).map_err(|source| ExtractionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document = Document::load_mem(&bytes).map_err(|error| ExtractionError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;

        let source = path.display().to_string();
        let mut pages = Vec::new();
        for (index, page_number) in document.get_pages().into_keys().enumerate() {
            match document.extract_text(&[page_number]) {
                Ok(text) => pages.push(DocumentPage {
                    source: source.clone(),
                    page: index,
                    text,
                }),
                Err(error) => {
                    tracing::warn!(
                        source = %source,
                        page = index,
                        error = %error,
                        "Skipping page without decodable text"
                    );
                }
            }
        }

        tracing::debug!(source = %source, pages = pages.len(), "Extracted PDF text");
        Ok(pages)
    }
}
