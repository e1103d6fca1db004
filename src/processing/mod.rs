//! Ingestion and query pipeline: chunking, prompt assembly, and the service tying them together.

pub mod chunking;
pub mod prompt;
mod service;
pub mod types;

pub use service::{PdfQueryService, PipelineSettings, QueryApi};
pub use types::{
    AnswerStatus, ChunkingError, EmbedOutcome, ErrorKind, IndexStatus, QueryAnswer, ServiceError,
    UploadOutcome,
};
