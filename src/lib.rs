#![deny(missing_docs)]

//! Core library for the PDF query service: upload PDFs, embed them, ask grounded questions.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// PDF text extraction.
pub mod extract;
/// Completion clients for answer generation.
pub mod generation;
/// In-memory embedding index and its persisted artifact.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Service counters.
pub mod metrics;
/// Ingestion and query pipeline.
pub mod processing;
/// Session-scoped document store.
pub mod store;
