use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing upload, ingestion and query activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_uploaded: AtomicU64,
    embed_runs: AtomicU64,
    last_documents_processed: AtomicU64,
    last_text_chunks: AtomicU64,
    queries_answered: AtomicU64,
    partial_answers: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stored upload.
    pub fn record_upload(&self) {
        self.documents_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful embed run and the size of the index it produced.
    pub fn record_embed(&self, documents: u64, chunks: u64) {
        self.embed_runs.fetch_add(1, Ordering::Relaxed);
        self.last_documents_processed
            .store(documents, Ordering::Relaxed);
        self.last_text_chunks.store(chunks, Ordering::Relaxed);
    }

    /// Record an answered query, flagging answers that fell back to placeholders.
    pub fn record_query(&self, partial: bool) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
        if partial {
            self.partial_answers.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_uploaded: self.documents_uploaded.load(Ordering::Relaxed),
            embed_runs: self.embed_runs.load(Ordering::Relaxed),
            last_documents_processed: self.last_documents_processed.load(Ordering::Relaxed),
            last_text_chunks: self.last_text_chunks.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            partial_answers: self.partial_answers.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Uploads stored since startup.
    pub documents_uploaded: u64,
    /// Successful embed runs since startup.
    pub embed_runs: u64,
    /// Documents processed by the most recent embed run.
    pub last_documents_processed: u64,
    /// Chunks held by the index built by the most recent embed run.
    pub last_text_chunks: u64,
    /// Queries answered since startup.
    pub queries_answered: u64,
    /// Answered queries that carried placeholder values.
    pub partial_answers: u64,
}
