//! Query service coordinating the document store, ingestion and grounded answering.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, get_embedding_client},
    extract::{DocumentPage, PdfTextExtractor, TextExtractor},
    generation::{CompletionClient, get_completion_client},
    index::{EmbeddingIndex, RetrievedChunk, TextChunk},
    metrics::{MetricsSnapshot, ServiceMetrics},
    processing::{
        chunking::{ChunkSettings, chunk_pages},
        prompt::{NO_ANSWER_PLACEHOLDER, NO_CONTEXT_PLACEHOLDER, build_prompt},
        types::{
            AnswerStatus, EmbedOutcome, IndexStatus, QueryAnswer, ServiceError, UploadOutcome,
        },
    },
    store::DocumentStore,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

/// Pipeline knobs derived from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Chunk budget applied to every page.
    pub chunk: ChunkSettings,
    /// Texts per embedding request.
    pub batch_size: usize,
    /// Expected vector dimension.
    pub dimension: usize,
    /// Chunks retrieved per query.
    pub top_k: usize,
    /// Location of the persisted index.
    pub index_path: PathBuf,
}

impl PipelineSettings {
    /// Derive the settings from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk: ChunkSettings {
                chunk_size: config.text_splitter_chunk_size,
                overlap: config.text_splitter_chunk_overlap,
                unit: config.text_splitter_unit,
            },
            batch_size: config.embedding_batch_size.max(1),
            dimension: config.embedding_dimension,
            top_k: config.retrieval_top_k.max(1),
            index_path: config.vector_store_path.clone(),
        }
    }
}

/// Operations exposed to the HTTP surface.
#[async_trait]
pub trait QueryApi: Send + Sync {
    /// Persist one uploaded file.
    async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<UploadOutcome, ServiceError>;

    /// Rebuild the index from every stored document.
    async fn embed(&self) -> Result<EmbedOutcome, ServiceError>;

    /// Answer a question from the current index.
    async fn query(&self, question: &str) -> Result<QueryAnswer, ServiceError>;

    /// Retrieve the current metrics snapshot.
    fn metrics_snapshot(&self) -> MetricsSnapshot;

    /// Describe the index currently serving queries, if any.
    async fn index_status(&self) -> Option<IndexStatus>;
}

/// Owns the document store, the provider clients and the current index.
///
/// Queries work on an `Arc` snapshot of the index taken under a short read lock. Embed runs are
/// serialized by `embed_lock` and only take the write lock to swap in the finished index, after
/// it has been persisted.
pub struct PdfQueryService {
    store: DocumentStore,
    extractor: Arc<dyn TextExtractor>,
    embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
    completion_client: Box<dyn CompletionClient + Send + Sync>,
    settings: PipelineSettings,
    index: RwLock<Option<Arc<EmbeddingIndex>>>,
    embed_lock: Mutex<()>,
    metrics: Arc<ServiceMetrics>,
}

impl PdfQueryService {
    /// Build the service with provider clients selected by configuration.
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        tracing::info!("Initializing embedding client");
        let embedding_client = get_embedding_client(config)?;
        tracing::info!("Initializing completion client");
        let completion_client = get_completion_client(config)?;
        Ok(Self::with_components(
            DocumentStore::new(config.document_dir.clone()),
            Arc::new(PdfTextExtractor::new()),
            embedding_client,
            completion_client,
            PipelineSettings::from_config(config),
        ))
    }

    /// Assemble the service from explicit collaborators.
    pub fn with_components(
        store: DocumentStore,
        extractor: Arc<dyn TextExtractor>,
        embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
        completion_client: Box<dyn CompletionClient + Send + Sync>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            extractor,
            embedding_client,
            completion_client,
            settings,
            index: RwLock::new(None),
            embed_lock: Mutex::new(()),
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }

    /// Startup hook: empty the document store and reload a persisted index if one is usable.
    pub async fn start(&self) -> Result<(), ServiceError> {
        self.store.reset().await?;
        tracing::info!(root = %self.store.root().display(), "Document store ready");

        let path = &self.settings.index_path;
        match EmbeddingIndex::load(path).await {
            Ok(Some(index)) => {
                if index.dimension() != self.settings.dimension
                    || index.model() != self.embedding_client.model_name()
                {
                    tracing::warn!(
                        path = %path.display(),
                        model = index.model(),
                        dimension = index.dimension(),
                        expected_model = self.embedding_client.model_name(),
                        expected_dimension = self.settings.dimension,
                        "Ignoring persisted index built with a different embedding model"
                    );
                    return Ok(());
                }
                tracing::info!(
                    path = %path.display(),
                    chunks = index.len(),
                    created_at = index.created_at(),
                    "Loaded persisted index"
                );
                *self.index.write().await = Some(Arc::new(index));
            }
            Ok(None) => tracing::debug!(path = %path.display(), "No persisted index found"),
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "Ignoring unreadable index");
            }
        }
        Ok(())
    }

    /// Shutdown hook: remove every uploaded document.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.store.clear_all().await?;
        tracing::info!(root = %self.store.root().display(), "Document store cleared");
        Ok(())
    }

    /// Persist an upload into the document store.
    pub async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<UploadOutcome, ServiceError> {
        let path = self.store.store(file_name, bytes).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());
        self.metrics.record_upload();
        Ok(UploadOutcome { file_name, path })
    }

    /// Extract, chunk and embed every stored PDF, then replace the index.
    pub async fn embed(&self) -> Result<EmbedOutcome, ServiceError> {
        let _guard = self.embed_lock.lock().await;
        let started = Instant::now();

        let documents = self.store.list_documents().await?;
        if documents.is_empty() {
            return Err(ServiceError::NoDocuments);
        }
        tracing::info!(documents = documents.len(), "Embedding stored documents");

        let mut pages: Vec<DocumentPage> = Vec::new();
        for path in &documents {
            let extractor = Arc::clone(&self.extractor);
            let path = path.clone();
            let extracted = tokio::task::spawn_blocking(move || extractor.extract(&path))
                .await
                .map_err(|error| ServiceError::Task(error.to_string()))??;
            pages.extend(extracted);
        }

        let chunks = chunk_pages(&pages, self.settings.chunk)?;
        if chunks.is_empty() {
            return Err(ServiceError::NoExtractableText);
        }

        let vectors = self.embed_chunks(&chunks).await?;
        let text_chunks = chunks.len();
        let index = EmbeddingIndex::build(
            self.embedding_client.model_name(),
            self.settings.dimension,
            documents.len(),
            chunks,
            vectors,
        )?;
        index.save(&self.settings.index_path).await?;
        *self.index.write().await = Some(Arc::new(index));

        let outcome = EmbedOutcome {
            documents_processed: documents.len(),
            text_chunks,
            elapsed: started.elapsed(),
        };
        self.metrics
            .record_embed(outcome.documents_processed as u64, text_chunks as u64);
        tracing::info!(
            documents = outcome.documents_processed,
            chunks = text_chunks,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Index rebuilt"
        );
        Ok(outcome)
    }

    async fn embed_chunks(&self, chunks: &[TextChunk]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for (batch_number, batch) in chunks.chunks(self.settings.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let mut embedded = self.embedding_client.generate_embeddings(texts).await?;
            tracing::debug!(
                batch = batch_number,
                size = batch.len(),
                "Embedded chunk batch"
            );
            vectors.append(&mut embedded);
        }
        Ok(vectors)
    }

    /// Answer a question from the current index snapshot.
    pub async fn query(&self, question: &str) -> Result<QueryAnswer, ServiceError> {
        let snapshot = self
            .index
            .read()
            .await
            .clone()
            .ok_or(ServiceError::IndexNotReady)?;

        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::EmptyQuestion);
        }

        let vector = self
            .embedding_client
            .generate_embeddings(vec![question.to_string()])
            .await?
            .pop()
            .ok_or(ServiceError::EmptyEmbedding)?;
        let mut context = snapshot.search(&vector, self.settings.top_k)?;

        let mut status = AnswerStatus::Complete;
        if context.is_empty() {
            status = AnswerStatus::Partial;
            context.push(RetrievedChunk {
                chunk: TextChunk {
                    text: NO_CONTEXT_PLACEHOLDER.to_string(),
                    source: String::new(),
                    page: 0,
                },
                score: 0.0,
            });
        }

        let prompt = build_prompt(question, &context);
        let completion = self.completion_client.complete(&prompt).await?;
        let answer = match completion.text {
            Some(text) => text,
            None => {
                tracing::warn!("Completion response carried no answer");
                status = AnswerStatus::Partial;
                NO_ANSWER_PLACEHOLDER.to_string()
            }
        };

        self.metrics.record_query(status == AnswerStatus::Partial);
        tracing::info!(
            chunks = context.len(),
            status = ?status,
            "Query answered"
        );
        Ok(QueryAnswer {
            answer,
            context,
            status,
        })
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Describe the index currently serving queries.
    pub async fn index_status(&self) -> Option<IndexStatus> {
        self.index.read().await.as_ref().map(|index| IndexStatus {
            model: index.model().to_string(),
            dimension: index.dimension(),
            documents: index.document_count(),
            chunks: index.len(),
            created_at: index.created_at().to_string(),
        })
    }
}

#[async_trait]
impl QueryApi for PdfQueryService {
    async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<UploadOutcome, ServiceError> {
        PdfQueryService::upload(self, file_name, bytes).await
    }

    async fn embed(&self) -> Result<EmbedOutcome, ServiceError> {
        PdfQueryService::embed(self).await
    }

    async fn query(&self, question: &str) -> Result<QueryAnswer, ServiceError> {
        PdfQueryService::query(self, question).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        PdfQueryService::metrics_snapshot(self)
    }

    async fn index_status(&self) -> Option<IndexStatus> {
        PdfQueryService::index_status(self).await
    }
}
