//! HTTP surface for the PDF query service.
//!
//! - `GET /` – Service description and endpoint catalog.
//! - `POST /upload` – Store one PDF sent as multipart field `pdf`.
//! - `POST /embed` – Rebuild the index from every stored PDF and report timing and counts.
//! - `POST /query` – Answer `{ "question": ... }` from the index, returning the supporting chunks.
//! - `GET /metrics` – Upload, embed and query counters plus the index currently serving queries.
//!
//! Requests from the configured browser origins are allowed through CORS.
//!
//! Every failure is rendered as `{ "detail": ... }`: caller mistakes map to 400, everything else
//! to 500.

use crate::config::Config;
use crate::processing::{
    AnswerStatus, ErrorKind, IndexStatus, QueryApi, QueryAnswer, ServiceError,
};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Multipart field carrying the uploaded PDF.
const UPLOAD_FIELD: &str = "pdf";

/// Transport settings applied on top of the routes.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
    /// Browser origins allowed by CORS; `*` allows any.
    pub allowed_origins: Vec<String>,
}

impl RouterOptions {
    /// Derive router options from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            allowed_origins: config.cors_allowed_origins.clone(),
        }
    }
}

/// Build the HTTP router exposing the upload, embed and query surface.
pub fn create_router<S>(service: Arc<S>, options: &RouterOptions) -> Router
where
    S: QueryApi + 'static,
{
    Router::new()
        .route("/", get(root))
        .route("/upload", post(upload_pdf::<S>))
        .route("/embed", post(embed_documents::<S>))
        .route("/query", post(query_documents::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(options.max_upload_bytes))
        .layer(cors_layer(&options.allowed_origins))
        .with_state(service)
}

/// CORS policy for browser clients: simple GET/POST calls with JSON or multipart
/// bodies from the configured origins.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(error) => {
                    tracing::warn!(origin = %origin, error = %error, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Welcome to the PDF Query API",
        "endpoints": {
            "/upload": "POST - Upload a PDF (multipart field 'pdf')",
            "/embed": "POST - Embed documents from uploaded PDFs",
            "/query": "POST - Query the embedded documents",
            "/metrics": "GET - Service counters"
        }
    }))
}

/// Success response for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    file_name: String,
}

/// Store the first `pdf` field of a multipart request.
async fn upload_pdf<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError>
where
    S: QueryApi,
{
    let mut multipart = multipart.map_err(|rejection| {
        ApiError::new(rejection.status(), rejection.body_text())
    })?;

    while let Some(field) = multipart.next_field().await.map_err(ApiError::from)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(ApiError::from)?;
        let outcome = service.upload(&file_name, &bytes).await?;
        tracing::info!(file = %outcome.file_name, bytes = bytes.len(), "Upload request completed");
        return Ok(Json(UploadResponse {
            message: "PDF uploaded successfully.",
            file_name: outcome.file_name,
        }));
    }

    Err(ServiceError::MissingUpload.into())
}

/// Success response for `POST /embed`.
#[derive(Serialize)]
struct EmbedResponse {
    message: &'static str,
    time_taken: String,
    documents_processed: usize,
    text_chunks: usize,
}

/// Rebuild the index from the document store.
async fn embed_documents<S>(State(service): State<Arc<S>>) -> Result<Json<EmbedResponse>, ApiError>
where
    S: QueryApi,
{
    let outcome = service.embed().await?;
    Ok(Json(EmbedResponse {
        message: "Embedding process completed successfully.",
        time_taken: format_elapsed(outcome.elapsed.as_secs_f64()),
        documents_processed: outcome.documents_processed,
        text_chunks: outcome.text_chunks,
    }))
}

fn format_elapsed(seconds: f64) -> String {
    format!("{seconds:.2} seconds")
}

/// Request body for `POST /query`.
#[derive(Deserialize)]
struct QueryRequest {
    /// Natural-language question; missing is treated as blank.
    #[serde(default)]
    question: String,
}

/// Success response for `POST /query`.
#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    context: Vec<ContextEntry>,
    status: AnswerStatus,
}

#[derive(Serialize)]
struct ContextEntry {
    page_content: String,
    metadata: ContextMetadata,
    score: f32,
}

#[derive(Serialize)]
struct ContextMetadata {
    source: String,
    page: usize,
}

impl From<QueryAnswer> for QueryResponse {
    fn from(answer: QueryAnswer) -> Self {
        Self {
            answer: answer.answer,
            context: answer
                .context
                .into_iter()
                .map(|retrieved| ContextEntry {
                    page_content: retrieved.chunk.text,
                    metadata: ContextMetadata {
                        source: retrieved.chunk.source,
                        page: retrieved.chunk.page,
                    },
                    score: retrieved.score,
                })
                .collect(),
            status: answer.status,
        }
    }
}

/// Answer a question from the current index.
async fn query_documents<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError>
where
    S: QueryApi,
{
    let Json(request) =
        request.map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))?;
    let answer = service.query(&request.question).await?;
    Ok(Json(answer.into()))
}

/// Response body for `GET /metrics`.
#[derive(Serialize)]
struct MetricsResponse {
    documents_uploaded: u64,
    embed_runs: u64,
    last_documents_processed: u64,
    last_text_chunks: u64,
    queries_answered: u64,
    partial_answers: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<IndexStatus>,
}

/// Return service counters and the index currently serving queries.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsResponse>
where
    S: QueryApi,
{
    let snapshot = service.metrics_snapshot();
    Json(MetricsResponse {
        documents_uploaded: snapshot.documents_uploaded,
        embed_runs: snapshot.embed_runs,
        last_documents_processed: snapshot.last_documents_processed,
        last_text_chunks: snapshot.last_text_chunks,
        queries_answered: snapshot.queries_answered,
        partial_answers: snapshot.partial_answers,
        index: service.index_status().await,
    })
}

/// Error rendered as `{ "detail": ... }` with the matching status code.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        match error.kind() {
            ErrorKind::Input => {
                tracing::warn!(error = %error, "Rejected request");
                Self::new(StatusCode::BAD_REQUEST, error.to_string())
            }
            ErrorKind::Unexpected => {
                tracing::error!(error = %error, "Request failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("An error occurred: {error}"),
                )
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        tracing::warn!(error = %error, "Malformed multipart upload");
        Self::new(error.status(), error.body_text())
    }
}
