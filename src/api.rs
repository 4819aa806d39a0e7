//! HTTP surface for Condense.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /summarize` – Normalize, chunk, and summarize one document through a provider.
//!   Accepts per-request overrides (`provider`, `api_key`, `model`, `prompt`, `chunking`,
//!   `include_metadata`) and returns the summary with `chunk_count` and `pre_summarized`.
//! - `POST /batch` – Summarize several documents sequentially; returns one progress/status pair
//!   and one result per item. A failed item never aborts the batch.
//! - `GET /providers` – Provider names available for dispatch.
//! - `GET /metrics` – Observe pipeline counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Errors are returned as `{ "error": { "kind", "status", "detail", "provider", "attempts" } }`
//! with a status derived from the error kind.

use crate::processing::{
    BatchItem, DocumentInput, SummarizationApi, SummarizeOptions, SummaryOutcome,
};
use crate::summarization::{ErrorKind, SummaryError};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Build the HTTP router exposing the summarization API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: SummarizationApi + 'static,
{
    Router::new()
        .route("/summarize", post(summarize_document::<S>))
        .route("/batch", post(summarize_batch::<S>))
        .route("/providers", get(list_providers::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Request body for the `POST /summarize` endpoint.
#[derive(Deserialize)]
struct SummarizeRequest {
    /// JSON document, segment list, or plain text. Strings are never read as server paths.
    input: Value,
    /// Identifier passed to the persistence sink (defaults to `"request"`).
    #[serde(default)]
    source_id: Option<String>,
    #[serde(flatten)]
    options: SummarizeOptions,
}

/// Success response for the `POST /summarize` endpoint.
#[derive(Serialize)]
struct SummarizeResponse {
    run_id: String,
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    chunk_count: usize,
    pre_summarized: bool,
    title: String,
    author: String,
}

impl From<SummaryOutcome> for SummarizeResponse {
    fn from(outcome: SummaryOutcome) -> Self {
        Self {
            run_id: outcome.run_id.to_string(),
            summary: outcome.summary,
            provider: outcome.provider,
            model: outcome.model,
            chunk_count: outcome.chunk_count,
            pre_summarized: outcome.pre_summarized,
            title: outcome.metadata.title,
            author: outcome.metadata.author,
        }
    }
}

/// Summarize one document.
async fn summarize_document<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<SummarizeResponse>, AppError>
where
    S: SummarizationApi,
{
    let source_id = request.source_id.unwrap_or_else(|| "request".into());
    let outcome = service
        .summarize(
            &source_id,
            DocumentInput::from(request.input),
            &request.options,
            &CancellationToken::new(),
        )
        .await?;
    tracing::info!(
        source_id,
        chunks = outcome.chunk_count,
        pre_summarized = outcome.pre_summarized,
        "Summarize request completed"
    );
    Ok(Json(outcome.into()))
}

/// One entry of a `POST /batch` request.
#[derive(Deserialize)]
struct BatchEntry {
    source_id: String,
    input: Value,
}

/// Request body for `POST /batch`; options apply to every item.
#[derive(Deserialize)]
struct BatchRequest {
    items: Vec<BatchEntry>,
    #[serde(flatten)]
    options: SummarizeOptions,
}

#[derive(Serialize)]
struct BatchItemResponse {
    source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<SummarizeResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

#[derive(Serialize)]
struct BatchResponse {
    updates: Vec<crate::processing::BatchUpdate>,
    results: Vec<BatchItemResponse>,
}

/// Summarize several documents sequentially.
async fn summarize_batch<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<BatchRequest>,
) -> Json<BatchResponse>
where
    S: SummarizationApi,
{
    let items = request
        .items
        .into_iter()
        .map(|entry| BatchItem {
            source_id: entry.source_id,
            input: DocumentInput::from(entry.input),
        })
        .collect();
    let report = service
        .summarize_batch(items, &request.options, &CancellationToken::new())
        .await;
    let results = report
        .results
        .into_iter()
        .map(|result| match result.outcome {
            Ok(outcome) => BatchItemResponse {
                source_id: result.source_id,
                summary: Some(outcome.into()),
                error: None,
            },
            Err(error) => BatchItemResponse {
                source_id: result.source_id,
                summary: None,
                error: Some(error_body(&error)),
            },
        })
        .collect();
    Json(BatchResponse {
        updates: report.updates,
        results,
    })
}

#[derive(Serialize)]
struct ProvidersResponse {
    providers: Vec<String>,
}

/// List provider names available for dispatch.
async fn list_providers<S>(State(service): State<Arc<S>>) -> Json<ProvidersResponse>
where
    S: SummarizationApi,
{
    Json(ProvidersResponse {
        providers: service.providers(),
    })
}

/// Return the pipeline counters.
async fn get_metrics<S>(
    State(service): State<Arc<S>>,
) -> Json<crate::metrics::MetricsSnapshot>
where
    S: SummarizationApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "summarize",
                method: "POST",
                path: "/summarize",
                description: "Normalize, chunk, and summarize one document. Response returns \
                    { \"summary\": string, \"chunk_count\": number, \"pre_summarized\": bool }.",
                request_example: Some(json!({
                    "input": { "title": "Weekly sync", "segments": [{ "Text": "Hello" }] },
                    "source_id": "meeting-42",
                    "provider": "anthropic",
                    "prompt": "Summarize the key decisions.",
                    "chunking": { "method": "words", "max_size": 1000, "overlap": 100 }
                })),
            },
            CommandDescriptor {
                name: "batch",
                method: "POST",
                path: "/batch",
                description: "Summarize several documents one after another, reporting progress \
                    per item.",
                request_example: Some(json!({
                    "items": [
                        { "source_id": "a", "input": "First transcript text" },
                        { "source_id": "b", "input": { "content": "Second document" } }
                    ],
                    "provider": "openai"
                })),
            },
            CommandDescriptor {
                name: "providers",
                method: "GET",
                path: "/providers",
                description: "Return the provider names this server can dispatch to.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return pipeline counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

fn error_body(error: &SummaryError) -> Value {
    json!({
        "kind": error.kind.label(),
        "status": match error.kind {
            ErrorKind::HttpError { status } => Some(status),
            _ => None,
        },
        "detail": error.detail,
        "provider": error.provider,
        "attempts": error.attempts,
    })
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput | ErrorKind::ChunkingError | ErrorKind::UnsupportedProvider => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::MissingCredential => StatusCode::UNAUTHORIZED,
        ErrorKind::NetworkError | ErrorKind::HttpError { .. } | ErrorKind::UnexpectedResponse => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

struct AppError(SummaryError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind);
        (status, Json(json!({ "error": error_body(&self.0) }))).into_response()
    }
}

impl From<SummaryError> for AppError {
    fn from(inner: SummaryError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        BatchItem, BatchReport, BatchResult, BatchUpdate, DocumentInput, DocumentMetadata,
        SummarizationApi, SummarizeOptions, SummaryOutcome,
    };
    use crate::config::{Config, ConfigStore, MapConfigStore};
    use crate::processing::SummarizationService;
    use crate::summarization::{
        AdapterRegistry, ErrorKind, ProviderAdapter, ProviderCredentials, SummaryError,
        SummaryResult,
    };
    use async_trait::async_trait;
    use std::io::Write;
    use std::time::Duration;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn commands_catalog_exposes_summarize_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let summarize = commands
            .iter()
            .find(|cmd| cmd.name == "summarize")
            .expect("summarize command present");

        assert_eq!(summarize.method, "POST");
        assert_eq!(summarize.path, "/summarize");
        assert!(commands.len() >= 3);
    }

    #[tokio::test]
    async fn summarize_route_passes_options_through() {
        let service = Arc::new(StubService::new(Ok("short".into())));
        let app = create_router(service.clone());

        let payload = json!({
            "input": { "title": "Talk", "segments": [{ "Text": "A" }] },
            "source_id": "talk-1",
            "provider": "anthropic",
            "api_key": "k",
            "chunking": { "method": "sentences", "max_size": 5, "overlap": 1 }
        });

        let (status, body) = send(app, Method::POST, "/summarize", Some(payload)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"], "short");
        assert_eq!(body["chunk_count"], 1);

        let calls = service.calls.lock().await.clone();
        assert_eq!(calls.len(), 1);
        let (source_id, options) = &calls[0];
        assert_eq!(source_id, "talk-1");
        assert_eq!(options.provider.as_deref(), Some("anthropic"));
        assert_eq!(options.api_key.as_deref(), Some("k"));
        let chunking = options.chunking.as_ref().expect("chunking");
        assert_eq!(chunking.max_size, 5);
        assert_eq!(chunking.language, "english");
    }

    struct EchoAdapter;

    #[async_trait]
    impl ProviderAdapter for EchoAdapter {
        fn name(&self) -> &str {
            "echo"
        }

        async fn invoke(
            &self,
            text: &str,
            _prompt: &str,
            _: &ProviderCredentials,
        ) -> SummaryResult {
            Ok(format!("echo: {text}"))
        }
    }

    #[tokio::test]
    async fn string_inputs_naming_server_files_are_plain_text() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"summary":"server-only contents"}}"#).expect("write");
        let path = file.path().to_string_lossy().to_string();

        let store: Arc<dyn ConfigStore> = Arc::new(MapConfigStore::new());
        let registry = AdapterRegistry::new(store.clone(), Duration::from_secs(1))
            .with_adapter(Arc::new(EchoAdapter));
        let service = SummarizationService::with_config(&Config::default(), store)
            .with_registry(registry)
            .with_similarity(None);
        let app = create_router(Arc::new(service));

        let payload = json!({
            "input": path,
            "provider": "echo",
            "api_key": "k",
            "include_metadata": false
        });
        let (status, body) = send(app, Method::POST, "/summarize", Some(payload)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"], format!("echo: {path}"));
        assert_eq!(body["pre_summarized"], false);
        assert!(!body.to_string().contains("server-only contents"));
    }

    #[tokio::test]
    async fn error_kinds_map_to_status_codes() {
        let cases = [
            (ErrorKind::MissingCredential, StatusCode::UNAUTHORIZED),
            (ErrorKind::UnsupportedProvider, StatusCode::BAD_REQUEST),
            (ErrorKind::HttpError { status: 503 }, StatusCode::BAD_GATEWAY),
            (ErrorKind::Cancelled, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (kind, expected) in cases {
            let error = SummaryError::new(kind, "nope").with_provider("openai");
            let app = create_router(Arc::new(StubService::new(Err(error))));
            let (status, body) = send(
                app,
                Method::POST,
                "/summarize",
                Some(json!({ "input": "text" })),
            )
            .await;
            assert_eq!(status, expected, "{kind:?}");
            assert_eq!(body["error"]["kind"], kind.label());
            assert_eq!(body["error"]["provider"], "openai");
        }
    }

    #[tokio::test]
    async fn batch_route_reports_each_item() {
        let service = Arc::new(StubService::new(Ok("fine".into())));
        let app = create_router(service);

        let payload = json!({
            "items": [
                { "source_id": "a", "input": "one" },
                { "source_id": "b", "input": { "content": "two" } }
            ]
        });
        let (status, body) = send(app, Method::POST, "/batch", Some(payload)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updates"][1]["progress"], "Processing 2/2: b");
        assert_eq!(body["results"][0]["summary"]["summary"], "fine");
    }

    #[tokio::test]
    async fn providers_and_metrics_routes() {
        let app = create_router(Arc::new(StubService::new(Ok("x".into()))));
        let (_, providers) = send(app.clone(), Method::GET, "/providers", None).await;
        assert_eq!(providers["providers"], json!(["openai", "stub"]));

        let (status, metrics) = send(app, Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(metrics["documents_summarized"], 7);
    }

    async fn send(
        app: axum::Router,
        method: Method,
        uri: &str,
        payload: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match payload {
            Some(payload) => {
                request = request.header("content-type", "application/json");
                Body::from(payload.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .oneshot(request.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    struct StubService {
        calls: Mutex<Vec<(String, SummarizeOptions)>>,
        reply: Result<String, SummaryError>,
    }

    impl StubService {
        fn new(reply: Result<String, SummaryError>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reply,
            }
        }
    }

    fn outcome(summary: String) -> SummaryOutcome {
        SummaryOutcome {
            run_id: Uuid::new_v4(),
            summary,
            provider: Some("stub".into()),
            model: Some("stub-model".into()),
            chunk_count: 1,
            pre_summarized: false,
            metadata: DocumentMetadata::default(),
            segments: Vec::new(),
        }
    }

    #[async_trait]
    impl SummarizationApi for StubService {
        async fn summarize(
            &self,
            source_id: &str,
            _input: DocumentInput,
            options: &SummarizeOptions,
            _cancel: &CancellationToken,
        ) -> Result<SummaryOutcome, SummaryError> {
            self.calls
                .lock()
                .await
                .push((source_id.to_string(), options.clone()));
            self.reply.clone().map(outcome)
        }

        async fn summarize_batch(
            &self,
            items: Vec<BatchItem>,
            _options: &SummarizeOptions,
            _cancel: &CancellationToken,
        ) -> BatchReport {
            let total = items.len();
            let mut report = BatchReport::default();
            for (position, item) in items.into_iter().enumerate() {
                report.updates.push(BatchUpdate {
                    progress: format!("Processing {}/{}: {}", position + 1, total, item.source_id),
                    status: "Summary complete".into(),
                });
                report.results.push(BatchResult {
                    source_id: item.source_id,
                    outcome: self.reply.clone().map(outcome),
                });
            }
            report
        }

        fn providers(&self) -> Vec<String> {
            vec!["openai".into(), "stub".into()]
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_summarized: 7,
                ..MetricsSnapshot::default()
            }
        }
    }
}
