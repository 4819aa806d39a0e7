//! Summarization service coordinating normalization, chunking, provider dispatch, and reduction.

use crate::{
    collaborators::{NullSink, PersistenceSink, TranscriptSource},
    config::{Config, ConfigStore, EnvConfigStore, get_config},
    embedding::get_embedding_client,
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        normalize::{format_with_metadata, normalize},
        reduce::{ReduceOptions, reduce},
        sanitize::sanitize_provider_name,
        semantic::{SimilarityBackend, chunk_document},
        types::{
            CanonicalDocument, Chunk, ChunkOptions, DocumentInput, DocumentMetadata, Segment,
        },
    },
    summarization::{
        AdapterRegistry, DEFAULT_PROMPT, ErrorKind, ProviderCredentials, RetryPolicy,
        SharedAdapter, SummaryError, SummaryResult, resolve_credentials, with_retry,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Per-document lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Turning raw input into a canonical document.
    Normalizing,
    /// Splitting content into chunks.
    Chunking,
    /// Calling the provider for each chunk.
    Summarizing,
    /// Folding chunk summaries together.
    Reducing,
    /// Summary produced.
    Done,
    /// Run ended with a terminal error.
    Failed,
}

impl PipelineStage {
    /// Lower-case label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normalizing => "normalizing",
            Self::Chunking => "chunking",
            Self::Summarizing => "summarizing",
            Self::Reducing => "reducing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request overrides. Unset fields fall back to the service settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SummarizeOptions {
    /// Provider name; defaults to the configured default provider.
    pub provider: Option<String>,
    /// Explicit API key; empty counts as absent.
    pub api_key: Option<String>,
    /// Explicit model; empty counts as absent.
    pub model: Option<String>,
    /// Instruction appended to every chunk.
    pub prompt: Option<String>,
    /// Chunking policy for this document.
    pub chunking: Option<ChunkOptions>,
    /// Prefix content with the title/author header (default `true`).
    pub include_metadata: Option<bool>,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryOutcome {
    /// Identifier of this run, also attached to every log line it produced.
    pub run_id: Uuid,
    /// Final summary.
    pub summary: String,
    /// Provider that produced the summary; `None` for pre-summarized input.
    pub provider: Option<String>,
    /// Model used; `None` for pre-summarized input.
    pub model: Option<String>,
    /// Number of chunks the document was split into.
    pub chunk_count: usize,
    /// The input already carried a summary.
    pub pre_summarized: bool,
    /// Title and author of the document.
    pub metadata: DocumentMetadata,
    /// Segments the document was built from, handed to the persistence sink.
    #[serde(skip)]
    pub segments: Vec<Segment>,
}

/// One entry of a batch.
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Identifier reported in progress lines and passed to the persistence sink.
    pub source_id: String,
    /// Raw document.
    pub input: DocumentInput,
}

/// Progress pair emitted after each batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchUpdate {
    /// `Processing i/n: <source>`.
    pub progress: String,
    /// `Summary complete` or the failure description.
    pub status: String,
}

/// Outcome of one batch item.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Item identifier.
    pub source_id: String,
    /// Summary or terminal error.
    pub outcome: Result<SummaryOutcome, SummaryError>,
}

/// Everything a batch produced, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Progress pairs, one per item.
    pub updates: Vec<BatchUpdate>,
    /// Results, one per item.
    pub results: Vec<BatchResult>,
}

/// Pipeline settings snapshotted from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Provider used when a request does not name one.
    pub default_provider: String,
    /// Default chunking policy.
    pub chunk_options: ChunkOptions,
    /// Concurrent chunk calls per document.
    pub chunk_concurrency: usize,
    /// Reduction threshold used with the default chunking policy.
    pub reduce_threshold: usize,
    /// Maximum reduction rounds.
    pub reduce_max_depth: usize,
    /// Retry policy for every provider call.
    pub retry: RetryPolicy,
}

impl PipelineSettings {
    /// Extract pipeline settings from the process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_provider: config.default_provider.clone(),
            chunk_options: config.chunk_options.clone(),
            chunk_concurrency: config.chunk_concurrency.max(1),
            reduce_threshold: config.reduce_threshold,
            reduce_max_depth: config.reduce_max_depth,
            retry: RetryPolicy {
                max_attempts: config.max_retries,
                delay: config.retry_delay,
            },
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// State shared read-only by every chunk call of one document run.
struct RunContext<'a> {
    provider: String,
    adapter: SharedAdapter,
    credentials: ProviderCredentials,
    prompt: String,
    retry: RetryPolicy,
    cancel: &'a CancellationToken,
    metrics: &'a PipelineMetrics,
}

impl RunContext<'_> {
    async fn summarize_chunk(&self, chunk: Chunk) -> SummaryResult {
        tracing::debug!(
            provider = %self.provider,
            chunk = chunk.index,
            chars = chunk.text.len(),
            "Summarizing chunk"
        );
        with_retry(
            || {
                self.metrics.record_provider_call();
                self.adapter
                    .invoke(&chunk.text, &self.prompt, &self.credentials)
            },
            &self.retry,
            self.cancel,
        )
        .await
    }
}

/// Coordinates the summarization pipeline for the HTTP surface and the CLI.
///
/// The service owns the adapter registry, config store, persistence sink, similarity backend,
/// and metrics so every surface reuses the same components. Construct it once near process start
/// and share it through an `Arc`.
pub struct SummarizationService {
    settings: PipelineSettings,
    store: Arc<dyn ConfigStore>,
    registry: AdapterRegistry,
    sink: Arc<dyn PersistenceSink>,
    similarity: Option<SimilarityBackend>,
    metrics: Arc<PipelineMetrics>,
}

/// Abstraction over the pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait SummarizationApi: Send + Sync {
    /// Summarize one document.
    async fn summarize(
        &self,
        source_id: &str,
        input: DocumentInput,
        options: &SummarizeOptions,
        cancel: &CancellationToken,
    ) -> Result<SummaryOutcome, SummaryError>;

    /// Summarize documents one after another.
    async fn summarize_batch(
        &self,
        items: Vec<BatchItem>,
        options: &SummarizeOptions,
        cancel: &CancellationToken,
    ) -> BatchReport;

    /// Provider names available for dispatch.
    fn providers(&self) -> Vec<String>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl SummarizationService {
    /// Build a service from the global configuration and environment-backed credentials.
    pub fn new() -> Self {
        let config = get_config();
        tracing::info!(
            provider = %config.default_provider,
            method = config.chunk_options.method.as_str(),
            max_size = config.chunk_options.max_size,
            "Initializing summarization service"
        );
        Self::with_config(config, Arc::new(EnvConfigStore))
    }

    /// Build a service from an explicit configuration and config store.
    pub fn with_config(config: &Config, store: Arc<dyn ConfigStore>) -> Self {
        let registry = AdapterRegistry::new(store.clone(), config.http_timeout);
        let similarity = get_embedding_client(config)
            .map(|client| SimilarityBackend::new(client, config.semantic_threshold));
        Self {
            settings: PipelineSettings::from_config(config),
            store,
            registry,
            sink: Arc::new(NullSink),
            similarity,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Replace the pipeline settings.
    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the adapter registry.
    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Send finished summaries to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace (or remove) the semantic chunking backend.
    pub fn with_similarity(mut self, similarity: Option<SimilarityBackend>) -> Self {
        self.similarity = similarity;
        self
    }

    /// Run the full pipeline for one document.
    pub async fn summarize(
        &self,
        source_id: &str,
        input: DocumentInput,
        options: &SummarizeOptions,
        cancel: &CancellationToken,
    ) -> Result<SummaryOutcome, SummaryError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("summarize", %run_id, source_id);
        async move {
            let result = self.run(run_id, source_id, input, options, cancel).await;
            match &result {
                Ok(outcome) => {
                    self.metrics.record_document(outcome.chunk_count as u64);
                    tracing::info!(
                        stage = %PipelineStage::Done,
                        provider = outcome.provider.as_deref().unwrap_or("none"),
                        chunks = outcome.chunk_count,
                        pre_summarized = outcome.pre_summarized,
                        "Summary complete"
                    );
                    self.persist(source_id, outcome).await;
                }
                Err(error) => {
                    self.metrics.record_failure();
                    tracing::warn!(
                        stage = %PipelineStage::Failed,
                        kind = %error.kind,
                        error = %error,
                        "Summarization failed"
                    );
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        run_id: Uuid,
        source_id: &str,
        input: DocumentInput,
        options: &SummarizeOptions,
        cancel: &CancellationToken,
    ) -> Result<SummaryOutcome, SummaryError> {
        tracing::debug!(stage = %PipelineStage::Normalizing, "Normalizing input");
        let document =
            normalize(input).map_err(|error| SummaryError::invalid_input(error.to_string()))?;

        if document.pre_summarized {
            tracing::info!("Document already summarized; skipping providers");
            return Ok(SummaryOutcome {
                run_id,
                summary: document.content,
                provider: None,
                model: None,
                chunk_count: 0,
                pre_summarized: true,
                metadata: document.metadata,
                segments: document.segments,
            });
        }

        if document.content.trim().is_empty() {
            return Err(SummaryError::invalid_input(format!(
                "document '{source_id}' has no content to summarize"
            )));
        }

        let provider = sanitize_provider_name(
            options
                .provider
                .as_deref()
                .unwrap_or(&self.settings.default_provider),
        );
        let adapter = self.registry.get(&provider)?;
        let credentials = resolve_credentials(
            &provider,
            options.api_key.as_deref(),
            options.model.as_deref(),
            self.store.as_ref(),
        )?;
        tracing::info!(provider = %provider, model = %credentials.model, "Provider resolved");

        let context = RunContext {
            provider: provider.clone(),
            adapter,
            credentials,
            prompt: options
                .prompt
                .clone()
                .filter(|prompt| !prompt.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            retry: self.settings.retry,
            cancel,
            metrics: &self.metrics,
        };

        let summary = self
            .summarize_document(&document, options, &context)
            .await
            .map_err(|error| attribute(error, &provider));

        let (summary, chunk_count) = summary?;
        Ok(SummaryOutcome {
            run_id,
            summary,
            provider: Some(provider),
            model: Some(context.credentials.model.clone()),
            chunk_count,
            pre_summarized: false,
            metadata: document.metadata,
            segments: document.segments,
        })
    }

    async fn summarize_document(
        &self,
        document: &CanonicalDocument,
        options: &SummarizeOptions,
        context: &RunContext<'_>,
    ) -> Result<(String, usize), SummaryError> {
        let text = if options.include_metadata.unwrap_or(true) {
            format_with_metadata(document)
        } else {
            document.content.clone()
        };
        let (chunk_options, threshold) = match &options.chunking {
            Some(chunking) => (chunking.clone(), chunking.max_size),
            None => (self.settings.chunk_options.clone(), self.settings.reduce_threshold),
        };

        tracing::debug!(
            stage = %PipelineStage::Chunking,
            method = chunk_options.method.as_str(),
            max_size = chunk_options.max_size,
            overlap = chunk_options.overlap,
            "Chunking document"
        );
        let chunks = chunk_document(&text, &chunk_options, self.similarity.as_ref())
            .await
            .map_err(|error| SummaryError::new(ErrorKind::ChunkingError, error.to_string()))?;
        let chunk_count = chunks.len();

        tracing::info!(
            stage = %PipelineStage::Summarizing,
            chunks = chunk_count,
            "Summarizing chunks"
        );
        if chunk_count > 1 {
            tracing::debug!(
                stage = %PipelineStage::Reducing,
                threshold,
                "Reducing chunk summaries"
            );
        }
        let reduce_options = ReduceOptions {
            threshold,
            max_depth: self.settings.reduce_max_depth,
            separator: "\n\n".into(),
            rechunk: chunk_options,
            concurrency: self.settings.chunk_concurrency,
        };
        let summary = reduce(
            chunks,
            |chunk| context.summarize_chunk(chunk),
            &reduce_options,
            context.cancel,
        )
        .await?;
        Ok((summary, chunk_count))
    }

    async fn persist(&self, source_id: &str, outcome: &SummaryOutcome) {
        if let Err(error) = self
            .sink
            .persist(source_id, &outcome.metadata, &outcome.segments, &outcome.summary)
            .await
        {
            tracing::warn!(error = %error, "Failed to persist summary");
        }
    }

    /// Summarize the transcript `source` holds for `source_id`.
    pub async fn summarize_source(
        &self,
        source_id: &str,
        source: &dyn TranscriptSource,
        options: &SummarizeOptions,
        cancel: &CancellationToken,
    ) -> Result<SummaryOutcome, SummaryError> {
        let segments = source.segments(source_id).await.map_err(|error| {
            self.metrics.record_failure();
            tracing::warn!(source_id, error = %error, "Transcript source failed");
            SummaryError::invalid_input(error.to_string())
        })?;
        self.summarize(source_id, DocumentInput::Segments(segments), options, cancel)
            .await
    }

    /// Summarize `items` sequentially, calling `on_update` after each item.
    ///
    /// A failed item never stops the batch. Once `cancel` fires, the remaining items are reported
    /// as cancelled without being started.
    pub async fn summarize_batch_with<F>(
        &self,
        items: Vec<BatchItem>,
        options: &SummarizeOptions,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> BatchReport
    where
        F: FnMut(&BatchUpdate) + Send,
    {
        let total = items.len();
        let mut report = BatchReport::default();
        for (position, item) in items.into_iter().enumerate() {
            let progress = format!("Processing {}/{}: {}", position + 1, total, item.source_id);
            let outcome = if cancel.is_cancelled() {
                Err(SummaryError::cancelled())
            } else {
                self.summarize(&item.source_id, item.input, options, cancel)
                    .await
            };
            let status = match &outcome {
                Ok(_) => "Summary complete".to_string(),
                Err(error) => error.describe(),
            };
            let update = BatchUpdate { progress, status };
            on_update(&update);
            report.updates.push(update);
            report.results.push(BatchResult {
                source_id: item.source_id,
                outcome,
            });
        }
        report
    }

    /// Snapshot of the pipeline counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Default for SummarizationService {
    fn default() -> Self {
        Self::new()
    }
}

fn attribute(mut error: SummaryError, provider: &str) -> SummaryError {
    if error.provider.as_deref().is_none_or(str::is_empty) {
        error.provider = Some(provider.to_string());
    }
    error
}

#[async_trait]
impl SummarizationApi for SummarizationService {
    async fn summarize(
        &self,
        source_id: &str,
        input: DocumentInput,
        options: &SummarizeOptions,
        cancel: &CancellationToken,
    ) -> Result<SummaryOutcome, SummaryError> {
        SummarizationService::summarize(self, source_id, input, options, cancel).await
    }

    async fn summarize_batch(
        &self,
        items: Vec<BatchItem>,
        options: &SummarizeOptions,
        cancel: &CancellationToken,
    ) -> BatchReport {
        self.summarize_batch_with(items, options, cancel, |_| {}).await
    }

    fn providers(&self) -> Vec<String> {
        self.registry.names()
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        SummarizationService::metrics_snapshot(self)
    }
}
