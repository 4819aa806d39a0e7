//! Narrow seams to the systems around the pipeline: where transcripts come from and where
//! finished summaries go.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::processing::sanitize::sanitize_filename;
use crate::processing::types::{DocumentMetadata, Segment};

/// Errors reported by transcript sources and persistence sinks.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The source has no transcript for the requested id.
    #[error("no transcript found for source '{0}'")]
    NotFound(String),
    /// Filesystem failure.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization failure.
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Any other collaborator-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Supplies ordered transcript segments for a source id.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Segments of `source_id`, ordered by time.
    async fn segments(&self, source_id: &str) -> Result<Vec<Segment>, CollaboratorError>;
}

/// Receives completed summaries.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Store `summary` alongside the document it was produced from.
    async fn persist(
        &self,
        source_id: &str,
        metadata: &DocumentMetadata,
        segments: &[Segment],
        summary: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    async fn persist(
        &self,
        _source_id: &str,
        _metadata: &DocumentMetadata,
        _segments: &[Segment],
        _summary: &str,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Sink writing one `<title>_<source id>_summary.json` file per document into a directory.
///
/// Both parts are sanitized; the source id keeps untitled documents from overwriting each other.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

#[derive(Serialize)]
struct SavedSummary<'a> {
    source_id: &'a str,
    title: &'a str,
    author: &'a str,
    segments: &'a [Segment],
    summary: &'a str,
    saved_at: String,
}

impl DirectorySink {
    /// Write into `root`, creating it on first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File the document `source_id` with `metadata` is written to.
    pub fn path_for(&self, source_id: &str, metadata: &DocumentMetadata) -> PathBuf {
        self.root.join(format!(
            "{}_{}_summary.json",
            sanitize_filename(&metadata.title),
            sanitize_filename(source_id)
        ))
    }
}

#[async_trait]
impl PersistenceSink for DirectorySink {
    async fn persist(
        &self,
        source_id: &str,
        metadata: &DocumentMetadata,
        segments: &[Segment],
        summary: &str,
    ) -> Result<(), CollaboratorError> {
        let saved_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|error| CollaboratorError::Other(error.to_string()))?;
        let record = SavedSummary {
            source_id,
            title: &metadata.title,
            author: &metadata.author,
            segments,
            summary,
            saved_at,
        };
        let body = serde_json::to_vec_pretty(&record)?;
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(source_id, metadata);
        tokio::fs::write(&path, body).await?;
        tracing::info!(path = %path.display(), source_id, "Summary saved");
        Ok(())
    }
}
