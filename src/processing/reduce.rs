//! Map-reduce over chunk summaries until the joined result fits the threshold.

use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::future::Future;
use tokio_util::sync::CancellationToken;

use super::chunking::{chunk_with_method, measure};
use super::types::{Chunk, ChunkMethod, ChunkOptions};
use crate::summarization::{ErrorKind, SummaryError, SummaryResult};

/// Reduction policy.
#[derive(Debug, Clone)]
pub struct ReduceOptions {
    /// Size, in `rechunk.method` units, above which joined summaries are reduced again.
    pub threshold: usize,
    /// Maximum number of summarize-and-join rounds.
    pub max_depth: usize,
    /// Text placed between consecutive summaries.
    pub separator: String,
    /// Options used to re-chunk joined summaries.
    pub rechunk: ChunkOptions,
    /// Maximum chunk calls in flight at once.
    pub concurrency: usize,
}

impl ReduceOptions {
    /// Reduction policy derived from the document's chunk options.
    pub fn for_chunking(rechunk: ChunkOptions, threshold: usize) -> Self {
        Self {
            threshold,
            max_depth: 4,
            separator: "\n\n".into(),
            rechunk,
            concurrency: 1,
        }
    }
}

/// Summarize every chunk and fold the results into one summary.
///
/// A single chunk is summarized exactly once and returned as-is. Otherwise each round summarizes
/// all chunks in index order, joins the summaries with `separator`, and stops when the joined text
/// measures at or below `threshold`. Larger results are re-chunked and reduced again, up to
/// `max_depth` rounds. The first terminal error aborts the reduction.
pub async fn reduce<F, Fut>(
    chunks: Vec<Chunk>,
    summarize_one: F,
    options: &ReduceOptions,
    cancel: &CancellationToken,
) -> SummaryResult
where
    F: Fn(Chunk) -> Fut,
    Fut: Future<Output = SummaryResult>,
{
    if chunks.is_empty() {
        return Err(SummaryError::invalid_input("nothing to summarize"));
    }

    let rechunk = ChunkOptions {
        method: match options.rechunk.method {
            ChunkMethod::Semantic => ChunkMethod::Tokens,
            other => other,
        },
        ..options.rechunk.clone()
    };
    let concurrency = options.concurrency.max(1);
    let mut current = chunks;
    let mut depth = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(SummaryError::cancelled());
        }
        if current.len() == 1 {
            let only = current.remove(0);
            return summarize_one(only).await;
        }

        depth += 1;
        tracing::debug!(depth, chunks = current.len(), concurrency, "Reduction round");
        let summaries: Vec<String> = stream::iter(current.into_iter().map(&summarize_one))
            .buffered(concurrency)
            .try_collect()
            .await?;
        let joined = summaries.join(&options.separator);
        let size = measure(&joined, &rechunk);

        if size <= options.threshold {
            tracing::debug!(depth, size, threshold = options.threshold, "Reduction converged");
            return Ok(joined);
        }
        if depth >= options.max_depth {
            tracing::warn!(
                depth,
                size,
                threshold = options.threshold,
                "Reduction depth limit reached; returning joined summaries"
            );
            return Ok(joined);
        }

        current = chunk_with_method(&joined, &rechunk, rechunk.method)
            .map_err(|error| SummaryError::new(ErrorKind::ChunkingError, error.to_string()))?;
        tracing::debug!(
            depth,
            size,
            threshold = options.threshold,
            chunks = current.len(),
            "Joined summaries exceed threshold; reducing again"
        );
    }
}
