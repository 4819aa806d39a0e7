//! Semantic chunking: sentence groups split where consecutive sentences stop being similar.

use serde_json::json;

use super::chunking::{build_token_counter, chunk_metadata, chunk_with_method, split_sentences};
use super::types::{Chunk, ChunkMethod, ChunkOptions, ChunkingError};
use crate::embedding::{SharedEmbeddingClient, cosine_similarity};

/// Embedding client plus the similarity threshold that opens a new chunk.
#[derive(Clone)]
pub struct SimilarityBackend {
    /// Client used to embed each sentence.
    pub client: SharedEmbeddingClient,
    /// Consecutive-sentence cosine similarity below which a boundary is placed.
    pub threshold: f32,
}

impl SimilarityBackend {
    /// Pair a client with a boundary threshold.
    pub fn new(client: SharedEmbeddingClient, threshold: f32) -> Self {
        Self { client, threshold }
    }
}

/// Chunk `content` under `options`, using `similarity` when the method is `semantic`.
///
/// Non-semantic methods behave exactly like [`super::chunk_text`]. Semantic chunking falls back to
/// token windows when no backend is supplied, when the backend fails, or when the content has at
/// most one sentence. Sentence groups are capped at `max_size` tokens, but a single sentence that
/// exceeds the cap is kept whole. `overlap` and `multi_level` do not apply to semantic chunks.
pub async fn chunk_document(
    content: &str,
    options: &ChunkOptions,
    similarity: Option<&SimilarityBackend>,
) -> Result<Vec<Chunk>, ChunkingError> {
    if options.method != ChunkMethod::Semantic {
        return super::chunking::chunk_text(content, options);
    }
    super::chunking::validate_options(options)?;

    let Some(backend) = similarity else {
        tracing::debug!("No similarity backend configured; semantic chunking uses tokens");
        return chunk_with_method(content, options, ChunkMethod::Tokens);
    };

    let counter = build_token_counter(options.tokenizer.as_deref());
    if counter.as_ref()(content) <= options.max_size {
        return chunk_with_method(content, options, ChunkMethod::Tokens).map(|mut chunks| {
            for chunk in &mut chunks {
                chunk.metadata.insert("method".into(), json!(ChunkMethod::Semantic.as_str()));
            }
            chunks
        });
    }

    let sentences = split_sentences(content);
    if sentences.len() <= 1 {
        return chunk_with_method(content, options, ChunkMethod::Tokens);
    }

    let embeddings = match backend
        .client
        .generate_embeddings(sentences.iter().map(|s| s.to_string()).collect())
        .await
    {
        Ok(vectors) if vectors.len() == sentences.len() => vectors,
        Ok(vectors) => {
            tracing::warn!(
                expected = sentences.len(),
                received = vectors.len(),
                "Similarity backend returned the wrong number of embeddings; using tokens"
            );
            return chunk_with_method(content, options, ChunkMethod::Tokens);
        }
        Err(error) => {
            tracing::warn!(error = %error, "Similarity backend failed; using tokens");
            return chunk_with_method(content, options, ChunkMethod::Tokens);
        }
    };

    let mut groups: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    let mut tokens = counter.as_ref()(sentences[0]);
    for next in 1..sentences.len() {
        let similarity = cosine_similarity(&embeddings[next - 1], &embeddings[next]);
        let next_tokens = counter.as_ref()(sentences[next]);
        if similarity < backend.threshold || tokens + next_tokens > options.max_size {
            groups.push((start, next));
            start = next;
            tokens = next_tokens;
        } else {
            tokens += next_tokens;
        }
    }
    groups.push((start, sentences.len()));

    let chunks: Vec<Chunk> = groups
        .into_iter()
        .enumerate()
        .map(|(index, (first, last))| {
            let text = sentences[first..last].join(" ");
            let mut metadata = chunk_metadata(options, ChunkMethod::Semantic, 0);
            metadata.insert("unit_start".into(), json!(first));
            metadata.insert("unit_end".into(), json!(last));
            metadata.insert("tokens".into(), json!(counter.as_ref()(&text)));
            Chunk {
                text,
                index,
                metadata,
            }
        })
        .collect();

    tracing::debug!(
        chunks = chunks.len(),
        sentences = sentences.len(),
        threshold = backend.threshold,
        "Semantic chunking complete"
    );
    Ok(chunks)
}
