use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient {
    /// Produce an embedding vector for each supplied piece of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Shared handle to a similarity backend.
pub type SharedEmbeddingClient = Arc<dyn EmbeddingClient + Send + Sync>;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he",
    "her", "his", "i", "in", "is", "it", "its", "of", "on", "or", "our", "she", "so", "that",
    "the", "their", "them", "there", "they", "this", "to", "was", "we", "were", "what", "which",
    "with", "you", "your",
];

/// Deterministic bag-of-words embeddings built with feature hashing.
///
/// Content words are lower-cased, hashed into one of `dimension` slots with a hash-derived sign,
/// and the vector is L2-normalized. Sentences sharing vocabulary land close together, which is
/// all semantic chunking needs to find topic shifts without a model.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a hashing client producing vectors of `dimension` slots.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let word = word.to_lowercase();
            if STOPWORDS.contains(&word.as_str()) {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let hash = hasher.finish();
            let position = (hash % dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            embedding[position] += sign;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

/// Embedding client backed by a local Ollama runtime (`POST /api/embed`).
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Build a client for `model` served at `base_url`; each request gives up after `timeout`.
    pub fn new(
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("condense/embed")
            .timeout(timeout)
            .build()
            .map_err(|error| EmbeddingClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = texts.len();
        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::GenerationFailed(format!(
                "failed to decode Ollama embeddings: {error}"
            ))
        })?;

        if body.embeddings.len() != expected {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "expected {expected} embeddings, received {}",
                body.embeddings.len()
            )));
        }
        Ok(body.embeddings)
    }
}

/// Cosine similarity of two vectors.
///
/// A zero vector carries no topic signal, so any comparison involving one reports full
/// similarity and never forces a boundary.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 1.0;
    }
    dot / (left_norm * right_norm)
}

/// Build the similarity backend selected by configuration, if any.
pub fn get_embedding_client(config: &Config) -> Option<SharedEmbeddingClient> {
    match config.embedding_provider {
        EmbeddingProvider::None => None,
        EmbeddingProvider::Hashing => Some(Arc::new(HashingEmbeddingClient::new(
            config.embedding_dimension,
        ))),
        EmbeddingProvider::Ollama => {
            match OllamaEmbeddingClient::new(
                config.ollama_url.clone(),
                config.embedding_model.clone(),
                config.http_timeout,
            ) {
                Ok(client) => Some(Arc::new(client)),
                Err(error) => {
                    tracing::warn!(
                        error = %error,
                        "Ollama embeddings unavailable; semantic chunking will use tokens"
                    );
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{ChunkMethod, ChunkOptions, SimilarityBackend, chunk_document};
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn hashing_client_is_deterministic_and_normalized() {
        let client = HashingEmbeddingClient::new(64);
        let vectors = client
            .generate_embeddings(vec!["Rust borrow checker".into(), "Rust borrow checker".into()])
            .await
            .expect("embeddings");
        assert_eq!(vectors[0], vectors[1]);
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher_than_disjoint_vocabulary() {
        let client = HashingEmbeddingClient::new(256);
        let vectors = client
            .generate_embeddings(vec![
                "The compiler rejected the borrow.".into(),
                "The borrow checker and the compiler agree.".into(),
                "Bananas ripen quickly in summer heat.".into(),
            ])
            .await
            .expect("embeddings");
        let related = cosine_similarity(&vectors[0], &vectors[1]);
        let unrelated = cosine_similarity(&vectors[0], &vectors[2]);
        assert!(related > unrelated);
    }

    #[tokio::test]
    async fn hashing_client_rejects_empty_batches() {
        let client = HashingEmbeddingClient::new(8);
        assert!(client.generate_embeddings(Vec::new()).await.is_err());
    }

    #[test]
    fn zero_vectors_never_force_a_boundary() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[tokio::test]
    async fn ollama_client_decodes_embeddings() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200)
                    .json_body(json!({ "embeddings": [[0.1, 0.2], [0.3, 0.4]] }));
            })
            .await;
        let client = OllamaEmbeddingClient::new(
            server.base_url(),
            "nomic-embed-text".into(),
            Duration::from_secs(5),
        )
        .expect("client");

        let vectors = client
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .expect("embeddings");

        mock.assert();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn ollama_client_reports_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(500).body("boom");
            })
            .await;
        let client =
            OllamaEmbeddingClient::new(server.base_url(), "m".into(), Duration::from_secs(5))
                .expect("client");

        let error = client
            .generate_embeddings(vec!["a".into()])
            .await
            .expect_err("error response");
        assert!(matches!(
            error,
            EmbeddingClientError::GenerationFailed(message) if message.contains("500")
        ));
    }

    #[tokio::test]
    async fn stalled_ollama_times_out_and_semantic_chunking_uses_tokens() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200)
                    .delay(Duration::from_secs(5))
                    .json_body(json!({ "embeddings": [] }));
            })
            .await;
        let config = Config {
            embedding_provider: EmbeddingProvider::Ollama,
            ollama_url: server.base_url(),
            http_timeout: Duration::from_millis(200),
            ..Config::default()
        };
        let client = get_embedding_client(&config).expect("ollama client");
        let backend = SimilarityBackend::new(client, 0.5);
        let options = ChunkOptions {
            method: ChunkMethod::Semantic,
            max_size: 20,
            overlap: 0,
            ..ChunkOptions::default()
        };
        let content = "The compiler rejected the borrow because the reference outlived its owner. \
            We rewrote the function to take ownership instead of borrowing the buffer. \
            Later that week the team planned a picnic by the river with sandwiches. \
            Everyone agreed the weather forecast looked promising for the weekend trip.";

        let started = std::time::Instant::now();
        let chunks = tokio::time::timeout(
            Duration::from_secs(3),
            chunk_document(content, &options, Some(&backend)),
        )
        .await
        .expect("embedding call gave up before the server answered")
        .expect("chunks");

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(chunks.len() > 1);
        assert!(chunks
            .iter()
            .all(|chunk| chunk.metadata["method"] == json!("tokens")));
    }
}
