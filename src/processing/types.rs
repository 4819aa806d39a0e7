//! Core data types and error definitions for the summarization pipeline.

use anyhow::Error as TokenizerError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

/// Title used when the source document does not carry one.
pub const DEFAULT_TITLE: &str = "No title available";
/// Author used when the source document does not carry one.
pub const DEFAULT_AUTHOR: &str = "Unknown author";

/// Errors produced while normalizing raw input into a canonical document.
#[derive(Debug, Error)]
pub enum InputError {
    /// The input shape is not JSON, a mapping, a sequence, or a string.
    #[error("unsupported input shape: {0}")]
    UnsupportedShape(String),
    /// A referenced file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File we attempted to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A file was readable but did not contain JSON.
    #[error("file {path} is not valid JSON: {source}")]
    InvalidJson {
        /// File whose contents failed to parse.
        path: PathBuf,
        /// Underlying parser error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors produced while turning canonical content into bounded chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Chunking configured an impossible budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap would stop the sliding window from advancing.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({max_size})")]
    InvalidOverlap {
        /// Requested overlap.
        overlap: usize,
        /// Requested chunk size.
        max_size: usize,
    },
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Tokenizer model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// One timed piece of transcribed speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Spoken text.
    #[serde(alias = "Text")]
    pub text: String,
    /// Start offset in seconds.
    #[serde(default, alias = "Time_Start", skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    /// End offset in seconds.
    #[serde(default, alias = "Time_End", skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    /// Speaker label assigned by diarization.
    #[serde(default, alias = "Speaker", skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl Segment {
    /// Build a segment carrying only text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start: None,
            end: None,
            speaker: None,
        }
    }
}

/// Descriptive metadata extracted from the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Document title.
    pub title: String,
    /// Document author or channel.
    pub author: String,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.into(),
            author: DEFAULT_AUTHOR.into(),
        }
    }
}

/// Normalized view of any supported input.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalDocument {
    /// Title and author.
    pub metadata: DocumentMetadata,
    /// Flattened text to summarize (or the stored summary when `pre_summarized`).
    pub content: String,
    /// Segments the content was flattened from, if any.
    pub segments: Vec<Segment>,
    /// The input already carried a `summary`; `content` holds it verbatim.
    pub pre_summarized: bool,
}

/// Raw input accepted by the normalizer.
#[derive(Debug, Clone)]
pub enum DocumentInput {
    /// A file path, a JSON string, or plain text.
    Text(String),
    /// A JSON string or plain text received from an untrusted caller; never read as a path.
    Inline(String),
    /// A JSON file on disk.
    Path(PathBuf),
    /// An already-parsed JSON value (mapping, sequence, or string).
    Json(Value),
    /// Ordered segments produced by a transcription source.
    Segments(Vec<Segment>),
}

impl From<Value> for DocumentInput {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Inline(text),
            other => Self::Json(other),
        }
    }
}

impl From<String> for DocumentInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for DocumentInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Unit used to size chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMethod {
    /// Whitespace-separated words.
    Words,
    /// Unicode sentences.
    Sentences,
    /// Blank-line separated paragraphs.
    Paragraphs,
    /// Tokenizer tokens.
    Tokens,
    /// Sentence groups split at embedding-similarity drops.
    Semantic,
}

impl ChunkMethod {
    /// Lower-case name used in metadata and configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Words => "words",
            Self::Sentences => "sentences",
            Self::Paragraphs => "paragraphs",
            Self::Tokens => "tokens",
            Self::Semantic => "semantic",
        }
    }
}

impl std::str::FromStr for ChunkMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "words" => Ok(Self::Words),
            "sentences" => Ok(Self::Sentences),
            "paragraphs" => Ok(Self::Paragraphs),
            "tokens" => Ok(Self::Tokens),
            "semantic" => Ok(Self::Semantic),
            _ => Err(()),
        }
    }
}

/// Chunking policy for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkOptions {
    /// Sizing unit.
    pub method: ChunkMethod,
    /// Maximum chunk size in `method` units.
    pub max_size: usize,
    /// Units repeated from the end of one chunk at the start of the next.
    pub overlap: usize,
    /// Shrink chunks for text with long sentences.
    pub adaptive: bool,
    /// Split into paragraphs first, then chunk each paragraph.
    pub multi_level: bool,
    /// Language of the content, recorded on every chunk.
    pub language: String,
    /// Tokenizer model or encoding used by `tokens` and `semantic`.
    pub tokenizer: Option<String>,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            method: ChunkMethod::Words,
            max_size: 1000,
            overlap: 100,
            adaptive: false,
            multi_level: false,
            language: "english".into(),
            tokenizer: None,
        }
    }
}

/// Bounded, ordered slice of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Chunk text.
    pub text: String,
    /// Position in the chunk sequence, contiguous from zero.
    pub index: usize,
    /// Method, language, unit span, and nesting level.
    pub metadata: Map<String, Value>,
}

impl Chunk {
    /// Wrap plain text as chunk `index` without metadata.
    pub fn new(text: impl Into<String>, index: usize) -> Self {
        Self {
            text: text.into(),
            index,
            metadata: Map::new(),
        }
    }
}
