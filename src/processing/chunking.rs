//! Chunking engine: bounded, ordered, overlapping slices of canonical content.
//!
//! Highlights:
//!
//! - Unit windows: `words`, `sentences`, and `paragraphs` size chunks by unit count. Each window
//!   takes as many contiguous units as fit in `max_size`, then the next window starts `overlap`
//!   units before the previous end so boundary context reaches the reducer twice.
//! - Token windows: `tokens` defers boundary selection to `semchunk-rs` under a token budget and
//!   then prefixes each chunk with the tail of its predecessor, trimmed back into budget.
//! - Token counting: prefer `tiktoken-rs` encodings; fall back to a whitespace counter when the
//!   requested tokenizer is unknown.
//! - Degenerate input: content whose size is within `max_size` is returned untouched as a single
//!   chunk, whatever the method.
//!
//! Semantic chunking lives in [`super::semantic`]; calling [`chunk_text`] with
//! [`ChunkMethod::Semantic`] uses token windows instead.

use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};
use unicode_segmentation::UnicodeSegmentation;

use super::types::{Chunk, ChunkMethod, ChunkOptions, ChunkingError};

pub(crate) type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const DEFAULT_ENCODING: &str = "cl100k_base";
const ADAPTIVE_SENTENCE_WORDS: f64 = 25.0;

/// Reject option combinations that cannot produce a progressing window.
pub fn validate_options(options: &ChunkOptions) -> Result<(), ChunkingError> {
    if options.max_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if options.overlap >= options.max_size {
        return Err(ChunkingError::InvalidOverlap {
            overlap: options.overlap,
            max_size: options.max_size,
        });
    }
    Ok(())
}

/// Split `content` into ordered chunks under `options`.
///
/// Chunks are returned in document order with `index` contiguous from zero.
pub fn chunk_text(content: &str, options: &ChunkOptions) -> Result<Vec<Chunk>, ChunkingError> {
    validate_options(options)?;
    let method = match options.method {
        ChunkMethod::Semantic => {
            tracing::debug!(
                "Semantic chunking requested without a similarity backend; using tokens"
            );
            ChunkMethod::Tokens
        }
        other => other,
    };
    chunk_with_method(content, options, method)
}

pub(crate) fn chunk_with_method(
    content: &str,
    options: &ChunkOptions,
    method: ChunkMethod,
) -> Result<Vec<Chunk>, ChunkingError> {
    let counter = match method {
        ChunkMethod::Tokens | ChunkMethod::Semantic => {
            Some(build_token_counter(options.tokenizer.as_deref()))
        }
        _ => None,
    };

    if measure_with(content, method, counter.as_ref()) <= options.max_size {
        return Ok(vec![whole_chunk(content, options, method)]);
    }

    let max_size = effective_max_size(content, options);
    if max_size != options.max_size {
        tracing::debug!(
            requested = options.max_size,
            effective = max_size,
            "Adaptive chunking shrank the window"
        );
    }

    let mut chunks = Vec::new();
    if options.multi_level && method != ChunkMethod::Paragraphs {
        for paragraph in split_paragraphs(content) {
            chunks.extend(split_once(paragraph, options, method, max_size, counter.as_ref(), 1));
        }
    } else {
        chunks = split_once(content, options, method, max_size, counter.as_ref(), 0);
    }

    for (index, chunk) in chunks.iter_mut().enumerate() {
        chunk.index = index;
    }
    tracing::debug!(
        method = method.as_str(),
        chunks = chunks.len(),
        max_size,
        overlap = options.overlap,
        "Chunked document"
    );
    Ok(chunks)
}

/// Size of `text` in the unit used by `options.method`.
pub fn measure(text: &str, options: &ChunkOptions) -> usize {
    let counter = match options.method {
        ChunkMethod::Tokens | ChunkMethod::Semantic => {
            Some(build_token_counter(options.tokenizer.as_deref()))
        }
        _ => None,
    };
    measure_with(text, options.method, counter.as_ref())
}

fn measure_with(text: &str, method: ChunkMethod, counter: Option<&TokenCounter>) -> usize {
    match (method, counter) {
        (ChunkMethod::Words, _) => text.split_whitespace().count(),
        (ChunkMethod::Sentences, _) => split_sentences(text).len(),
        (ChunkMethod::Paragraphs, _) => split_paragraphs(text).len(),
        (_, Some(counter)) => counter.as_ref()(text),
        (_, None) => text.split_whitespace().count(),
    }
}

fn split_once(
    text: &str,
    options: &ChunkOptions,
    method: ChunkMethod,
    max_size: usize,
    counter: Option<&TokenCounter>,
    level: usize,
) -> Vec<Chunk> {
    match (method, counter) {
        (ChunkMethod::Words, _) => {
            let units: Vec<&str> = text.split_whitespace().collect();
            unit_chunks(&units, " ", max_size, options, method, level)
        }
        (ChunkMethod::Sentences, _) => {
            unit_chunks(&split_sentences(text), " ", max_size, options, method, level)
        }
        (ChunkMethod::Paragraphs, _) => {
            unit_chunks(&split_paragraphs(text), "\n\n", max_size, options, method, level)
        }
        (_, Some(counter)) => {
            chunk_text_with_counter(text, max_size, options.overlap, counter.clone())
                .into_iter()
                .map(|piece| {
                    let mut metadata = chunk_metadata(options, ChunkMethod::Tokens, level);
                    metadata.insert("tokens".into(), json!(counter.as_ref()(&piece)));
                    Chunk {
                        text: piece,
                        index: 0,
                        metadata,
                    }
                })
                .collect()
        }
        (_, None) => {
            let units: Vec<&str> = text.split_whitespace().collect();
            unit_chunks(&units, " ", max_size, options, ChunkMethod::Words, level)
        }
    }
}

fn unit_chunks(
    units: &[&str],
    separator: &str,
    max_size: usize,
    options: &ChunkOptions,
    method: ChunkMethod,
    level: usize,
) -> Vec<Chunk> {
    sliding_windows(units.len(), max_size, options.overlap)
        .into_iter()
        .map(|(start, end)| {
            let mut metadata = chunk_metadata(options, method, level);
            metadata.insert("unit_start".into(), json!(start));
            metadata.insert("unit_end".into(), json!(end));
            Chunk {
                text: units[start..end].join(separator),
                index: 0,
                metadata,
            }
        })
        .collect()
}

/// Half-open unit ranges of at most `max_size` units, each starting `overlap` units before the
/// previous end.
pub(crate) fn sliding_windows(len: usize, max_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let max_size = max_size.max(1);
    let overlap = overlap.min(max_size - 1);
    let mut windows = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + max_size).min(len);
        windows.push((start, end));
        if end == len {
            break;
        }
        start = end - overlap;
    }
    windows
}

fn whole_chunk(content: &str, options: &ChunkOptions, method: ChunkMethod) -> Chunk {
    Chunk {
        text: content.to_string(),
        index: 0,
        metadata: chunk_metadata(options, method, 0),
    }
}

pub(crate) fn chunk_metadata(
    options: &ChunkOptions,
    method: ChunkMethod,
    level: usize,
) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("method".into(), json!(method.as_str()));
    metadata.insert("language".into(), json!(options.language));
    metadata.insert("level".into(), json!(level));
    metadata
}

/// Shrink the window for text whose sentences run long.
///
/// Average sentence length above 25 words scales `max_size` by `25 / average`, floored at half of
/// `max_size` and kept strictly above `overlap`.
fn effective_max_size(content: &str, options: &ChunkOptions) -> usize {
    if !options.adaptive {
        return options.max_size;
    }
    let sentences = split_sentences(content).len().max(1);
    let words = content.split_whitespace().count();
    let average = words as f64 / sentences as f64;
    if average <= ADAPTIVE_SENTENCE_WORDS {
        return options.max_size;
    }
    let scaled = (options.max_size as f64 * ADAPTIVE_SENTENCE_WORDS / average).round() as usize;
    scaled
        .max(options.max_size / 2)
        .max(options.overlap + 1)
        .min(options.max_size)
}

/// Unicode sentences, trimmed, without empties.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    text.unicode_sentences()
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

/// Paragraphs separated by one or more blank lines, trimmed, without empties.
pub(crate) fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut paragraphs = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if line.trim().is_empty() {
            if let Some(begin) = start.take() {
                paragraphs.push(text[begin..end].trim());
            }
        } else {
            if start.is_none() {
                start = Some(line_start);
            }
            end = offset;
        }
    }
    if let Some(begin) = start {
        paragraphs.push(text[begin..end].trim());
    }
    paragraphs.retain(|paragraph| !paragraph.is_empty());
    paragraphs
}

/// Build a token counter for the given tokenizer model or encoding name.
///
/// Uses `tiktoken` encodings when possible and falls back to whitespace tokenization for unknown
/// tokenizers. The fallback is logged at `warn` level to keep chunking flowing.
pub(crate) fn build_token_counter(tokenizer: Option<&str>) -> TokenCounter {
    let target = tokenizer.unwrap_or(DEFAULT_ENCODING);
    match build_tiktoken_counter(target) {
        Ok(counter) => counter,
        Err(error) => {
            tracing::warn!(
                tokenizer = target,
                error = %error,
                "Tokenizer unavailable; falling back to whitespace counter"
            );
            default_token_counter()
        }
    }
}

fn build_tiktoken_counter(model: &str) -> Result<TokenCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        DEFAULT_ENCODING
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            match encoding_from_name(model) {
                Some(candidate) => candidate,
                None => Err(model_err),
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

fn default_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

/// Token-budget chunker with an explicit token counter.
fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    token_counter: TokenCounter,
) -> Vec<String> {
    let counter_for_chunker = token_counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = chunker.chunk(text);
    apply_overlap(base_chunks, chunk_size, overlap, &token_counter)
}

/// Prefix each chunk with up to `overlap` tokens from the tail of its predecessor.
///
/// The overlapped chunk never exceeds `chunk_size`; it is trimmed from the start when needed.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    token_counter: &TokenCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if chunks.is_empty() || effective_overlap == 0 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;
    for current in chunks {
        match previous.as_deref() {
            None => overlapped.push(current.clone()),
            Some(prior) => overlapped.push(build_overlapped_chunk(
                prior,
                &current,
                effective_overlap,
                chunk_size,
                token_counter,
            )),
        }
        previous = Some(current);
    }

    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    token_counter: &TokenCounter,
) -> String {
    let tail = tail_with_token_limit(previous, overlap, token_counter);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    trim_to_token_budget(&combined, chunk_size, token_counter)
}

fn tail_with_token_limit<'a>(
    text: &'a str,
    token_limit: usize,
    token_counter: &TokenCounter,
) -> &'a str {
    if token_limit == 0 {
        return "";
    }
    longest_suffix_within(text, token_limit, token_counter).unwrap_or("")
}

fn trim_to_token_budget(text: &str, token_budget: usize, token_counter: &TokenCounter) -> String {
    if token_budget == 0 {
        return String::new();
    }
    longest_suffix_within(text, token_budget, token_counter)
        .unwrap_or("")
        .to_string()
}

/// Longest left-trimmed suffix of `text` whose token count fits `limit`.
fn longest_suffix_within<'a>(
    text: &'a str,
    limit: usize,
    token_counter: &TokenCounter,
) -> Option<&'a str> {
    let trimmed = text.trim_start();
    if token_counter.as_ref()(trimmed) <= limit {
        return Some(trimmed);
    }
    text.char_indices()
        .skip(1)
        .map(|(offset, _)| text[offset..].trim_start())
        .find(|candidate| token_counter.as_ref()(candidate) <= limit)
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}
