//! Input normalization: every supported input shape becomes a [`CanonicalDocument`].

use serde_json::{Map, Value};
use std::path::Path;

use super::sanitize::sanitize_string;
use super::types::{
    CanonicalDocument, DEFAULT_AUTHOR, DEFAULT_TITLE, DocumentInput, DocumentMetadata, InputError,
    Segment,
};

/// Normalize raw input into metadata plus flattened content.
///
/// Strings are tried in order: an existing file path (parsed as JSON), an inline JSON object or
/// array, and finally plain text. [`DocumentInput::Inline`] never looks at the filesystem.
/// Structured input is searched for `summary`, then `transcription`/`segments`, then `content`;
/// anything else is serialized back to JSON text.
pub fn normalize(input: DocumentInput) -> Result<CanonicalDocument, InputError> {
    match input {
        DocumentInput::Text(text) => normalize_text(text),
        DocumentInput::Inline(text) => normalize_inline(text),
        DocumentInput::Path(path) => normalize_value(read_json_file(&path)?),
        DocumentInput::Json(value) => normalize_value(value),
        DocumentInput::Segments(segments) => {
            Ok(from_segments(DocumentMetadata::default(), segments))
        }
    }
}

fn normalize_text(text: String) -> Result<CanonicalDocument, InputError> {
    let candidate = text.trim();
    if !candidate.is_empty() && !candidate.contains('\n') && Path::new(candidate).is_file() {
        tracing::debug!(path = candidate, "Loading JSON document from file");
        return normalize_value(read_json_file(Path::new(candidate))?);
    }
    normalize_inline(text)
}

fn normalize_inline(text: String) -> Result<CanonicalDocument, InputError> {
    let candidate = text.trim();
    if candidate.starts_with('{') || candidate.starts_with('[') {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => return normalize_value(value),
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "Input looks like JSON but failed to parse; treating as plain text"
                );
            }
        }
    }

    Ok(CanonicalDocument {
        metadata: DocumentMetadata::default(),
        content: text,
        segments: Vec::new(),
        pre_summarized: false,
    })
}

fn read_json_file(path: &Path) -> Result<Value, InputError> {
    let raw = std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| InputError::InvalidJson {
        path: path.to_path_buf(),
        source,
    })
}

fn normalize_value(value: Value) -> Result<CanonicalDocument, InputError> {
    match value {
        Value::Object(map) => Ok(normalize_mapping(map)),
        Value::Array(items) => Ok(from_segments(
            DocumentMetadata::default(),
            parse_segments(&items),
        )),
        Value::String(text) => Ok(CanonicalDocument {
            metadata: DocumentMetadata::default(),
            content: text,
            segments: Vec::new(),
            pre_summarized: false,
        }),
        other => Err(InputError::UnsupportedShape(json_kind(&other).to_string())),
    }
}

fn normalize_mapping(map: Map<String, Value>) -> CanonicalDocument {
    let metadata = DocumentMetadata {
        title: string_field(&map, "title").unwrap_or_else(|| DEFAULT_TITLE.into()),
        author: string_field(&map, "author").unwrap_or_else(|| DEFAULT_AUTHOR.into()),
    };

    let stored_summary = map.get("summary").filter(|summary| match summary {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        _ => true,
    });
    if let Some(summary) = stored_summary {
        tracing::debug!("Input already carries a summary; passing it through");
        return CanonicalDocument {
            metadata,
            content: value_as_text(summary),
            segments: Vec::new(),
            pre_summarized: true,
        };
    }

    let segment_field = map.get("transcription").or_else(|| map.get("segments"));
    if let Some(field) = segment_field {
        return match field {
            Value::Array(items) => from_segments(metadata, parse_segments(items)),
            Value::String(text) => CanonicalDocument {
                metadata,
                content: text.clone(),
                segments: Vec::new(),
                pre_summarized: false,
            },
            other => {
                tracing::warn!(
                    kind = json_kind(other),
                    "Unexpected segment container; using its JSON text"
                );
                CanonicalDocument {
                    metadata,
                    content: other.to_string(),
                    segments: Vec::new(),
                    pre_summarized: false,
                }
            }
        };
    }

    let content = match map.get("content") {
        Some(value) => value_as_text(value),
        None => Value::Object(map.clone()).to_string(),
    };

    CanonicalDocument {
        metadata,
        content,
        segments: Vec::new(),
        pre_summarized: false,
    }
}

fn from_segments(metadata: DocumentMetadata, segments: Vec<Segment>) -> CanonicalDocument {
    CanonicalDocument {
        metadata,
        content: flatten_segments(&segments),
        segments,
        pre_summarized: false,
    }
}

/// Join segment texts with single spaces.
pub fn flatten_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| segment.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse segment records, skipping (and logging) entries without a text field.
pub fn parse_segments(items: &[Value]) -> Vec<Segment> {
    items
        .iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let segment = item.as_object().and_then(parse_segment);
            if segment.is_none() {
                tracing::warn!(position, "Skipping segment without a text field");
            }
            segment
        })
        .collect()
}

fn parse_segment(record: &Map<String, Value>) -> Option<Segment> {
    let text = record
        .get("Text")
        .or_else(|| record.get("text"))
        .and_then(Value::as_str)?;
    Some(Segment {
        text: text.to_string(),
        start: number_field(record, &["Time_Start", "start"]),
        end: number_field(record, &["Time_End", "end"]),
        speaker: ["Speaker", "speaker"]
            .iter()
            .find_map(|key| record.get(*key).and_then(Value::as_str))
            .map(str::to_string),
    })
}

fn number_field(record: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match record.get(*key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    sanitize_string(map.get(key).and_then(Value::as_str).map(str::to_string))
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render the structured form sent to providers: a title/author header followed by the content.
pub fn format_with_metadata(document: &CanonicalDocument) -> String {
    format!(
        "Title: {}\nAuthor: {}\n\n{}",
        document.metadata.title, document.metadata.author, document.content
    )
}
