//! Provider-agnostic summarization: error taxonomy, the adapter seam, and dispatch helpers.
//!
//! Each provider is one row in the [`providers`] table and is driven by a single generic HTTP
//! adapter. Adapters make exactly one request per invocation; transient failures are retried by
//! [`retry::with_retry`], never inside an adapter.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub mod credentials;
pub mod providers;
pub mod registry;
pub mod retry;

pub use credentials::resolve_credentials;
pub use providers::{HttpAdapter, PROVIDERS, ProviderSpec, WireFormat};
pub use registry::{AdapterRegistry, SharedAdapter};
pub use retry::{RetryPolicy, with_retry};

/// Prompt appended to every chunk when the caller does not supply one.
pub const DEFAULT_PROMPT: &str = "You are a bulleted notes specialist. ```When creating \
    comprehensive bulleted notes, you should follow these guidelines: Use multiple headings \
    based on the referenced topics, not categories like quotes or terms. Headings should be \
    surrounded by bold formatting and not be listed as bullet points themselves. Leave no space \
    between headings and their corresponding list items underneath. Important terms within the \
    content should be emphasized by setting them in bold font. Any text that ends with a colon \
    should also be bolded. Before submitting your response, review the instructions, and make \
    any corrections necessary to adhere to the specified format. Do not reference these \
    instructions within the notes.``` \nBased on the content between backticks create \
    comprehensive bulleted notes.
**Bulleted Note Creation Guidelines**

**Headings**:
- Based on referenced topics, not categories like quotes or terms
- Surrounded by **bold** formatting
- Not listed as bullet points
- No space between headings and list items underneath

**Emphasis**:
- **Important terms** set in bold font
- **Text ending in a colon**: also bolded

**Review**:
- Ensure adherence to specified format
- Do not reference these instructions in your response.";

/// Classification of every failure the pipeline can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input could not be normalized or a request could not be built.
    InvalidInput,
    /// No API key was supplied or configured for the provider.
    MissingCredential,
    /// Provider name is not in the registry.
    UnsupportedProvider,
    /// Transport failure or timeout. Retryable.
    NetworkError,
    /// Provider answered with a non-success status. Retryable when `status >= 500`.
    HttpError {
        /// HTTP status code returned by the provider.
        status: u16,
    },
    /// Provider answered 2xx but the body did not have the expected shape.
    UnexpectedResponse,
    /// Chunk options were invalid.
    ChunkingError,
    /// The run was cancelled before it finished.
    Cancelled,
}

impl ErrorKind {
    /// Whether the retry controller should try again after this kind of failure.
    pub fn is_retryable(self) -> bool {
        match self {
            Self::NetworkError => true,
            Self::HttpError { status } => status >= 500,
            _ => false,
        }
    }

    /// Stable snake_case label used in logs and API error bodies.
    pub fn label(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::MissingCredential => "missing_credential",
            Self::UnsupportedProvider => "unsupported_provider",
            Self::NetworkError => "network_error",
            Self::HttpError { .. } => "http_error",
            Self::UnexpectedResponse => "unexpected_response",
            Self::ChunkingError => "chunking_error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpError { status } => write!(f, "http_error({status})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Failure value carried by [`SummaryResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.describe())]
pub struct SummaryError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Human-readable detail (raw response body for HTTP errors).
    pub detail: String,
    /// Provider the failure is attributed to, when known.
    pub provider: Option<String>,
    /// Provider invocations made before giving up (0 when no call was made).
    pub attempts: u32,
}

impl SummaryError {
    /// Build an error with no provider attribution and no attempts.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            provider: None,
            attempts: 0,
        }
    }

    /// Attach the provider name.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Record how many invocations were made.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Shorthand for [`ErrorKind::InvalidInput`].
    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, detail)
    }

    /// Shorthand for [`ErrorKind::Cancelled`].
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "summarization cancelled")
    }

    /// One-line description naming the provider and the error kind.
    pub fn describe(&self) -> String {
        let provider = self.provider.as_deref().unwrap_or("pipeline");
        let mut line = format!("{provider}: {}: {}", self.kind, self.detail);
        if self.attempts > 1 {
            line.push_str(&format!(" (after {} attempts)", self.attempts));
        }
        line
    }
}

/// Outcome of one provider call, one reduction, or one pipeline run.
pub type SummaryResult = Result<String, SummaryError>;

/// Key and model resolved once per run and shared read-only by every chunk call.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    /// API key; empty for key-less providers.
    pub api_key: String,
    /// Model identifier sent to the provider.
    pub model: String,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("model", &self.model)
            .finish()
    }
}

/// A single unit of provider work.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    /// Registry name of the target provider.
    pub provider_name: String,
    /// Text to summarize.
    pub text: String,
    /// Instruction appended after the text.
    pub prompt: String,
    /// Credentials for this provider.
    pub credentials: ProviderCredentials,
}

/// Uniform interface implemented by every provider.
///
/// Implementations issue exactly one request per call and classify the outcome into a
/// [`SummaryResult`]; they never retry and never panic on provider output.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry name of the provider this adapter talks to.
    fn name(&self) -> &str;

    /// Summarize `text` following `prompt`.
    async fn invoke(
        &self,
        text: &str,
        prompt: &str,
        credentials: &ProviderCredentials,
    ) -> SummaryResult;
}

/// Dispatch one [`SummaryRequest`] through the registry.
pub async fn summarize_request(
    registry: &AdapterRegistry,
    request: &SummaryRequest,
) -> SummaryResult {
    let adapter = registry.get(&request.provider_name)?;
    adapter
        .invoke(&request.text, &request.prompt, &request.credentials)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_kinds_are_retryable() {
        assert!(ErrorKind::NetworkError.is_retryable());
        assert!(ErrorKind::HttpError { status: 503 }.is_retryable());
        assert!(!ErrorKind::HttpError { status: 429 }.is_retryable());
        assert!(!ErrorKind::MissingCredential.is_retryable());
        assert!(!ErrorKind::UnexpectedResponse.is_retryable());
    }

    #[test]
    fn description_names_provider_and_kind() {
        let error = SummaryError::new(ErrorKind::HttpError { status: 502 }, "bad gateway")
            .with_provider("openai")
            .with_attempts(3);
        assert_eq!(
            error.to_string(),
            "openai: http_error(502): bad gateway (after 3 attempts)"
        );
    }

    #[test]
    fn credentials_debug_hides_the_key() {
        let credentials = ProviderCredentials {
            api_key: "sk-secret".into(),
            model: "gpt-4o".into(),
        };
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("gpt-4o"));
    }

    struct Echo;

    #[async_trait]
    impl ProviderAdapter for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn invoke(
            &self,
            text: &str,
            prompt: &str,
            credentials: &ProviderCredentials,
        ) -> SummaryResult {
            Ok(format!("{}|{text}|{prompt}", credentials.model))
        }
    }

    #[tokio::test]
    async fn requests_dispatch_by_provider_name() {
        let store: std::sync::Arc<dyn crate::config::ConfigStore> =
            std::sync::Arc::new(crate::config::MapConfigStore::new());
        let registry = AdapterRegistry::new(store, std::time::Duration::from_secs(1))
            .with_adapter(std::sync::Arc::new(Echo));
        let mut request = SummaryRequest {
            provider_name: "ECHO".into(),
            text: "body".into(),
            prompt: "shorter".into(),
            credentials: ProviderCredentials {
                api_key: "k".into(),
                model: "m".into(),
            },
        };

        assert_eq!(
            summarize_request(&registry, &request).await,
            Ok("m|body|shorter".into())
        );

        request.provider_name = "nobody".into();
        let error = summarize_request(&registry, &request).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnsupportedProvider);
    }
}
