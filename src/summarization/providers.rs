//! Provider table and the generic HTTP adapter that drives every row.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::time::Duration;

use super::{ErrorKind, ProviderAdapter, ProviderCredentials, SummaryError, SummaryResult};

const SYSTEM_PROMPT: &str = "You are a professional summarizer.";
const MAX_TOKENS: u32 = 4096;
const TEMPERATURE: f64 = 0.1;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const LOCAL_MODEL: &str = "local-model";
const KOBOLD_MAX_CONTEXT: u32 = 8192;

/// Request/response contract spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// OpenAI-style `messages` in, `choices[0].message.content` out.
    ChatCompletions,
    /// Anthropic `messages` in, `content[0].text` out.
    Messages,
    /// Cohere chat with history, `text` out.
    CohereChat,
    /// Hugging Face inference summarization, `[0].summary_text` out.
    Inference,
    /// Ollama `generate`, `response` out.
    OllamaGenerate,
    /// KoboldAI `generate`, `results[0].text` out.
    KoboldGenerate,
}

/// How the API key is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// `x-api-key: <key>` plus the pinned `anthropic-version`.
    AnthropicKey,
    /// No key required.
    None,
    /// `Authorization: Bearer <key>` when a key is configured, nothing otherwise.
    OptionalBearer,
}

/// One row of the provider table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSpec {
    /// Lower-case registry name.
    pub name: &'static str,
    /// Body and response shape.
    pub wire: WireFormat,
    /// Base URL used unless overridden through the config store.
    pub base_url: &'static str,
    /// Request path; `{model}` is substituted with the resolved model.
    pub path: &'static str,
    /// Authentication scheme.
    pub auth: AuthScheme,
    /// Model used when neither the caller nor the config store names one.
    pub default_model: &'static str,
}

impl ProviderSpec {
    /// Whether the provider can be called without an API key.
    pub fn keyless(&self) -> bool {
        matches!(self.auth, AuthScheme::None | AuthScheme::OptionalBearer)
    }
}

/// Every provider the registry knows about.
pub const PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openai",
        wire: WireFormat::ChatCompletions,
        base_url: "https://api.openai.com",
        path: "/v1/chat/completions",
        auth: AuthScheme::Bearer,
        default_model: "gpt-4o",
    },
    ProviderSpec {
        name: "anthropic",
        wire: WireFormat::Messages,
        base_url: "https://api.anthropic.com",
        path: "/v1/messages",
        auth: AuthScheme::AnthropicKey,
        default_model: "claude-3-5-sonnet-20240620",
    },
    ProviderSpec {
        name: "cohere",
        wire: WireFormat::CohereChat,
        base_url: "https://api.cohere.ai",
        path: "/v1/chat",
        auth: AuthScheme::Bearer,
        default_model: "command-r-plus",
    },
    ProviderSpec {
        name: "groq",
        wire: WireFormat::ChatCompletions,
        base_url: "https://api.groq.com",
        path: "/openai/v1/chat/completions",
        auth: AuthScheme::Bearer,
        default_model: "llama3-70b-8192",
    },
    ProviderSpec {
        name: "openrouter",
        wire: WireFormat::ChatCompletions,
        base_url: "https://openrouter.ai",
        path: "/api/v1/chat/completions",
        auth: AuthScheme::Bearer,
        default_model: "mistralai/mistral-7b-instruct:free",
    },
    ProviderSpec {
        name: "deepseek",
        wire: WireFormat::ChatCompletions,
        base_url: "https://api.deepseek.com",
        path: "/chat/completions",
        auth: AuthScheme::Bearer,
        default_model: "deepseek-chat",
    },
    ProviderSpec {
        name: "huggingface",
        wire: WireFormat::Inference,
        base_url: "https://api-inference.huggingface.co",
        path: "/models/{model}",
        auth: AuthScheme::Bearer,
        default_model: "facebook/bart-large-cnn",
    },
    ProviderSpec {
        name: "ollama",
        wire: WireFormat::OllamaGenerate,
        base_url: "http://127.0.0.1:11434",
        path: "/api/generate",
        auth: AuthScheme::None,
        default_model: "llama3",
    },
    ProviderSpec {
        name: "llama.cpp",
        wire: WireFormat::ChatCompletions,
        base_url: "http://127.0.0.1:8080",
        path: "/v1/chat/completions",
        auth: AuthScheme::OptionalBearer,
        default_model: LOCAL_MODEL,
    },
    ProviderSpec {
        name: "kobold",
        wire: WireFormat::KoboldGenerate,
        base_url: "http://127.0.0.1:5001",
        path: "/api/v1/generate",
        auth: AuthScheme::OptionalBearer,
        default_model: LOCAL_MODEL,
    },
    ProviderSpec {
        name: "ooba",
        wire: WireFormat::ChatCompletions,
        base_url: "http://127.0.0.1:5000",
        path: "/v1/chat/completions",
        auth: AuthScheme::OptionalBearer,
        default_model: LOCAL_MODEL,
    },
    ProviderSpec {
        name: "tabbyapi",
        wire: WireFormat::ChatCompletions,
        base_url: "http://127.0.0.1:5000",
        path: "/v1/chat/completions",
        auth: AuthScheme::OptionalBearer,
        default_model: LOCAL_MODEL,
    },
    ProviderSpec {
        name: "vllm",
        wire: WireFormat::ChatCompletions,
        base_url: "http://127.0.0.1:8000",
        path: "/v1/chat/completions",
        auth: AuthScheme::OptionalBearer,
        default_model: LOCAL_MODEL,
    },
    ProviderSpec {
        name: "local-llm",
        wire: WireFormat::ChatCompletions,
        base_url: "http://127.0.0.1:8080",
        path: "/v1/chat/completions",
        auth: AuthScheme::OptionalBearer,
        default_model: LOCAL_MODEL,
    },
];

/// Case-insensitive lookup in [`PROVIDERS`].
pub fn find_spec(name: &str) -> Option<&'static ProviderSpec> {
    let name = name.trim();
    PROVIDERS
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

/// User content shared by every wire format.
pub fn combine(text: &str, prompt: &str) -> String {
    format!("{text} \n\n\n\n{prompt}")
}

/// Generic adapter: one [`ProviderSpec`] plus a configured HTTP client.
pub struct HttpAdapter {
    spec: &'static ProviderSpec,
    base_url: String,
    http: Client,
}

impl HttpAdapter {
    /// Build an adapter for `spec`, optionally pointed at a different base URL.
    pub fn new(
        spec: &'static ProviderSpec,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SummaryError> {
        let http = Client::builder()
            .user_agent("condense/summary")
            .timeout(timeout)
            .build()
            .map_err(|error| {
                SummaryError::new(ErrorKind::NetworkError, error.to_string())
                    .with_provider(spec.name)
            })?;
        Ok(Self {
            spec,
            base_url: base_url
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| spec.base_url.to_string()),
            http,
        })
    }

    /// The table row this adapter serves.
    pub fn spec(&self) -> &'static ProviderSpec {
        self.spec
    }

    /// Full request URL for `model`.
    pub fn endpoint(&self, model: &str) -> String {
        format!("{}{}", self.base_url, self.spec.path.replace("{model}", model))
    }

    /// Provider-specific request body. `text` and `prompt` are embedded verbatim.
    pub fn build_body(&self, text: &str, prompt: &str, model: &str) -> Value {
        let content = combine(text, prompt);
        match self.spec.wire {
            WireFormat::ChatCompletions => json!({
                "model": model,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": content },
                ],
                "max_tokens": MAX_TOKENS,
                "temperature": TEMPERATURE,
            }),
            WireFormat::Messages => json!({
                "model": model,
                "max_tokens": MAX_TOKENS,
                "messages": [{ "role": "user", "content": content }],
                "system": SYSTEM_PROMPT,
                "temperature": TEMPERATURE,
            }),
            WireFormat::CohereChat => json!({
                "model": model,
                "chat_history": [{ "role": "USER", "message": content }],
                "message": "Please provide a summary.",
            }),
            WireFormat::Inference => json!({
                "inputs": content,
                "parameters": { "max_length": 512, "min_length": 100 },
            }),
            WireFormat::OllamaGenerate => json!({
                "model": model,
                "prompt": content,
                "stream": false,
                "options": { "temperature": TEMPERATURE },
            }),
            WireFormat::KoboldGenerate => json!({
                "prompt": format!("{SYSTEM_PROMPT}\n\n{content}"),
                "max_context_length": KOBOLD_MAX_CONTEXT,
                "max_length": MAX_TOKENS,
                "temperature": TEMPERATURE,
            }),
        }
    }

    fn authorize(&self, request: RequestBuilder, api_key: &str) -> RequestBuilder {
        match self.spec.auth {
            AuthScheme::Bearer => request.bearer_auth(api_key),
            AuthScheme::AnthropicKey => request
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            AuthScheme::OptionalBearer if !api_key.is_empty() => request.bearer_auth(api_key),
            AuthScheme::OptionalBearer | AuthScheme::None => request,
        }
    }

    fn error(&self, kind: ErrorKind, detail: impl Into<String>) -> SummaryError {
        SummaryError::new(kind, detail).with_provider(self.spec.name)
    }

    fn extract(&self, body: &Value) -> Option<String> {
        let text = match self.spec.wire {
            WireFormat::ChatCompletions => body
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str),
            WireFormat::Messages => body.pointer("/content/0/text").and_then(Value::as_str),
            WireFormat::CohereChat => body.get("text").and_then(Value::as_str),
            WireFormat::Inference => body.pointer("/0/summary_text").and_then(Value::as_str),
            WireFormat::OllamaGenerate => {
                if body.get("done").and_then(Value::as_bool) != Some(true) {
                    return None;
                }
                body.get("response").and_then(Value::as_str)
            }
            WireFormat::KoboldGenerate => body.pointer("/results/0/text").and_then(Value::as_str),
        };
        text.map(|summary| summary.trim().to_string())
    }
}

#[async_trait]
impl ProviderAdapter for HttpAdapter {
    fn name(&self) -> &str {
        self.spec.name
    }

    async fn invoke(
        &self,
        text: &str,
        prompt: &str,
        credentials: &ProviderCredentials,
    ) -> SummaryResult {
        let url = self.endpoint(&credentials.model);
        let body = self.build_body(text, prompt, &credentials.model);
        tracing::debug!(
            provider = self.spec.name,
            model = %credentials.model,
            url = %url,
            chars = text.len(),
            "Posting summarization request"
        );

        let request = self.authorize(self.http.post(&url).json(&body), &credentials.api_key);
        let response = request.send().await.map_err(|error| {
            if error.is_builder() {
                self.error(ErrorKind::InvalidInput, format!("could not build request: {error}"))
            } else {
                self.error(ErrorKind::NetworkError, format!("request to {url} failed: {error}"))
            }
        })?;

        let status = response.status();
        let raw = response.text().await.map_err(|error| {
            self.error(ErrorKind::NetworkError, format!("failed to read response body: {error}"))
        })?;

        if !status.is_success() {
            tracing::debug!(
                provider = self.spec.name,
                status = status.as_u16(),
                "Provider returned an error status"
            );
            return Err(self.error(
                ErrorKind::HttpError {
                    status: status.as_u16(),
                },
                raw,
            ));
        }

        let parsed: Value = serde_json::from_str(&raw).map_err(|error| {
            self.error(
                ErrorKind::UnexpectedResponse,
                format!("response was not JSON ({error}): {raw}"),
            )
        })?;

        self.extract(&parsed).ok_or_else(|| {
            self.error(
                ErrorKind::UnexpectedResponse,
                format!("response did not contain a summary: {raw}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn adapter(name: &str, server: &MockServer) -> HttpAdapter {
        let spec = find_spec(name).expect("known provider");
        HttpAdapter::new(spec, Some(server.base_url()), Duration::from_secs(5)).expect("adapter")
    }

    fn credentials(model: &str) -> ProviderCredentials {
        ProviderCredentials {
            api_key: "test-key".into(),
            model: model.into(),
        }
    }

    #[tokio::test]
    async fn chat_completions_round_trip() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer test-key")
                    .json_body(json!({
                        "model": "gpt-4o",
                        "messages": [
                            { "role": "system", "content": "You are a professional summarizer." },
                            { "role": "user", "content": "hello world \n\n\n\nsummarize" },
                        ],
                        "max_tokens": 4096,
                        "temperature": 0.1,
                    }));
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "  short  " } }]
                }));
            })
            .await;

        let summary = adapter("openai", &server)
            .invoke("hello world", "summarize", &credentials("gpt-4o"))
            .await
            .expect("summary");

        mock.assert_async().await;
        assert_eq!(summary, "short");
    }

    #[tokio::test]
    async fn anthropic_sends_key_and_version_headers() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/messages")
                    .header("x-api-key", "test-key")
                    .header("anthropic-version", "2023-06-01")
                    .json_body_partial(r#"{"system": "You are a professional summarizer."}"#);
                then.status(200)
                    .json_body(json!({ "content": [{ "type": "text", "text": "claude says" }] }));
            })
            .await;

        let summary = adapter("anthropic", &server)
            .invoke("text", "prompt", &credentials("claude-3-5-sonnet-20240620"))
            .await
            .expect("summary");

        mock.assert_async().await;
        assert_eq!(summary, "claude says");
    }

    #[tokio::test]
    async fn cohere_uses_chat_history() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat").json_body(json!({
                    "model": "command-r-plus",
                    "chat_history": [{ "role": "USER", "message": "t \n\n\n\np" }],
                    "message": "Please provide a summary.",
                }));
                then.status(200).json_body(json!({ "text": "cohere summary" }));
            })
            .await;

        let summary = adapter("cohere", &server)
            .invoke("t", "p", &credentials("command-r-plus"))
            .await
            .expect("summary");

        mock.assert_async().await;
        assert_eq!(summary, "cohere summary");
    }

    #[tokio::test]
    async fn huggingface_puts_model_in_path() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/facebook/bart-large-cnn")
                    .json_body_partial(r#"{"parameters": {"max_length": 512, "min_length": 100}}"#);
                then.status(200)
                    .json_body(json!([{ "summary_text": "hf summary" }]));
            })
            .await;

        let summary = adapter("huggingface", &server)
            .invoke("t", "p", &credentials("facebook/bart-large-cnn"))
            .await
            .expect("summary");

        mock.assert_async().await;
        assert_eq!(summary, "hf summary");
    }

    #[tokio::test]
    async fn ollama_requires_completed_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"stream": false}"#);
                then.status(200)
                    .json_body(json!({ "response": "partial", "done": false }));
            })
            .await;

        let error = adapter("ollama", &server)
            .invoke("t", "p", &credentials("llama3"))
            .await
            .expect_err("incomplete response");

        assert_eq!(error.kind, ErrorKind::UnexpectedResponse);
        assert_eq!(error.provider.as_deref(), Some("ollama"));
    }

    #[tokio::test]
    async fn local_chat_servers_skip_auth_without_a_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .matches(|request| {
                        request.headers.iter().flatten().all(|(name, _)| {
                            !name.eq_ignore_ascii_case("authorization")
                        })
                    })
                    .json_body_partial(r#"{"model": "local-model", "max_tokens": 4096}"#);
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "vllm summary" } }]
                }));
            })
            .await;

        let summary = adapter("vllm", &server)
            .invoke(
                "t",
                "p",
                &ProviderCredentials {
                    api_key: String::new(),
                    model: "local-model".into(),
                },
            )
            .await
            .expect("summary");

        mock.assert_async().await;
        assert_eq!(summary, "vllm summary");
    }

    #[tokio::test]
    async fn local_chat_servers_forward_a_configured_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer test-key");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "tabby summary" } }]
                }));
            })
            .await;

        let summary = adapter("tabbyapi", &server)
            .invoke("t", "p", &credentials("local-model"))
            .await
            .expect("summary");

        mock.assert_async().await;
        assert_eq!(summary, "tabby summary");
    }

    #[tokio::test]
    async fn kobold_reads_the_first_result() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/generate").json_body(json!({
                    "prompt": "You are a professional summarizer.\n\nt \n\n\n\np",
                    "max_context_length": 8192,
                    "max_length": 4096,
                    "temperature": 0.1,
                }));
                then.status(200)
                    .json_body(json!({ "results": [{ "text": " kobold summary " }] }));
            })
            .await;

        let summary = adapter("kobold", &server)
            .invoke("t", "p", &credentials("local-model"))
            .await
            .expect("summary");

        mock.assert_async().await;
        assert_eq!(summary, "kobold summary");
    }

    #[tokio::test]
    async fn non_success_status_carries_the_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/openai/v1/chat/completions");
                then.status(503).body("overloaded");
            })
            .await;

        let error = adapter("groq", &server)
            .invoke("t", "p", &credentials("llama3-70b-8192"))
            .await
            .expect_err("error status");

        assert_eq!(error.kind, ErrorKind::HttpError { status: 503 });
        assert_eq!(error.detail, "overloaded");
        assert!(error.kind.is_retryable());
    }

    #[tokio::test]
    async fn wrong_shape_is_unexpected_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = adapter("deepseek", &server)
            .invoke("t", "p", &credentials("deepseek-chat"))
            .await
            .expect_err("unexpected shape");

        assert_eq!(error.kind, ErrorKind::UnexpectedResponse);
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let spec = find_spec("openrouter").expect("known provider");
        let adapter = HttpAdapter::new(
            spec,
            Some("http://127.0.0.1:1".into()),
            Duration::from_secs(2),
        )
        .expect("adapter");

        let error = adapter
            .invoke("t", "p", &credentials("m"))
            .await
            .expect_err("connection refused");

        assert_eq!(error.kind, ErrorKind::NetworkError);
    }

    #[tokio::test]
    async fn invalid_header_value_is_invalid_input() {
        let server = MockServer::start_async().await;
        let error = adapter("openai", &server)
            .invoke(
                "t",
                "p",
                &ProviderCredentials {
                    api_key: "bad\nkey".into(),
                    model: "gpt-4o".into(),
                },
            )
            .await
            .expect_err("invalid header");

        assert_eq!(error.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(find_spec(" OpenAI ").map(|spec| spec.name), Some("openai"));
        assert!(find_spec("unknown").is_none());
        assert!(find_spec("ollama").expect("ollama").keyless());
        assert!(find_spec("LLAMA.CPP").expect("llama.cpp").keyless());
        assert!(!find_spec("openai").expect("openai").keyless());
    }

    #[test]
    fn text_and_prompt_are_not_truncated() {
        let spec = find_spec("openai").expect("openai");
        let adapter = HttpAdapter::new(spec, None, Duration::from_secs(1)).expect("adapter");
        let long = "word ".repeat(50_000);
        let body = adapter.build_body(&long, "p", "gpt-4o");
        let content = body
            .pointer("/messages/1/content")
            .and_then(Value::as_str)
            .expect("user content");
        assert_eq!(content, combine(&long, "p"));
    }
}
