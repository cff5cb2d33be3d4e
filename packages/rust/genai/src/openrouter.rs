//! OpenRouter-style chat-completions backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use termforge_shared::{BackendConfig, ModelPrice, Result, TermForgeError};

use crate::prompt::{SYSTEM_PROMPT, build_user_prompt};
use crate::{GeneratedContent, GenerationBackend, GenerationRequest};

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("TermForge/", env!("CARGO_PKG_VERSION"));

/// Per-call request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP backend speaking the chat-completions wire format.
#[derive(Debug)]
pub struct OpenRouterBackend {
    client: Client,
    endpoint: Url,
    api_key: String,
    prices: Vec<ModelPrice>,
}

impl OpenRouterBackend {
    /// Build a backend with an explicit API key.
    pub fn new(config: &BackendConfig, api_key: impl Into<String>) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            TermForgeError::config(format!("invalid backend endpoint {}: {e}", config.endpoint))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                TermForgeError::generation_terminal(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            prices: config.prices.clone(),
        })
    }

    /// Build a backend reading the API key from the configured env var.
    pub fn from_env(config: &BackendConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            TermForgeError::config(format!(
                "backend API key not found. Set the {} environment variable.",
                config.api_key_env
            ))
        })?;
        Self::new(config, api_key)
    }

    /// USD cost of a call from the configured per-model token prices.
    /// Unknown models account as zero cost, loudly.
    fn cost_for(&self, model: &str, tokens_in: u64, tokens_out: u64) -> f64 {
        match self.prices.iter().find(|p| p.model == model) {
            Some(price) => {
                (tokens_in as f64 * price.input_usd_per_mtok
                    + tokens_out as f64 * price.output_usd_per_mtok)
                    / 1_000_000.0
            }
            None => {
                tracing::warn!(model, "no price configured for model, accounting zero cost");
                0.0
            }
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenRouterBackend {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent> {
        let started = Instant::now();

        let body = serde_json::json!({
            "model": request.model_id,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_user_prompt(request) },
            ],
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                // Transport failures (timeouts, resets) are worth retrying.
                TermForgeError::generation_retryable(format!("{}: {e}", request.model_id))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &request.model_id, &detail));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            TermForgeError::generation_retryable(format!("malformed backend response: {e}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(TermForgeError::generation_retryable(format!(
                "{}: backend returned no content",
                request.model_id
            )));
        }

        let model = parsed.model.unwrap_or_else(|| request.model_id.clone());
        let usage = parsed.usage.unwrap_or_default();
        let cost = self.cost_for(&model, usage.prompt_tokens, usage.completion_tokens);
        let latency_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(
            model = %model,
            tokens_in = usage.prompt_tokens,
            tokens_out = usage.completion_tokens,
            cost_usd = cost,
            latency_ms,
            "generation call completed"
        );

        Ok(GeneratedContent {
            content: content.trim().to_string(),
            cost_incurred: cost,
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
            model,
            latency_ms,
        })
    }
}

/// Map an HTTP error status onto the retryable/terminal split: rate limits,
/// request timeouts and server errors retry; everything else (auth,
/// malformed prompt, rejected content) short-circuits.
fn classify_status(status: StatusCode, model: &str, detail: &str) -> TermForgeError {
    let message = format!("{model}: HTTP {status}: {}", snippet(detail));
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        TermForgeError::generation_retryable(message)
    } else {
        TermForgeError::generation_terminal(message)
    }
}

fn snippet(text: &str) -> &str {
    &text[..text.len().min(200)]
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use termforge_shared::SectionId;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server_uri: &str) -> BackendConfig {
        BackendConfig {
            endpoint: format!("{server_uri}/api/v1/chat/completions"),
            ..BackendConfig::default()
        }
    }

    fn test_request() -> GenerationRequest {
        GenerationRequest {
            term: "Attention".into(),
            section: SectionId::Faqs,
            context: serde_json::json!({ "definition": "A weighting mechanism." }),
            model_id: "openai/gpt-4.1-nano".into(),
        }
    }

    #[tokio::test]
    async fn successful_call_returns_content_and_cost() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "openai/gpt-4.1-nano",
                "choices": [
                    { "message": { "role": "assistant", "content": "Q: What is attention?\nA: ..." } }
                ],
                "usage": { "prompt_tokens": 1000, "completion_tokens": 500 }
            })))
            .mount(&server)
            .await;

        let backend =
            OpenRouterBackend::new(&test_config(&server.uri()), "test-key").expect("backend");
        let result = backend.generate(&test_request()).await.expect("generate");

        assert!(result.content.starts_with("Q: What is attention?"));
        assert_eq!(result.tokens_in, 1000);
        assert_eq!(result.tokens_out, 500);
        // 1000 in @ 0.10/Mtok + 500 out @ 0.40/Mtok
        let expected = (1000.0 * 0.10 + 500.0 * 0.40) / 1_000_000.0;
        assert!((result.cost_incurred - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn rate_limit_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let backend =
            OpenRouterBackend::new(&test_config(&server.uri()), "test-key").expect("backend");
        let err = backend.generate(&test_request()).await.unwrap_err();
        assert!(err.is_retryable(), "429 should be retryable: {err}");
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend =
            OpenRouterBackend::new(&test_config(&server.uri()), "test-key").expect("backend");
        let err = backend.generate(&test_request()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn bad_request_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("malformed prompt"))
            .mount(&server)
            .await;

        let backend =
            OpenRouterBackend::new(&test_config(&server.uri()), "test-key").expect("backend");
        let err = backend.generate(&test_request()).await.unwrap_err();
        assert!(!err.is_retryable(), "400 should be terminal: {err}");
        assert!(err.to_string().contains("malformed prompt"));
    }

    #[tokio::test]
    async fn empty_choices_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let backend =
            OpenRouterBackend::new(&test_config(&server.uri()), "test-key").expect("backend");
        let err = backend.generate(&test_request()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("no content"));
    }

    #[tokio::test]
    async fn unknown_model_accounts_zero_cost() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "some/unpriced-model",
                "choices": [ { "message": { "content": "text" } } ],
                "usage": { "prompt_tokens": 10, "completion_tokens": 10 }
            })))
            .mount(&server)
            .await;

        let backend =
            OpenRouterBackend::new(&test_config(&server.uri()), "test-key").expect("backend");
        let result = backend.generate(&test_request()).await.expect("generate");
        assert_eq!(result.cost_incurred, 0.0);
    }

    #[test]
    fn invalid_endpoint_is_config_error() {
        let config = BackendConfig {
            endpoint: "not a url".into(),
            ..BackendConfig::default()
        };
        let err = OpenRouterBackend::new(&config, "key").unwrap_err();
        assert!(matches!(err, TermForgeError::Config { .. }));
    }
}
