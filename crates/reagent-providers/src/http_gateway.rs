//! HTTP model gateway for OpenAI-compatible `/chat/completions` endpoints.
//!
//! Each call is retried according to a [`RetryPolicy`]; each attempt is bounded
//! by the client timeout. The API key lives behind a lock holding an
//! `Arc<str>`: rotation swaps the pointer, and an attempt that already took
//! its snapshot is unaffected.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, error, info, warn};

use reagent_core::config::Config;
use reagent_core::config::ProviderConfig;
use reagent_core::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};

use crate::error::GatewayError;
use crate::retry::{with_retry, RetryPolicy};
use crate::traits::{validate_request, GenerationConfig, ModelGateway};

// ─────────────────────────────────────────────
// HttpGateway
// ─────────────────────────────────────────────

/// Talks to any OpenAI-compatible chat completion API.
pub struct HttpGateway {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"https://api.deepseek.com/v1"`).
    api_base: String,
    /// Current API key; replaced wholesale on rotation.
    api_key: RwLock<Arc<str>>,
    model: String,
    generation: GenerationConfig,
    retry: RetryPolicy,
    /// Extra headers to send with each request.
    extra_headers: HeaderMap,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("retry", &self.retry)
            .finish()
    }
}

impl HttpGateway {
    /// Create a gateway from provider settings.
    ///
    /// # Arguments
    /// * `config`     — API key, base URL, timeout, retry, headers
    /// * `model`      — model identifier sent with every request
    /// * `generation` — sampling parameters used by `generate`
    pub fn new(
        config: &ProviderConfig,
        model: &str,
        generation: GenerationConfig,
    ) -> Result<Self, GatewayError> {
        let mut extra_headers = HeaderMap::new();
        if let Some(ref headers) = config.extra_headers {
            for (key, value) in headers {
                if let (Ok(name), Ok(val)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    extra_headers.insert(name, val);
                } else {
                    warn!("Invalid header: {}={}", key, value);
                }
            }
        }

        Ok(HttpGateway {
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            api_base: config.api_base.clone(),
            api_key: RwLock::new(Arc::from(config.api_key.as_str())),
            model: model.to_string(),
            generation,
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
            extra_headers,
        })
    }

    /// Replace the retry policy (builder pattern).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the per-attempt timeout (builder pattern).
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, GatewayError> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// Swap the API key used by subsequent attempts (last writer wins).
    pub fn rotate_api_key(&self, api_key: &str) {
        let mut guard = self.api_key.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::from(api_key);
        info!(model = %self.model, "api key rotated");
    }

    /// Snapshot of the current API key.
    fn current_api_key(&self) -> Arc<str> {
        self.api_key
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    /// One request/response round-trip, no retries.
    async fn send_once(
        &self,
        url: &str,
        body: &ChatCompletionRequest,
        api_key: &str,
    ) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .headers(self.extra_headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let what = if e.is_timeout() { "timed out" } else { "failed" };
                GatewayError::Transport(format!("request to {url} {what}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(GatewayError::Transport(format!(
                "HTTP {status}: {error_text}"
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(format!("undecodable response body: {e}")))?;

        if let Some(ref usage) = parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "token usage"
            );
        }

        parsed.into_content().ok_or_else(|| {
            GatewayError::Protocol("response has no completion choice with content".into())
        })
    }
}

#[async_trait]
impl ModelGateway for HttpGateway {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String, GatewayError> {
        validate_request(messages, max_tokens)?;

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            max_tokens,
            temperature,
            top_p: self.generation.top_p,
            frequency_penalty: self.generation.frequency_penalty,
            presence_penalty: self.generation.presence_penalty,
        };
        let url = self.completions_url();

        debug!(
            model = %self.model,
            messages = messages.len(),
            max_tokens = max_tokens,
            "calling generation service"
        );

        let result = with_retry(&self.retry, "chat", |attempt| {
            let api_key = self.current_api_key();
            let url = &url;
            let body = &body;
            async move {
                debug!(attempt = attempt, "sending completion request");
                self.send_once(url, body, &api_key).await
            }
        })
        .await;

        match result {
            Ok(text) => {
                debug!(model = %self.model, chars = text.len(), "completion received");
                Ok(text)
            }
            Err(e) => {
                error!(model = %self.model, kind = e.kind(), error = %e, "generation failed");
                Err(e)
            }
        }
    }

    fn generation_config(&self) -> GenerationConfig {
        self.generation.clone()
    }

    fn with_api_key(&self, api_key: &str) -> Option<Arc<dyn ModelGateway>> {
        Some(Arc::new(HttpGateway {
            client: self.client.clone(),
            api_base: self.api_base.clone(),
            api_key: RwLock::new(Arc::from(api_key)),
            model: self.model.clone(),
            generation: self.generation.clone(),
            retry: self.retry.clone(),
            extra_headers: self.extra_headers.clone(),
        }))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))
}

// ─────────────────────────────────────────────
// Builder (convenience)
// ─────────────────────────────────────────────

/// Build an `HttpGateway` from the loaded configuration.
///
/// Fails when no API key is configured.
pub fn create_gateway(config: &Config) -> Result<HttpGateway, GatewayError> {
    if !config.provider.is_configured() {
        return Err(GatewayError::Config(
            "No API key configured. Set REAGENT_PROVIDER__API_KEY or provider.apiKey \
             in ~/.reagent/config.json."
                .into(),
        ));
    }

    debug!(
        model = %config.agent.model,
        api_base = %config.provider.api_base,
        "creating model gateway"
    );

    HttpGateway::new(
        &config.provider,
        &config.agent.model,
        GenerationConfig::from(&config.agent),
    )
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
