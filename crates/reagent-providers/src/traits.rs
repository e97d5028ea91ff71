//! Model gateway trait — the seam between the agent and the generation service.
//!
//! The agent loop only ever talks to `dyn ModelGateway`, so tests can swap in
//! scripted gateways and the HTTP client stays in this crate.

use std::sync::Arc;

use async_trait::async_trait;
use reagent_core::config::AgentConfig;
use reagent_core::types::ChatMessage;

use crate::error::GatewayError;

/// Sampling parameters sent with each request.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: 0.7,
            top_p: 0.95,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

impl From<&AgentConfig> for GenerationConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            frequency_penalty: config.frequency_penalty,
            presence_penalty: config.presence_penalty,
        }
    }
}

/// A remote text generator reached over the network.
///
/// Implementations own their retry and timeout policy: a returned error is
/// final from the caller's point of view.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Generate a completion with explicit token and temperature settings.
    ///
    /// `messages` must be non-empty and `max_tokens` greater than zero.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String, GatewayError>;

    /// Generate a completion with the gateway's configured sampling parameters.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, GatewayError> {
        let config = self.generation_config();
        self.chat(messages, config.max_tokens, config.temperature).await
    }

    /// Sampling parameters used by [`ModelGateway::generate`].
    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig::default()
    }

    /// A copy of this gateway that authenticates with `api_key`.
    ///
    /// The receiver is left untouched so concurrent runs keep their own
    /// credentials. `None` means the gateway has no notion of credentials.
    fn with_api_key(&self, _api_key: &str) -> Option<Arc<dyn ModelGateway>> {
        None
    }

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

/// Reject calls the service could never answer.
pub fn validate_request(messages: &[ChatMessage], max_tokens: u32) -> Result<(), GatewayError> {
    if messages.is_empty() {
        return Err(GatewayError::InvalidRequest("message list is empty".into()));
    }
    if max_tokens == 0 {
        return Err(GatewayError::InvalidRequest("max_tokens must be greater than zero".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_config_from_agent_config() {
        let mut agent = AgentConfig::default();
        agent.max_tokens = 128;
        agent.top_p = 0.5;
        let config = GenerationConfig::from(&agent);
        assert_eq!(config.max_tokens, 128);
        assert_eq!(config.top_p, 0.5);
        assert_eq!(config.temperature, 0.7);
    }

    #[test]
    fn test_validate_request() {
        assert!(validate_request(&[ChatMessage::user("q")], 10).is_ok());
        assert!(matches!(
            validate_request(&[], 10),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_request(&[ChatMessage::user("q")], 0),
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    struct FixedGateway;

    #[async_trait]
    impl ModelGateway for FixedGateway {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            max_tokens: u32,
            temperature: f64,
        ) -> Result<String, GatewayError> {
            Ok(format!("{max_tokens}@{temperature}"))
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_generate_uses_generation_config() {
        let gateway = FixedGateway;
        let out = gateway.generate(&[ChatMessage::user("q")]).await.unwrap();
        assert_eq!(out, "2000@0.7");
        assert!(gateway.with_api_key("k").is_none());
    }
}
