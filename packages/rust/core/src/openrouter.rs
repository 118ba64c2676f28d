//! OpenAI-compatible chat-completions client (OpenRouter by default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use tickerflow_shared::{ComputeError, ProviderConfig, QualityTier, Result, TickerflowError};

use crate::provider::ReasoningProvider;

const USER_AGENT: &str = concat!("tickerflow/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Provider backed by `POST {base_url}chat/completions`.
pub struct OpenRouterProvider {
    client: Client,
    endpoint: Url,
    api_key: String,
    config: ProviderConfig,
}

impl OpenRouterProvider {
    pub fn new(config: &ProviderConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TickerflowError::Provider(format!("failed to build HTTP client: {e}")))?;

        let endpoint = config
            .base_url
            .join("chat/completions")
            .map_err(|e| TickerflowError::Provider(format!("invalid provider base URL: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            config: config.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ReasoningProvider for OpenRouterProvider {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len(), %tier))]
    async fn invoke(
        &self,
        prompt: &str,
        tier: QualityTier,
    ) -> std::result::Result<String, ComputeError> {
        let model = self.config.model_for(tier);
        let body = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ComputeError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ComputeError::Transport(e.to_string()))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(%model, "provider reports resource exhaustion");
            return Err(ComputeError::ResourceExhausted(text));
        }
        if !status.is_success() {
            return Err(ComputeError::Provider(format!("HTTP {status}: {}", truncate(&text))));
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| ComputeError::Transport(format!("invalid response body: {e}")))?;

        // Some gateways report upstream failures in a 200 body.
        if let Some(error) = json.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown provider error")
                .to_string();
            if error.get("code").and_then(Value::as_u64) == Some(429) {
                return Err(ComputeError::ResourceExhausted(message));
            }
            return Err(ComputeError::Provider(message));
        }

        let content = json
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| ComputeError::Provider("response has no message content".into()))?;

        debug!(%model, response_len = content.len(), "provider answered");
        Ok(content.to_string())
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
