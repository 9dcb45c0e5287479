//! LLM adapter for planning completions.
//!
//! Supports OpenAI and Anthropic APIs, selected explicitly or via environment
//! variables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::completion::{CompletionAgent, CompletionRequest, CompletionResponse};
use crate::error::{AgentError, AgentResult};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const MAX_RETRIES: u32 = 3;

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[serde(alias = "open_ai")]
    OpenAI,
    Anthropic,
}

impl LlmProvider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-sonnet-latest",
        }
    }

    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAI => f.write_str("openai"),
            Self::Anthropic => f.write_str("anthropic"),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(AgentError::UnknownProvider(other.to_string())),
        }
    }
}

/// LLM adapter that handles API calls
pub struct LlmAdapter {
    provider: LlmProvider,
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl fmt::Debug for LlmAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmAdapter")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl LlmAdapter {
    /// Create a new LLM adapter with explicit configuration
    pub fn new(provider: LlmProvider, api_key: impl Into<String>, model: Option<String>) -> Self {
        let base_url = match provider {
            LlmProvider::OpenAI => OPENAI_URL,
            LlmProvider::Anthropic => ANTHROPIC_URL,
        };

        Self {
            provider,
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| provider.default_model().to_string()),
            base_url: base_url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create an LLM adapter from environment variables.
    ///
    /// With a preferred provider only its key is considered. Otherwise
    /// `OPENAI_API_KEY` is checked before `ANTHROPIC_API_KEY`.
    pub fn from_env(preferred: Option<LlmProvider>, model: Option<String>) -> AgentResult<Self> {
        let candidates = match preferred {
            Some(p) => vec![p],
            None => vec![LlmProvider::OpenAI, LlmProvider::Anthropic],
        };

        for provider in candidates {
            if let Ok(api_key) = std::env::var(provider.api_key_var()) {
                if !api_key.is_empty() {
                    return Ok(Self::new(provider, api_key, model));
                }
            }
        }

        Err(AgentError::NotConfigured)
    }

    /// Point the adapter at a compatible endpoint (proxies, local gateways).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a request, retrying transient failures with exponential backoff.
    async fn send_with_retry(
        &self,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> AgentResult<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1));
                debug!("Retrying {} call in {:?}", self.provider, delay);
                tokio::time::sleep(delay).await;
            }

            let request = match self.provider {
                LlmProvider::OpenAI => self
                    .client
                    .post(&self.base_url)
                    .header("Authorization", format!("Bearer {}", self.api_key)),
                LlmProvider::Anthropic => self
                    .client
                    .post(&self.base_url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01"),
            }
            .header("Content-Type", "application/json")
            .json(body);

            let response = match tokio::time::timeout(timeout, request.send()).await {
                Err(_) => return Err(AgentError::Timeout(timeout.as_secs())),
                Ok(Err(e)) => {
                    warn!(
                        "{} network error (attempt {}/{}): {}",
                        self.provider,
                        attempt + 1,
                        MAX_RETRIES,
                        e
                    );
                    last_error = Some(AgentError::Network(e.to_string()));
                    continue;
                }
                Ok(Ok(resp)) => resp,
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let error = AgentError::Api {
                provider: self.provider.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            };
            if !error.is_transient() {
                return Err(error);
            }
            warn!("{} (attempt {}/{})", error, attempt + 1, MAX_RETRIES);
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| AgentError::Network("Max retries exceeded".to_string())))
    }

    async fn complete_openai(&self, request: &CompletionRequest, model: &str) -> AgentResult<CompletionResponse> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage::new("system", system));
        }
        messages.push(ChatMessage::new("user", &request.prompt));

        let body = serde_json::to_value(OpenAIRequest {
            model: model.to_string(),
            messages,
            temperature: request.temperature,
            max_completion_tokens: Some(request.max_tokens),
        })?;

        let response = self.send_with_retry(&body, request.timeout).await?;
        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| AgentError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AgentError::InvalidResponse("No response from OpenAI".to_string()))?;
        let (input_tokens, output_tokens) = result
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(CompletionResponse {
            content,
            model: model.to_string(),
            input_tokens,
            output_tokens,
        })
    }

    async fn complete_anthropic(&self, request: &CompletionRequest, model: &str) -> AgentResult<CompletionResponse> {
        let body = serde_json::to_value(AnthropicRequest {
            model: model.to_string(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system_prompt.clone(),
            messages: vec![ChatMessage::new("user", &request.prompt)],
        })?;

        let response = self.send_with_retry(&body, request.timeout).await?;
        let result: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AgentError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let content = result
            .content
            .into_iter()
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");
        if content.is_empty() {
            return Err(AgentError::InvalidResponse(
                "No response from Anthropic".to_string(),
            ));
        }
        let (input_tokens, output_tokens) = result
            .usage
            .map(|u| (u.input_tokens, u.output_tokens))
            .unwrap_or((0, 0));

        Ok(CompletionResponse {
            content,
            model: model.to_string(),
            input_tokens,
            output_tokens,
        })
    }
}

#[async_trait]
impl CompletionAgent for LlmAdapter {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> AgentResult<CompletionResponse> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        debug!("Calling {} model {}", self.provider, model);

        match self.provider {
            LlmProvider::OpenAI => self.complete_openai(&request, &model).await,
            LlmProvider::Anthropic => self.complete_anthropic(&request, &model).await,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_models() {
        let openai = LlmAdapter::new(LlmProvider::OpenAI, "key", None);
        assert_eq!(openai.model(), "gpt-4o-mini");

        let anthropic = LlmAdapter::new(LlmProvider::Anthropic, "key", None);
        assert_eq!(anthropic.model(), "claude-3-5-sonnet-latest");
    }

    #[test]
    fn test_custom_model() {
        let adapter = LlmAdapter::new(LlmProvider::OpenAI, "key", Some("gpt-4.1".to_string()));
        assert_eq!(adapter.model(), "gpt-4.1");
        assert_eq!(adapter.name(), "gpt-4.1");
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAI);
        assert_eq!("anthropic".parse::<LlmProvider>().unwrap(), LlmProvider::Anthropic);
        assert!("gemini".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let adapter = LlmAdapter::new(LlmProvider::Anthropic, "sk-secret", None);
        assert!(!format!("{:?}", adapter).contains("sk-secret"));
    }

    #[test]
    fn test_transient_classification() {
        let server = AgentError::Api {
            provider: "openai".into(),
            status: 503,
            body: String::new(),
        };
        let rate = AgentError::Api {
            provider: "openai".into(),
            status: 429,
            body: String::new(),
        };
        let auth = AgentError::Api {
            provider: "openai".into(),
            status: 401,
            body: String::new(),
        };
        assert!(server.is_transient());
        assert!(rate.is_transient());
        assert!(!auth.is_transient());
        assert!(!AgentError::Timeout(120).is_transient());
    }
}
