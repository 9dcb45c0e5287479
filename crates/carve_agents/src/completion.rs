//! Request/response text completion interface.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentResult;

/// Default sampling temperature for planning calls.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Default per-call timeout.
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(120);

/// One completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model/agent identifier; `None` uses the adapter default
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            model: None,
            system_prompt: None,
            prompt: prompt.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: 4096,
            timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Completion text plus usage info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl CompletionResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: String::new(),
            input_tokens: 0,
            output_tokens: 0,
        }
    }
}

/// An external agent answering text prompts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionAgent: Send + Sync {
    /// Human-readable agent name for logs.
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> AgentResult<CompletionResponse>;
}
