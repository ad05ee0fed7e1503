use crate::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const BACKEND: &str = "openrouter";

pub const DEFAULT_COMPLETION_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_COMPLETION_MODEL: &str = "mistralai/mistral-7b-instruct";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, SearchError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Chat-completions client for OpenRouter or any API with the same wire format.
pub struct OpenRouterClient {
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenRouterClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SearchError::dependency(BACKEND, error))?;

        Ok(Self {
            endpoint: DEFAULT_COMPLETION_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, SearchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.trim())
            .json(&ChatRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await
            .map_err(|error| SearchError::dependency(BACKEND, error))?;

        let status = response.status();
        if !status.is_success() {
            let details = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(SearchError::DependencyFailure {
                backend: BACKEND.to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| SearchError::dependency(BACKEND, error))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| SearchError::DependencyFailure {
                backend: BACKEND.to_string(),
                details: "response had no choices".to_string(),
            })
    }
}
