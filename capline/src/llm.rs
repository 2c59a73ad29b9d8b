//! Chat-completion client used by the polish and translation stages.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing api key for language model")]
    MissingApiKey,

    #[error("language model request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("language model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("language model returned no choices")]
    EmptyResponse,
}

/// Text-in, text-out language model.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Complete `user` under the `system` instruction, returning the reply text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

#[async_trait]
impl<T: TextModel + ?Sized> TextModel for std::sync::Arc<T> {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        (**self).complete(system, user).await
    }
}

/// OpenAI-compatible `chat/completions` client.
#[derive(Clone, Debug)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl ChatClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let client = Client::builder()
            .user_agent(concat!("capline/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [Message<'a>; 2],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Result<String, LlmError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl TextModel for ChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<ChatResponse>().await?.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_system_then_user() {
        let body = ChatRequest {
            model: "gpt-4o",
            temperature: 0.3,
            messages: [
                Message {
                    role: "system",
                    content: "be terse",
                },
                Message {
                    role: "user",
                    content: "[0] hello",
                },
            ],
        };

        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "[0] hello");
    }

    #[test]
    fn response_takes_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"id": "x", "choices": [{"index": 0, "message": {"role": "assistant", "content": "[0] Hello."}}]}"#,
        )
        .unwrap();

        assert_eq!(response.into_text().unwrap(), "[0] Hello.");
    }

    #[test]
    fn empty_choices_is_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();

        assert!(matches!(response.into_text(), Err(LlmError::EmptyResponse)));
    }

    #[test]
    fn rejects_blank_api_key() {
        assert!(matches!(ChatClient::new(""), Err(LlmError::MissingApiKey)));
    }
}
