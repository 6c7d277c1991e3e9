/// OpenAI-compatible generative suggestion provider
///
/// Sends one system+user chat-completion request per suggestion and returns
/// the raw assistant text. Works with any OpenAI-compatible endpoint; the
/// model name and base URL come from configuration.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    services::providers::{SuggestionProvider, SuggestionRequest},
};

/// Generative calls are in the 30s class
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenAiProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            api_key,
            api_url,
            model,
        }
    }
}

#[async_trait]
impl SuggestionProvider for OpenAiProvider {
    async fn suggest(&self, request: &SuggestionRequest) -> AppResult<String> {
        let url = format!("{}/chat/completions", self.api_url);

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt.clone(),
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::external_api(
                status,
                format!("Suggestion API returned status {}: {}", status, text),
            ));
        }

        let completion: ChatCompletionResponse =
            response.json().await.map_err(|e| AppError::ExternalApi {
                status: None,
                message: format!("Failed to parse suggestion response: {}", e),
            })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::ExternalApi {
                status: None,
                message: "Suggestion response contained no choices".to_string(),
            })?;

        tracing::debug!(
            chars = content.len(),
            temperature = request.temperature,
            provider = "openai",
            "Suggestion received"
        );

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_response_deserialization() {
        let json = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "{\"title\": \"Heat\"}"}}
            ]
        }"#;

        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("{\"title\": \"Heat\"}")
        );
    }

    #[test]
    fn test_completion_response_missing_content() {
        let json = r#"{"choices": [{"message": {"role": "assistant"}}]}"#;
        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert!(response.choices[0].message.content.is_none());
    }
}
