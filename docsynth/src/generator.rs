//! Azure OpenAI chat-completions client implementing [`TextGenerator`].

use async_trait::async_trait;
use docsynth_core::contract::{StoreError, TextGenerator};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::load_config::GenerationSection;

const SYSTEM_PROMPT: &str = "You are an assistant that writes professional business documents.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

pub struct AzureOpenAiClient {
    http: Client,
    settings: GenerationSection,
    api_key: String,
}

impl AzureOpenAiClient {
    pub fn new(settings: GenerationSection, api_key: String) -> Self {
        tracing::info!(
            endpoint = %settings.endpoint,
            deployment = %settings.deployment,
            api_version = %settings.api_version,
            api_key_set = !api_key.is_empty(),
            "Initialized AzureOpenAiClient"
        );
        Self {
            http: Client::new(),
            settings,
            api_key,
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.deployment
        )
    }
}

/// Text of the first choice, or the service's error message.
pub fn completion_text(body: &Value) -> Result<String, StoreError> {
    if let Some(content) = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        return Ok(content.to_string());
    }
    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("completion response without content");
    Err(message.to_string().into())
}

#[async_trait]
impl TextGenerator for AzureOpenAiClient {
    /// The reference texts are already part of `prompt`; only their count is logged here.
    async fn generate(
        &self,
        prompt: &str,
        reference_texts: &[String],
    ) -> Result<String, StoreError> {
        tracing::info!(
            deployment = %self.settings.deployment,
            references = reference_texts.len(),
            prompt_len = prompt.len(),
            "Requesting chat completion"
        );
        let payload = ChatRequest {
            model: &self.settings.deployment,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let response = self
            .http
            .post(self.completions_url())
            .query(&[("api-version", self.settings.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = completion_text(&body)
                .err()
                .map(|e| e.to_string())
                .unwrap_or_default();
            tracing::error!(%status, message = %message, "Chat completion failed");
            return Err(format!("HTTP {status}: {message}").into());
        }

        let text = completion_text(&body)?;
        tracing::info!(length = text.len(), "Received chat completion");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_choice_content_is_returned() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "# Hi"}}]});
        assert_eq!(completion_text(&body).unwrap(), "# Hi");
    }

    #[test]
    fn error_message_is_surfaced() {
        let body = json!({"error": {"code": "429", "message": "Rate limit reached"}});
        assert_eq!(
            completion_text(&body).unwrap_err().to_string(),
            "Rate limit reached"
        );
    }

    #[test]
    fn url_joins_endpoint_and_deployment() {
        let client = AzureOpenAiClient::new(
            GenerationSection {
                endpoint: "https://example.openai.azure.com/".to_string(),
                ..GenerationSection::default()
            },
            "key".to_string(),
        );
        assert_eq!(
            client.completions_url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions"
        );
    }
}
