//! OpenAI chat completions provider.

use super::{FinishReason, GenerationParams, ProviderError, ProviderResponse, TextProvider};
use crate::config::LlmConfig;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

/// OpenAI API base URL.
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI provider configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Secret<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn from_llm_config(config: &LlmConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_API_BASE.to_string()),
            timeout_secs: config.timeout_secs,
        }
    }
}

/// OpenAI text provider.
pub struct OpenAiTextProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiTextProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        let client = super::http_client(config.timeout_secs)?;
        Ok(Self { config, client })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn ensure_configured(&self) -> Result<(), ProviderError> {
        if self.config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(
                "OpenAI API key not configured".to_string(),
            ));
        }
        Ok(())
    }

    fn build_request<'a>(&'a self, prompt: &'a str, params: &'a GenerationParams) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = params.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        ChatRequest {
            model: &self.config.model,
            messages,
            response_format: params.json_output.then_some(ResponseFormat {
                kind: "json_object",
            }),
            max_completion_tokens: params.max_tokens,
            temperature: params.temperature,
        }
    }
}

#[async_trait]
impl TextProvider for OpenAiTextProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        self.ensure_configured()?;

        let request = self.build_request(prompt, params);

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            json_output = params.json_output,
            "Sending request to OpenAI API"
        );

        let response = self
            .client
            .post(self.api_url("chat/completions"))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("OpenAI", status, &error_text));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        let choice = api_response.choices.into_iter().next();

        let finish_reason = match choice.as_ref().and_then(|c| c.finish_reason.as_deref()) {
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Complete,
        };

        if finish_reason == FinishReason::ContentFilter {
            return Err(ProviderError::ContentFiltered);
        }

        let usage = api_response.usage.unwrap_or_default();

        Ok(ProviderResponse {
            text: choice.and_then(|c| c.message.content),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            finish_reason,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.ensure_configured()?;

        let response = self
            .client
            .get(self.api_url("models"))
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            Err(ProviderError::from_status("OpenAI", status, "health check failed"))
        }
    }
}

// ============================================================================
// OpenAI API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: i32,
    #[serde(default)]
    completion_tokens: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiTextProvider {
        OpenAiTextProvider::new(OpenAiConfig {
            api_key: Secret::new("sk-test".to_string()),
            model: "gpt-5".to_string(),
            base_url: "http://localhost:1/v1/".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn request_carries_system_prompt_and_json_mode() {
        let provider = provider();
        let params = GenerationParams {
            system_prompt: Some("be terse".to_string()),
            max_tokens: Some(2048),
            temperature: None,
            json_output: true,
        };
        let body = serde_json::to_value(provider.build_request("hello", &params)).unwrap();

        assert_eq!(body["model"], "gpt-5");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["max_completion_tokens"], 2048);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn plain_text_request_omits_response_format() {
        let provider = provider();
        let body =
            serde_json::to_value(provider.build_request("hi", &GenerationParams::default())).unwrap();
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn api_url_trims_trailing_slash() {
        assert_eq!(
            provider().api_url("chat/completions"),
            "http://localhost:1/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let provider = OpenAiTextProvider::new(OpenAiConfig {
            api_key: Secret::new(String::new()),
            model: "gpt-5".to_string(),
            base_url: OPENAI_API_BASE.to_string(),
            timeout_secs: 5,
        })
        .unwrap();

        let err = provider
            .generate("hi", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
