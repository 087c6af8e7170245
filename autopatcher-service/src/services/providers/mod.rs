//! LLM provider abstractions and implementations.
//!
//! The assistant talks to a single `TextProvider`; the concrete vendor
//! (OpenAI, Gemini, or the in-process mock) is picked from configuration.

pub mod gemini;
pub mod mock;
pub mod openai;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{LlmConfig, LlmProviderKind};

/// Error type for provider operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Map a non-success vendor status to an error.
    pub fn from_status(vendor: &str, status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => {
                ProviderError::Unauthorized(format!("{} rejected the API key ({})", vendor, status))
            }
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
            _ => ProviderError::ApiError(format!("{} API error {}: {}", vendor, status, body)),
        }
    }

    /// Short label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::Unauthorized(_) => "unauthorized",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::ContentFiltered => "content_filtered",
            ProviderError::NetworkError(_) => "network_error",
        }
    }
}

/// Result of a provider response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Generated text. `None` when the vendor returned no content.
    pub text: Option<String>,

    /// Input tokens consumed.
    pub input_tokens: i32,

    /// Output tokens generated.
    pub output_tokens: i32,

    /// Finish reason.
    pub finish_reason: FinishReason,
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    ContentFilter,
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Complete => "complete",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Error => "error",
        }
    }
}

/// Generation parameters for LLM requests.
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    /// System instruction sent ahead of the user prompt.
    pub system_prompt: Option<String>,

    /// Maximum output tokens.
    pub max_tokens: Option<i32>,

    /// Temperature (0.0 - 2.0).
    pub temperature: Option<f32>,

    /// Ask the vendor for a JSON object response.
    pub json_output: bool,
}

/// Trait for text/JSON generation providers.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Vendor name, used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Model identifier sent to the vendor.
    fn model(&self) -> &str;

    /// Generate a text response.
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ProviderError>;
}

/// Build the provider selected by configuration.
pub fn build_text_provider(config: &LlmConfig) -> Result<Arc<dyn TextProvider>, ProviderError> {
    let provider: Arc<dyn TextProvider> = match config.provider {
        LlmProviderKind::OpenAi => Arc::new(openai::OpenAiTextProvider::new(
            openai::OpenAiConfig::from_llm_config(config),
        )?),
        LlmProviderKind::Gemini => Arc::new(gemini::GeminiTextProvider::new(
            gemini::GeminiConfig::from_llm_config(config),
        )?),
        LlmProviderKind::Mock => Arc::new(mock::MockTextProvider::new(true)),
    };

    tracing::info!(
        provider = provider.name(),
        model = %provider.model(),
        "Initialized text provider"
    );

    Ok(provider)
}

/// Shared HTTP client for vendor adapters.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ProviderError::from_status("OpenAI", StatusCode::UNAUTHORIZED, ""),
            ProviderError::Unauthorized(_)
        ));
        assert!(matches!(
            ProviderError::from_status("Gemini", StatusCode::FORBIDDEN, "model access denied"),
            ProviderError::ApiError(msg) if msg.contains("403")
        ));
        assert_eq!(
            ProviderError::from_status("OpenAI", StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::RateLimited
        );
        assert!(matches!(
            ProviderError::from_status("OpenAI", StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            ProviderError::ApiError(msg) if msg.contains("boom")
        ));
    }
}
