//! Task-level LLM calls: build the prompt, call the provider in JSON mode,
//! and re-parse the answer into a typed result.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use super::metrics;
use super::prompts::{self, Prompt};
use super::providers::{GenerationParams, ProviderError, TextProvider};
use crate::models::{CodeExplanation, DiffSummary, GeneratedYaml, YamlAnalysis};

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Model returned malformed JSON: {0}")]
    Malformed(String),
}

#[derive(Clone)]
pub struct Assistant {
    provider: Arc<dyn TextProvider>,
    max_tokens: i32,
    temperature: Option<f32>,
    max_diff_chars: usize,
}

impl Assistant {
    pub fn new(provider: Arc<dyn TextProvider>, max_tokens: i32, max_diff_chars: usize) -> Self {
        Self {
            provider,
            max_tokens,
            temperature: None,
            max_diff_chars,
        }
    }

    /// Sampling temperature sent with every request.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub async fn analyze_yaml(&self, content: &str) -> Result<YamlAnalysis, AssistantError> {
        self.run("analyze_yaml", prompts::analyze_yaml(content)).await
    }

    pub async fn generate_yaml(&self, request: &str) -> Result<GeneratedYaml, AssistantError> {
        self.run("generate_yaml", prompts::generate_yaml(request))
            .await
    }

    pub async fn explain_code(&self, code: &str) -> Result<CodeExplanation, AssistantError> {
        self.run("explain_code", prompts::explain_code(code)).await
    }

    pub async fn summarize_diff(&self, diff: &str) -> Result<DiffSummary, AssistantError> {
        self.run(
            "summarize_diff",
            prompts::summarize_diff(diff, self.max_diff_chars),
        )
        .await
    }

    #[tracing::instrument(
        name = "assistant.run",
        skip(self, prompt),
        fields(provider = self.provider.name(), model = %self.provider.model())
    )]
    async fn run<T: DeserializeOwned>(
        &self,
        task: &'static str,
        prompt: Prompt,
    ) -> Result<T, AssistantError> {
        let params = GenerationParams {
            system_prompt: Some(prompt.system),
            max_tokens: Some(self.max_tokens),
            temperature: self.temperature,
            json_output: true,
        };

        let start = Instant::now();
        let result = self.provider.generate(&prompt.user, &params).await;
        let elapsed = start.elapsed().as_secs_f64();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics::record_llm_request(task, e.kind(), elapsed);
                tracing::error!(error = %e, duration_secs = elapsed, "LLM request failed");
                return Err(e.into());
            }
        };

        metrics::record_tokens(response.input_tokens, response.output_tokens);

        let parsed = parse_json_object(response.text.as_deref());
        let outcome = if parsed.is_ok() { "ok" } else { "malformed" };
        metrics::record_llm_request(task, outcome, elapsed);

        tracing::info!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            finish_reason = response.finish_reason.as_str(),
            duration_secs = elapsed,
            outcome,
            "LLM request completed"
        );

        parsed
    }
}

/// Parse the model's text as a JSON object into `T`.
///
/// Missing or blank text reads as `{}`. A surrounding Markdown code fence is
/// removed first.
pub fn parse_json_object<T: DeserializeOwned>(text: Option<&str>) -> Result<T, AssistantError> {
    let raw = text.map(str::trim).filter(|t| !t.is_empty()).unwrap_or("{}");
    let body = strip_code_fence(raw);

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| AssistantError::Malformed(e.to_string()))?;

    if !value.is_object() {
        return Err(AssistantError::Malformed(
            "expected a JSON object".to_string(),
        ));
    }

    serde_json::from_value(value).map_err(|e| AssistantError::Malformed(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string (`json`) on the opening line
    match inner.find('\n') {
        Some(newline) => inner[newline + 1..].trim(),
        None => inner.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::mock::MockTextProvider;

    fn assistant_with(mock: Arc<MockTextProvider>) -> Assistant {
        Assistant::new(mock, 2048, 100)
    }

    #[test]
    fn empty_text_defaults_every_field() {
        let analysis: YamlAnalysis = parse_json_object(None).unwrap();
        assert_eq!(analysis, YamlAnalysis::default());

        let summary: DiffSummary = parse_json_object(Some("   ")).unwrap();
        assert!(summary.key_changes.is_empty());
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let text = "```json\n{\"explanation\": \"hi\"}\n```";
        let parsed: CodeExplanation = parse_json_object(Some(text)).unwrap();
        assert_eq!(parsed.explanation, "hi");
    }

    #[test]
    fn non_object_is_malformed() {
        let err = parse_json_object::<YamlAnalysis>(Some("[1,2]")).unwrap_err();
        assert!(matches!(err, AssistantError::Malformed(_)));

        let err = parse_json_object::<YamlAnalysis>(Some("not json")).unwrap_err();
        assert!(matches!(err, AssistantError::Malformed(_)));
    }

    #[tokio::test]
    async fn analyze_sends_json_mode_with_system_prompt() {
        let mock = Arc::new(MockTextProvider::new(true));
        mock.push_response(
            r#"{"corrected_yaml":"a: 1\n","explanation":"fixed indent","is_correct":false}"#,
        );
        let assistant = assistant_with(mock.clone());

        let analysis = assistant.analyze_yaml("a:  1").await.unwrap();
        assert_eq!(analysis.explanation, "fixed indent");
        assert!(!analysis.is_correct);

        let prompts = mock.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].json_output);
        assert!(prompts[0]
            .system
            .as_deref()
            .unwrap()
            .contains("analyzes YAML files"));
        assert!(prompts[0].user.ends_with("a:  1"));
        assert_eq!(prompts[0].temperature, None);
    }

    #[tokio::test]
    async fn configured_temperature_reaches_the_provider() {
        let mock = Arc::new(MockTextProvider::new(true));
        let assistant = assistant_with(mock.clone()).with_temperature(Some(0.2));

        assistant.generate_yaml("a CI workflow").await.unwrap();

        assert_eq!(mock.prompts()[0].temperature, Some(0.2));
    }

    #[tokio::test]
    async fn provider_errors_pass_through() {
        let mock = Arc::new(MockTextProvider::new(true));
        mock.push_error(ProviderError::RateLimited);
        let assistant = assistant_with(mock);

        let err = assistant.explain_code("fn main() {}").await.unwrap_err();
        assert!(matches!(
            err,
            AssistantError::Provider(ProviderError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn summarize_truncates_long_diffs() {
        let mock = Arc::new(MockTextProvider::new(true));
        mock.push_response(r#"{"summary":"s","key_changes":["a","b"]}"#);
        let assistant = assistant_with(mock.clone());

        let summary = assistant.summarize_diff(&"x".repeat(500)).await.unwrap();
        assert_eq!(summary.key_changes, vec!["a", "b"]);
        assert!(mock.prompts()[0].user.contains("truncated"));
    }
}
