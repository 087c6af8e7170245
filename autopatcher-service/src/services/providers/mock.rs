//! Mock provider implementation for local runs and testing.

use super::{FinishReason, GenerationParams, ProviderError, ProviderResponse, TextProvider};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Response used when nothing is scripted. Carries every field the
/// assistant reads so each task gets a well-formed answer.
pub const DEFAULT_MOCK_RESPONSE: &str = r##"{
  "corrected_yaml": "",
  "explanation": "Mock analysis: no issues found.",
  "is_correct": true,
  "generated_yaml": "# generated by the mock provider\n",
  "summary": "Mock summary.",
  "key_changes": []
}"##;

/// A prompt the mock received.
#[derive(Debug, Clone)]
pub struct RecordedPrompt {
    pub system: Option<String>,
    pub user: String,
    pub temperature: Option<f32>,
    pub json_output: bool,
}

/// Mock text provider. Replies from a script of queued responses and
/// falls back to `DEFAULT_MOCK_RESPONSE` once the script is exhausted.
pub struct MockTextProvider {
    enabled: bool,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<RecordedPrompt>>,
}

impl MockTextProvider {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a text response.
    pub fn push_response(&self, text: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(text.into()));
        }
    }

    /// Queue a failure, e.g. `ProviderError::RateLimited`.
    pub fn push_error(&self, error: ProviderError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error));
        }
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<RecordedPrompt> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn next_scripted(&self) -> Option<Result<String, ProviderError>> {
        self.script.lock().ok().and_then(|mut s| s.pop_front())
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        if !self.enabled {
            return Err(ProviderError::NotConfigured(
                "Mock text provider not enabled".to_string(),
            ));
        }

        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(RecordedPrompt {
                system: params.system_prompt.clone(),
                user: prompt.to_string(),
                temperature: params.temperature,
                json_output: params.json_output,
            });
        }

        let text = match self.next_scripted() {
            Some(scripted) => scripted?,
            None => DEFAULT_MOCK_RESPONSE.to_string(),
        };

        Ok(ProviderResponse {
            input_tokens: prompt.len() as i32 / 4,
            output_tokens: text.len() as i32 / 4,
            text: (!text.is_empty()).then_some(text),
            finish_reason: FinishReason::Complete,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.enabled {
            Ok(())
        } else {
            Err(ProviderError::NotConfigured(
                "Mock text provider not enabled".to_string(),
            ))
        }
    }
}
