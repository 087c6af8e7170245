use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::analysis::YamlAnalysis;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Partial,
    Error,
}

impl EventStatus {
    /// Aggregate per-file outcomes. No files at all counts as success.
    pub fn from_results(results: &[FileResult]) -> Self {
        let failed = results.iter().filter(|r| r.error.is_some()).count();
        if failed == 0 {
            EventStatus::Success
        } else if failed == results.len() {
            EventStatus::Error
        } else {
            EventStatus::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Success => "success",
            EventStatus::Partial => "partial",
            EventStatus::Error => "error",
        }
    }
}

/// Outcome for a single file of a webhook delivery. Exactly one of
/// `analysis` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileResult {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<YamlAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
}

impl FileResult {
    pub fn analyzed(file: String, original_content: String, analysis: YamlAnalysis) -> Self {
        Self {
            file,
            analysis: Some(analysis),
            error: None,
            original_content: Some(original_content),
        }
    }

    pub fn failed(file: String, error: impl Into<String>) -> Self {
        Self {
            file,
            analysis: None,
            error: Some(error.into()),
            original_content: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// One processed GitHub delivery. Immutable once appended to the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookEvent {
    pub id: String,
    pub repository: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub files_analyzed: Vec<FileResult>,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
}

impl WebhookEvent {
    pub fn new(repository: String, event_type: String, files_analyzed: Vec<FileResult>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            repository,
            event_type,
            timestamp: Utc::now(),
            status: EventStatus::from_results(&files_analyzed),
            files_analyzed,
            delivery_id: None,
            git_ref: None,
            commit_sha: None,
        }
    }

    pub fn success_count(&self) -> usize {
        self.files_analyzed.iter().filter(|f| f.is_success()).count()
    }
}
