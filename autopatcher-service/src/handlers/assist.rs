use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use service_core::extract::ValidatedJson;

use crate::dtos::{DiffSource, ExplainCodeRequest, GenerateYamlRequest, SummarizeDiffRequest};
use crate::models::{CodeExplanation, DiffSummary, GeneratedYaml, YamlAnalysis};
use crate::services::providers::ProviderError;
use crate::services::webhook_processor::is_yaml;
use crate::services::{AssistantError, GitHubError};
use crate::startup::AppState;

const UPLOAD_FIELD: &str = "file";

pub async fn analyze_yml(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<YamlAnalysis>, AppError> {
    // Not multipart at all (no body, wrong content type, no boundary)
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!(error = %e, "Upload is not a multipart form");
        AppError::BadRequest(anyhow::anyhow!("No file uploaded"))
    })?;
    let max_bytes = state.config.limits.max_upload_bytes;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, data));
        break;
    }

    let (file_name, data) =
        upload.ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("No file uploaded")))?;

    if !is_yaml(&file_name) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Only .yml and .yaml files are supported"
        )));
    }

    if data.len() > max_bytes {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "File too large (max {} bytes)",
            max_bytes
        )));
    }

    let content = String::from_utf8_lossy(&data);

    tracing::info!(file_name = %file_name, size = data.len(), "Analyzing uploaded YAML");

    let analysis = state
        .assistant
        .analyze_yaml(&content)
        .await
        .map_err(|e| assist_error(e, "Failed to analyze YAML file. Please try again."))?;

    Ok(Json(analysis))
}

pub async fn generate_yml(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<GenerateYamlRequest>,
) -> Result<Json<GeneratedYaml>, AppError> {
    let generated = state
        .assistant
        .generate_yaml(req.prompt.trim())
        .await
        .map_err(|e| assist_error(e, "Failed to generate YAML. Please try again."))?;

    Ok(Json(generated))
}

pub async fn explain_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ExplainCodeRequest>,
) -> Result<Json<CodeExplanation>, AppError> {
    let explanation = state
        .assistant
        .explain_code(&req.code)
        .await
        .map_err(|e| assist_error(e, "Failed to explain code. Please try again."))?;

    Ok(Json(explanation))
}

pub async fn summarize_diff(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SummarizeDiffRequest>,
) -> Result<Json<DiffSummary>, AppError> {
    let fetched;
    let diff = match req.source() {
        Some(DiffSource::Inline(diff)) => diff,
        Some(DiffSource::PullRequest { repository, number }) => {
            fetched = state
                .github
                .fetch_pull_request_diff(repository, number)
                .await
                .map_err(github_error)?;
            fetched.as_str()
        }
        None => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Provide diff or repository and pull_number"
            )))
        }
    };

    if diff.trim().is_empty() {
        return Ok(Json(DiffSummary {
            summary: "The diff is empty; there are no changes to summarize.".to_string(),
            key_changes: Vec::new(),
        }));
    }

    let summary = state
        .assistant
        .summarize_diff(diff)
        .await
        .map_err(|e| assist_error(e, "Failed to summarize diff. Please try again."))?;

    Ok(Json(summary))
}

/// Map an assistant failure to the response the caller sees. Quota and key
/// problems get their own messages; everything else gets `task_message`.
pub fn assist_error(err: AssistantError, task_message: &str) -> AppError {
    tracing::error!(error = %err, "Assistant request failed");

    match err {
        AssistantError::Provider(ProviderError::RateLimited) => AppError::TooManyRequests(
            "API quota exceeded. Please check your LLM API key has sufficient credits.".to_string(),
            None,
        ),
        AssistantError::Provider(ProviderError::Unauthorized(_)) => {
            AppError::Unauthorized(anyhow::anyhow!(
                "Invalid API key. Please check your LLM API key configuration."
            ))
        }
        _ => AppError::Upstream(task_message.to_string()),
    }
}

fn github_error(err: GitHubError) -> AppError {
    tracing::warn!(error = %err, "Failed to fetch pull request diff");

    match err {
        GitHubError::NotFound(_) => {
            AppError::NotFound(anyhow::anyhow!("Pull request not found on GitHub"))
        }
        GitHubError::RateLimited => AppError::TooManyRequests(
            "GitHub API rate limit exceeded. Please try again later.".to_string(),
            None,
        ),
        GitHubError::TooLarge { limit, .. } => AppError::PayloadTooLarge(format!(
            "Pull request diff exceeds {} bytes; summarize a smaller diff inline.",
            limit
        )),
        _ => AppError::Upstream("Failed to fetch pull request diff from GitHub.".to_string()),
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge("Upload exceeds the maximum request size".to_string());
    }
    AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", err))
}
