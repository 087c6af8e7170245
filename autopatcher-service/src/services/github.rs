//! GitHub REST and raw-content client.

use reqwest::{header, Client, StatusCode, Url};
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;
use thiserror::Error;

use crate::config::GitHubConfig;
use crate::models::github::PullRequestFile;

const USER_AGENT: &str = "autopatcher";
const PER_PAGE: usize = 100;
/// GitHub lists at most 3000 files per pull request.
const MAX_PAGES: usize = 30;
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("GitHub rate limit exceeded")]
    RateLimited,

    #[error("GitHub rejected the credentials")]
    Unauthorized,

    #[error("Response is too large ({size} bytes, limit {limit})")]
    TooLarge { size: usize, limit: usize },

    #[error("Invalid GitHub URL: {0}")]
    InvalidUrl(String),

    #[error("GitHub API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: String,
    raw_url: Url,
    token: Option<Secret<String>>,
    max_file_bytes: usize,
    max_diff_bytes: usize,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, GitHubError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            raw_url: base_url(&config.raw_url)?,
            token: config.token.clone(),
            max_file_bytes: config.max_file_bytes,
            max_diff_bytes: config.max_diff_bytes,
        })
    }

    fn get(&self, url: impl reqwest::IntoUrl) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Raw file content at `git_ref`.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_file(
        &self,
        repository: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<String, GitHubError> {
        let url = self.raw_file_url(repository, git_ref, path)?;
        let response = check_status(self.get(url.clone()).send().await?, url.as_str()).await?;

        let bytes = read_capped(response, self.max_file_bytes).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// `{raw_url}/{owner}/{repo}/{ref}/{path}` with every segment
    /// percent-encoded, so names containing `#`, `?` or `%` stay in the path.
    fn raw_file_url(&self, repository: &str, git_ref: &str, path: &str) -> Result<Url, GitHubError> {
        let mut url = self.raw_url.clone();
        url.path_segments_mut()
            .map_err(|_| GitHubError::InvalidUrl(self.raw_url.to_string()))?
            .pop_if_empty()
            .extend(repository.split('/'))
            .extend(git_ref.split('/'))
            .extend(path.split('/'));
        Ok(url)
    }

    /// Every file of a pull request, following pagination.
    #[tracing::instrument(skip(self))]
    pub async fn list_pull_request_files(
        &self,
        repository: &str,
        number: u64,
    ) -> Result<Vec<PullRequestFile>, GitHubError> {
        let mut files = Vec::new();

        for page in 1..=MAX_PAGES {
            let url = format!(
                "{}/repos/{}/pulls/{}/files?per_page={}&page={}",
                self.api_url, repository, number, PER_PAGE, page
            );
            let response = check_status(
                self.get(&url)
                    .header(header::ACCEPT, "application/vnd.github+json")
                    .send()
                    .await?,
                &url,
            )
            .await?;

            let batch: Vec<PullRequestFile> = response.json().await?;
            let short_page = batch.len() < PER_PAGE;
            files.extend(batch);
            if short_page {
                break;
            }
        }

        tracing::debug!(count = files.len(), "Listed pull request files");
        Ok(files)
    }

    /// Unified diff of a pull request.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_pull_request_diff(
        &self,
        repository: &str,
        number: u64,
    ) -> Result<String, GitHubError> {
        let url = format!("{}/repos/{}/pulls/{}", self.api_url, repository, number);
        let response = check_status(
            self.get(&url)
                .header(header::ACCEPT, DIFF_MEDIA_TYPE)
                .send()
                .await?,
            &url,
        )
        .await?;

        let bytes = read_capped(response, self.max_diff_bytes).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn base_url(raw: &str) -> Result<Url, GitHubError> {
    let url = Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| GitHubError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(GitHubError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

/// Read the body, giving up as soon as it exceeds `limit` bytes.
async fn read_capped(mut response: reqwest::Response, limit: usize) -> Result<Vec<u8>, GitHubError> {
    let too_large = |size| GitHubError::TooLarge { size, limit };

    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(too_large(len as usize));
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() > limit {
            return Err(too_large(body.len()));
        }
    }
    Ok(body)
}

async fn check_status(
    response: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response, GitHubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                == Some("0"));

    let err = match status {
        _ if rate_limited => GitHubError::RateLimited,
        StatusCode::NOT_FOUND => GitHubError::NotFound(url.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GitHubError::Unauthorized,
        _ => GitHubError::Api {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        },
    };

    tracing::warn!(status = %status, error = %err, "GitHub request failed");
    Err(err)
}
