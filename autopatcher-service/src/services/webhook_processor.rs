//! GitHub webhook dispatch and best-effort multi-file analysis.
//!
//! `handle` runs inside the request: it parses the payload and decides what
//! to do. `process` does the slow part (fetch, analyze, persist) and is run
//! in a background task by the HTTP handler.

use futures::{stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use super::assistant::Assistant;
use super::event_store::EventStore;
use super::github::GitHubClient;
use super::metrics;
use crate::models::github::{PingEvent, PullRequestEvent, PushEvent};
use crate::models::{FileResult, WebhookEvent};

const ANALYZED_PR_ACTIONS: &[&str] = &["opened", "synchronize", "reopened", "ready_for_review"];

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid {event} payload: {source}")]
    InvalidPayload {
        event: String,
        source: serde_json::Error,
    },

    #[error("{limit} webhook jobs are already in flight")]
    Saturated { limit: usize },
}

/// Where the files of a job come from.
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    /// Paths already known from the payload (push).
    Paths(Vec<String>),
    /// Listed from the pull request at processing time.
    PullRequest { number: u64 },
}

/// Work accepted from one delivery.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub event_type: String,
    /// Repository the event belongs to (`owner/name`).
    pub repository: String,
    /// Repository file contents are read from; the fork for cross-repo PRs.
    pub source_repository: String,
    pub git_ref: String,
    pub commit_sha: String,
    pub delivery_id: Option<String>,
    pub files: FileSource,
}

impl AnalysisJob {
    /// Number of files known up front; `None` until a pull request is listed.
    pub fn known_file_count(&self) -> Option<usize> {
        match &self.files {
            FileSource::Paths(paths) => Some(paths.len()),
            FileSource::PullRequest { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum WebhookOutcome {
    Pong { zen: Option<String> },
    Ignored { reason: String },
    Accepted(AnalysisJob),
}

#[derive(Clone)]
pub struct WebhookProcessor {
    github: GitHubClient,
    assistant: Assistant,
    store: Arc<dyn EventStore>,
    concurrency: usize,
    max_files: usize,
    jobs: TaskTracker,
    permits: Arc<Semaphore>,
    max_inflight: usize,
}

impl WebhookProcessor {
    pub fn new(
        github: GitHubClient,
        assistant: Assistant,
        store: Arc<dyn EventStore>,
        concurrency: usize,
        max_files: usize,
        max_inflight: usize,
    ) -> Self {
        let max_inflight = max_inflight.max(1);
        Self {
            github,
            assistant,
            store,
            concurrency: concurrency.max(1),
            max_files,
            jobs: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_inflight)),
            max_inflight,
        }
    }

    /// Run `job` in a tracked background task.
    ///
    /// Refuses the job instead of queueing it when `max_inflight` jobs are
    /// already running.
    pub fn spawn(&self, job: AnalysisJob) -> Result<(), WebhookError> {
        let permit = self.permits.clone().try_acquire_owned().map_err(|_| {
            tracing::warn!(limit = self.max_inflight, "Webhook job limit reached");
            WebhookError::Saturated {
                limit: self.max_inflight,
            }
        })?;

        let processor = self.clone();
        self.jobs.spawn(
            async move {
                processor.process(job).await;
                drop(permit);
            }
            .in_current_span(),
        );
        Ok(())
    }

    /// Wait for every spawned job to persist its event. Called once the
    /// server has stopped accepting deliveries.
    pub async fn drain(&self) {
        self.jobs.close();
        if !self.jobs.is_empty() {
            tracing::info!(in_flight = self.jobs.len(), "Waiting for webhook jobs to finish");
        }
        self.jobs.wait().await;
    }

    /// Parse a delivery and decide what to do with it.
    pub fn handle(
        &self,
        event_name: &str,
        delivery_id: Option<String>,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        let invalid = |source| WebhookError::InvalidPayload {
            event: event_name.to_string(),
            source,
        };

        match event_name {
            "ping" => {
                let ping: PingEvent = serde_json::from_slice(body).map_err(invalid)?;
                tracing::info!(hook_id = ?ping.hook_id, "GitHub ping received");
                Ok(WebhookOutcome::Pong { zen: ping.zen })
            }
            "push" => {
                let push: PushEvent = serde_json::from_slice(body).map_err(invalid)?;
                Ok(plan_push(push, delivery_id))
            }
            "pull_request" => {
                let pr: PullRequestEvent = serde_json::from_slice(body).map_err(invalid)?;
                Ok(plan_pull_request(pr, delivery_id))
            }
            other => Ok(WebhookOutcome::Ignored {
                reason: format!("Event type '{}' is not handled", other),
            }),
        }
    }

    /// Fetch and analyze every file of the job, then persist the event.
    /// Never fails: per-file problems are recorded in the event itself.
    #[tracing::instrument(
        name = "webhook.process",
        skip(self, job),
        fields(
            repository = %job.repository,
            event_type = %job.event_type,
            delivery_id = ?job.delivery_id
        )
    )]
    pub async fn process(&self, job: AnalysisJob) -> WebhookEvent {
        let paths = match &job.files {
            FileSource::Paths(paths) => paths.clone(),
            FileSource::PullRequest { number } => {
                match self
                    .github
                    .list_pull_request_files(&job.repository, *number)
                    .await
                {
                    Ok(files) => dedup_preserving_order(
                        files
                            .into_iter()
                            .filter(|f| f.status != "removed" && is_yaml(&f.filename))
                            .map(|f| f.filename),
                    ),
                    Err(e) => {
                        let result = FileResult::failed(
                            format!("pull request #{}", number),
                            format!("Failed to list pull request files: {}", e),
                        );
                        return self.finish(&job, vec![result]).await;
                    }
                }
            }
        };

        let split = paths.len().min(self.max_files);
        let (to_analyze, skipped) = paths.split_at(split);

        let mut results: Vec<FileResult> = stream::iter(to_analyze.iter().cloned())
            .map(|path| self.analyze_file(&job, path))
            .buffered(self.concurrency)
            .collect()
            .await;

        if !skipped.is_empty() {
            tracing::warn!(
                skipped = skipped.len(),
                limit = self.max_files,
                "Too many YAML files in one event; skipping the rest"
            );
        }
        results.extend(skipped.iter().map(|path| {
            metrics::record_webhook_file("skipped");
            FileResult::failed(
                path.clone(),
                format!(
                    "Skipped: only the first {} YAML files of an event are analyzed",
                    self.max_files
                ),
            )
        }));

        self.finish(&job, results).await
    }

    async fn analyze_file(&self, job: &AnalysisJob, path: String) -> FileResult {
        let content = match self
            .github
            .fetch_file(&job.source_repository, &job.commit_sha, &path)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(file = %path, error = %e, "Failed to fetch file");
                metrics::record_webhook_file("fetch_error");
                return FileResult::failed(path, format!("Failed to fetch file: {}", e));
            }
        };

        match self.assistant.analyze_yaml(&content).await {
            Ok(analysis) => {
                metrics::record_webhook_file("analyzed");
                FileResult::analyzed(path, content, analysis)
            }
            Err(e) => {
                tracing::warn!(file = %path, error = %e, "Failed to analyze file");
                metrics::record_webhook_file("analysis_error");
                FileResult::failed(path, format!("Analysis failed: {}", e))
            }
        }
    }

    async fn finish(&self, job: &AnalysisJob, results: Vec<FileResult>) -> WebhookEvent {
        let mut event = WebhookEvent::new(job.repository.clone(), job.event_type.clone(), results);
        event.delivery_id = job.delivery_id.clone();
        event.git_ref = Some(job.git_ref.clone());
        event.commit_sha = Some(job.commit_sha.clone());

        metrics::record_webhook_event(&event.event_type, event.status.as_str());

        if let Err(e) = self.store.append(&event).await {
            tracing::error!(event_id = %event.id, error = %e, "Failed to persist webhook event");
        }

        tracing::info!(
            event_id = %event.id,
            status = event.status.as_str(),
            files = event.files_analyzed.len(),
            succeeded = event.success_count(),
            "Webhook event processed"
        );

        event
    }
}

fn plan_push(push: PushEvent, delivery_id: Option<String>) -> WebhookOutcome {
    if push.deleted {
        return WebhookOutcome::Ignored {
            reason: format!("Branch deletion ({}) has nothing to analyze", push.git_ref),
        };
    }

    let paths = yaml_files_from_push(&push);
    if paths.is_empty() {
        return WebhookOutcome::Ignored {
            reason: "No YAML files changed".to_string(),
        };
    }

    WebhookOutcome::Accepted(AnalysisJob {
        event_type: "push".to_string(),
        repository: push.repository.full_name.clone(),
        source_repository: push.repository.full_name,
        git_ref: push.git_ref,
        commit_sha: push.after,
        delivery_id,
        files: FileSource::Paths(paths),
    })
}

fn plan_pull_request(pr: PullRequestEvent, delivery_id: Option<String>) -> WebhookOutcome {
    if !ANALYZED_PR_ACTIONS.contains(&pr.action.as_str()) {
        return WebhookOutcome::Ignored {
            reason: format!("Pull request action '{}' is not analyzed", pr.action),
        };
    }

    let head = pr.pull_request.head;
    let Some(head_repo) = head.repo else {
        return WebhookOutcome::Ignored {
            reason: "Pull request head repository no longer exists".to_string(),
        };
    };

    WebhookOutcome::Accepted(AnalysisJob {
        event_type: "pull_request".to_string(),
        repository: pr.repository.full_name,
        source_repository: head_repo.full_name,
        git_ref: head.git_ref,
        commit_sha: head.sha,
        delivery_id,
        files: FileSource::PullRequest { number: pr.number },
    })
}

/// YAML files added or modified by a push and still present afterwards.
///
/// Commits are replayed in order so the last action on a path wins: a file
/// removed and later re-added is analyzed, one added and later removed is not.
pub fn yaml_files_from_push(push: &PushEvent) -> Vec<String> {
    let mut order: Vec<&str> = Vec::new();
    let mut present: HashSet<&str> = HashSet::new();

    for commit in &push.commits {
        for path in commit.added.iter().chain(commit.modified.iter()) {
            if is_yaml(path) && present.insert(path.as_str()) {
                order.push(path.as_str());
            }
        }
        for path in &commit.removed {
            present.remove(path.as_str());
        }
    }

    dedup_preserving_order(
        order
            .into_iter()
            .filter(|path| present.contains(path))
            .map(str::to_string),
    )
}

pub fn is_yaml(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".yml") || lower.ends_with(".yaml")
}

fn dedup_preserving_order(paths: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    paths.filter(|p| seen.insert(p.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::github::{Commit, Repository};

    fn push(commits: Vec<Commit>) -> PushEvent {
        PushEvent {
            git_ref: "refs/heads/main".into(),
            after: "abc123".into(),
            deleted: false,
            commits,
            repository: Repository {
                full_name: "octo/repo".into(),
            },
        }
    }

    fn commit(added: &[&str], modified: &[&str], removed: &[&str]) -> Commit {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        Commit {
            id: "c".into(),
            added: owned(added),
            modified: owned(modified),
            removed: owned(removed),
        }
    }

    #[test]
    fn yaml_detection_is_case_insensitive() {
        assert!(is_yaml(".github/workflows/CI.YML"));
        assert!(is_yaml("k8s/deploy.yaml"));
        assert!(!is_yaml("README.md"));
        assert!(!is_yaml("yml"));
    }

    #[test]
    fn push_collects_added_and_modified_yaml_in_first_seen_order() {
        let event = push(vec![
            commit(&["b.yml", "notes.txt"], &["a.yaml"], &[]),
            commit(&[], &["b.yml", "c.yml"], &[]),
        ]);
        assert_eq!(yaml_files_from_push(&event), vec!["b.yml", "a.yaml", "c.yml"]);
    }

    #[test]
    fn push_drops_files_removed_by_a_later_commit() {
        let event = push(vec![
            commit(&["gone.yml", "kept.yml"], &[], &[]),
            commit(&[], &[], &["gone.yml"]),
        ]);
        assert_eq!(yaml_files_from_push(&event), vec!["kept.yml"]);
    }

    #[test]
    fn push_keeps_file_re_added_after_removal() {
        let event = push(vec![
            commit(&[], &[], &["ci.yml"]),
            commit(&["ci.yml"], &[], &[]),
        ]);
        assert_eq!(yaml_files_from_push(&event), vec!["ci.yml"]);

        let renamed_back = push(vec![
            commit(&["a.yml"], &[], &[]),
            commit(&[], &[], &["a.yml"]),
            commit(&[], &["a.yml"], &[]),
        ]);
        assert_eq!(yaml_files_from_push(&renamed_back), vec!["a.yml"]);
    }

    #[test]
    fn deleted_branch_is_ignored() {
        let mut event = push(vec![commit(&["a.yml"], &[], &[])]);
        event.deleted = true;
        assert!(matches!(
            plan_push(event, None),
            WebhookOutcome::Ignored { .. }
        ));
    }

    #[test]
    fn push_without_yaml_is_ignored() {
        let event = push(vec![commit(&["src/main.rs"], &[], &[])]);
        assert!(matches!(
            plan_push(event, None),
            WebhookOutcome::Ignored { .. }
        ));
    }

    #[test]
    fn push_job_fetches_at_after_sha() {
        let event = push(vec![commit(&["a.yml"], &[], &[])]);
        match plan_push(event, Some("d-1".into())) {
            WebhookOutcome::Accepted(job) => {
                assert_eq!(job.commit_sha, "abc123");
                assert_eq!(job.delivery_id.as_deref(), Some("d-1"));
                assert_eq!(job.known_file_count(), Some(1));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn pull_request_actions() {
        let payload = |action: &str| {
            serde_json::from_value::<PullRequestEvent>(serde_json::json!({
                "action": action,
                "number": 7,
                "pull_request": {
                    "head": {"ref": "feature", "sha": "def456", "repo": {"full_name": "fork/repo"}}
                },
                "repository": {"full_name": "octo/repo"}
            }))
            .unwrap()
        };

        match plan_pull_request(payload("synchronize"), None) {
            WebhookOutcome::Accepted(job) => {
                assert_eq!(job.repository, "octo/repo");
                assert_eq!(job.source_repository, "fork/repo");
                assert_eq!(job.commit_sha, "def456");
                assert_eq!(job.files, FileSource::PullRequest { number: 7 });
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert!(matches!(
            plan_pull_request(payload("closed"), None),
            WebhookOutcome::Ignored { .. }
        ));
    }
}
