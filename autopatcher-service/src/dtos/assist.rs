use serde::Deserialize;
use validator::{Validate, ValidationError};

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateYamlRequest {
    #[validate(
        length(max = 20000, message = "Prompt is too long"),
        custom(function = "not_blank", message = "Prompt is required")
    )]
    pub prompt: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExplainCodeRequest {
    #[validate(
        length(max = 100000, message = "Code is too long"),
        custom(function = "not_blank", message = "Code is required")
    )]
    pub code: String,
}

/// Either an inline `diff`, or the coordinates of a pull request whose diff
/// is fetched from GitHub.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_diff_source"))]
pub struct SummarizeDiffRequest {
    #[serde(default)]
    pub diff: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, message = "Pull number must be positive"))]
    pub pull_number: Option<u64>,
}

pub enum DiffSource<'a> {
    Inline(&'a str),
    PullRequest { repository: &'a str, number: u64 },
}

impl SummarizeDiffRequest {
    /// Only meaningful after validation passed.
    pub fn source(&self) -> Option<DiffSource<'_>> {
        match (&self.diff, &self.repository, self.pull_number) {
            (Some(diff), None, None) => Some(DiffSource::Inline(diff)),
            (None, Some(repository), Some(number)) => Some(DiffSource::PullRequest {
                repository,
                number,
            }),
            _ => None,
        }
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn validate_diff_source(req: &SummarizeDiffRequest) -> Result<(), ValidationError> {
    let remote = req.repository.is_some() || req.pull_number.is_some();

    match (req.diff.as_deref(), remote) {
        (Some(_), true) => Err(invalid(
            "ambiguous_source",
            "Provide either diff or repository and pull_number, not both",
        )),
        (None, false) => Err(invalid(
            "missing_source",
            "Provide diff or repository and pull_number",
        )),
        (Some(diff), false) if diff.trim().is_empty() => Err(invalid("blank_diff", "Diff is empty")),
        (Some(_), false) => Ok(()),
        (None, true) => match (req.repository.as_deref(), req.pull_number) {
            (Some(repo), Some(_)) if is_repository_name(repo) => Ok(()),
            (Some(_), Some(_)) => Err(invalid(
                "invalid_repository",
                "Repository must look like owner/name",
            )),
            _ => Err(invalid(
                "incomplete_pull_request",
                "Both repository and pull_number are required",
            )),
        },
    }
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// `owner/name` with GitHub's allowed characters.
fn is_repository_name(value: &str) -> bool {
    let mut parts = value.split('/');
    let valid = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    matches!((parts.next(), parts.next(), parts.next()), (Some(owner), Some(name), None) if valid(owner) && valid(name))
}
