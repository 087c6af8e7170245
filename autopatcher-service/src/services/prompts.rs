//! Prompt templates, one per assistant task.
//!
//! User-supplied content always goes last, after the instructions, so the
//! model reads the task before it reads anything it should not trust.

/// System and user halves of a chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const ANALYZE_SYSTEM: &str =
    "You are an expert DevOps engineer who analyzes YAML files. Always respond with valid JSON.";

const GENERATE_SYSTEM: &str =
    "You are an expert DevOps engineer who writes configuration files. Always respond with valid JSON.";

const EXPLAIN_SYSTEM: &str =
    "You are a senior software engineer who explains code clearly. Always respond with valid JSON.";

const SUMMARIZE_SYSTEM: &str =
    "You are a senior software engineer who reviews pull requests. Always respond with valid JSON.";

pub fn analyze_yaml(content: &str) -> Prompt {
    Prompt {
        system: ANALYZE_SYSTEM.to_string(),
        user: format!(
            "You are an expert DevOps engineer. The following is a YAML file. Analyze it for \
             errors, misconfigurations, and bad practices. Respond with a JSON object with three \
             keys: 1. corrected_yaml (the full corrected YAML file), 2. explanation (a detailed, \
             step-by-step explanation of what was wrong and why you fixed it), and 3. is_correct \
             (a boolean - true if the original YAML was already correct, false if issues were \
             found).\n\nYAML file to analyze:\n{}",
            content
        ),
    }
}

pub fn generate_yaml(request: &str) -> Prompt {
    Prompt {
        system: GENERATE_SYSTEM.to_string(),
        user: format!(
            "Write the configuration file described below. It may be a Dockerfile, a \
             docker-compose file, a GitHub Actions workflow, a Kubernetes manifest, or any other \
             DevOps configuration. Follow current best practices and include brief comments \
             where they help. Respond with a JSON object with one key: generated_yaml (the \
             complete file contents).\n\nRequest:\n{}",
            request
        ),
    }
}

pub fn explain_code(code: &str) -> Prompt {
    Prompt {
        system: EXPLAIN_SYSTEM.to_string(),
        user: format!(
            "Explain what the following code does, step by step, for a developer who has not \
             seen it before. Point out bugs or risky constructs if you notice any. Respond with a \
             JSON object with one key: explanation (a string, Markdown allowed).\n\nCode:\n{}",
            code
        ),
    }
}

/// Build the diff summary prompt. Diffs longer than `max_chars` characters
/// are cut at a character boundary and the prompt says so.
pub fn summarize_diff(diff: &str, max_chars: usize) -> Prompt {
    let (body, truncated) = truncate_chars(diff, max_chars);

    let note = if truncated {
        format!(
            "\n\nNote: the diff was truncated to its first {} characters; summarize what is \
             shown and mention that the rest was omitted.",
            max_chars
        )
    } else {
        String::new()
    };

    Prompt {
        system: SUMMARIZE_SYSTEM.to_string(),
        user: format!(
            "Summarize the following unified diff for a pull request reviewer. Respond with a \
             JSON object with two keys: summary (a short paragraph describing the change) and \
             key_changes (an array of strings, one per notable change).{}\n\nDiff:\n{}",
            note, body
        ),
    }
}

/// Cut `s` to at most `max_chars` characters.
fn truncate_chars(s: &str, max_chars: usize) -> (&str, bool) {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => (&s[..idx], true),
        None => (s, false),
    }
}
