use serde::{Deserialize, Serialize};

/// Result of reviewing one YAML file. Missing fields in the model's answer
/// fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct YamlAnalysis {
    pub corrected_yaml: String,
    pub explanation: String,
    pub is_correct: bool,
}

/// Comment tags the model puts on lines it touched.
const CHANGE_MARKERS: &[&str] = &["# FIXED:", "# CHANGED:", "# ADDED:"];

/// One line of a corrected file, flagged when it carries a change marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectedLine<'a> {
    pub text: &'a str,
    pub changed: bool,
}

impl YamlAnalysis {
    pub fn corrected_lines(&self) -> Vec<CorrectedLine<'_>> {
        self.corrected_yaml
            .lines()
            .map(|text| CorrectedLine {
                text,
                changed: CHANGE_MARKERS.iter().any(|m| text.contains(m)),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratedYaml {
    pub generated_yaml: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CodeExplanation {
    pub explanation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiffSummary {
    pub summary: String,
    pub key_changes: Vec<String>,
}
