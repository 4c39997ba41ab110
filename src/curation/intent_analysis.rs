/**
 * Phase 2: Intent Analysis (§4.H)
 *
 * DESIGN DECISION: the LLM call covers task classification and scope, while
 * language/framework/package-manager/structure detection is derived straight
 * from the code map via the existing architectural-info parser
 * WHY: the code map already names directories, languages, frameworks, and
 * config files in a fixed format; re-deriving that from a second model call
 * would be slower and less precise than a deterministic pass over text the
 * generator already produced
 */

use serde::Deserialize;
use serde_json::Value;

use crate::code_map::extract_architectural_info;
use crate::error::{Error, Result};
use crate::llm_gateway::{LlmGateway, OutputFormat, SchemaValidator};

use super::CurationRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Medium
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisScope {
    pub complexity: String,
    pub estimated_files: usize,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntentAnalysisResult {
    pub task_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Vec<String>,
    #[serde(default)]
    pub architectural_components: Vec<String>,
    #[serde(default)]
    pub scope: AnalysisScope,
    #[serde(default)]
    pub suggested_focus_areas: Vec<String>,
    #[serde(default)]
    pub estimated_effort: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectTypeAnalysisResult {
    pub package_managers: Vec<String>,
    pub structure_pattern: String,
    pub config_files: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LanguageAnalysisResult {
    /// `(language, fraction of mentions)`, sorted by fraction descending.
    pub languages: Vec<(String, f64)>,
    pub frameworks: Vec<String>,
}

const SYSTEM_PROMPT: &str = "You classify a software task from its prompt and an excerpt of the \
project's code map. Reply with JSON only, matching the requested fields. Keep reasoning terse.";

fn build_user_prompt(request: &CurationRequest, codemap_excerpt: &str) -> String {
    format!(
        "Task prompt:\n{}\n\nDeclared task type hint: {}\nFocus areas: {}\n\nCode map excerpt:\n{}",
        request.prompt,
        request.task_type,
        if request.focus_areas.is_empty() { "(none)".to_string() } else { request.focus_areas.join(", ") },
        truncate(codemap_excerpt, 4000),
    )
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn schema_validator() -> &'static SchemaValidator {
    fn validate(value: &Value) -> std::result::Result<(), String> {
        let obj = value.as_object().ok_or("expected a JSON object")?;
        if !obj.get("task_type").map(Value::is_string).unwrap_or(false) {
            return Err("task_type must be a string".to_string());
        }
        match obj.get("confidence").and_then(Value::as_f64) {
            Some(c) if (0.0..=1.0).contains(&c) => {}
            _ => return Err("confidence must be a number in [0, 1]".to_string()),
        }
        Ok(())
    }
    &validate
}

/// Runs the model-backed classification, then folds in deterministic
/// language/framework/package-manager/structure detection from the code map.
pub async fn run(
    gateway: &LlmGateway,
    request: &CurationRequest,
    codemap_content: &str,
) -> Result<(IntentAnalysisResult, ProjectTypeAnalysisResult, LanguageAnalysisResult)> {
    let arch = extract_architectural_info(codemap_content);

    let user_prompt = build_user_prompt(request, codemap_content);
    let raw = gateway
        .call(&user_prompt, Some(SYSTEM_PROMPT), "intent_analysis", OutputFormat::Json, Some(schema_validator()), 0.2)
        .await?;

    let mut intent: IntentAnalysisResult =
        serde_json::from_str(&raw).map_err(|e| Error::InvalidModelOutput(format!("intent_analysis: {e}")))?;
    if intent.task_type.trim().is_empty() {
        intent.task_type = request.task_type.clone();
    }

    let project_analysis = ProjectTypeAnalysisResult {
        package_managers: detect_package_managers(&arch.config_files),
        structure_pattern: detect_structure_pattern(&arch.directories),
        config_files: arch.config_files,
    };

    let language_analysis = LanguageAnalysisResult { languages: language_distribution(&arch.languages), frameworks: dedup_case_insensitive(arch.frameworks) };

    Ok((intent, project_analysis, language_analysis))
}

fn detect_package_managers(config_files: &[String]) -> Vec<String> {
    let mut found = Vec::new();
    let checks: &[(&str, &str)] = &[
        ("package.json", "npm"),
        ("cargo.toml", "cargo"),
        ("requirements.txt", "pip"),
        ("pyproject.toml", "pip"),
        ("go.mod", "go modules"),
        ("pom.xml", "maven"),
        ("build.gradle", "gradle"),
        ("gemfile", "bundler"),
    ];
    for file in config_files {
        let lower = file.to_lowercase();
        for (needle, manager) in checks {
            if lower.contains(needle) && !found.contains(&manager.to_string()) {
                found.push(manager.to_string());
            }
        }
    }
    found
}

fn detect_structure_pattern(directories: &[crate::code_map::markdown::DirectoryEntry]) -> String {
    let names: Vec<String> = directories.iter().map(|d| d.path.trim_matches('/').to_lowercase()).collect();
    if names.iter().any(|n| n.contains("controllers")) && names.iter().any(|n| n.contains("models")) {
        "mvc".to_string()
    } else if names.iter().any(|n| n.contains("packages")) || names.iter().any(|n| n.contains("crates")) {
        "monorepo".to_string()
    } else if names.iter().any(|n| n == "src") {
        "conventional".to_string()
    } else {
        "unknown".to_string()
    }
}

fn language_distribution(languages: &[String]) -> Vec<(String, f64)> {
    if languages.is_empty() {
        return Vec::new();
    }
    let total = languages.len() as f64;
    let mut counts: Vec<(String, usize)> = Vec::new();
    for lang in languages {
        let key = lang.to_lowercase();
        match counts.iter_mut().find(|(name, _)| *name == key) {
            Some((_, count)) => *count += 1,
            None => counts.push((key, 1)),
        }
    }
    let mut result: Vec<(String, f64)> = counts.into_iter().map(|(name, count)| (name, count as f64 / total)).collect();
    result.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    result
}

/// Drops duplicates that differ only by casing, keeping the first-seen form.
/// This is the pipeline's "false-positive filtering" step for §4.H phase 2:
/// the code map's regex-based detectors can report the same framework twice
/// under different capitalizations across sections.
fn dedup_case_insensitive(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if seen.insert(item.to_lowercase()) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_map::markdown::DirectoryEntry;

    #[test]
    fn test_detect_package_managers() {
        let files = vec!["package.json".to_string(), "Cargo.toml".to_string()];
        let managers = detect_package_managers(&files);
        assert!(managers.contains(&"npm".to_string()));
        assert!(managers.contains(&"cargo".to_string()));
    }

    #[test]
    fn test_detect_structure_pattern_mvc() {
        let dirs = vec![
            DirectoryEntry { path: "controllers".to_string(), file_count: None, purpose: None },
            DirectoryEntry { path: "models".to_string(), file_count: None, purpose: None },
        ];
        assert_eq!(detect_structure_pattern(&dirs), "mvc");
    }

    #[test]
    fn test_language_distribution_normalizes_to_fractions() {
        let langs = vec!["Rust".to_string(), "rust".to_string(), "Python".to_string()];
        let dist = language_distribution(&langs);
        assert_eq!(dist[0].0, "rust");
        assert!((dist[0].1 - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_dedup_case_insensitive_keeps_first_form() {
        let items = vec!["React".to_string(), "react".to_string(), "Vue".to_string()];
        assert_eq!(dedup_case_insensitive(items), vec!["React".to_string(), "Vue".to_string()]);
    }
}
