/**
 * Phase 6: Meta-Prompt Generation (§4.H)
 *
 * DESIGN DECISION: a task-type-keyed template supplies the system prompt and
 * guideline list; the model call fills in the context summary and the
 * per-task decomposition/response-format hints
 * WHY: the five task types (`feature_addition`, `refactoring`, `bug_fix`,
 * `performance_optimization`, `general`) each want a different reviewer
 * posture; hard-coding that posture per type keeps the model call focused on
 * the parts that actually need the specific file list to answer
 */

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::llm_gateway::{LlmGateway, OutputFormat, SchemaValidator};
use crate::types::MetaPrompt;

use super::intent_analysis::IntentAnalysisResult;
use super::scoring::ScoredFile;
use super::CurationRequest;

struct Template {
    system_prompt: &'static str,
    guidelines: &'static [&'static str],
}

fn template_for(task_type: &str) -> Template {
    match task_type {
        "feature_addition" => Template {
            system_prompt: "You are implementing a new feature. Preserve existing behavior for \
unrelated code paths and follow the conventions already present in the supplied files.",
            guidelines: &["Add tests alongside new behavior.", "Reuse existing abstractions before introducing new ones.", "Keep the change scoped to the stated feature."],
        },
        "refactoring" => Template {
            system_prompt: "You are refactoring existing code. Behavior must not change; only the \
internal structure may.",
            guidelines: &["Do not alter public signatures unless the prompt requires it.", "Keep commits reviewable: prefer mechanical, traceable transformations.", "Run or update existing tests rather than deleting them."],
        },
        "bug_fix" => Template {
            system_prompt: "You are fixing a defect. Identify the root cause in the supplied files \
before changing code, and add a regression test that would have caught it.",
            guidelines: &["Reproduce the bug's symptom before patching it.", "Prefer the minimal fix over a broader rewrite.", "Add a regression test."],
        },
        "performance_optimization" => Template {
            system_prompt: "You are optimizing performance. Preserve existing behavior and \
correctness; only latency, throughput, or resource usage may change.",
            guidelines: &["Measure before and after where the codebase has benchmarks.", "Do not trade correctness for speed.", "Call out any complexity trade-offs in the change."],
        },
        _ => Template {
            system_prompt: "You are completing a general engineering task against the supplied \
files. Follow the conventions already present in the codebase.",
            guidelines: &["Match the existing code style.", "Keep the change scoped to the stated task."],
        },
    }
}

const USER_PROMPT_SYSTEM: &str = "Given the task prompt, the detected intent, and the list of \
curated files with their relevance tiers, write a one-paragraph context summary and an estimated \
complexity (\"low\"|\"medium\"|\"high\"). Reply with JSON: {\"context_summary\": string, \
\"estimated_complexity\": string, \"quality_score\": number in [0,1]}.";

#[derive(Debug, Deserialize)]
struct MetaPromptLlmResult {
    context_summary: String,
    estimated_complexity: String,
    quality_score: f64,
}

fn schema_validator() -> &'static SchemaValidator {
    fn validate(value: &Value) -> std::result::Result<(), String> {
        if value.get("context_summary").and_then(Value::as_str).is_none() {
            return Err("context_summary must be a string".to_string());
        }
        if value.get("estimated_complexity").and_then(Value::as_str).is_none() {
            return Err("estimated_complexity must be a string".to_string());
        }
        match value.get("quality_score").and_then(Value::as_f64) {
            Some(v) if (0.0..=1.0).contains(&v) => Ok(()),
            _ => Err("quality_score must be in [0, 1]".to_string()),
        }
    }
    &validate
}

/// Builds the hierarchical `{epics[] -> tasks[] -> subtasks[]}` decomposition
/// from the scored files: one epic per relevance category (falling back to
/// the detected task type when a file has none), one task per file within
/// its epic, and one subtask per reasoning point the scorer gave for it.
fn build_task_decomposition(intent: &IntentAnalysisResult, scored: &[ScoredFile]) -> Value {
    use std::collections::BTreeMap;

    let mut epics: BTreeMap<String, Vec<&ScoredFile>> = BTreeMap::new();
    for file in scored {
        let epic_name = file.relevance.categories.first().cloned().unwrap_or_else(|| intent.task_type.clone());
        epics.entry(epic_name).or_default().push(file);
    }
    if epics.is_empty() {
        epics.entry(intent.task_type.clone()).or_default();
    }

    let epics_json: Vec<Value> = epics
        .into_iter()
        .map(|(epic_name, files)| {
            let tasks: Vec<Value> = files
                .into_iter()
                .map(|file| {
                    let subtasks: Vec<Value> = if file.relevance.reasoning.is_empty() {
                        vec![serde_json::json!({ "description": format!("Review {}", file.path) })]
                    } else {
                        file.relevance.reasoning.iter().map(|reason| serde_json::json!({ "description": reason })).collect()
                    };
                    serde_json::json!({
                        "title": format!("Update {}", file.path),
                        "file": file.path,
                        "tier": format!("{:?}", file.tier).to_lowercase(),
                        "subtasks": subtasks,
                    })
                })
                .collect();
            serde_json::json!({ "name": epic_name, "tasks": tasks })
        })
        .collect();

    serde_json::json!({ "epics": epics_json })
}

pub async fn run(gateway: &LlmGateway, request: &CurationRequest, intent: &IntentAnalysisResult, scored: &[ScoredFile]) -> Result<MetaPrompt> {
    let template = template_for(&request.task_type);
    let file_list = scored.iter().map(|f| format!("- {} ({:?}, overall {:.2})", f.path, f.tier, f.relevance.overall)).collect::<Vec<_>>().join("\n");

    let user_prompt = format!(
        "Task prompt:\n{}\n\nDetected intent: {} (confidence {:.2})\n\nCurated files:\n{}",
        request.prompt, intent.task_type, intent.confidence, file_list
    );

    let raw = gateway.call(&user_prompt, Some(USER_PROMPT_SYSTEM), "meta_prompt_generation", OutputFormat::Json, Some(schema_validator()), 0.3).await?;
    let parsed: MetaPromptLlmResult = serde_json::from_str(&raw).map_err(|e| Error::InvalidModelOutput(format!("meta_prompt_generation: {e}")))?;

    Ok(MetaPrompt {
        task_type: request.task_type.clone(),
        system_prompt: template.system_prompt.to_string(),
        user_prompt,
        context_summary: parsed.context_summary,
        task_decomposition: build_task_decomposition(intent, scored),
        guidelines: template.guidelines.iter().map(|g| g.to_string()).collect(),
        estimated_complexity: parsed.estimated_complexity,
        quality_score: parsed.quality_score,
        ai_agent_response_format: None,
    })
}
