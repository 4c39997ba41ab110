/**
 * Phase 3: Prompt Refinement (§4.H)
 *
 * DESIGN DECISION: a single LLM call that turns the raw prompt plus the
 * phase-2 intent analysis into a refined, self-contained prompt
 * WHY: downstream phases (discovery, scoring, meta-prompt) all read the
 * refined prompt instead of the original, so ambiguity the user left implicit
 * is resolved exactly once
 */

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::llm_gateway::{LlmGateway, OutputFormat, SchemaValidator};

use super::intent_analysis::IntentAnalysisResult;

const SYSTEM_PROMPT: &str = "You rewrite a software task prompt to be explicit and self-contained, \
using the supplied intent analysis. Reply with JSON: {\"refined_prompt\": string}. Do not invent \
requirements the original prompt does not imply.";

#[derive(Debug, Deserialize)]
struct PromptRefinementResult {
    refined_prompt: String,
}

fn schema_validator() -> &'static SchemaValidator {
    fn validate(value: &Value) -> std::result::Result<(), String> {
        match value.get("refined_prompt").and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => Ok(()),
            _ => Err("refined_prompt must be a non-empty string".to_string()),
        }
    }
    &validate
}

pub async fn run(gateway: &LlmGateway, original_prompt: &str, intent: &IntentAnalysisResult) -> Result<String> {
    let user_prompt = format!(
        "Original prompt:\n{}\n\nDetected task type: {}\nArchitectural components: {}\nSuggested focus areas: {}",
        original_prompt,
        intent.task_type,
        intent.architectural_components.join(", "),
        intent.suggested_focus_areas.join(", "),
    );

    let raw = gateway
        .call(&user_prompt, Some(SYSTEM_PROMPT), "prompt_refinement", OutputFormat::Json, Some(schema_validator()), 0.3)
        .await?;

    let parsed: PromptRefinementResult =
        serde_json::from_str(&raw).map_err(|e| Error::InvalidModelOutput(format!("prompt_refinement: {e}")))?;
    Ok(parsed.refined_prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_validator_rejects_empty_refined_prompt() {
        let value = serde_json::json!({"refined_prompt": ""});
        assert!(schema_validator()(&value).is_err());
    }

    #[test]
    fn test_schema_validator_accepts_nonempty_refined_prompt() {
        let value = serde_json::json!({"refined_prompt": "fix the websocket reconnect loop in src/ws"});
        assert!(schema_validator()(&value).is_ok());
    }
}
