/**
 * Phase 5: Relevance Scoring (§4.H)
 *
 * DESIGN DECISION: one LLM call per candidate, chunked into batches of 50 when
 * the candidate list is larger, with a bounded worker pool
 * WHY: a single call asked to score hundreds of files in one shot degrades
 * model attention; chunking keeps each call's context small and lets chunks
 * run concurrently under the gateway's own per-task-name semaphore
 */

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::llm_gateway::{LlmGateway, OutputFormat, SchemaValidator};
use crate::types::{FilePriority, ModificationLikelihood, RelevanceScore, SubScore};

use super::discovery::FileCandidate;
use super::CurationRequest;

const CHUNK_SIZE: usize = 50;
const MAX_CONCURRENT_CHUNKS: usize = 4;
const DROP_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelevanceTier {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone)]
pub struct ScoredFile {
    pub path: String,
    pub relevance: RelevanceScore,
    pub tier: RelevanceTier,
}

const SYSTEM_PROMPT: &str = "You score how relevant each candidate file is to the task prompt. \
Reply with JSON: {\"scores\": [{\"path\": string, \"overall\": number in [0,1], \"confidence\": number in [0,1], \
\"modification_likelihood\": \"very_low\"|\"low\"|\"medium\"|\"high\"|\"very_high\", \"reasoning\": [string], \
\"categories\": [string]}]}. Include one entry per candidate path, in the order given.";

fn build_user_prompt(prompt: &str, batch: &[FileCandidate]) -> String {
    let list = batch.iter().map(|c| format!("- {} (discovery confidence {:.2}, via {})", c.path, c.confidence, c.strategies.join("+"))).collect::<Vec<_>>().join("\n");
    format!("Task prompt:\n{prompt}\n\nCandidate files:\n{list}")
}

fn schema_validator() -> &'static SchemaValidator {
    fn validate(value: &Value) -> std::result::Result<(), String> {
        let scores = value.get("scores").and_then(Value::as_array).ok_or("scores must be an array")?;
        for entry in scores {
            if entry.get("path").and_then(Value::as_str).is_none() {
                return Err("each score entry needs a path".to_string());
            }
            match entry.get("overall").and_then(Value::as_f64) {
                Some(v) if (0.0..=1.0).contains(&v) => {}
                _ => return Err("overall must be in [0, 1]".to_string()),
            }
            match entry.get("confidence").and_then(Value::as_f64) {
                Some(v) if (0.0..=1.0).contains(&v) => {}
                _ => return Err("confidence must be in [0, 1]".to_string()),
            }
        }
        Ok(())
    }
    &validate
}

#[derive(Debug, Deserialize)]
struct ScoreEntry {
    path: String,
    overall: f64,
    confidence: f64,
    #[serde(default)]
    modification_likelihood: Option<ModificationLikelihood>,
    #[serde(default)]
    reasoning: Vec<String>,
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    #[serde(default)]
    scores: Vec<ScoreEntry>,
}

fn classify(overall: f64) -> RelevanceTier {
    if overall >= 0.7 {
        RelevanceTier::High
    } else if overall >= 0.4 {
        RelevanceTier::Medium
    } else {
        RelevanceTier::Low
    }
}

pub fn tier_to_priority(tier: RelevanceTier) -> FilePriority {
    match tier {
        RelevanceTier::High => FilePriority::High,
        RelevanceTier::Medium => FilePriority::Medium,
        RelevanceTier::Low => FilePriority::Low,
    }
}

async fn score_chunk(gateway: &LlmGateway, prompt: &str, batch: &[FileCandidate]) -> Result<Vec<ScoredFile>> {
    let user_prompt = build_user_prompt(prompt, batch);
    let raw = gateway.call(&user_prompt, Some(SYSTEM_PROMPT), "relevance_scoring", OutputFormat::Json, Some(schema_validator()), 0.1).await?;
    let parsed: ScoreResponse = serde_json::from_str(&raw).map_err(|e| Error::InvalidModelOutput(format!("relevance_scoring: {e}")))?;

    let mut out = Vec::new();
    for entry in parsed.scores {
        if entry.overall < DROP_THRESHOLD {
            continue;
        }
        let relevance = RelevanceScore {
            overall: entry.overall,
            confidence: entry.confidence,
            modification_likelihood: entry.modification_likelihood.unwrap_or(ModificationLikelihood::Medium),
            reasoning: entry.reasoning,
            categories: entry.categories,
            imports: Vec::new(),
            exports: Vec::new(),
            functions: Vec::<SubScore>::new(),
            classes: Vec::<SubScore>::new(),
        };
        let tier = classify(relevance.overall);
        out.push(ScoredFile { path: entry.path, relevance, tier });
    }
    Ok(out)
}

/// Runs chunked scoring over a bounded worker pool (`tokio::spawn` per chunk,
/// `MAX_CONCURRENT_CHUNKS` in flight at once), returning the scored files
/// sorted per §4.H's tie-break (overall desc, confidence desc, modification
/// likelihood desc, path asc), and whether chunking was used.
pub async fn run(gateway: &Arc<LlmGateway>, request: &CurationRequest, candidates: &[FileCandidate], refined_prompt: &str) -> Result<(Vec<ScoredFile>, bool)> {
    if candidates.is_empty() {
        return Ok((Vec::new(), false));
    }

    let owned_chunks: Vec<Vec<FileCandidate>> = candidates.chunks(CHUNK_SIZE).map(|c| c.to_vec()).collect();
    let chunking_used = owned_chunks.len() > 1;

    let mut scored = Vec::new();
    for group in owned_chunks.chunks(MAX_CONCURRENT_CHUNKS) {
        let handles: Vec<_> = group
            .iter()
            .cloned()
            .map(|chunk| {
                let gateway = Arc::clone(gateway);
                let prompt = refined_prompt.to_string();
                tokio::spawn(async move { score_chunk(&gateway, &prompt, &chunk).await })
            })
            .collect();

        for handle in handles {
            let result = handle.await.map_err(|e| Error::Internal(format!("relevance scoring task panicked: {e}")))?;
            scored.extend(result?);
        }
    }

    scored.sort_by(|a, b| {
        b.relevance
            .overall
            .partial_cmp(&a.relevance.overall)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.relevance.confidence.partial_cmp(&a.relevance.confidence).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| b.relevance.modification_likelihood.cmp(&a.relevance.modification_likelihood))
            .then_with(|| a.path.cmp(&b.path))
    });

    scored.truncate(request.max_files);
    Ok((scored, chunking_used))
}

pub fn language_hint(path: &str) -> String {
    Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_tiers() {
        assert_eq!(classify(0.9), RelevanceTier::High);
        assert_eq!(classify(0.7), RelevanceTier::High);
        assert_eq!(classify(0.69), RelevanceTier::Medium);
        assert_eq!(classify(0.4), RelevanceTier::Medium);
        assert_eq!(classify(0.39), RelevanceTier::Low);
    }

    #[test]
    fn test_schema_validator_requires_path_and_bounds() {
        let bad = serde_json::json!({"scores": [{"overall": 0.5, "confidence": 0.5}]});
        assert!(schema_validator()(&bad).is_err());

        let good = serde_json::json!({"scores": [{"path": "a.rs", "overall": 0.5, "confidence": 0.5}]});
        assert!(schema_validator()(&good).is_ok());
    }

    #[test]
    fn test_tier_to_priority_mapping() {
        assert_eq!(tier_to_priority(RelevanceTier::High), FilePriority::High);
        assert_eq!(tier_to_priority(RelevanceTier::Low), FilePriority::Low);
    }
}
