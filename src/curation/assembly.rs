/**
 * Phase 1 (init helpers) and Phase 7: Package Assembly (§4.H)
 *
 * DESIGN DECISION: greedy token-budget fill over the already-sorted scored
 * list (high tier first, then medium, low tier always becomes a reference),
 * tracking one running total across all three tiers
 * WHY: §4.H phase 7 fills high before medium before low and stops admitting
 * *anything* - full content or a reference - once the running total would
 * exceed `maxTokenBudget`; because phase 5 already sorts by `overall`
 * descending and the relevance tiers are monotonic in `overall`, a single
 * pass over the sorted list preserves that fill order without re-grouping.
 * A file that doesn't fit as full content still gets a shot at fitting as a
 * reference before it is dropped outright.
 */

use std::path::Path;

use crate::error::Result;
use crate::types::{estimate_tokens, ContentSection, FileReference, PackagedFile, ProjectContext, SectionKind};

use super::scoring::RelevanceTier;
use super::{CurationRequest, PipelineContext};

/// Files longer than this are truncated into an "optimized" section rather
/// than packaged whole; keeps a single huge generated file from consuming the
/// entire token budget by itself.
const MAX_FULL_CONTENT_CHARS: usize = 20_000;

fn language_for(path: &str) -> String {
    Path::new(path).extension().and_then(|e| e.to_str()).map(str::to_string).unwrap_or_else(|| "unknown".to_string())
}

fn read_file(project_path: &Path, rel_path: &str) -> Option<String> {
    std::fs::read_to_string(project_path.join(rel_path)).ok()
}

fn build_packaged_file(project_path: &Path, scored: &super::scoring::ScoredFile) -> Option<PackagedFile> {
    let content = read_file(project_path, &scored.path)?;
    let total_lines = content.lines().count().max(1);
    let reasoning = if scored.relevance.reasoning.is_empty() { String::new() } else { scored.relevance.reasoning.join("; ") };

    if content.len() <= MAX_FULL_CONTENT_CHARS {
        let token_estimate = estimate_tokens(&content);
        Some(PackagedFile {
            path: scored.path.clone(),
            content: content.clone(),
            is_optimized: false,
            total_lines,
            token_estimate,
            reasoning,
            content_sections: vec![ContentSection { start_line: 1, end_line: total_lines, content, section_type: SectionKind::Full }],
            relevance: scored.relevance.clone(),
        })
    } else {
        let optimized: String = content.chars().take(MAX_FULL_CONTENT_CHARS).collect();
        let optimized_lines = optimized.lines().count().max(1);
        let token_estimate = estimate_tokens(&optimized);
        Some(PackagedFile {
            path: scored.path.clone(),
            content: optimized.clone(),
            is_optimized: true,
            total_lines,
            token_estimate,
            reasoning,
            content_sections: vec![ContentSection { start_line: 1, end_line: optimized_lines, content: optimized, section_type: SectionKind::Optimized }],
            relevance: scored.relevance.clone(),
        })
    }
}

fn build_reference(project_path: &Path, scored: &super::scoring::ScoredFile) -> FileReference {
    let full_path = project_path.join(&scored.path);
    let metadata = std::fs::metadata(&full_path).ok();
    let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
    let last_modified = metadata
        .and_then(|m| m.modified().ok())
        .map(chrono::DateTime::<chrono::Utc>::from)
        .unwrap_or_else(chrono::Utc::now);
    let token_estimate = (size as f64 / 4.0).ceil() as usize;

    FileReference {
        path: scored.path.clone(),
        relevance: scored.relevance.overall,
        size,
        language: language_for(&scored.path),
        last_modified,
        token_estimate,
    }
}

/// Runs the greedy fill and returns the three tiers as they will sit in the
/// final `ContextPackage` (metadata and `codemap_path` are attached by the
/// output phase, which also knows the job id and timestamps).
pub async fn run(request: &CurationRequest, project: &ProjectContext, ctx: &PipelineContext) -> Result<crate::types::ContextPackage> {
    let project_path = project.project_path.clone();
    let mut budget_used = 0usize;
    let mut high = Vec::new();
    let mut medium = Vec::new();
    let mut low = Vec::new();

    for scored in &ctx.scored {
        if scored.tier != RelevanceTier::Low {
            if let Some(packaged) = build_packaged_file(&project_path, scored) {
                if budget_used + packaged.token_estimate <= request.max_token_budget {
                    budget_used += packaged.token_estimate;
                    match scored.tier {
                        RelevanceTier::High => high.push(packaged),
                        RelevanceTier::Medium => medium.push(packaged),
                        RelevanceTier::Low => unreachable!(),
                    }
                    continue;
                }
            }
        }

        // Low tier to begin with, unreadable as full content, or didn't fit
        // the remaining budget as full content - try it as a reference
        // against the same running total; drop it if even that doesn't fit.
        let reference = build_reference(&project_path, scored);
        if budget_used + reference.token_estimate <= request.max_token_budget {
            budget_used += reference.token_estimate;
            low.push(reference);
        }
    }

    let metadata = crate::types::ContextPackageMetadata {
        job_id: ctx.job_id.clone(),
        created_at: chrono::Utc::now(),
        original_prompt: request.prompt.clone(),
        refined_prompt: ctx.refined_prompt.clone(),
        task_type: request.task_type.clone(),
        total_tokens: budget_used,
        high_count: high.len(),
        medium_count: medium.len(),
        low_count: low.len(),
        codemap_cache_used: ctx.codemap_cache_used,
    };

    Ok(crate::types::ContextPackage {
        metadata,
        refined_prompt: ctx.refined_prompt.clone(),
        codemap_path: ctx.codemap_path.clone(),
        high_priority_files: high,
        medium_priority_files: medium,
        low_priority_files: low,
        meta_prompt: Some(ctx.meta_prompt.clone()),
    })
}
