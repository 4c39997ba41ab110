/**
 * Phase 8: Output Generation (§4.H)
 *
 * DESIGN DECISION: serialize through the XML package writer (or plain JSON
 * for `output_format = json`), write under `<OUT>/context-curator/`, and
 * return a small summary rather than the full package a second time
 * WHY: callers that only need the summary (job id, file counts, token total,
 * output path) shouldn't have to hold the whole `ContextPackage` in memory
 * again after `run` already returned it
 */

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::secure_path::validate_output_path;
use crate::types::ContextPackage;
use crate::xml_writer;

use super::{CurationRequest, OutputFormatKind, PipelineContext};

#[derive(Debug, Clone)]
pub struct CurationSummary {
    pub job_id: String,
    pub total_files: usize,
    pub total_tokens: usize,
    pub average_relevance_score: f64,
    pub codemap_cache_used: bool,
    pub processing_time_ms: u128,
    pub output_path: PathBuf,
}

fn extension_for(format: OutputFormatKind) -> &'static str {
    match format {
        OutputFormatKind::Xml => "xml",
        OutputFormatKind::Json => "json",
    }
}

fn average_relevance(package: &ContextPackage) -> f64 {
    let scored: Vec<f64> = package
        .high_priority_files
        .iter()
        .map(|f| f.relevance.overall)
        .chain(package.medium_priority_files.iter().map(|f| f.relevance.overall))
        .chain(package.low_priority_files.iter().map(|f| f.relevance))
        .collect();
    if scored.is_empty() {
        0.0
    } else {
        scored.iter().sum::<f64>() / scored.len() as f64
    }
}

pub async fn run(output_dir: &Path, allowed_root: &Path, request: &CurationRequest, ctx: &PipelineContext, package: &ContextPackage) -> Result<CurationSummary> {
    let dir = output_dir.join("context-curator");
    tokio::fs::create_dir_all(&dir).await?;

    let file_name = format!("context-package-{}.{}", ctx.job_id, extension_for(request.output_format));
    let candidate = dir.join(file_name);
    let target = validate_output_path(&candidate, allowed_root)?;

    let serialized = match request.output_format {
        OutputFormatKind::Xml => xml_writer::serialize(package),
        OutputFormatKind::Json => serde_json::to_string_pretty(package).map_err(|e| crate::error::Error::Internal(e.to_string()))?,
    };

    tokio::fs::write(&target, serialized).await?;

    let total_files = package.high_priority_files.len() + package.medium_priority_files.len() + package.low_priority_files.len();

    Ok(CurationSummary {
        job_id: ctx.job_id.clone(),
        total_files,
        total_tokens: package.total_tokens(),
        average_relevance_score: average_relevance(package),
        codemap_cache_used: ctx.codemap_cache_used,
        processing_time_ms: ctx.started_at.elapsed().as_millis(),
        output_path: target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for_formats() {
        assert_eq!(extension_for(OutputFormatKind::Xml), "xml");
        assert_eq!(extension_for(OutputFormatKind::Json), "json");
    }

    #[test]
    fn test_average_relevance_empty_package_is_zero() {
        let package = ContextPackage {
            metadata: crate::types::ContextPackageMetadata {
                job_id: "job".to_string(),
                created_at: chrono::Utc::now(),
                original_prompt: String::new(),
                refined_prompt: String::new(),
                task_type: "general".to_string(),
                total_tokens: 0,
                high_count: 0,
                medium_count: 0,
                low_count: 0,
                codemap_cache_used: false,
            },
            refined_prompt: String::new(),
            codemap_path: PathBuf::from("map.md"),
            high_priority_files: vec![],
            medium_priority_files: vec![],
            low_priority_files: vec![],
            meta_prompt: None,
        };
        assert_eq!(average_relevance(&package), 0.0);
    }
}
