/**
 * Phase 4: Multi-Strategy File Discovery (§4.H)
 *
 * DESIGN DECISION: four independent strategies over real files on disk plus
 * the code map text, consolidated by path union / max confidence, rather than
 * a single ranked list
 * WHY: §4.H names four named strategies (`semantic_similarity`,
 * `keyword_matching`, `semantic_and_keyword`, `structural_analysis`) that each
 * catch files the others miss; this crate has no injected embeddings
 * backend (§6 names only an LLM provider and a code-map generator as external
 * collaborators), so "semantic" similarity here is a bag-of-words overlap
 * between the refined prompt and a file's path plus leading content rather
 * than a vector search - documented in DESIGN.md
 */

use std::collections::{HashMap, HashSet};
use std::path::Path;

use regex::Regex;

use crate::code_map::extract_relevant_files;
use crate::error::Result;
use crate::types::ProjectContext;

use super::CurationRequest;

#[derive(Debug, Clone)]
pub struct FileCandidate {
    pub path: String,
    pub confidence: f64,
    pub strategies: Vec<&'static str>,
}

/// Caps the discovery fan-out well above `max_files` so phase 5 (relevance
/// scoring) still has room to down-select, without scanning unbounded trees.
const MAX_CANDIDATES_MULTIPLIER: usize = 5;

/// Runs the four strategies concurrently and waits on all of them. A
/// strategy that fails (panics or returns an error) is logged as a warning
/// and dropped; the phase only fails if every strategy failed.
pub async fn run(
    request: &CurationRequest,
    project: &ProjectContext,
    codemap_content: &str,
    refined_prompt: &str,
) -> Result<Vec<FileCandidate>> {
    let project_path = project.project_path.clone();
    let include = compile_patterns(&request.include_patterns);
    let exclude = compile_patterns(&request.exclude_patterns);
    let files = list_files(&project_path, &include, &exclude);

    let keywords = extract_keywords(refined_prompt);

    let semantic_files = files.clone();
    let semantic_keywords = keywords.clone();
    let semantic_project_path = project_path.clone();
    let semantic_task = tokio::task::spawn_blocking(move || semantic_similarity(&semantic_project_path, &semantic_files, &semantic_keywords));

    let keyword_codemap = codemap_content.to_string();
    let keyword_prompt = refined_prompt.to_string();
    let keyword_files = files.clone();
    let keyword_task = tokio::task::spawn_blocking(move || keyword_matching(&keyword_codemap, &keyword_prompt, &keyword_files));

    let structural_files = files.clone();
    let structural_structure = project.structure.clone();
    let structural_keywords = keywords.clone();
    let structural_task = tokio::task::spawn_blocking(move || structural_analysis(&structural_files, &structural_structure, &structural_keywords));

    let semantic = run_strategy("semantic_similarity", semantic_task).await;
    let keyword = run_strategy("keyword_matching", keyword_task).await;
    let structural = run_strategy("structural_analysis", structural_task).await;

    // `semantic_and_keyword` combines the other two strategies' own results
    // rather than recomputing them, so it runs once both are in hand.
    let combined = semantic_and_keyword(semantic.as_deref().unwrap_or(&[]), keyword.as_deref().unwrap_or(&[]));

    let any_succeeded = semantic.is_some() || keyword.is_some() || structural.is_some();
    let mut merged: HashMap<String, FileCandidate> = HashMap::new();
    for (name, batch) in [
        ("semantic_similarity", semantic.unwrap_or_default()),
        ("keyword_matching", keyword.unwrap_or_default()),
        ("semantic_and_keyword", combined),
        ("structural_analysis", structural.unwrap_or_default()),
    ] {
        for candidate in batch {
            merge_candidate(&mut merged, candidate, name);
        }
    }

    if !any_succeeded {
        return Err(crate::error::Error::Internal("all discovery strategies failed".to_string()));
    }

    let mut candidates: Vec<FileCandidate> = merged.into_values().collect();
    candidates.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.path.cmp(&b.path)));
    candidates.truncate(request.max_files.saturating_mul(MAX_CANDIDATES_MULTIPLIER).max(1));

    Ok(candidates)
}

/// Awaits a spawned strategy, turning a panic or join failure into a logged
/// warning and `None` rather than failing the whole phase.
async fn run_strategy(name: &str, task: tokio::task::JoinHandle<Vec<FileCandidate>>) -> Option<Vec<FileCandidate>> {
    match task.await {
        Ok(candidates) => Some(candidates),
        Err(err) => {
            tracing::warn!(strategy = name, error = %err, "discovery strategy failed, continuing with the rest");
            None
        }
    }
}

fn merge_candidate(merged: &mut HashMap<String, FileCandidate>, mut candidate: FileCandidate, strategy: &'static str) {
    if !candidate.strategies.contains(&strategy) {
        candidate.strategies = vec![strategy];
    }
    merged
        .entry(candidate.path.clone())
        .and_modify(|existing| {
            if candidate.confidence > existing.confidence {
                existing.confidence = candidate.confidence;
            }
            if !existing.strategies.contains(&strategy) {
                existing.strategies.push(strategy);
            }
        })
        .or_insert(candidate);
}

fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(&glob_to_regex(p)).ok()).collect()
}

/// Translates a small glob subset (`**`, `*`, `?`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push('.'),
            c if "\\.+()|[]{}^$".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    out
}

fn matches_any(regexes: &[Regex], rel_path: &str) -> bool {
    regexes.iter().any(|re| re.is_match(rel_path))
}

fn list_files(project_path: &Path, include: &[Regex], exclude: &[Regex]) -> Vec<String> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(project_path).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(project_path) else { continue };
        let rel_path = rel.to_string_lossy().replace('\\', "/");
        if rel_path.is_empty() {
            continue;
        }
        if matches_any(exclude, &rel_path) {
            continue;
        }
        if !include.is_empty() && !matches_any(include, &rel_path) {
            continue;
        }
        out.push(rel_path);
    }
    out.sort();
    out
}

fn extract_keywords(prompt: &str) -> HashSet<String> {
    const STOP_WORDS: &[&str] = &["the", "a", "an", "and", "or", "for", "with", "from", "that", "this", "should", "please"];
    prompt
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Bag-of-words overlap between prompt keywords and a file's path tokens plus
/// its first 2 KiB of content. Stands in for a real embeddings search.
fn semantic_similarity(project_path: &Path, files: &[String], keywords: &HashSet<String>) -> Vec<FileCandidate> {
    if keywords.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    for path in files {
        let path_tokens: HashSet<String> = path.to_lowercase().split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 2).map(str::to_string).collect();
        let mut hits = path_tokens.intersection(keywords).count();

        if let Ok(content) = std::fs::read(project_path.join(path)) {
            let prefix_len = content.len().min(2048);
            if let Ok(text) = std::str::from_utf8(&content[..prefix_len]) {
                let content_tokens: HashSet<String> = text.to_lowercase().split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 2).map(str::to_string).collect();
                hits += content_tokens.intersection(keywords).count().min(keywords.len());
            }
        }

        if hits > 0 {
            let confidence = (hits as f64 / (keywords.len() as f64 * 2.0)).min(1.0);
            out.push(FileCandidate { path: path.clone(), confidence, strategies: vec!["semantic_similarity"] });
        }
    }
    out
}

fn keyword_matching(codemap_content: &str, refined_prompt: &str, files: &[String]) -> Vec<FileCandidate> {
    let known: HashSet<&str> = files.iter().map(String::as_str).collect();
    extract_relevant_files(codemap_content, refined_prompt)
        .into_iter()
        .filter(|path| known.contains(path.as_str()) || known.iter().any(|f| f.ends_with(path.as_str())))
        .map(|path| FileCandidate { path, confidence: 0.6, strategies: vec!["keyword_matching"] })
        .collect()
}

/// A weighted union: a file found by either strategy is kept, with its
/// confidence boosted when both strategies agree on it.
fn semantic_and_keyword(semantic: &[FileCandidate], keyword: &[FileCandidate]) -> Vec<FileCandidate> {
    let semantic_scores: HashMap<&str, f64> = semantic.iter().map(|c| (c.path.as_str(), c.confidence)).collect();
    let keyword_scores: HashMap<&str, f64> = keyword.iter().map(|c| (c.path.as_str(), c.confidence)).collect();

    let mut paths: Vec<&str> = semantic_scores.keys().chain(keyword_scores.keys()).copied().collect();
    paths.sort_unstable();
    paths.dedup();

    paths
        .into_iter()
        .map(|path| {
            let sem = semantic_scores.get(path).copied();
            let kw = keyword_scores.get(path).copied();
            let confidence = match (sem, kw) {
                (Some(s), Some(k)) => (s + k) / 2.0 + 0.1, // agreement bonus
                (Some(s), None) => s * 0.7,
                (None, Some(k)) => k * 0.7,
                (None, None) => 0.0,
            };
            FileCandidate { path: path.to_string(), confidence: confidence.min(1.0), strategies: vec!["semantic_and_keyword"] }
        })
        .collect()
}

fn structural_analysis(files: &[String], structure: &crate::types::ProjectStructure, keywords: &HashSet<String>) -> Vec<FileCandidate> {
    let mut out = Vec::new();
    for path in files {
        let lower = path.to_lowercase();
        let in_source = structure.source_dirs.iter().any(|d| lower.starts_with(&d.to_lowercase()));
        let in_test = structure.test_dirs.iter().any(|d| lower.starts_with(&d.to_lowercase()));
        let keyword_in_path = keywords.iter().any(|kw| lower.contains(kw.as_str()));

        let mut confidence: f64 = 0.0;
        if in_source {
            confidence += 0.4;
        }
        if keyword_in_path {
            confidence += 0.3;
        }
        if in_test {
            confidence += 0.1;
        }
        if confidence > 0.0 {
            out.push(FileCandidate { path: path.clone(), confidence: confidence.min(1.0), strategies: vec!["structural_analysis"] });
        }
    }
    out
}
