/**
 * Code-Map Info, Context Package, and Relevance Score data models (see §3)
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeMapInfo {
    pub file_path: PathBuf,
    pub generated_at: DateTime<Utc>,
    pub project_path: PathBuf,
    pub file_size: u64,
}

impl CodeMapInfo {
    /// Staleness is purely age-based: `now - generatedAt > maxAge`.
    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        Utc::now().signed_duration_since(self.generated_at) > max_age
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationLikelihood {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubScore {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub complexity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub overall: f64,
    pub confidence: f64,
    pub modification_likelihood: ModificationLikelihood,
    pub reasoning: Vec<String>,
    pub categories: Vec<String>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub functions: Vec<SubScore>,
    #[serde(default)]
    pub classes: Vec<SubScore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSection {
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    #[serde(rename = "type")]
    pub section_type: SectionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Full,
    Optimized,
}

impl ContentSection {
    pub fn is_valid(&self) -> bool {
        self.start_line <= self.end_line
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagedFile {
    pub path: String,
    pub content: String,
    pub is_optimized: bool,
    pub total_lines: usize,
    pub token_estimate: usize,
    pub reasoning: String,
    #[serde(default)]
    pub content_sections: Vec<ContentSection>,
    pub relevance: RelevanceScore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReference {
    pub path: String,
    pub relevance: f64,
    pub size: u64,
    pub language: String,
    pub last_modified: DateTime<Utc>,
    pub token_estimate: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaPrompt {
    pub task_type: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub context_summary: String,
    pub task_decomposition: serde_json::Value,
    pub guidelines: Vec<String>,
    pub estimated_complexity: String,
    pub quality_score: f64,
    #[serde(default)]
    pub ai_agent_response_format: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPackageMetadata {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub original_prompt: String,
    pub refined_prompt: String,
    pub task_type: String,
    pub total_tokens: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
    #[serde(default)]
    pub codemap_cache_used: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPackage {
    pub metadata: ContextPackageMetadata,
    pub refined_prompt: String,
    pub codemap_path: PathBuf,
    pub high_priority_files: Vec<PackagedFile>,
    pub medium_priority_files: Vec<PackagedFile>,
    pub low_priority_files: Vec<FileReference>,
    #[serde(default)]
    pub meta_prompt: Option<MetaPrompt>,
}

impl ContextPackage {
    /// `sum(tokenEstimate) <= maxTokenBudget` across all three tiers.
    pub fn total_tokens(&self) -> usize {
        let high: usize = self.high_priority_files.iter().map(|f| f.token_estimate).sum();
        let medium: usize = self.medium_priority_files.iter().map(|f| f.token_estimate).sum();
        let low: usize = self.low_priority_files.iter().map(|f| f.token_estimate).sum();
        high + medium + low
    }

    pub fn within_budget(&self, budget: usize) -> bool {
        self.total_tokens() <= budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codemap_staleness() {
        let info = CodeMapInfo {
            file_path: PathBuf::from("map.md"),
            generated_at: Utc::now() - chrono::Duration::minutes(90),
            project_path: PathBuf::from("/p"),
            file_size: 10,
        };
        assert!(info.is_stale(chrono::Duration::minutes(60)));
        assert!(!info.is_stale(chrono::Duration::minutes(120)));
    }

    #[test]
    fn test_content_section_validity() {
        let section = ContentSection {
            start_line: 10,
            end_line: 5,
            content: String::new(),
            section_type: SectionKind::Full,
        };
        assert!(!section.is_valid());
    }

    #[test]
    fn test_modification_likelihood_ordering() {
        assert!(ModificationLikelihood::VeryHigh > ModificationLikelihood::High);
        assert!(ModificationLikelihood::Low > ModificationLikelihood::VeryLow);
    }
}
