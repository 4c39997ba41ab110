/**
 * Project Context data model (see §3)
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::task::ProjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodebaseSize {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectedStack {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub build_tools: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub config_files: Vec<String>,
    #[serde(default)]
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub architectural_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectStructure {
    #[serde(default)]
    pub source_dirs: Vec<String>,
    #[serde(default)]
    pub test_dirs: Vec<String>,
    #[serde(default)]
    pub doc_dirs: Vec<String>,
    #[serde(default)]
    pub build_dirs: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectDependencies {
    #[serde(default)]
    pub production: Vec<String>,
    #[serde(default)]
    pub development: Vec<String>,
    #[serde(default)]
    pub external: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodebaseContextSnapshot {
    #[serde(default)]
    pub relevant_files: Vec<String>,
    #[serde(default)]
    pub context_summary: String,
    #[serde(default)]
    pub gathering_metrics_ms: u64,
    #[serde(default)]
    pub total_context_size: usize,
    #[serde(default)]
    pub average_relevance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectContextMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: String,
    pub source: ContextSource,
}

/// Created once per session and read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_id: ProjectId,
    pub project_path: PathBuf,
    pub project_name: String,
    pub description: String,
    pub detected: DetectedStack,
    pub existing_tasks_summary: String,
    pub codebase_size: CodebaseSize,
    pub team_size: u32,
    pub complexity: Complexity,
    pub structure: ProjectStructure,
    pub dependencies: ProjectDependencies,
    pub codebase_context: CodebaseContextSnapshot,
    pub metadata: ProjectContextMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_context_round_trips_through_json() {
        let ctx = ProjectContext {
            project_id: ProjectId::new("P1"),
            project_path: PathBuf::from("/tmp/project"),
            project_name: "demo".to_string(),
            description: "a demo project".to_string(),
            detected: DetectedStack::default(),
            existing_tasks_summary: String::new(),
            codebase_size: CodebaseSize::Small,
            team_size: 1,
            complexity: Complexity::Low,
            structure: ProjectStructure::default(),
            dependencies: ProjectDependencies::default(),
            codebase_context: CodebaseContextSnapshot::default(),
            metadata: ProjectContextMetadata {
                created_at: Utc::now(),
                updated_at: Utc::now(),
                version: "1".to_string(),
                source: ContextSource::Auto,
            },
        };

        let json = serde_json::to_string(&ctx).unwrap();
        let back: ProjectContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back.project_name, "demo");
    }
}
