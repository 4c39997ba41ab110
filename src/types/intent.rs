/**
 * Intent Recognition Result data model (see §3, §4.D)
 */

use serde::{Deserialize, Serialize};

/// The closed intent set from §4.D, also used by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CreateProject,
    ListProjects,
    OpenProject,
    UpdateProject,
    ArchiveProject,
    CreateTask,
    ListTasks,
    RunTask,
    CheckStatus,
    DecomposeTask,
    DecomposeProject,
    SearchFiles,
    SearchContent,
    RefineTask,
    AssignTask,
    GetHelp,
    ParsePrd,
    ParseTasks,
    ImportArtifact,
    ClarificationNeeded,
    Unknown,
}

impl Intent {
    pub fn all() -> &'static [Intent] {
        use Intent::*;
        &[
            CreateProject,
            ListProjects,
            OpenProject,
            UpdateProject,
            ArchiveProject,
            CreateTask,
            ListTasks,
            RunTask,
            CheckStatus,
            DecomposeTask,
            DecomposeProject,
            SearchFiles,
            SearchContent,
            RefineTask,
            AssignTask,
            GetHelp,
            ParsePrd,
            ParseTasks,
            ImportArtifact,
            ClarificationNeeded,
            Unknown,
        ]
    }

    /// Parses a loosely-cased model-supplied intent string, falling back to
    /// `None` when it is not in the closed set (callers rewrite that to
    /// `Unknown` per §4.E).
    pub fn parse(raw: &str) -> Option<Intent> {
        use Intent::*;
        Some(match raw.trim().to_lowercase().as_str() {
            "create_project" => CreateProject,
            "list_projects" => ListProjects,
            "open_project" => OpenProject,
            "update_project" => UpdateProject,
            "archive_project" => ArchiveProject,
            "create_task" => CreateTask,
            "list_tasks" => ListTasks,
            "run_task" => RunTask,
            "check_status" => CheckStatus,
            "decompose_task" => DecomposeTask,
            "decompose_project" => DecomposeProject,
            "search_files" => SearchFiles,
            "search_content" => SearchContent,
            "refine_task" => RefineTask,
            "assign_task" => AssignTask,
            "get_help" => GetHelp,
            "parse_prd" => ParsePrd,
            "parse_tasks" => ParseTasks,
            "import_artifact" => ImportArtifact,
            "clarification_needed" => ClarificationNeeded,
            "unknown" => Unknown,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    /// Banding from §4.D: >=0.9 very_high, >=0.7 high, >=0.5 medium, >=0.3 low,
    /// else very_low.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            ConfidenceLevel::VeryHigh
        } else if confidence >= 0.7 {
            ConfidenceLevel::High
        } else if confidence >= 0.5 {
            ConfidenceLevel::Medium
        } else if confidence >= 0.3 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMethod {
    Pattern,
    Llm,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionMetadata {
    pub processing_time_ms: u64,
    pub method: RecognitionMethod,
    #[serde(default)]
    pub model_used: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentCandidate {
    pub intent: Intent,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRecognitionResult {
    pub intent: Intent,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub entities: Vec<Entity>,
    pub original_input: String,
    pub processed_input: String,
    pub alternatives: Vec<IntentCandidate>,
    pub metadata: RecognitionMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_banding() {
        assert_eq!(ConfidenceLevel::from_confidence(0.95), ConfidenceLevel::VeryHigh);
        assert_eq!(ConfidenceLevel::from_confidence(0.75), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_confidence(0.55), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(0.35), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_confidence(0.1), ConfidenceLevel::VeryLow);
    }

    #[test]
    fn test_confidence_banding_boundaries() {
        assert_eq!(ConfidenceLevel::from_confidence(0.9), ConfidenceLevel::VeryHigh);
        assert_eq!(ConfidenceLevel::from_confidence(0.7), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_confidence(0.5), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(0.3), ConfidenceLevel::Low);
    }

    #[test]
    fn test_intent_parse_unknown_strings() {
        assert_eq!(Intent::parse("create_project"), Some(Intent::CreateProject));
        assert_eq!(Intent::parse("not_a_real_intent"), None);
    }

    #[test]
    fn test_intent_parse_is_case_insensitive() {
        assert_eq!(Intent::parse("CREATE_PROJECT"), Some(Intent::CreateProject));
    }
}
