/**
 * Decomposition Session data model (see §3, §4.G)
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::project::ProjectContext;
use super::task::AtomicTask;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Status is monotonic except that `pending` may move directly to `failed`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (Pending, Failed) | (InProgress, Completed) | (InProgress, Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionOptions {
    pub max_depth: u8,
    pub min_hours: f64,
    pub max_hours: f64,
    pub force_decomposition: bool,
}

impl Default for DecompositionOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_hours: 0.1,
            max_hours: 4.0,
            force_decomposition: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionResult {
    pub parent: AtomicTask,
    pub sub_tasks: Vec<AtomicTask>,
    pub depth: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionSession {
    pub id: SessionId,
    pub originating_task: AtomicTask,
    pub project_context: ProjectContext,
    pub options: DecompositionOptions,
    pub status: SessionStatus,
    pub results: Vec<DecompositionResult>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip, default)]
    pub cancelled: bool,
}

impl DecompositionSession {
    pub fn new(task: AtomicTask, project_context: ProjectContext, options: DecompositionOptions) -> Self {
        Self {
            id: SessionId::generate(),
            originating_task: task,
            project_context,
            options,
            status: SessionStatus::Pending,
            results: Vec::new(),
            error: None,
            started_at: None,
            finished_at: None,
            cancelled: false,
        }
    }

    pub fn max_result_depth(&self) -> u8 {
        self.results.iter().map(|r| r.depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::task::{EpicId, Priority, ProjectId, TaskId, TaskStatus, TaskType};
    use crate::types::project::{CodebaseSize, Complexity, ContextSource, ProjectContextMetadata};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn sample_task() -> AtomicTask {
        AtomicTask {
            id: TaskId::new("T1"),
            title: "t".to_string(),
            description: "a description long enough to pass validation".to_string(),
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            task_type: TaskType::Development,
            estimated_hours: 2.0,
            actual_hours: None,
            project_id: ProjectId::new("P1"),
            epic_id: EpicId::new("E1"),
            dependencies: vec![],
            dependents: vec![],
            file_paths: vec![],
            acceptance_criteria: vec!["works".to_string()],
            criteria: Default::default(),
            validation_methods: vec![],
            assigned_agent: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
            created_by: "test".to_string(),
            tags: vec![],
            metadata: HashMap::new(),
        }
    }

    fn sample_project() -> ProjectContext {
        ProjectContext {
            project_id: ProjectId::new("P1"),
            project_path: PathBuf::from("/tmp/p"),
            project_name: "p".to_string(),
            description: String::new(),
            detected: Default::default(),
            existing_tasks_summary: String::new(),
            codebase_size: CodebaseSize::Small,
            team_size: 1,
            complexity: Complexity::Low,
            structure: Default::default(),
            dependencies: Default::default(),
            codebase_context: Default::default(),
            metadata: ProjectContextMetadata {
                created_at: Utc::now(),
                updated_at: Utc::now(),
                version: "1".to_string(),
                source: ContextSource::Auto,
            },
        }
    }

    #[test]
    fn test_session_starts_pending() {
        let session = DecompositionSession::new(sample_task(), sample_project(), DecompositionOptions::default());
        assert_eq!(session.status, SessionStatus::Pending);
    }

    #[test]
    fn test_status_transitions() {
        assert!(SessionStatus::Pending.can_transition_to(SessionStatus::InProgress));
        assert!(SessionStatus::Pending.can_transition_to(SessionStatus::Failed));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::InProgress));
    }
}
