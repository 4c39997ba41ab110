/**
 * Atomic Task data model (see §3)
 *
 * DESIGN DECISION: newtype identifiers for task/project/epic ids
 * WHY: call sites that mix up a TaskId and an EpicId fail to compile instead of
 * producing a silently-wrong lookup
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

macro_rules! newtype_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

newtype_id!(TaskId);
newtype_id!(ProjectId);
newtype_id!(EpicId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    /// Transition table from §3: `pending -> in_progress`,
    /// `in_progress -> {completed, blocked, cancelled}`, `blocked -> in_progress`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Blocked)
                | (InProgress, Cancelled)
                | (Blocked, InProgress)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Development,
    Testing,
    Documentation,
    Research,
    Deployment,
    Review,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityCriteria {
    #[serde(default)]
    pub testing: Vec<String>,
    #[serde(default)]
    pub quality: Vec<String>,
    #[serde(default)]
    pub integration: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicTask {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub task_type: TaskType,
    pub estimated_hours: f64,
    #[serde(default)]
    pub actual_hours: Option<f64>,
    pub project_id: ProjectId,
    pub epic_id: EpicId,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub dependents: Vec<TaskId>,
    #[serde(default)]
    pub file_paths: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub criteria: QualityCriteria,
    #[serde(default)]
    pub validation_methods: Vec<String>,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AtomicTask {
    /// The atomicity predicate used by the decomposition engine (§4.G):
    /// `estimatedHours in [minHours, maxHours]`, nonempty acceptance criteria,
    /// description length >= 20, dependencies.length <= 5.
    pub fn is_atomic(&self, min_hours: f64, max_hours: f64) -> bool {
        self.estimated_hours >= min_hours
            && self.estimated_hours <= max_hours
            && !self.acceptance_criteria.is_empty()
            && self.description.len() >= 20
            && self.dependencies.len() <= 5
    }

    /// `estimatedHours <= 8` for a task to be "atomic" per the top-level
    /// invariant in §3 (independent of the tighter options-scoped predicate
    /// used during decomposition).
    pub fn within_atomic_bound(&self) -> bool {
        self.estimated_hours <= 8.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task(hours: f64, criteria: Vec<String>, description: &str, deps: usize) -> AtomicTask {
        AtomicTask {
            id: TaskId::new("T1"),
            title: "Task".to_string(),
            description: description.to_string(),
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            task_type: TaskType::Development,
            estimated_hours: hours,
            actual_hours: None,
            project_id: ProjectId::new("P1"),
            epic_id: EpicId::new("E1"),
            dependencies: (0..deps).map(|i| TaskId::new(format!("D{i}"))).collect(),
            dependents: vec![],
            file_paths: vec![],
            acceptance_criteria: criteria,
            criteria: QualityCriteria::default(),
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

    #[test]
    fn test_status_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Blocked));
        assert!(TaskStatus::Blocked.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::InProgress));
    }

    #[test]
    fn test_atomic_predicate() {
        let task = sample_task(2.0, vec!["visible on mobile".to_string()], "Add a login button to the nav", 0);
        assert!(task.is_atomic(0.1, 4.0));
    }

    #[test]
    fn test_atomic_predicate_boundary_inclusive() {
        // estimatedHours exactly equal to maxHours is atomic (inclusive), per §8.
        let task = sample_task(4.0, vec!["criterion".to_string()], "description long enough to pass the check", 0);
        assert!(task.is_atomic(0.1, 4.0));
    }

    #[test]
    fn test_non_atomic_short_description() {
        let task = sample_task(2.0, vec!["c".to_string()], "short", 0);
        assert!(!task.is_atomic(0.1, 4.0));
    }

    #[test]
    fn test_non_atomic_too_many_dependencies() {
        let task = sample_task(2.0, vec!["c".to_string()], "a description that is definitely long enough", 6);
        assert!(!task.is_atomic(0.1, 4.0));
    }

    #[test]
    fn test_within_atomic_bound() {
        let mut task = sample_task(8.0, vec!["c".to_string()], "a description that is definitely long enough", 0);
        assert!(task.within_atomic_bound());
        task.estimated_hours = 8.1;
        assert!(!task.within_atomic_bound());
    }
}
