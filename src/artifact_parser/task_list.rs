/**
 * Task-list markdown parsing and conversion to Atomic Tasks (§4.C)
 */

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::types::{AtomicTask, EpicId, ProjectId, QualityCriteria, TaskId, TaskPriority, TaskStatus, TaskType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskListType {
    Detailed,
    Summary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub list_type: TaskListType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParsedTaskItem {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListData {
    pub metadata: TaskListMetadata,
    pub tasks: Vec<ParsedTaskItem>,
}

/// `YYYY-MM-DDTHH-mm-ss-sssZ-<project-slug>-task-list-<type>.md`
fn filename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2}-\d{3}Z)-(.+)-task-list-(detailed|summary)\.md$",
        )
        .unwrap()
    })
}

/// Recovers metadata from the documented file-name convention, falling back
/// to `{name: basename minus suffix, createdAt: now, listType: detailed}`.
pub fn metadata_from_filename(filename: &str) -> TaskListMetadata {
    if let Some(caps) = filename_regex().captures(filename) {
        let timestamp_str = caps.get(1).unwrap().as_str();
        let name = caps.get(2).unwrap().as_str().to_string();
        let list_type = if caps.get(3).unwrap().as_str() == "summary" {
            TaskListType::Summary
        } else {
            TaskListType::Detailed
        };

        let normalized = timestamp_str.replacen('T', "T", 1);
        let normalized = {
            let mut parts = normalized.splitn(2, 'T');
            let date = parts.next().unwrap_or_default();
            let time = parts.next().unwrap_or_default().trim_end_matches('Z');
            let mut time_parts = time.splitn(4, '-');
            let h = time_parts.next().unwrap_or("00");
            let m = time_parts.next().unwrap_or("00");
            let s = time_parts.next().unwrap_or("00");
            let ms = time_parts.next().unwrap_or("000");
            format!("{date}T{h}:{m}:{s}.{ms}Z")
        };

        let created_at = DateTime::parse_from_rfc3339(&normalized)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        TaskListMetadata { name, created_at, list_type }
    } else {
        let name = filename.strip_suffix(".md").unwrap_or(filename).to_string();
        TaskListMetadata { name, created_at: Utc::now(), list_type: TaskListType::Detailed }
    }
}

fn task_heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^###?\s+(.+)$").unwrap())
}

fn hours_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)estimated\s*(?:hours)?:?\s*([0-9]+(?:\.[0-9]+)?)").unwrap())
}

/// Parses a task-list markdown body: `### <title>` starts a task; lines under
/// it accumulate as description, `- [ ] <criterion>` lines become acceptance
/// criteria, and an `Estimated: Nh` line sets the hour estimate. Malformed
/// input produces an empty task list, not an error.
pub fn parse_task_list_body(markdown: &str) -> Vec<ParsedTaskItem> {
    let mut tasks = Vec::new();
    let mut current: Option<ParsedTaskItem> = None;

    for line in markdown.lines() {
        if let Some(caps) = task_heading_regex().captures(line) {
            if let Some(task) = current.take() {
                tasks.push(task);
            }
            current = Some(ParsedTaskItem { title: caps.get(1).unwrap().as_str().trim().to_string(), ..Default::default() });
            continue;
        }

        let Some(task) = current.as_mut() else { continue };

        let trimmed = line.trim();
        if let Some(criterion) = trimmed.strip_prefix("- [ ]").or_else(|| trimmed.strip_prefix("- [x]")) {
            task.acceptance_criteria.push(criterion.trim().to_string());
        } else if let Some(caps) = hours_regex().captures(trimmed) {
            task.estimated_hours = caps.get(1).and_then(|m| m.as_str().parse().ok());
        } else if !trimmed.is_empty() && !trimmed.starts_with('#') {
            if !task.description.is_empty() {
                task.description.push(' ');
            }
            task.description.push_str(trimmed);
        }
    }

    if let Some(task) = current.take() {
        tasks.push(task);
    }

    tasks
}

pub fn parse_task_list(filename: &str, markdown: &str) -> TaskListData {
    TaskListData {
        metadata: metadata_from_filename(filename),
        tasks: parse_task_list_body(markdown),
    }
}

/// Converts parsed task-list items into full Atomic Tasks, filling defaults
/// for every field the markdown did not specify.
pub fn convert_to_atomic_tasks(
    data: &TaskListData,
    project_id: ProjectId,
    epic_id: EpicId,
    created_by: &str,
) -> Vec<AtomicTask> {
    let now = Utc::now();
    data.tasks
        .iter()
        .enumerate()
        .map(|(i, item)| AtomicTask {
            id: TaskId::new(format!("{}-{}", data.metadata.name, i + 1)),
            title: item.title.clone(),
            description: item.description.clone(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            task_type: TaskType::Development,
            estimated_hours: item.estimated_hours.unwrap_or(4.0),
            actual_hours: None,
            project_id: project_id.clone(),
            epic_id: epic_id.clone(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            file_paths: Vec::new(),
            acceptance_criteria: item.acceptance_criteria.clone(),
            criteria: QualityCriteria::default(),
            validation_methods: Vec::new(),
            assigned_agent: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            created_by: created_by.to_string(),
            tags: Vec::new(),
            metadata: HashMap::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_from_well_formed_filename() {
        let metadata = metadata_from_filename("2026-01-15T10-30-00-000Z-web-app-task-list-detailed.md");
        assert_eq!(metadata.name, "web-app");
        assert_eq!(metadata.list_type, TaskListType::Detailed);
    }

    #[test]
    fn test_metadata_falls_back_on_unrecognized_filename() {
        let metadata = metadata_from_filename("random-name.md");
        assert_eq!(metadata.name, "random-name");
        assert_eq!(metadata.list_type, TaskListType::Detailed);
    }

    #[test]
    fn test_parse_task_list_body() {
        let markdown = r#"
### Add login button
Add a login button to the nav bar.
- [ ] Visible on mobile
- [ ] Click navigates to /login
Estimated: 2h

### Fix websocket leak
Sockets are never closed on disconnect.
- [ ] No leak after 1000 reconnects
Estimated hours: 3.5
"#;
        let tasks = parse_task_list_body(markdown);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "Add login button");
        assert_eq!(tasks[0].acceptance_criteria.len(), 2);
        assert_eq!(tasks[0].estimated_hours, Some(2.0));
        assert_eq!(tasks[1].estimated_hours, Some(3.5));
    }

    #[test]
    fn test_convert_to_atomic_tasks() {
        let data = TaskListData {
            metadata: TaskListMetadata { name: "demo".to_string(), created_at: Utc::now(), list_type: TaskListType::Detailed },
            tasks: vec![ParsedTaskItem {
                title: "Task one".to_string(),
                description: "description".to_string(),
                acceptance_criteria: vec!["done".to_string()],
                estimated_hours: Some(3.0),
            }],
        };

        let tasks = convert_to_atomic_tasks(&data, ProjectId::new("P1"), EpicId::new("E1"), "importer");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id.0, "demo-1");
        assert_eq!(tasks[0].estimated_hours, 3.0);
    }
}
