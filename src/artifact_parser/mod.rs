/**
 * Artifact Parser (§4.C)
 *
 * DESIGN DECISION: detection and parsing are split - `detect_existing_*` walks
 * the project directory for a candidate file, `parse_*` only ever reads a path
 * it is handed
 * WHY: callers that already know the artifact path (e.g. re-parsing after an
 * edit) should not pay for a directory walk
 *
 * Every filesystem read in this module goes through `secure_path::validate_path`
 * first; a project root is never trusted to keep artifacts inside itself.
 */

pub mod prd;
pub mod task_list;

use std::path::{Path, PathBuf};

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::secure_path::validate_path;
use crate::types::{AtomicTask, EpicId, ProjectId};

pub use prd::{parse_prd, PrdData};
pub use task_list::{convert_to_atomic_tasks, parse_task_list, TaskListData, TaskListType};

fn prd_filename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(.+-)?prd(-.+)?\.md$").unwrap())
}

fn task_list_filename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)task-list").unwrap())
}

fn most_recent_matching(dir: &Path, matches: impl Fn(&str) -> bool) -> Option<PathBuf> {
    let mut candidates: Vec<(PathBuf, std::time::SystemTime)> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some("md"))
        .filter(|entry| entry.file_name().to_str().is_some_and(&matches))
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((entry.path(), modified))
        })
        .collect();

    candidates.sort_by_key(|(_, modified)| *modified);
    candidates.pop().map(|(path, _)| path)
}

/// Scans `project_root` (non-recursively) for the most recently modified file
/// whose name matches the PRD naming convention.
pub fn detect_existing_prd(project_root: &Path, allowed_root: &Path) -> Result<Option<PathBuf>> {
    let validated = validate_path(project_root, allowed_root)?;
    Ok(most_recent_matching(&validated, |name| prd_filename_regex().is_match(name)))
}

/// Scans `project_root` (non-recursively) for the most recently modified file
/// whose name contains `task-list`.
pub fn detect_existing_task_list(project_root: &Path, allowed_root: &Path) -> Result<Option<PathBuf>> {
    let validated = validate_path(project_root, allowed_root)?;
    Ok(most_recent_matching(&validated, |name| task_list_filename_regex().is_match(name)))
}

/// Reads and parses the PRD at `path`, which must resolve within `allowed_root`.
pub fn read_and_parse_prd(path: &Path, allowed_root: &Path) -> Result<PrdData> {
    let validated = validate_path(path, allowed_root)?;
    let contents = std::fs::read_to_string(&validated).map_err(Error::from)?;
    Ok(parse_prd(&contents))
}

/// Reads and parses the task list at `path`, which must resolve within
/// `allowed_root`.
pub fn read_and_parse_task_list(path: &Path, allowed_root: &Path) -> Result<TaskListData> {
    let validated = validate_path(path, allowed_root)?;
    let contents = std::fs::read_to_string(&validated).map_err(Error::from)?;
    let filename = validated
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("task-list.md");
    Ok(parse_task_list(filename, &contents))
}

/// Convenience: detect, read, parse, and convert a project's task list into
/// Atomic Tasks in one call. Returns `Ok(None)` if no task list is found,
/// rather than an error - an absent artifact is a normal outcome.
pub fn load_atomic_tasks(
    project_root: &Path,
    allowed_root: &Path,
    project_id: ProjectId,
    epic_id: EpicId,
    created_by: &str,
) -> Result<Option<Vec<AtomicTask>>> {
    let Some(path) = detect_existing_task_list(project_root, allowed_root)? else {
        return Ok(None);
    };
    let data = read_and_parse_task_list(&path, allowed_root)?;
    Ok(Some(convert_to_atomic_tasks(&data, project_id, epic_id, created_by)))
}
