/**
 * Entity extractors (§4.D step 4)
 *
 * DESIGN DECISION: one small regex-driven extractor per entity family, chosen
 * by the matched intent, plus a generic extractor that always runs
 * WHY: entity extraction needs the original, case-preserving text (normalized
 * text would mangle project/task names), so it is a separate pass from
 * pattern matching
 */

use regex::Regex;
use std::sync::OnceLock;

use crate::types::{Entity, Intent};

fn quoted_or_capitalized_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["']([^"']+)["']|\bcalled\s+(\S+)|\bnamed\s+(\S+)"#).unwrap())
}

fn task_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\btask[- ]?([a-z0-9_.-]+)\b").unwrap())
}

fn status_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(pending|in[- ]progress|completed|blocked|cancelled)\b").unwrap())
}

fn agent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bto\s+(@?\w+)\b").unwrap())
}

fn search_query_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:for|search)\s+(.+?)(?:\s+in\s+|$)").unwrap())
}

fn content_query_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bin\s+(.+)$").unwrap())
}

fn artifact_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w\-./\\]+\.(md|txt|json|yaml|yml)").unwrap())
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#(\w+)").unwrap())
}

fn integer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d+)\b").unwrap())
}

fn push_first_capture(entities: &mut Vec<Entity>, entity_type: &str, regex: &Regex, text: &str, confidence: f64) {
    if let Some(caps) = regex.captures(text) {
        let value = caps
            .iter()
            .skip(1)
            .find_map(|m| m)
            .map(|m| m.as_str().to_string());
        if let Some(value) = value {
            entities.push(Entity { entity_type: entity_type.to_string(), value, confidence });
        }
    }
}

fn extract_project_name(text: &str, entities: &mut Vec<Entity>) {
    push_first_capture(entities, "project_name", quoted_or_capitalized_regex(), text, 0.8);
}

fn extract_task_info(text: &str, entities: &mut Vec<Entity>) {
    push_first_capture(entities, "task_id", task_id_regex(), text, 0.75);
}

fn extract_status_info(text: &str, entities: &mut Vec<Entity>) {
    push_first_capture(entities, "status", status_regex(), text, 0.85);
}

fn extract_agent_info(text: &str, entities: &mut Vec<Entity>) {
    push_first_capture(entities, "agent", agent_regex(), text, 0.7);
}

fn extract_search_info(text: &str, entities: &mut Vec<Entity>) {
    push_first_capture(entities, "query", search_query_regex(), text, 0.65);
}

fn extract_content_info(text: &str, entities: &mut Vec<Entity>) {
    push_first_capture(entities, "scope", content_query_regex(), text, 0.65);
}

fn extract_artifact_info(text: &str, entities: &mut Vec<Entity>) {
    if let Some(m) = artifact_path_regex().find(text) {
        entities.push(Entity { entity_type: "artifact_path".to_string(), value: m.as_str().to_string(), confidence: 0.8 });
    }
}

/// Runs always, regardless of intent: `#tag` hashtags and bare integers.
fn extract_generic(text: &str, entities: &mut Vec<Entity>) {
    for m in tag_regex().captures_iter(text) {
        entities.push(Entity { entity_type: "tag".to_string(), value: m[1].to_string(), confidence: 0.9 });
    }
    for m in integer_regex().captures_iter(text) {
        entities.push(Entity { entity_type: "integer".to_string(), value: m[1].to_string(), confidence: 0.9 });
    }
}

/// Dispatches to the extractor family appropriate for `intent`, then always
/// runs the generic tag/integer extractor.
pub fn extract_entities(intent: Intent, text: &str) -> Vec<Entity> {
    let mut entities = Vec::new();

    match intent {
        Intent::CreateProject | Intent::OpenProject | Intent::UpdateProject | Intent::ArchiveProject => {
            extract_project_name(text, &mut entities);
        }
        Intent::CreateTask | Intent::RunTask | Intent::RefineTask | Intent::DecomposeTask => {
            extract_task_info(text, &mut entities);
        }
        Intent::CheckStatus => extract_status_info(text, &mut entities),
        Intent::AssignTask => extract_agent_info(text, &mut entities),
        Intent::SearchFiles => extract_search_info(text, &mut entities),
        Intent::SearchContent => extract_content_info(text, &mut entities),
        Intent::ImportArtifact | Intent::ParsePrd | Intent::ParseTasks => extract_artifact_info(text, &mut entities),
        _ => {}
    }

    extract_generic(text, &mut entities);
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_project_name() {
        let entities = extract_entities(Intent::CreateProject, r#"create project called "widgets""#);
        assert!(entities.iter().any(|e| e.entity_type == "project_name"));
    }

    #[test]
    fn test_extract_status_info() {
        let entities = extract_entities(Intent::CheckStatus, "what's the status, is it in progress?");
        assert!(entities.iter().any(|e| e.entity_type == "status" && e.value.eq_ignore_ascii_case("in progress")));
    }

    #[test]
    fn test_extract_generic_tag_and_integer() {
        let entities = extract_entities(Intent::Unknown, "bump priority on #urgent by 3 levels");
        assert!(entities.iter().any(|e| e.entity_type == "tag" && e.value == "urgent"));
        assert!(entities.iter().any(|e| e.entity_type == "integer" && e.value == "3"));
    }

    #[test]
    fn test_extract_artifact_info() {
        let entities = extract_entities(Intent::ParsePrd, "parse the prd at docs/web-app-prd.md please");
        assert!(entities.iter().any(|e| e.entity_type == "artifact_path" && e.value.ends_with(".md")));
    }
}
