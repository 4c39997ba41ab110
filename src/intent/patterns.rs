/**
 * Intent Pattern Engine (§4.D)
 *
 * DESIGN DECISION: pattern table is an in-process literal, not a config file
 * WHY: the closed intent set is part of this crate's contract with callers;
 * changing it is a code change, not an operator-tunable
 */

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::types::{ConfidenceLevel, Entity, Intent};

use super::entities::extract_entities;

#[derive(Debug, Clone)]
pub struct IntentPattern {
    pub id: &'static str,
    pub intent: Intent,
    pub regexes: &'static [&'static str],
    pub keywords: &'static [&'static str],
    pub priority: i32,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct IntentMatch {
    pub intent: Intent,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub entities: Vec<Entity>,
    pub pattern_id: &'static str,
}

fn compiled(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"))
}

/// The built-in pattern table: one or more regex surface forms per intent,
/// plus the keyword set used in the confidence formula.
pub fn pattern_table() -> &'static [IntentPattern] {
    static TABLE: OnceLock<Vec<IntentPattern>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            IntentPattern {
                id: "create_project",
                intent: Intent::CreateProject,
                regexes: &[r"^(create|start|new|init(ialize)?)\s+(a\s+)?(new\s+)?project"],
                keywords: &["create", "new", "project", "start"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "list_projects",
                intent: Intent::ListProjects,
                regexes: &[r"^(list|show|display)\s+(all\s+)?projects"],
                keywords: &["list", "projects", "show"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "open_project",
                intent: Intent::OpenProject,
                regexes: &[r"^open\s+(project\s+)?"],
                keywords: &["open", "project"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "update_project",
                intent: Intent::UpdateProject,
                regexes: &[r"^update\s+(the\s+)?project"],
                keywords: &["update", "project"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "archive_project",
                intent: Intent::ArchiveProject,
                regexes: &[r"^archive\s+(the\s+)?project"],
                keywords: &["archive", "project"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "create_task",
                intent: Intent::CreateTask,
                regexes: &[r"^(create|add|new)\s+(a\s+)?task"],
                keywords: &["create", "add", "task"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "list_tasks",
                intent: Intent::ListTasks,
                regexes: &[r"^(list|show)\s+(all\s+)?tasks"],
                keywords: &["list", "tasks", "show"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "run_task",
                intent: Intent::RunTask,
                regexes: &[r"^(run|execute|start)\s+task"],
                keywords: &["run", "execute", "task"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "check_status",
                intent: Intent::CheckStatus,
                regexes: &[r"^(check|what('?s)?|show)\s+(the\s+)?status"],
                keywords: &["status", "check"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "decompose_task",
                intent: Intent::DecomposeTask,
                regexes: &[r"^(break\s+down|decompose|split)\s+(this\s+)?task"],
                keywords: &["decompose", "break", "down", "split", "task"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "decompose_project",
                intent: Intent::DecomposeProject,
                regexes: &[r"^(break\s+down|decompose|split)\s+(this\s+)?project"],
                keywords: &["decompose", "break", "down", "split", "project"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "search_files",
                intent: Intent::SearchFiles,
                regexes: &[r"^(find|search|locate)\s+(for\s+)?files?"],
                keywords: &["find", "search", "files"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "search_content",
                intent: Intent::SearchContent,
                regexes: &[r"^(find|search|grep)\s+(for\s+)?.*\b(in|within)\b"],
                keywords: &["find", "search", "content", "in"],
                priority: 9,
                active: true,
            },
            IntentPattern {
                id: "refine_task",
                intent: Intent::RefineTask,
                regexes: &[r"^(refine|revise|clarify)\s+task"],
                keywords: &["refine", "revise", "task"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "assign_task",
                intent: Intent::AssignTask,
                regexes: &[r"^assign\s+task"],
                keywords: &["assign", "task"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "get_help",
                intent: Intent::GetHelp,
                regexes: &[r"^(help|how\s+do\s+i|what\s+can\s+you\s+do)"],
                keywords: &["help"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "parse_prd",
                intent: Intent::ParsePrd,
                regexes: &[r"^(parse|import|read)\s+(the\s+)?prd"],
                keywords: &["parse", "prd"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "parse_tasks",
                intent: Intent::ParseTasks,
                regexes: &[r"^(parse|import|read)\s+(the\s+)?task\s*list"],
                keywords: &["parse", "task", "list"],
                priority: 10,
                active: true,
            },
            IntentPattern {
                id: "import_artifact",
                intent: Intent::ImportArtifact,
                regexes: &[r"^import\s+(artifact|file|document)"],
                keywords: &["import", "artifact"],
                priority: 10,
                active: true,
            },
        ]
    })
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Implements the §4.D `match` algorithm exactly: normalize, try each active
/// pattern's regexes in order, score, extract entities on the original text,
/// keep the best match per pattern, filter by `min_confidence`, sort descending.
pub fn match_intent(text: &str, min_confidence: f64) -> Vec<IntentMatch> {
    let normalized = normalize(text);
    let text_len = normalized.chars().count().max(1) as f64;

    let mut matches = Vec::new();

    for pattern in pattern_table() {
        if !pattern.active {
            continue;
        }

        let mut best: Option<(f64, usize, usize)> = None; // (confidence, match_start, match_len)

        for regex_src in pattern.regexes {
            let regex = compiled(regex_src);
            if let Some(m) = regex.find(&normalized) {
                let matched_keywords = count_matched_keywords(&normalized, pattern.keywords);
                let keyword_ratio = matched_keywords as f64 / pattern.keywords.len().max(1) as f64;
                let match_len = (m.end() - m.start()) as f64;
                let length_component = (match_len / text_len * 0.2).min(0.2);
                let position_bonus = if m.start() == 0 { 0.1 } else { 0.0 };

                let confidence = (0.5 + 0.3 * keyword_ratio + length_component + position_bonus).clamp(0.0, 1.0);

                if best.map(|(c, _, _)| confidence > c).unwrap_or(true) {
                    best = Some((confidence, m.start(), m.end() - m.start()));
                }
            }
        }

        if let Some((confidence, _, _)) = best {
            if confidence >= min_confidence {
                let entities = extract_entities(pattern.intent, text);
                matches.push(IntentMatch {
                    intent: pattern.intent,
                    confidence,
                    confidence_level: ConfidenceLevel::from_confidence(confidence),
                    entities,
                    pattern_id: pattern.id,
                });
            }
        }
    }

    matches.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
    matches
}

fn count_matched_keywords(normalized_text: &str, keywords: &[&str]) -> usize {
    let words: HashSet<&str> = normalized_text.split_whitespace().collect();
    keywords.iter().filter(|kw| words.contains(*kw)).count()
}
