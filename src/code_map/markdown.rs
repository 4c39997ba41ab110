/**
 * Markdown code-map parsers (§4.B)
 *
 * DESIGN DECISION: deterministic regex/line parsers, never an error on
 * malformed input
 * WHY: the code map is produced by an external generator this crate does not
 * control; a parser that raises on unexpected formatting would make every
 * downstream phase brittle. Empty output on malformed sections matches the
 * corpus's own "robust to malformed input" parsing idiom.
 */

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchitecturalInfo {
    pub directories: Vec<DirectoryEntry>,
    pub frameworks: Vec<String>,
    pub languages: Vec<String>,
    pub entry_points: Vec<String>,
    pub config_files: Vec<String>,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub path: String,
    pub file_count: Option<u32>,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyType {
    Import,
    Require,
    Include,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DependencyInfo {
    pub target: String,
    pub dependency_type: DependencyType,
    pub is_external: bool,
    pub package_name: Option<String>,
}

fn directory_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-*]\s+([^\s(]+)(?:\s*\((\d+)\s+files?\))?").unwrap())
}

fn directory_purpose(path: &str) -> Option<&'static str> {
    let name = path.trim_matches('/').rsplit('/').next().unwrap_or(path);
    match name {
        "src" => Some("source code"),
        "lib" => Some("library code"),
        "test" | "tests" | "__tests__" | "spec" => Some("tests"),
        "doc" | "docs" => Some("documentation"),
        "bin" => Some("executables"),
        "build" | "dist" | "target" => Some("build output"),
        "config" | "conf" => Some("configuration"),
        "scripts" => Some("scripts"),
        _ => None,
    }
}

fn known_frameworks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(react|vue|angular|svelte|next\.?js|nuxt|express|fastify|nestjs|django|flask|rails|spring|actix|axum|rocket|tokio)\b").unwrap()
    })
}

fn known_languages() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(rust|typescript|javascript|python|go|java|c\+\+|c#|ruby|php|swift|kotlin)\b").unwrap()
    })
}

fn entry_point_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(main|index|entry)\b.*\.(rs|ts|tsx|js|jsx|py|go|java)").unwrap())
}

fn config_file_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(package\.json|tsconfig|webpack|babel|eslint|prettier|\.env|cargo\.toml|config\.)").unwrap()
    })
}

/// Section headers `## <name>` select a parser mode; directory/frameworks/
/// languages/entry-points/config-files/patterns sections are each scanned with
/// their own rule.
pub fn extract_architectural_info(markdown: &str) -> ArchitecturalInfo {
    let mut info = ArchitecturalInfo::default();
    let mut mode = Mode::None;

    for line in markdown.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            mode = Mode::from_header(header);
            continue;
        }

        match mode {
            Mode::Directory => {
                if let Some(caps) = directory_regex().captures(line) {
                    let path = caps.get(1).unwrap().as_str().to_string();
                    let file_count = caps.get(2).and_then(|m| m.as_str().parse().ok());
                    let purpose = directory_purpose(&path).map(str::to_string);
                    info.directories.push(DirectoryEntry { path, file_count, purpose });
                }
            }
            Mode::Frameworks => {
                for m in known_frameworks().find_iter(line) {
                    let name = m.as_str().to_string();
                    if !info.frameworks.contains(&name) {
                        info.frameworks.push(name);
                    }
                }
            }
            Mode::Languages => {
                for m in known_languages().find_iter(line) {
                    let name = m.as_str().to_string();
                    if !info.languages.contains(&name) {
                        info.languages.push(name);
                    }
                }
            }
            Mode::EntryPoints => {
                if entry_point_regex().is_match(line) {
                    info.entry_points.push(line.trim().to_string());
                }
            }
            Mode::ConfigFiles => {
                if config_file_regex().is_match(line) {
                    info.config_files.push(line.trim().to_string());
                }
            }
            Mode::Patterns => {
                let trimmed = line.trim_start_matches(['-', '*', ' ']);
                if !trimmed.is_empty() {
                    info.patterns.push(trimmed.to_string());
                }
            }
            Mode::None => {}
        }
    }

    info
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    None,
    Directory,
    Frameworks,
    Languages,
    EntryPoints,
    ConfigFiles,
    Patterns,
}

impl Mode {
    fn from_header(header: &str) -> Mode {
        let lower = header.to_lowercase();
        if lower.contains("directory") || lower.contains("structure") {
            Mode::Directory
        } else if lower.contains("framework") {
            Mode::Frameworks
        } else if lower.contains("language") {
            Mode::Languages
        } else if lower.contains("entry") {
            Mode::EntryPoints
        } else if lower.contains("config") {
            Mode::ConfigFiles
        } else if lower.contains("pattern") {
            Mode::Patterns
        } else {
            Mode::None
        }
    }
}

fn import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"import\s+.*?\s+from\s+["']([^"']+)["']"#).unwrap())
}

fn require_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"require\(["']([^"']+)["']\)"#).unwrap())
}

fn include_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#include\s+<([^>]+)>").unwrap())
}

/// `import … from "x"` / `require("x")` / `#include <x>` each yield
/// `{target, type, isExternal, packageName}`.
pub fn extract_dependency_info(markdown: &str) -> Vec<DependencyInfo> {
    let mut deps = Vec::new();

    for line in markdown.lines() {
        if let Some(caps) = import_regex().captures(line) {
            deps.push(dependency_from(caps.get(1).unwrap().as_str(), DependencyType::Import));
        }
        if let Some(caps) = require_regex().captures(line) {
            deps.push(dependency_from(caps.get(1).unwrap().as_str(), DependencyType::Require));
        }
        if let Some(caps) = include_regex().captures(line) {
            deps.push(dependency_from(caps.get(1).unwrap().as_str(), DependencyType::Include));
        }
    }

    deps
}

fn dependency_from(target: &str, dependency_type: DependencyType) -> DependencyInfo {
    let is_external = !(target.starts_with('.') || target.starts_with('/'));
    let package_name = if is_external {
        Some(target.split('/').next().unwrap_or(target).to_string())
    } else {
        None
    };
    DependencyInfo { target: target.to_string(), dependency_type, is_external, package_name }
}

const STOP_WORDS: &[&str] = &["the", "a", "an", "and", "or", "for", "with", "from", "that", "this"];

fn path_like_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w\-./\\]+\.[A-Za-z0-9]+").unwrap())
}

/// Keywords are extracted from the task description (lowercase, length > 2,
/// minus a small stop-word set); a line containing a file-path-shaped token is
/// included if any keyword appears in the same line. Deduplicated on return.
pub fn extract_relevant_files(markdown: &str, task_description: &str) -> Vec<String> {
    let keywords: HashSet<String> = task_description
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect();

    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for line in markdown.lines() {
        let line_lower = line.to_lowercase();
        if !keywords.iter().any(|kw| line_lower.contains(kw.as_str())) {
            continue;
        }
        for m in path_like_regex().find_iter(line) {
            let path = m.as_str().to_string();
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    files
}
