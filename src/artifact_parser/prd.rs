/**
 * PRD markdown parsing (§4.C)
 *
 * DESIGN DECISION: section-header-driven line scanning, identical idiom to the
 * code-map markdown parsers
 * WHY: both are externally-produced markdown with loosely-structured sections;
 * reusing the same "select a mode on `## heading`, then apply a per-mode rule"
 * shape keeps the two parsers easy to read side by side
 */

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrdOverview {
    #[serde(default)]
    pub business_goals: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrdTechnical {
    #[serde(default)]
    pub tech_stack: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrdPhase {
    pub name: String,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrdData {
    pub overview: PrdOverview,
    #[serde(default)]
    pub features: Vec<String>,
    pub technical: PrdTechnical,
    #[serde(default)]
    pub phases: Vec<PrdPhase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    None,
    Goals,
    Summary,
    Features,
    TechStack,
    Phase,
}

/// Parses a PRD markdown document. Robust to malformed input: an unrecognized
/// or empty document produces an empty `PrdData` rather than an error.
pub fn parse_prd(markdown: &str) -> PrdData {
    let mut data = PrdData::default();
    let mut mode = Mode::None;
    let mut current_phase: Option<PrdPhase> = None;

    for line in markdown.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            if let Some(phase) = current_phase.take() {
                data.phases.push(phase);
            }
            let lower = header.to_lowercase();
            mode = if lower.contains("goal") {
                Mode::Goals
            } else if lower.contains("overview") || lower.contains("summary") {
                Mode::Summary
            } else if lower.contains("feature") {
                Mode::Features
            } else if lower.contains("tech") {
                Mode::TechStack
            } else if lower.contains("phase") {
                current_phase = Some(PrdPhase { name: header.trim().to_string(), items: Vec::new() });
                Mode::Phase
            } else {
                Mode::None
            };
            continue;
        }

        let item = line.trim_start_matches(['-', '*', ' ']).trim();
        if item.is_empty() {
            continue;
        }

        match mode {
            Mode::Goals => data.overview.business_goals.push(item.to_string()),
            Mode::Summary => {
                if !data.overview.summary.is_empty() {
                    data.overview.summary.push(' ');
                }
                data.overview.summary.push_str(line.trim());
            }
            Mode::Features => data.features.push(item.to_string()),
            Mode::TechStack => data.technical.tech_stack.push(item.to_string()),
            Mode::Phase => {
                if let Some(phase) = current_phase.as_mut() {
                    phase.items.push(item.to_string());
                }
            }
            Mode::None => {}
        }
    }

    if let Some(phase) = current_phase.take() {
        data.phases.push(phase);
    }

    data
}
