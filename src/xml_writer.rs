/**
 * XML Package Writer (§4.I)
 *
 * DESIGN DECISION: pure string-building functions, no XML crate
 * WHY: the escaping and CDATA rules are fully specified and narrow; a
 * hand-written writer plus a single forward-scan validator covers it without
 * pulling in a general-purpose parser for a one-shot serialization
 */

use crate::types::{ContextPackage, PackagedFile};

const FORMAT_VERSION: &str = "1";
const PACKAGE_VERSION: &str = "1.0";

/// Escapes `&`, `<`, `>`, `"`, `'` in that order (ampersand first, so already
/// escaped entities are not double-escaped), and drops control characters
/// other than TAB (9), LF (10), CR (13).
pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c if (c as u32) < 32 && c != '\t' && c != '\n' && c != '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Wraps `content` in one or more `<![CDATA[ ... ]]>` sections, splitting on
/// any occurrence of the literal sequence `]]>` so each section stays
/// well-formed.
fn cdata(content: &str) -> String {
    let mut out = String::new();
    let mut rest = content;
    while let Some(pos) = rest.find("]]>") {
        out.push_str("<![CDATA[");
        out.push_str(&rest[..pos + 2]);
        out.push_str("]]>");
        out.push_str("<![CDATA[");
        rest = &rest[pos + 2..];
    }
    out.push_str("<![CDATA[");
    out.push_str(rest);
    out.push_str("]]>");
    out
}

fn element(tag: &str, text_content: &str) -> String {
    format!("<{tag}>{}</{tag}>", escape_text(text_content))
}

fn cdata_element(tag: &str, content: &str) -> String {
    format!("<{tag}>{}</{tag}>", cdata(content))
}

fn json_element(tag: &str, value: &serde_json::Value) -> String {
    let serialized = serde_json::to_string(value).unwrap_or_default();
    element(tag, &serialized)
}

fn serialize_file(file: &PackagedFile) -> String {
    let mut sections = String::new();
    for section in &file.content_sections {
        sections.push_str(&format!(
            "<content_section start_line=\"{}\" end_line=\"{}\" type=\"{:?}\">{}</content_section>",
            section.start_line,
            section.end_line,
            section.section_type,
            cdata(&section.content)
        ));
    }

    format!(
        "<file>{}{}<is_optimized>{}</is_optimized><total_lines>{}</total_lines><token_estimate>{}</token_estimate>{}<content_sections>{}</content_sections></file>",
        element("path", &file.path),
        cdata_element("content", &file.content),
        file.is_optimized,
        file.total_lines,
        file.token_estimate,
        element("reasoning", &file.reasoning),
        sections
    )
}

fn serialize_reference(reference: &crate::types::FileReference) -> String {
    format!(
        "<file_reference><path>{}</path><relevance>{}</relevance><size>{}</size><language>{}</language><last_modified>{}</last_modified><token_estimate>{}</token_estimate></file_reference>",
        escape_text(&reference.path),
        reference.relevance,
        reference.size,
        escape_text(&reference.language),
        reference.last_modified.to_rfc3339(),
        reference.token_estimate
    )
}

fn serialize_meta_prompt(meta_prompt: &crate::types::MetaPrompt) -> String {
    let mut guidelines = String::new();
    for guideline in &meta_prompt.guidelines {
        guidelines.push_str(&element("guideline", guideline));
    }

    let response_format = meta_prompt
        .ai_agent_response_format
        .as_ref()
        .map(|v| json_element("ai_agent_response_format", v))
        .unwrap_or_default();

    format!(
        "<meta_prompt task_type=\"{}\">{}{}{}{}<guidelines>{}</guidelines>{}</meta_prompt>",
        escape_text(&meta_prompt.task_type),
        element("system_prompt", &meta_prompt.system_prompt),
        element("user_prompt", &meta_prompt.user_prompt),
        element("context_summary", &meta_prompt.context_summary),
        json_element("task_decomposition", &meta_prompt.task_decomposition),
        guidelines,
        response_format
    )
}

fn serialize_metadata(metadata: &crate::types::ContextPackageMetadata) -> String {
    format!(
        "<package_metadata><job_id>{}</job_id><created_at>{}</created_at>{}{}<task_type>{}</task_type><total_tokens>{}</total_tokens><high_count>{}</high_count><medium_count>{}</medium_count><low_count>{}</low_count><codemap_cache_used>{}</codemap_cache_used></package_metadata>",
        escape_text(&metadata.job_id),
        metadata.created_at.to_rfc3339(),
        element("original_prompt", &metadata.original_prompt),
        element("refined_prompt", &metadata.refined_prompt),
        escape_text(&metadata.task_type),
        metadata.total_tokens,
        metadata.high_count,
        metadata.medium_count,
        metadata.low_count,
        metadata.codemap_cache_used
    )
}

/// Serializes `package` to the stable XML schema in §6, versioned by
/// `format_version`.
pub fn serialize(package: &ContextPackage) -> String {
    let high: String = package.high_priority_files.iter().map(serialize_file).collect();
    let medium: String = package.medium_priority_files.iter().map(serialize_file).collect();
    let low: String = package.low_priority_files.iter().map(serialize_reference).collect();
    let meta_prompt = package.meta_prompt.as_ref().map(serialize_meta_prompt).unwrap_or_default();

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<context_package version=\"{PACKAGE_VERSION}\" format_version=\"{FORMAT_VERSION}\">{}{}<codemap_path>{}</codemap_path><high_priority_files>{}</high_priority_files><medium_priority_files>{}</medium_priority_files><low_priority_files>{}</low_priority_files>{}</context_package>",
        serialize_metadata(&package.metadata),
        element("refined_prompt", &package.refined_prompt),
        escape_text(&package.codemap_path.to_string_lossy()),
        high,
        medium,
        low,
        meta_prompt
    )
}

#[derive(Debug, Clone, Default)]
pub struct XmlValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Checks for the XML declaration, then streams the document verifying
/// balanced tags via a tag-name stack. Does not validate element content
/// against a schema - only well-formedness.
pub fn validate_xml(document: &str) -> XmlValidationResult {
    let mut errors = Vec::new();

    if !document.trim_start().starts_with("<?xml") {
        errors.push("missing XML declaration".to_string());
    }

    let mut stack: Vec<String> = Vec::new();
    let bytes = document.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }

        if document[i..].starts_with("<![CDATA[") {
            match document[i..].find("]]>") {
                Some(end) => i += end + 3,
                None => {
                    errors.push("unterminated CDATA section".to_string());
                    break;
                }
            }
            continue;
        }

        if document[i..].starts_with("<?") {
            match document[i..].find("?>") {
                Some(end) => i += end + 2,
                None => {
                    errors.push("unterminated processing instruction".to_string());
                    break;
                }
            }
            continue;
        }

        let Some(close) = document[i..].find('>') else {
            errors.push("unterminated tag".to_string());
            break;
        };
        let tag_body = &document[i + 1..i + close];

        if let Some(name) = tag_body.strip_prefix('/') {
            let name = name.trim().to_string();
            match stack.pop() {
                Some(open) if open == name => {}
                Some(open) => errors.push(format!("mismatched close tag: expected </{open}>, found </{name}>")),
                None => errors.push(format!("unexpected close tag: </{name}>")),
            }
        } else if !tag_body.ends_with('/') {
            let name = tag_body.split_whitespace().next().unwrap_or("").to_string();
            if !name.is_empty() {
                stack.push(name);
            }
        }

        i += close + 1;
    }

    if !stack.is_empty() {
        errors.push(format!("unclosed tags: {}", stack.join(", ")));
    }

    XmlValidationResult { is_valid: errors.is_empty(), errors }
}
