//! Auto-canvas extraction.
//!
//! When the bound tools include a Canvas tool but the turn produced no
//! Canvas payload, fenced code blocks in the final answer are promoted
//! to Canvas payloads and stripped from the text. Blocks with no
//! language tag are classified by content heuristics over their first
//! ~500 characters.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Languages promoted to canvas payloads.
const RECOGNIZED_LANGUAGES: &[&str] = &[
    "html", "css", "javascript", "python", "sql", "markdown", "json", "svg", "mermaid",
];

/// Languages that can be live-previewed in a canvas pane.
const PREVIEWABLE: &[&str] = &["html", "svg", "mermaid", "markdown"];

/// Characters inspected when sniffing an untagged block.
const SNIFF_WINDOW: usize = 500;

/// A fenced code block found in answer text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    /// Declared or detected language.
    pub language: String,
    /// Block body.
    pub code: String,
}

/// A canvas render payload produced from a code block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasPayload {
    /// Component discriminator, always `"canvas"`.
    pub component: String,
    /// Language of the content.
    pub language: String,
    /// Generated title.
    pub title: String,
    /// Line count of the content.
    pub line_count: usize,
    /// The content itself.
    pub content: String,
    /// Whether the canvas pane can live-preview this language.
    pub preview_supported: bool,
    /// Render destination.
    pub render_target: String,
}

fn fence_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\n(.*?)```").expect("valid fence regex")
    })
}

/// Sniff a language from untagged block content.
fn detect_language(code: &str) -> Option<&'static str> {
    let window: String = code.chars().take(SNIFF_WINDOW).collect();
    let head = window.trim_start();
    let lower = head.to_lowercase();

    if head.starts_with("<svg") {
        return Some("svg");
    }
    if lower.starts_with("<!doctype html") || lower.contains("<html") || lower.contains("<div") {
        return Some("html");
    }
    if lower.starts_with("graph ")
        || lower.starts_with("flowchart ")
        || lower.starts_with("sequencediagram")
        || lower.starts_with("erdiagram")
    {
        return Some("mermaid");
    }
    if ["select ", "insert ", "update ", "delete ", "with ", "create table"]
        .iter()
        .any(|k| lower.starts_with(k))
    {
        return Some("sql");
    }
    if (head.starts_with('{') || head.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(head).is_ok()
    {
        return Some("json");
    }
    if lower.contains("def ") || lower.contains("import ") {
        return Some("python");
    }
    if lower.contains("function ") || lower.contains("const ") || lower.contains("=>") {
        return Some("javascript");
    }
    None
}

/// Title from the first non-empty line, bounded.
fn title_for(language: &str, code: &str) -> String {
    let first_line = code
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim();
    let mut title: String = first_line.chars().take(48).collect();
    if title.is_empty() {
        title = format!("{language} snippet");
    }
    title
}

/// Scan `answer` for promotable fenced blocks. Returns the payloads
/// and the answer text with those blocks removed.
#[must_use]
pub fn extract_canvas_payloads(answer: &str) -> (Vec<CanvasPayload>, String) {
    let mut payloads = Vec::new();
    let mut stripped = String::with_capacity(answer.len());
    let mut cursor = 0usize;

    for captures in fence_regex().captures_iter(answer) {
        let whole = captures.get(0).expect("match has a whole capture");
        let declared = captures.get(1).map_or("", |m| m.as_str()).to_lowercase();
        let code = captures.get(2).map_or("", |m| m.as_str());

        let language = if RECOGNIZED_LANGUAGES.contains(&declared.as_str()) {
            Some(declared.as_str())
        } else if declared.is_empty() {
            detect_language(code)
        } else {
            None
        };

        match language {
            Some(language) => {
                payloads.push(CanvasPayload {
                    component: "canvas".to_string(),
                    language: language.to_string(),
                    title: title_for(language, code),
                    line_count: code.lines().count(),
                    content: code.trim_end().to_string(),
                    preview_supported: PREVIEWABLE.contains(&language),
                    render_target: "inline".to_string(),
                });
                stripped.push_str(&answer[cursor..whole.start()]);
                cursor = whole.end();
            },
            None => {
                // Unrecognized block stays in the text.
            },
        }
    }
    stripped.push_str(&answer[cursor..]);

    // Collapse whitespace gaps left by removed blocks.
    let cleaned = stripped.replace("\n\n\n", "\n\n").trim().to_string();
    (payloads, cleaned)
}
