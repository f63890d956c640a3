//! Paragraph-level block rendering
//!
//! The document is split on blank lines. Each block is either handed to the
//! table renderer, rendered line by line (multi-line blocks), or rendered as a
//! single segment. Each line of a multi-line block goes through the segment
//! rule on its own, so a block mixing list lines with plain lines yields one
//! list container per list line.

use std::sync::LazyLock;

use regex_lite::Regex;

use super::table::render_table;

static EXCESS_BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank line pattern is valid"));
static LEADING_BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*\n)+").expect("leading blank pattern is valid"));
static BLOCK_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\n+").expect("separator pattern is valid"));
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").expect("heading pattern is valid"));
static UNORDERED_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[*+-]\s+").expect("list marker pattern is valid"));
static ORDERED_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s+").expect("ordered marker pattern is valid"));
static QUOTE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^>\s?").expect("quote marker pattern is valid"));
static RULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-{3,}$").expect("rule pattern is valid"));

/// Normalize line endings and blank-line runs ahead of block splitting
pub fn normalize(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = EXCESS_BLANK_LINES_RE.replace_all(&text, "\n\n");
    LEADING_BLANK_LINES_RE.replace(&text, "").into_owned()
}

/// Split normalized text into raw blocks, in document order
pub fn split_blocks(text: &str) -> Vec<&str> {
    BLOCK_SEPARATOR_RE.split(text).collect()
}

/// Render every block of `text` and join the fragments in source order
pub fn render_blocks(text: &str) -> String {
    let normalized = normalize(text);
    split_blocks(&normalized)
        .into_iter()
        .map(render_block)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render a single raw block
pub fn render_block(block: &str) -> String {
    let block = block.trim();
    if block.is_empty() {
        return String::new();
    }

    if block.contains('|') && block.contains('\n') {
        return render_table(block);
    }

    if block.contains('\n') {
        return block
            .split('\n')
            .map(render_segment)
            .collect::<Vec<_>>()
            .join("\n");
    }

    render_segment(block)
}

/// Apply the single-segment rule; the first matching form wins
pub fn render_segment(segment: &str) -> String {
    if let Some(caps) = HEADING_RE.captures(segment) {
        let level = caps[1].len();
        let content = caps[2].trim();
        return format!("<h{level}>{content}</h{level}>");
    }

    if UNORDERED_MARKER_RE.is_match(segment) {
        return format!("<ul>{}</ul>", list_items(segment, &UNORDERED_MARKER_RE));
    }

    if ORDERED_MARKER_RE.is_match(segment) {
        return format!("<ol>{}</ol>", list_items(segment, &ORDERED_MARKER_RE));
    }

    if segment.starts_with('>') {
        let content = segment
            .split('\n')
            .map(|line| QUOTE_MARKER_RE.replace(line, "").into_owned())
            .collect::<Vec<_>>()
            .join("<br>");
        return format!("<blockquote>{content}</blockquote>");
    }

    if RULE_RE.is_match(segment) {
        return "<hr>".to_string();
    }

    if segment.starts_with('<') {
        segment.to_string()
    } else {
        format!("<p>{segment}</p>")
    }
}

fn list_items(segment: &str, marker: &Regex) -> String {
    segment
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(|line| format!("<li>{}</li>", marker.replace(line, "")))
        .collect()
}
