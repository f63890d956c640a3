//! Per-block terminal output

use std::fmt;

use serde::{Deserialize, Serialize};

/// Styling class of a terminal line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    #[default]
    Info,
    Error,
    Success,
    System,
}

impl LineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LineKind::Info => "info",
            LineKind::Error => "error",
            LineKind::Success => "success",
            LineKind::System => "system",
        }
    }
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One line of terminal output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalLine {
    pub text: String,
    pub kind: LineKind,
}

impl TerminalLine {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// Append-only output of one execution context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Terminal {
    lines: Vec<TerminalLine>,
}

impl Terminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: LineKind, text: impl Into<String>) {
        self.lines.push(TerminalLine::new(kind, text));
    }

    /// Clear output
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> &[TerminalLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines of one kind, in order
    pub fn texts_of(&self, kind: LineKind) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(move |line| line.kind == kind)
            .map(|line| line.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_clear() {
        let mut terminal = Terminal::new();
        terminal.push(LineKind::System, "> Starting automation...");
        terminal.push(LineKind::Info, "hi");
        assert_eq!(terminal.lines().len(), 2);
        assert_eq!(terminal.texts_of(LineKind::Info).collect::<Vec<_>>(), vec!["hi"]);

        terminal.clear();
        assert!(terminal.is_empty());
    }

    #[test]
    fn test_line_serializes_kind_lowercase() {
        let line = TerminalLine::new(LineKind::Success, "done");
        assert_eq!(
            serde_json::to_value(&line).unwrap(),
            serde_json::json!({"text": "done", "kind": "success"})
        );
    }
}
