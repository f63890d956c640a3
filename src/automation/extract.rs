//! Locating automation blocks in a document
//!
//! Two delimiters are recognized:
//!
//! ````text
//! ```automation
//! ...
//! ```
//!
//! :::automation
//! ...
//! :::
//! ````

use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

use super::compiler::{compile, CompiledScript};
use super::error::CompileError;

static AUTOMATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```automation\s*\n((?s:.*?))\n```|:::automation\s*\n((?s:.*?))\n:::")
        .expect("automation pattern is valid")
});

/// Variant used by preview: closing marker must end its line
static AUTOMATION_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:```automation\n|:::automation\n)((?s:.*?))(?:\n```$|\n:::$)")
        .expect("automation line pattern is valid")
});

/// One automation block of a document
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationBlock {
    /// `automation-<n>`, counted per document from 0
    pub id: String,
    /// Trimmed source between the markers
    pub source: String,
    pub compiled: Result<CompiledScript, CompileError>,
}

impl AutomationBlock {
    fn new(index: usize, source: &str) -> Self {
        let source = source.trim().to_string();
        let compiled = compile(&source);
        if let Err(err) = &compiled {
            tracing::debug!("automation-{} failed to compile: {}", index, err);
        }
        Self {
            id: format!("automation-{index}"),
            source,
            compiled,
        }
    }
}

fn block_source<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default()
}

/// Compile every automation block of `text`, in document order
pub fn find_automations(text: &str) -> Vec<AutomationBlock> {
    AUTOMATION_RE
        .captures_iter(text)
        .enumerate()
        .map(|(index, caps)| AutomationBlock::new(index, block_source(&caps)))
        .collect()
}

/// Replace each automation block with `replacement(block)`
pub fn replace_automations(
    text: &str,
    mut replacement: impl FnMut(&AutomationBlock) -> String,
) -> (String, Vec<AutomationBlock>) {
    let mut blocks = Vec::new();
    let replaced = AUTOMATION_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let block = AutomationBlock::new(blocks.len(), block_source(caps));
            let html = replacement(&block);
            blocks.push(block);
            html
        })
        .into_owned();
    (replaced, blocks)
}

/// Remove automation blocks entirely
pub fn strip_automations(text: &str) -> String {
    AUTOMATION_LINE_RE.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::compiler::Tier;

    const DOC: &str = "# Notes\n\n```automation\ncreate notes.txt\n```\n\ntext\n\n:::automation\nfunction f() {\n  print 1\n}\nf()\n:::\n";

    #[test]
    fn test_finds_both_delimiters_in_order() {
        let blocks = find_automations(DOC);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].id, "automation-0");
        assert_eq!(blocks[0].source, "create notes.txt");
        assert_eq!(blocks[0].compiled.as_ref().unwrap().tier(), Tier::SimpleCommand);
        assert_eq!(blocks[1].id, "automation-1");
        assert_eq!(blocks[1].compiled.as_ref().unwrap().tier(), Tier::Advanced);
    }

    #[test]
    fn test_compile_failures_are_kept_per_block() {
        let blocks = find_automations("```automation\nfunction broken( {\n```");
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].compiled.is_err());
    }

    #[test]
    fn test_replace_hands_each_block_to_the_callback() {
        let (out, blocks) = replace_automations(DOC, |block| format!("[{}]", block.id));
        assert_eq!(blocks.len(), 2);
        assert!(out.contains("[automation-0]"));
        assert!(out.contains("[automation-1]"));
        assert!(!out.contains("create notes.txt"));
    }

    #[test]
    fn test_strip_for_preview() {
        let out = strip_automations(DOC);
        assert!(!out.contains("automation"));
        assert!(out.contains("# Notes"));
        assert!(out.contains("text"));
    }

    #[test]
    fn test_no_blocks() {
        assert!(find_automations("```js\nlet a\n```").is_empty());
    }
}
