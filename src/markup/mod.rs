//! Note markup rendering
//!
//! Pipeline for one document:
//!
//! 1. automation blocks are compiled and replaced by vaulted fragments
//! 2. code fences are vaulted ([`FenceVault`])
//! 3. blocks are rendered ([`render_blocks`]), tables included
//! 4. inline substitutions run over the block output
//! 5. vaulted fences and fragments are restored
//!
//! Inline rules run before restoration, so fenced code is never touched by
//! emphasis or link substitution.

pub mod block;
pub mod escape;
pub mod fence;
pub mod inline;
pub mod table;

pub use block::render_blocks;
pub use escape::escape_html;
pub use fence::{normalize_language, CodeFence, FenceVault};
pub use inline::render_inline;
pub use table::{render_table, TableAlignment, TableLayout};

use crate::automation::{replace_automations, strip_automations, AutomationBlock};

/// Rendered markup plus the automation blocks found while rendering
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub html: String,
    pub automations: Vec<AutomationBlock>,
}

/// Render a full document, keeping its automation blocks
pub fn render_document(text: &str) -> RenderedDocument {
    let mut vault = FenceVault::new();
    let (text, automations) =
        replace_automations(text, |block| vault.stash_fragment(automation_fragment(block)));

    let text = vault.extract(&text);
    let html = render_inline(&render_blocks(&text));
    let html = vault.restore(&html);

    tracing::debug!(
        "Rendered document: {} fence(s), {} automation(s)",
        vault.fences().count(),
        automations.len()
    );
    RenderedDocument { html, automations }
}

/// Render a full document to markup
pub fn render(text: &str) -> String {
    render_document(text).html
}

/// Render for the live preview pane
///
/// Blank input shows the placeholder; otherwise automation blocks are left
/// out of the preview entirely.
pub fn preview(text: &str) -> String {
    if text.trim().is_empty() {
        return preview_empty_state();
    }
    render(&strip_automations(text))
}

/// Example block suggested by the empty-editor placeholder
pub const PLACEHOLDER_AUTOMATION: &str = "fn setup() {\n    print \"Hello, automation!\"\n}";

/// Placeholder shown while the editor is empty
pub fn preview_empty_state() -> String {
    format!(
        concat!(
            "<div class=\"mne-preview-empty\">\n",
            "<em>Start typing to see the preview...</em>\n",
            "<div class=\"preview-hint\">\n",
            "<p>Create an automation block using:</p>\n",
            "<pre>:::automation\n{example}\n:::</pre>\n",
            "<p>or with code fences:</p>\n",
            "<pre>```automation\n{example}\n```</pre>\n",
            "</div>\n",
            "</div>"
        ),
        example = PLACEHOLDER_AUTOMATION
    )
}

/// Plain-text cheat sheet for the three automation dialects
pub const AUTOMATION_QUICK_REFERENCE: &str = r#"// Simple commands:
create file.txt
create src/
delete file.txt
print "Message"

// Task usage:
task "scaffold" {
    name: "myproject"
    template: "basic"
}

// Advanced usage:
let greet = fn(name) => "Hello {name}"
for i in 1..3 {
    print greet(i)
}
"#;

/// Quick reference shown in an automation block's output panel
pub fn automation_help() -> String {
    format!(
        "<div class=\"help-section\">\n<h4>Quick Reference</h4>\n<pre>{}</pre>\n</div>",
        escape_html(AUTOMATION_QUICK_REFERENCE)
    )
}

fn automation_fragment(block: &AutomationBlock) -> String {
    let source = escape_html(&block.source);
    match &block.compiled {
        Ok(_) => format!(
            concat!(
                "<div class=\"automation-block\" id=\"{id}\">\n",
                "<div class=\"automation-header\">",
                "<span class=\"automation-icon\">auto_fix_high</span>",
                "<span>Automation Script</span>",
                "<button class=\"automation-run\" data-automation=\"{id}\">Run</button>",
                "</div>\n",
                "<pre><code class=\"language-automation\">{source}</code></pre>\n",
                "<div class=\"automation-output\" hidden>",
                "<div class=\"automation-status\"></div>",
                "<div class=\"automation-terminal\"></div>",
                "</div>\n",
                "</div>"
            ),
            id = block.id,
            source = source,
        ),
        Err(err) => format!(
            concat!(
                "<div class=\"automation-block error\" id=\"{id}\">\n",
                "<div class=\"automation-header\">",
                "<span class=\"automation-icon\">error</span>",
                "<span>Invalid Automation Script</span>",
                "</div>\n",
                "<pre><code class=\"language-automation\">{source}</code></pre>\n",
                "<div class=\"automation-error\">{error}</div>\n",
                "</div>"
            ),
            id = block.id,
            source = source,
            error = escape_html(&err.to_string()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{compile, Tier};

    #[test]
    fn test_heading_and_paragraph() {
        let html = render("# Title\n\nSome *text*.");
        assert_eq!(html, "<h1>Title</h1>\n\n<p>Some <em>text</em>.</p>");
    }

    #[test]
    fn test_table_document() {
        let html = render("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.starts_with("<div class=\"table-wrapper\">"));
        assert_eq!(html.matches("class=\"text-left\"").count(), 4);
        assert!(html.contains("<td class=\"text-left\">1</td><td class=\"text-left\">2</td>"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let doc = "# A\n\n```automation\ncreate x.txt\n```\n\n```rs\nfn main() {}\n```\n\n- item";
        assert_eq!(render(doc), render(doc));
    }

    #[test]
    fn test_fenced_code_is_verbatim() {
        let html = render("Intro\n\n```\n*not em* and [x](y)\n\n# not a heading\n```\n\nOutro");
        assert!(html.contains("<pre><code>*not em* and [x](y)\n\n# not a heading</code></pre>"));
        assert!(html.contains("<p>Intro</p>"));
        assert!(html.contains("<p>Outro</p>"));
    }

    #[test]
    fn test_automation_fragments() {
        let doc = render_document(
            "Intro\n\n```automation\nprint \"<hi>\"\n```\n\n:::automation\nfunction broken( {\n:::",
        );
        assert_eq!(doc.automations.len(), 2);
        assert!(doc.html.contains("<div class=\"automation-block\" id=\"automation-0\">"));
        assert!(doc.html.contains("print &quot;&lt;hi&gt;&quot;"));
        assert!(doc
            .html
            .contains("<div class=\"automation-block error\" id=\"automation-1\">"));
        assert!(doc.html.contains("<div class=\"automation-error\">Invalid automation syntax:"));
        assert!(!doc.html.contains("<p><div"));
    }

    #[test]
    fn test_quick_reference_covers_each_dialect() {
        let tiers: Vec<Tier> = AUTOMATION_QUICK_REFERENCE
            .split("\n\n")
            .map(|section| compile(section).unwrap().tier())
            .collect();
        assert_eq!(tiers, vec![Tier::SimpleCommand, Tier::TaskDefinition, Tier::Advanced]);

        let html = automation_help();
        assert!(html.starts_with("<div class=\"help-section\">\n<h4>Quick Reference</h4>"));
        assert!(html.contains("print &quot;Message&quot;"));
    }

    #[test]
    fn test_placeholder_shows_example_twice() {
        let html = preview_empty_state();
        assert_eq!(html.matches(PLACEHOLDER_AUTOMATION).count(), 2);
        assert_eq!(compile(PLACEHOLDER_AUTOMATION).unwrap().tier(), Tier::SimpleCommand);
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("  \n "), preview_empty_state());
        let html = preview("# Notes\n\n```automation\ncreate x.txt\n```\n");
        assert_eq!(html.trim_end(), "<h1>Notes</h1>");
        assert!(!html.contains("automation"));
    }
}
