//! Code-fence vault
//!
//! Fenced code blocks are lifted out of the document before block parsing and
//! replaced with opaque placeholders. Block segmentation then treats each
//! placeholder as ordinary (already-markup) text, so it can never split a
//! fence on an inner blank line or wrap fence lines in paragraphs. After block
//! and inline rendering the placeholders are swapped for escaped
//! `<pre><code>` fragments.
//!
//! The vault also holds pre-rendered fragments (automation blocks) that need
//! the same protection.

use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

use super::escape::escape_html;

/// Reserved placeholder prefix. The private-use character keeps it from
/// colliding with anything a user would type.
pub const PLACEHOLDER_PREFIX: &str = "<!--\u{e000}mne-";

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(\w*)\n((?s:.*?))```").expect("fence pattern is valid"));

/// Fence languages that are handled elsewhere and must stay in the text
const RESERVED_LANGUAGES: &[&str] = &["automation"];

/// A fenced code block lifted out of the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFence {
    /// Placeholder token standing in for the fence
    pub id: String,
    /// Raw code between the fences
    pub code: String,
    /// Normalized language tag
    pub language: Option<String>,
}

impl CodeFence {
    /// Render the fence as an escaped `<pre><code>` fragment
    pub fn to_html(&self) -> String {
        match &self.language {
            Some(lang) => format!(
                "<pre><code class=\"language-{}\">{}</code></pre>",
                escape_html(lang),
                escape_html(&self.code)
            ),
            None => format!("<pre><code>{}</code></pre>", escape_html(&self.code)),
        }
    }
}

#[derive(Debug, Clone)]
enum Vaulted {
    Fence(CodeFence),
    Fragment { id: String, html: String },
}

impl Vaulted {
    fn id(&self) -> &str {
        match self {
            Vaulted::Fence(fence) => &fence.id,
            Vaulted::Fragment { id, .. } => id,
        }
    }

    fn html(&self) -> String {
        match self {
            Vaulted::Fence(fence) => fence.to_html(),
            Vaulted::Fragment { html, .. } => html.clone(),
        }
    }
}

/// Placeholder map scoped to a single render call
#[derive(Debug, Default)]
pub struct FenceVault {
    entries: Vec<Vaulted>,
    counter: usize,
}

impl FenceVault {
    /// Create an empty vault
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self, kind: &str) -> String {
        let id = format!("{PLACEHOLDER_PREFIX}{kind}-{}-->", self.counter);
        self.counter += 1;
        id
    }

    /// Replace every fenced code block in `text` with a placeholder
    pub fn extract(&mut self, text: &str) -> String {
        FENCE_RE
            .replace_all(text, |caps: &Captures<'_>| {
                let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                if RESERVED_LANGUAGES.contains(&tag) {
                    return caps[0].to_string();
                }

                let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                let code = body.strip_suffix('\n').unwrap_or(body).to_string();
                let id = self.next_id("fence");

                self.entries.push(Vaulted::Fence(CodeFence {
                    id: id.clone(),
                    code,
                    language: normalize_language(tag),
                }));
                id
            })
            .into_owned()
    }

    /// Store an already-rendered fragment and return its placeholder
    pub fn stash_fragment(&mut self, html: String) -> String {
        let id = self.next_id("fragment");
        self.entries.push(Vaulted::Fragment {
            id: id.clone(),
            html,
        });
        id
    }

    /// Swap every placeholder in `text` for its rendered fragment
    ///
    /// Each entry is consumed once: only the first occurrence of its
    /// placeholder is replaced.
    pub fn restore(&self, text: &str) -> String {
        let mut result = text.to_string();
        for entry in &self.entries {
            result = result.replacen(entry.id(), &entry.html(), 1);
        }
        result
    }

    /// Code fences extracted so far, in document order
    pub fn fences(&self) -> impl Iterator<Item = &CodeFence> {
        self.entries.iter().filter_map(|entry| match entry {
            Vaulted::Fence(fence) => Some(fence),
            Vaulted::Fragment { .. } => None,
        })
    }

    /// Number of vaulted entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was vaulted
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Normalize a fence language tag through the alias table
///
/// Unknown tags pass through lower-cased; an empty tag yields `None`.
pub fn normalize_language(tag: &str) -> Option<String> {
    let lower = tag.trim().to_lowercase();
    let normalized = match lower.as_str() {
        "" => return None,
        "js" => "javascript",
        "py" => "python",
        "md" => "markdown",
        "sh" | "shell" => "bash",
        "html" => "xml",
        "yml" => "yaml",
        "rb" => "ruby",
        other => other,
    };
    Some(normalized.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_aliases() {
        assert_eq!(normalize_language("js").as_deref(), Some("javascript"));
        assert_eq!(normalize_language("PY").as_deref(), Some("python"));
        assert_eq!(normalize_language("shell").as_deref(), Some("bash"));
        assert_eq!(normalize_language("sh").as_deref(), Some("bash"));
        assert_eq!(normalize_language("html").as_deref(), Some("xml"));
        assert_eq!(normalize_language("yml").as_deref(), Some("yaml"));
        assert_eq!(normalize_language("rb").as_deref(), Some("ruby"));
        assert_eq!(normalize_language("Rust").as_deref(), Some("rust"));
        assert_eq!(normalize_language(""), None);
    }

    #[test]
    fn test_extract_replaces_fences_with_placeholders() {
        let mut vault = FenceVault::new();
        let text = "before\n\n```js\nlet a = 1;\n\nlet b = 2;\n```\n\nafter";
        let out = vault.extract(text);

        assert!(!out.contains("```"));
        assert!(out.contains(PLACEHOLDER_PREFIX));
        assert!(!out.contains("let a"));

        let fences: Vec<_> = vault.fences().collect();
        assert_eq!(fences.len(), 1);
        assert_eq!(fences[0].code, "let a = 1;\n\nlet b = 2;");
        assert_eq!(fences[0].language.as_deref(), Some("javascript"));
    }

    #[test]
    fn test_round_trip_preserves_code_verbatim() {
        let mut vault = FenceVault::new();
        let text = "```\n<b>*not bold*</b> & \"q\"\n```\n\n```py\nprint('x')\n```";
        let out = vault.extract(text);
        let restored = vault.restore(&out);

        assert_eq!(restored.matches("<pre><code").count(), 2);
        assert!(restored.contains(
            "<pre><code>&lt;b&gt;*not bold*&lt;/b&gt; &amp; &quot;q&quot;</code></pre>"
        ));
        assert!(restored
            .contains("<pre><code class=\"language-python\">print(&#039;x&#039;)</code></pre>"));
    }

    #[test]
    fn test_automation_fences_are_left_in_place() {
        let mut vault = FenceVault::new();
        let text = "```automation\nprint \"hi\"\n```";
        assert_eq!(vault.extract(text), text);
        assert!(vault.is_empty());
    }

    #[test]
    fn test_placeholders_are_unique() {
        let mut vault = FenceVault::new();
        let out = vault.extract("```\na\n```\n\n```\nb\n```");
        let fragment = vault.stash_fragment("<div></div>".to_string());
        let ids: Vec<_> = vault.fences().map(|f| f.id.clone()).collect();

        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(!ids.contains(&fragment));
        assert!(out.contains(&ids[0]) && out.contains(&ids[1]));
    }
}
