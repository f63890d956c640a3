//! Inline substitutions: bold, italic, inline code and links

use std::sync::LazyLock;

use regex_lite::Regex;

/// Ordered `(pattern, replacement)` pairs; bold must run before italic
static INLINE_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\*\*(.*?)\*\*", "<strong>${1}</strong>"),
        (r"\*(.*?)\*", "<em>${1}</em>"),
        (r"`(.*?)`", "<code>${1}</code>"),
        (r"\[(.*?)\]\((.*?)\)", "<a href=\"${2}\">${1}</a>"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("inline pattern is valid"),
            replacement,
        )
    })
    .collect()
});

/// Apply every inline rule to `text` in order
pub fn render_inline(text: &str) -> String {
    INLINE_RULES
        .iter()
        .fold(text.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emphasis() {
        assert_eq!(render_inline("Some *text*."), "Some <em>text</em>.");
        assert_eq!(render_inline("**bold** and *it*"), "<strong>bold</strong> and <em>it</em>");
    }

    #[test]
    fn test_code_and_links() {
        assert_eq!(render_inline("use `cargo`"), "use <code>cargo</code>");
        assert_eq!(
            render_inline("[docs](https://example.com)"),
            "<a href=\"https://example.com\">docs</a>"
        );
    }

    #[test]
    fn test_substitutions_do_not_cross_lines() {
        assert_eq!(render_inline("*a\nb*"), "*a\nb*");
    }
}
