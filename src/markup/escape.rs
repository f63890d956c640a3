//! HTML entity escaping for literal text

/// Escape the five HTML-significant characters in `text`
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_all_special_characters() {
        let escaped = escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#);
        for raw in ['<', '>', '"', '\''] {
            assert!(!escaped.contains(raw), "found raw {raw:?} in {escaped}");
        }
        assert_eq!(
            escaped,
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_escape_leaves_plain_text_alone() {
        assert_eq!(escape_html("plain text 123"), "plain text 123");
        assert_eq!(escape_html(""), "");
    }

    #[test]
    fn test_escape_does_not_double_count_ampersands() {
        // Every '&' in the output must start an entity we produced
        let escaped = escape_html("&&amp;");
        assert_eq!(escaped, "&amp;&amp;amp;");
    }
}
