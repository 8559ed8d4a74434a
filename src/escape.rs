use std::borrow::Cow;

/// Escapes text for HTML element content and quoted attributes.
/// Non-ASCII text passes through.
pub fn escape_html(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Strict XML encoding: markup characters become entities, non-ASCII becomes
/// numeric references and control characters other than tab/LF/CR are
/// replaced by U+FFFD. With `attribute`, quotes are escaped too.
pub fn encode_xml(s: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\'' if attribute => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if c.is_control() => out.push_str("&#xfffd;"),
            c if !c.is_ascii() => out.push_str(&format!("&#x{:x};", c as u32)),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn html_escaping_borrows_clean_text() {
        assert!(matches!(escape_html("plain text"), Cow::Borrowed(_)));
        assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
        assert_eq!(escape_html("café"), "café");
    }

    #[test]
    fn xml_encoding() {
        assert_eq!(encode_xml("a<b & \"c\"", false), "a&lt;b &amp; \"c\"");
        assert_eq!(encode_xml("'q'", true), "&apos;q&apos;");
        assert_eq!(encode_xml("é\u{1}\n", false), "&#xe9;&#xfffd;\n");
    }
}
