//! In-page script builders for the script-based extraction paths.
//!
//! Selectors and values are injected only inside single-quoted string
//! literals, escaped by [`js_string`].

/// Escape `s` for use inside a single-quoted JavaScript string literal.
pub fn js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {}
            '<' => result.push_str("\\x3c"),
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}

/// Text of the first match, or `''`.
pub fn text_of(selector: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector('{}');
            if (!el) return '';
            return el.innerText ?? el.textContent ?? '';
        }})()"#,
        js_string(selector)
    )
}

/// Attribute value of the first match, or `''`.
pub fn attribute_of(selector: &str, name: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector('{}');
            if (!el) return '';
            return el.getAttribute('{}') ?? '';
        }})()"#,
        js_string(selector),
        js_string(name)
    )
}

/// Click the first match; evaluates to whether an element was found.
pub fn click(selector: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector('{}');
            if (el) {{ el.click(); return true; }}
            return false;
        }})()"#,
        js_string(selector)
    )
}

/// Assign `value` directly to the first match.
pub fn assign_value(selector: &str, value: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector('{}');
            if (el) {{ el.value = '{}'; return true; }}
            return false;
        }})()"#,
        js_string(selector),
        js_string(value)
    )
}

/// Fire bubbling `input` and `change` events on the first match.
pub fn dispatch_input_events(selector: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector('{}');
            if (!el) return false;
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
        }})()"#,
        js_string(selector)
    )
}

/// Number of elements matching `selector`.
pub fn count(selector: &str) -> String {
    format!(
        "document.querySelectorAll('{}').length",
        js_string(selector)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_basic() {
        assert_eq!(js_string("#username"), "#username");
        assert_eq!(js_string("it's"), "it\\'s");
        assert_eq!(js_string("a\"b"), "a\\\"b");
    }

    #[test]
    fn test_js_string_breakout() {
        let sanitized = js_string("'); alert(1); ('");
        assert_eq!(sanitized, "\\'); alert(1); (\\'");

        let tags = js_string("</script>");
        assert_eq!(tags, "\\x3c/script\\x3e");
    }

    #[test]
    fn test_js_string_controls() {
        assert_eq!(js_string("a\0b"), "ab");
        assert_eq!(js_string("line\nnext"), "line\\nnext");
    }

    #[test]
    fn test_scripts_embed_escaped_selector() {
        let selector = "#emailAddress > label:nth-child(2)";
        assert!(click(selector).contains("'#emailAddress \\x3e label:nth-child(2)'"));
        assert!(text_of("div[data-x='1']").contains("div[data-x=\\'1\\']"));
        assert!(attribute_of("#a", "value").contains("getAttribute('value')"));
    }

    #[test]
    fn test_assign_value_escapes_secret() {
        let script = assign_value("#password", "wr&a'7");
        assert!(script.contains("el.value = 'wr&a\\'7'"));
    }
}
