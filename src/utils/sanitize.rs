//! Response sanitizing for display.
//!
//! Model output is untrusted text that a display layer renders as markdown with raw HTML enabled. [sanitize] turns
//! line breaks into an explicit `<br/>` marker and strips anything executable, keeping the inline formatting tags a
//! markdown renderer produces.

/// Explicit line-break marker that survives sanitizing.
pub const LINE_BREAK: &str = "<br/>";

/// Replace newlines with [LINE_BREAK], then remove unsafe markup.
///
/// Idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
///
/// ```
/// use paramprompt::utils::sanitize::sanitize;
/// assert_eq!(sanitize("Dear Hiring Manager\nI am excited..."), "Dear Hiring Manager<br/>I am excited...");
/// assert_eq!(sanitize("<b>hi</b><script>alert(1)</script>"), "<b>hi</b>");
/// ```
pub fn sanitize(raw: &str) -> String {
    let cleaned = clean_once(raw);
    // character references such as `&#10;` decode to raw line breaks during cleaning
    if cleaned.contains(['\n', '\r']) {
        clean_once(&cleaned)
    } else {
        cleaned
    }
}

fn clean_once(raw: &str) -> String {
    let with_breaks = raw
        .replace("\r\n", LINE_BREAK)
        .replace(['\n', '\r'], LINE_BREAK);
    // the HTML serializer writes void elements as `<br>`
    ammonia::clean(&with_breaks).replace("<br>", LINE_BREAK)
}

#[cfg(test)]
mod test_sanitize {
    use super::sanitize;

    #[test]
    fn test_line_breaks() {
        assert_eq!(sanitize("a\nb\r\nc"), "a<br/>b<br/>c");
        assert_eq!(sanitize("a&#10;b"), "a<br/>b");
        assert_eq!(sanitize("a&#13;b"), "a<br/>b");
        assert_eq!(sanitize("a<br/>b<br>c"), "a<br/>b<br/>c");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_strips_executable_markup() {
        let cleaned = sanitize("<script>alert('x')</script><img src=x onerror=alert(1)><a href=\"javascript:alert(1)\">x</a>");
        assert!(!cleaned.contains("<script"));
        assert!(!cleaned.contains("onerror"));
        assert!(!cleaned.contains("javascript:"));
        assert!(!sanitize("<style>body{}</style><iframe src=\"https://e.com\"></iframe>ok").contains("<iframe"));
    }

    #[test]
    fn test_keeps_inline_formatting() {
        assert_eq!(sanitize("<strong>bold</strong> and <em>it</em>"), "<strong>bold</strong> and <em>it</em>");
        assert_eq!(sanitize("1 < 2 & 3"), "1 &lt; 2 &amp; 3");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "plain",
            "line\nbreaks\r\neverywhere\n",
            "<b>bold</b>\n<script>evil()</script>",
            "1 < 2 && \"quoted\" 'single'",
            "<a href=\"https://example.com\" onclick=\"x()\">link</a>",
            "<p>para<br>after</p><ul><li>item</li></ul>",
            "&lt;script&gt; already escaped",
            "<div title=\"a\nb\">attr</div>",
            "a&#10;b",
            "a&#13;b",
            "a&#13;&#10;b",
            "<div title=\"a&#10;b\">attr</div>",
        ];
        for sample in samples {
            let once = sanitize(sample);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", sample);
        }
    }
}
