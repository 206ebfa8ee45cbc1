use std::borrow::Cow;

/// Decodes HTML entities embedded in feed text (`&amp;`, `&#39;`, `&eacute;`, ...).
///
/// Publishers routinely double-escape titles and descriptions, so after the
/// XML layer resolves its own entities the text can still carry HTML ones.
/// Callers must apply this exactly once per value: a second pass would turn
/// a literal `&amp;lt;` written by the author into `<`.
pub fn unescape_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    html_escape::decode_html_entities(s)
}

/// Makes publisher-controlled text safe to print on a terminal.
///
/// Drops C0 controls, DEL and C1 controls except tab, newline and carriage
/// return. A CSI escape (`ESC [` up to its final byte in `@`..=`~`) is
/// removed whole so no stray `[31m` is left behind.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_unprintable) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.next_if_eq(&'[').is_some() {
            for param in chars.by_ref() {
                if ('@'..='~').contains(&param) {
                    break;
                }
            }
        } else if !is_unprintable(c) {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

fn is_unprintable(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_ampersand() {
        assert_eq!(unescape_entities("Cats &amp; Dogs"), "Cats & Dogs");
    }

    #[test]
    fn test_unescape_numeric_and_named() {
        assert_eq!(
            unescape_entities("It&#39;s &quot;caf&eacute;&quot;"),
            "It's \"café\""
        );
    }

    #[test]
    fn test_unescape_without_entities_borrows() {
        let result = unescape_entities("plain title");
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_unescape_applies_once() {
        // A double-escaped entity loses exactly one level
        assert_eq!(unescape_entities("&amp;lt;b&amp;gt;"), "&lt;b&gt;");
    }

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let input = "Hello, world! This is clean text.";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_preserves_tabs_newlines_cr() {
        let input = "line1\nline2\ttabbed\r\nwindows";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_control_chars_removes_controls() {
        // NUL, BEL, BS, VT, FF, and other C0 controls
        let input = "he\x00ll\x07o\x08 w\x0bor\x0cld\x01!";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Owned(_)));
        assert_eq!(result, "hello world!");
    }

    #[test]
    fn test_strip_ansi_color_codes() {
        // CSI SGR: \x1b[31m (red) and \x1b[0m (reset)
        let input = "\x1b[31mRed text\x1b[0m";
        let result = strip_control_chars(input);
        assert_eq!(result, "Red text");
    }

    #[test]
    fn test_strip_c1_controls() {
        assert_eq!(strip_control_chars("a\u{9b}31mb\u{85}c"), "a31mbc");
    }

    #[test]
    fn test_strip_unterminated_csi() {
        assert_eq!(strip_control_chars("title\x1b[12;"), "title");
    }

    #[test]
    fn test_strip_bare_esc() {
        let input = "before\x1bafter";
        let result = strip_control_chars(input);
        assert_eq!(result, "beforeafter");
    }

    #[test]
    fn test_strip_unicode_preserved() {
        let input = "日本語 \x1b[31m赤い\x1b[0m テキスト";
        let result = strip_control_chars(input);
        assert_eq!(result, "日本語 赤い テキスト");
    }
}
