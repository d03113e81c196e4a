//! The two text escaping strategies and their inverses.

use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseErrorKind;
use crate::interface::EscapeMode;

/// Letters, marks, numbers, punctuation and symbols. Outside ASCII these are
/// the only characters a quoted literal keeps unescaped.
static PRINTABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A[\p{L}\p{M}\p{N}\p{P}\p{S}]\z").expect("printable class is a valid pattern")
});

/// Escapes literal template text according to `mode`.
///
/// Text may hold bytes that are not UTF-8. Quote mode keeps them as `\xHH`
/// escapes; entity mode replaces them with U+FFFD.
pub fn escape(text: &[u8], mode: EscapeMode) -> Cow<'_, str> {
    match mode {
        EscapeMode::Quote => Cow::Owned(quote_bytes(text)),
        EscapeMode::Xml => match String::from_utf8_lossy(text) {
            Cow::Borrowed(text) => escape_xml(text),
            Cow::Owned(text) => Cow::Owned(escape_xml(&text).into_owned()),
        },
    }
}

/// Replaces `&`, `<`, `>`, `'` and `"` with XML entities, writes tab, line
/// feed and carriage return as character references, and replaces anything
/// that is not an XML character with U+FFFD.
///
/// The references keep `\r` and `\r\n` intact through a reader's line-end
/// normalisation.
///
/// ```rust
/// assert_eq!(tmplxml::escape::escape_xml("a\r\n<b>"), "a&#xD;&#xA;&lt;b&gt;");
/// ```
pub fn escape_xml(text: &str) -> Cow<'_, str> {
    let escaped = quick_xml::escape::escape(text);
    if !escaped.contains(needs_reference) {
        return escaped;
    }

    let mut out = String::with_capacity(escaped.len().saturating_add(16));
    for c in escaped.chars() {
        match c {
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c if is_xml_char(c) => out.push(c),
            _ => out.push(char::REPLACEMENT_CHARACTER),
        }
    }
    Cow::Owned(out)
}

fn needs_reference(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || !is_xml_char(c)
}

/// The `Char` production of XML 1.0.
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Reverses [`escape_xml`] for text made only of XML characters.
///
/// # Errors
/// - If `text` holds a malformed or unknown entity reference.
pub fn unescape_xml(text: &str) -> Result<Cow<'_, str>, quick_xml::escape::EscapeError> {
    quick_xml::escape::unescape(text)
}

/// Produces a double-quoted literal with backslash escapes for quotes,
/// backslashes and non-printable characters.
///
/// ```rust
/// assert_eq!(tmplxml::escape::quote("a \"b\"\n"), r#""a \"b\"\n""#);
/// ```
pub fn quote(text: &str) -> String {
    quote_bytes(text.as_bytes())
}

/// Like [`quote`], but bytes that are not valid UTF-8 become `\xHH`.
///
/// ```rust
/// assert_eq!(tmplxml::escape::quote_bytes(b"a\xffb"), r#""a\xffb""#);
/// ```
pub fn quote_bytes(text: &[u8]) -> String {
    Quoted(text).to_string()
}

struct Quoted<'a>(&'a [u8]);

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"")?;
        for chunk in self.0.utf8_chunks() {
            for c in chunk.valid().chars() {
                write_quoted_char(f, c)?;
            }
            for byte in chunk.invalid() {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        f.write_str("\"")
    }
}

fn write_quoted_char(f: &mut fmt::Formatter<'_>, c: char) -> fmt::Result {
    match c {
        '"' => f.write_str("\\\""),
        '\\' => f.write_str("\\\\"),
        '\u{07}' => f.write_str("\\a"),
        '\u{08}' => f.write_str("\\b"),
        '\u{0C}' => f.write_str("\\f"),
        '\n' => f.write_str("\\n"),
        '\r' => f.write_str("\\r"),
        '\t' => f.write_str("\\t"),
        '\u{0B}' => f.write_str("\\v"),
        c if is_printable(c) => write!(f, "{c}"),
        c if c.is_ascii() => write!(f, "\\x{:02x}", u32::from(c)),
        c if u32::from(c) <= 0xFFFF => write!(f, "\\u{:04x}", u32::from(c)),
        c => write!(f, "\\U{:08x}", u32::from(c)),
    }
}

fn is_printable(c: char) -> bool {
    if c.is_ascii() {
        return c == ' ' || c.is_ascii_graphic();
    }
    let mut buf = [0; 4];
    PRINTABLE.is_match(c.encode_utf8(&mut buf))
}

/// Reverses [`quote`]; also accepts raw (`` `...` ``) and character
/// (`'x'`) literals as they appear in template actions.
///
/// # Errors
/// - If `literal` is not a well-formed literal, or does not decode to UTF-8.
pub fn unquote(literal: &str) -> Result<String, ParseErrorKind> {
    String::from_utf8(unquote_bytes(literal)?).map_err(|_| ParseErrorKind::InvalidStringLiteral {
        literal: literal.to_string(),
    })
}

/// Reverses [`quote_bytes`], keeping `\xHH` escapes as raw bytes.
///
/// # Errors
/// - If `literal` is not a well-formed literal.
pub fn unquote_bytes(literal: &str) -> Result<Vec<u8>, ParseErrorKind> {
    let invalid = || ParseErrorKind::InvalidStringLiteral {
        literal: literal.to_string(),
    };

    let mut chars = literal.chars();
    let (Some(quote), Some(closing)) = (chars.next(), chars.next_back()) else {
        return Err(invalid());
    };
    if quote != closing {
        return Err(invalid());
    }
    let body = chars.as_str();

    match quote {
        '`' if body.contains('`') => return Err(invalid()),
        // Carriage returns are discarded from raw literals.
        '`' => return Ok(body.replace('\r', "").into_bytes()),
        '"' | '\'' => {}
        _ => return Err(invalid()),
    }

    let mut bytes = Vec::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or_else(invalid)?;
                match escaped {
                    'a' => bytes.push(0x07),
                    'b' => bytes.push(0x08),
                    'f' => bytes.push(0x0C),
                    'n' => bytes.push(b'\n'),
                    'r' => bytes.push(b'\r'),
                    't' => bytes.push(b'\t'),
                    'v' => bytes.push(0x0B),
                    '\\' => bytes.push(b'\\'),
                    '"' | '\'' if escaped == quote => push_char(&mut bytes, escaped),
                    'x' => {
                        let value = read_digits(&mut chars, 2, 16).ok_or_else(invalid)?;
                        bytes.push(u8::try_from(value).map_err(|_| invalid())?);
                    }
                    '0'..='7' => {
                        let first = escaped.to_digit(8).ok_or_else(invalid)?;
                        let rest = read_digits(&mut chars, 2, 8).ok_or_else(invalid)?;
                        let value = first
                            .checked_mul(64)
                            .and_then(|v| v.checked_add(rest))
                            .ok_or_else(invalid)?;
                        bytes.push(u8::try_from(value).map_err(|_| invalid())?);
                    }
                    'u' | 'U' => {
                        let width = if escaped == 'u' { 4 } else { 8 };
                        let value = read_digits(&mut chars, width, 16).ok_or_else(invalid)?;
                        push_char(&mut bytes, char::from_u32(value).ok_or_else(invalid)?);
                    }
                    _ => return Err(invalid()),
                }
            }
            '\n' => return Err(invalid()),
            c if c == quote => return Err(invalid()),
            c => push_char(&mut bytes, c),
        }
    }

    if quote == '\'' && !std::str::from_utf8(&bytes).is_ok_and(|text| text.chars().count() == 1) {
        return Err(invalid());
    }
    Ok(bytes)
}

fn push_char(bytes: &mut Vec<u8>, c: char) {
    let mut buf = [0; 4];
    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

/// Reads exactly `count` digits of `radix`, returning their value.
fn read_digits(chars: &mut std::str::Chars<'_>, count: usize, radix: u32) -> Option<u32> {
    let mut value: u32 = 0;
    for _ in 0..count {
        let digit = chars.next()?.to_digit(radix)?;
        value = value.checked_mul(radix)?.checked_add(digit)?;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRICKY: &str = "if a < b && c > \"d\" then 'e'\n\ttab\\slash\u{1b}\u{7f}é\u{a0}😀";

    #[test]
    #[ntest::timeout(100)]
    fn test_quote_simple() {
        assert_eq!(quote("Hello "), "\"Hello \"");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote("<b>&</b>"), "\"<b>&</b>\"");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_quote_control_characters() {
        assert_eq!(quote("\u{1b}[0m"), r#""\x1b[0m""#);
        assert_eq!(quote("a\u{7f}"), r#""a\x7f""#);
        assert_eq!(quote("\u{a0}"), r#""\u00a0""#);
        assert_eq!(quote("\u{7}\u{8}\u{c}\u{b}\r"), r#""\a\b\f\v\r""#);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_quote_keeps_printable_unicode() {
        assert_eq!(quote("héllo 😀"), "\"héllo 😀\"");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_quote_unprintable_unicode() {
        assert_eq!(quote("zero\u{200b}width"), r#""zero\u200bwidth""#);
        assert_eq!(quote("\u{feff}bom"), r#""\ufeffbom""#);
        assert_eq!(quote("soft\u{ad}hyphen"), r#""soft\u00adhyphen""#);
        assert_eq!(quote("\u{e000}"), r#""\ue000""#);
        assert_eq!(quote("\u{378}"), r#""\u0378""#);
        assert_eq!(quote("\u{2028}"), r#""\u2028""#);
        assert_eq!(quote("\u{e0001}"), r#""\U000e0001""#);
        assert_eq!(quote("€ ∑ ‿ ١"), "\"€ ∑ ‿ ١\"");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_quote_bytes_keeps_invalid_bytes() {
        assert_eq!(quote_bytes(b"a\xffb"), r#""a\xffb""#);
        assert_eq!(quote_bytes(b"\xc3"), r#""\xc3""#);
        assert_eq!(quote_bytes(b"\xe2\x82"), r#""\xe2\x82""#);
        assert_eq!(quote_bytes("é".as_bytes()), "\"é\"");
        assert_eq!(unquote_bytes(&quote_bytes(b"a\xffb\n")).unwrap(), b"a\xffb\n");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_escape_xml() {
        assert_eq!(
            escape_xml("a<b & 'c' > \"d\""),
            "a&lt;b &amp; &apos;c&apos; &gt; &quot;d&quot;"
        );
        assert!(matches!(escape_xml("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_escape_xml_line_ends_and_tabs() {
        assert_eq!(escape_xml("a\r\nb"), "a&#xD;&#xA;b");
        assert_eq!(escape_xml("a\rb"), "a&#xD;b");
        assert_eq!(escape_xml("x\ty"), "x&#x9;y");
        assert_eq!(unescape_xml(&escape_xml("a\r\n\tb")).unwrap(), "a\r\n\tb");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_escape_xml_replaces_non_characters() {
        assert_eq!(escape_xml("esc\u{1b}[0m"), "esc\u{fffd}[0m");
        assert_eq!(escape_xml("\u{0}\u{fffe}\u{ffff}"), "\u{fffd}\u{fffd}\u{fffd}");
        assert_eq!(escape_xml("del\u{7f}"), "del\u{7f}");
        assert_eq!(escape(b"a\xffb", EscapeMode::Xml), "a\u{fffd}b");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_modes_differ_and_reverse() {
        let quoted = escape(TRICKY.as_bytes(), EscapeMode::Quote);
        let entities = escape(TRICKY.as_bytes(), EscapeMode::Xml);
        assert_ne!(quoted, entities);
        assert_eq!(unquote(&quoted).unwrap(), TRICKY);

        // Entity mode can only carry XML characters.
        let carried = TRICKY.replace('\u{1b}', "\u{fffd}");
        assert_eq!(unescape_xml(&entities).unwrap(), carried);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unquote_escapes() {
        assert_eq!(unquote(r#""\x41\101A\U00000041""#).unwrap(), "AAAA");
        assert_eq!(unquote(r#""\"quoted\"""#).unwrap(), "\"quoted\"");
        assert_eq!(unquote(r#""é""#).unwrap(), "é");
        assert_eq!(unquote(r#""\xc3\xa9""#).unwrap(), "é");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unquote_raw_and_char() {
        assert_eq!(unquote("`a\\n\"b\"`").unwrap(), "a\\n\"b\"");
        assert_eq!(unquote("`a\r\nb`").unwrap(), "a\nb");
        assert_eq!(unquote("'x'").unwrap(), "x");
        assert_eq!(unquote(r"'\''").unwrap(), "'");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unquote_rejects_malformed() {
        for bad in [
            "", "\"", "abc", "\"abc", "'ab'", r#""\q""#, r#""\x4""#, r#""\400""#, "\"a\nb\"",
            r#""\'""#, "\"a\"b\"", r#""\xff""#, r#""\ud800""#,
        ] {
            assert!(unquote(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
