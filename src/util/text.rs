use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// Ellipsis appended to truncated excerpts.
const ELLIPSIS: char = '…';

static TAG_RE: OnceLock<Regex> = OnceLock::new();

fn tag_re() -> &'static Regex {
    // Comments first so `<!-- a > b -->` doesn't leave half a comment behind
    TAG_RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->|<[^>]*>").unwrap())
}

/// Replaces every HTML tag (and comment) with a single space.
///
/// Tags become spaces rather than vanishing so `<p>a</p><p>b</p>` reads as
/// `a b`, not `ab`. Callers usually follow up with [`collapse_whitespace`].
pub fn strip_tags(html: &str) -> Cow<'_, str> {
    tag_re().replace_all(html, " ")
}

/// Collapses runs of Unicode whitespace into single spaces and trims the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates `s` to at most `max_chars` characters, appending `…` when cut.
///
/// Counts Unicode scalar values, not bytes, so multi-byte text never splits
/// mid-character. Trailing whitespace before the ellipsis is dropped.
///
/// # Examples
///
/// ```
/// use feedmirror::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello World", 6), "Hello…");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        None => Cow::Borrowed(s),
        Some((cut, _)) => {
            let mut out = s[..cut].trim_end().to_string();
            out.push(ELLIPSIS);
            Cow::Owned(out)
        }
    }
}

/// Builds a plain-text excerpt from an HTML fragment.
///
/// Tags are stripped, entities decoded, whitespace collapsed, and the result
/// truncated to `max_chars`. Text that only looked like markup after decoding
/// (`&lt;b&gt;`) is stripped as well, so the excerpt never carries tags.
/// Returns `None` when nothing readable remains.
pub fn excerpt(html: &str, max_chars: usize) -> Option<String> {
    let text = strip_tags(html);
    let decoded = html_escape::decode_html_entities(&text);
    let text = collapse_whitespace(&strip_tags(&decoded));
    let text = strip_control_chars(&text);

    if text.is_empty() {
        return None;
    }

    Some(truncate_chars(&text, max_chars).into_owned())
}

/// Strips terminal control characters and ANSI escape sequences from text.
///
/// Feed titles end up on terminals (the CLI) and in page titles, where a
/// stray ESC or NUL is never wanted. Tab, newline and carriage return are
/// kept.
///
/// Returns `Cow::Borrowed` when the input is already clean (common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |c: char| c == '\u{7f}' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'));

    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            if !is_control(c) {
                out.push(c);
            }
            continue;
        }

        match chars.peek() {
            // CSI: ESC [ params... final byte in 0x40..=0x7e
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&c) {
                        break;
                    }
                }
            }
            // OSC: ESC ] ... terminated by BEL or ESC \
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\u{07}' {
                        break;
                    }
                    if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}
