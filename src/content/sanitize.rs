use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;

/// Tags allowed on top of the ammonia baseline (which already covers
/// paragraphs, headings, emphasis, lists, links, blockquote, tables, code).
const BODY_TAGS: &[&str] = &["img", "figure", "figcaption"];

const IMG_ATTRIBUTES: &[&str] = &[
    "src", "alt", "title", "width", "height", "srcset", "sizes", "loading",
];

/// Removed along with their content; never allowed, even via `extra_tags`.
const CONTENT_STRIPPED_TAGS: &[&str] = &["script", "style"];

/// Elements whose first leading newline the HTML parser discards.
const NEWLINE_STRIPPING_TAGS: &[&str] = &["pre", "textarea", "listing"];

const ANCHOR_ATTRIBUTES: &[&str] = &["href", "name", "target", "rel"];

const IFRAME_ATTRIBUTES: &[&str] = &[
    "src",
    "width",
    "height",
    "allow",
    "allowfullscreen",
    "frameborder",
];

/// Sanitizer settings, read from the `[sanitizer]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Keep `<iframe>` embeds (YouTube, Spotify, ...). Off by default.
    pub allow_iframes: bool,

    /// Additional tag names to allow beyond the built-in set.
    pub extra_tags: Vec<String>,

    /// `rel` given to anchors that don't declare one.
    pub default_link_rel: String,

    /// `target` given to anchors that don't declare one.
    pub default_link_target: String,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            allow_iframes: false,
            extra_tags: Vec::new(),
            default_link_rel: "noopener noreferrer".to_string(),
            default_link_target: "_blank".to_string(),
        }
    }
}

/// Allow-list HTML sanitizer for post bodies.
///
/// Wraps an [`ammonia`] policy and adds one rewrite ammonia can't express:
/// anchors gain a default `rel`/`target` only when the author didn't set one.
/// (ammonia's own `link_rel` overwrites existing values.)
///
/// Output is deterministic and idempotent: feeding sanitized output back in
/// returns it unchanged.
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    config: SanitizerConfig,
}

impl Sanitizer {
    pub fn new(config: SanitizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    /// Sanitizes an HTML fragment.
    ///
    /// Disallowed tags are unwrapped (their text kept); `<script>` and
    /// `<style>` are removed together with their content. Disallowed
    /// attributes, `on*` handlers, `style`, and URLs with unsafe schemes
    /// such as `javascript:` are dropped. Comments are removed.
    pub fn sanitize(&self, html: &str) -> String {
        if html.trim().is_empty() {
            return String::new();
        }

        let cleaned = self.policy().clean(html).to_string();
        let cleaned = restore_leading_newlines(&cleaned);
        self.add_link_defaults(&cleaned).into_owned()
    }

    fn policy(&self) -> ammonia::Builder<'_> {
        let mut builder = ammonia::Builder::default();
        builder
            // rel is author-controlled; defaults are filled in afterwards
            .link_rel(None)
            .add_tags(BODY_TAGS)
            .add_tags(
                self.config
                    .extra_tags
                    .iter()
                    .filter(|t| !CONTENT_STRIPPED_TAGS.contains(&t.to_ascii_lowercase().as_str())),
            )
            .add_tag_attributes("img", IMG_ATTRIBUTES)
            .add_tag_attributes("a", ANCHOR_ATTRIBUTES);

        if self.config.allow_iframes {
            builder
                .add_tags(&["iframe"])
                .add_tag_attributes("iframe", IFRAME_ATTRIBUTES);
        }

        builder
    }

    /// Appends default `rel`/`target` to every `<a>` missing them.
    ///
    /// Runs on ammonia's serializer output, where every start tag has the
    /// shape `<name k="v" ...>` and text `<` is escaped. Matching whole tags
    /// left to right means markup-like text inside attribute values (for
    /// example `alt="<a >"`) is consumed with its tag and never rewritten.
    fn add_link_defaults<'h>(&self, html: &'h str) -> Cow<'h, str> {
        start_tag_re().replace_all(html, |caps: &Captures<'_>| {
            let whole = &caps[0];
            if !caps[1].eq_ignore_ascii_case("a") {
                return whole.to_string();
            }

            let attrs = &caps[2];
            let mut has_rel = false;
            let mut has_target = false;
            for name in attr_name_re().captures_iter(attrs) {
                match name[1].to_ascii_lowercase().as_str() {
                    "rel" => has_rel = true,
                    "target" => has_target = true,
                    _ => {}
                }
            }

            if has_rel && has_target {
                return whole.to_string();
            }

            let mut tag = format!("<a{}", attrs);
            if !has_rel {
                push_attr(&mut tag, "rel", &self.config.default_link_rel);
            }
            if !has_target {
                push_attr(&mut tag, "target", &self.config.default_link_target);
            }
            tag.push('>');
            tag
        })
    }
}

/// Doubles the newline right after `<pre>`-like start tags.
///
/// The HTML parser drops one leading newline inside these elements and
/// ammonia's serializer doesn't put it back, so a body starting with a
/// newline would lose one per pass. Whole tags are matched left to right,
/// as in `add_link_defaults`, so attribute text is never touched.
fn restore_leading_newlines(html: &str) -> Cow<'_, str> {
    let mut out = String::new();
    let mut last = 0;

    for caps in start_tag_re().captures_iter(html) {
        let Some(tag) = caps.get(0) else { continue };
        let name = caps[1].to_ascii_lowercase();
        if NEWLINE_STRIPPING_TAGS.contains(&name.as_str())
            && html[tag.end()..].starts_with('\n')
        {
            out.push_str(&html[last..tag.end()]);
            out.push('\n');
            last = tag.end();
        }
    }

    if last == 0 {
        return Cow::Borrowed(html);
    }
    out.push_str(&html[last..]);
    Cow::Owned(out)
}

fn push_attr(tag: &mut String, name: &str, value: &str) {
    tag.push(' ');
    tag.push_str(name);
    tag.push_str("=\"");
    tag.push_str(&html_escape::encode_double_quoted_attribute(value));
    tag.push('"');
}

static START_TAG_RE: OnceLock<Regex> = OnceLock::new();
static ATTR_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn start_tag_re() -> &'static Regex {
    START_TAG_RE.get_or_init(|| {
        Regex::new(r#"<([A-Za-z][A-Za-z0-9:-]*)((?:\s+[^\s"'>/=]+="[^"]*")*)\s*/?>"#).unwrap()
    })
}

fn attr_name_re() -> &'static Regex {
    ATTR_NAME_RE.get_or_init(|| Regex::new(r#"\s+([^\s"'>/=]+)="[^"]*""#).unwrap())
}
