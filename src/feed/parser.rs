use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::content::Sanitizer;
use crate::feed::entry::FeedEntry;
use crate::feed::xml::{parse_xml, XmlError, XmlNode, XmlValue};
use crate::util::{collapse_whitespace, excerpt, resolve_url, strip_control_chars, validate_url};

/// Elements that may carry an explicit lead image, in priority order.
const MEDIA_ELEMENTS: [&str; 3] = ["enclosure", "media:content", "media:thumbnail"];

/// Errors that make a whole document unusable.
///
/// Problems confined to one item never surface here; that item is
/// empty-filled or skipped instead.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Xml(#[from] XmlError),
    /// Well-formed XML, but the root element isn't `<rss>`.
    #[error("Not an RSS document (root element <{0}>)")]
    NotRss(String),
}

/// Entries extracted from one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseResult {
    /// Entries in feed order.
    pub entries: Vec<FeedEntry>,
    /// Items dropped for having neither a title nor a link.
    pub skipped: usize,
}

/// Turns RSS 2.0 documents into [`FeedEntry`] lists.
#[derive(Debug, Clone)]
pub struct FeedParser {
    sanitizer: Sanitizer,
    excerpt_chars: usize,
}

impl FeedParser {
    pub fn new(sanitizer: Sanitizer, excerpt_chars: usize) -> Self {
        Self {
            sanitizer,
            excerpt_chars,
        }
    }

    /// Parses XML text and extracts its entries.
    pub fn parse(&self, xml: &str) -> Result<ParseResult, ParseError> {
        let root = parse_xml(xml)?;
        self.extract(&root)
    }

    /// Extracts entries from `rss.channel.item`.
    ///
    /// A feed without a channel or without items is valid and yields an
    /// empty result. Items are processed independently and kept in source
    /// order; ids are made unique within the result.
    pub fn extract(&self, root: &XmlNode) -> Result<ParseResult, ParseError> {
        let Some(rss) = root.get("rss") else {
            let name = root
                .children
                .first()
                .map(|c| c.name.clone())
                .unwrap_or_default();
            return Err(ParseError::NotRss(name));
        };

        let items: Vec<&XmlValue> = rss
            .get("channel")
            .and_then(XmlValue::as_node)
            .map(|channel| channel.get_all("item").collect())
            .unwrap_or_default();

        let mut seen_ids = HashSet::with_capacity(items.len());
        let mut entries = Vec::with_capacity(items.len());
        let mut skipped = 0;

        for (index, item) in items.into_iter().enumerate() {
            match self.extract_entry(item) {
                Some(mut entry) => {
                    entry.id = unique_id(entry.id, &mut seen_ids);
                    entries.push(entry);
                }
                None => {
                    skipped += 1;
                    tracing::debug!(index = index, "Skipping item with neither title nor link");
                }
            }
        }

        Ok(ParseResult { entries, skipped })
    }

    fn extract_entry(&self, item: &XmlValue) -> Option<FeedEntry> {
        let title = item
            .get("title")
            .map(|t| decode_title(&t.text()))
            .unwrap_or_default();
        let link = item_link(item);

        if title.is_empty() && link.is_empty() {
            return None;
        }

        let published_at = published(item);

        // content:encoded carries the full post; description is often a summary
        let raw_body = field(item, "content:encoded")
            .or_else(|| field(item, "description"))
            .unwrap_or_default();
        let body_html = self.sanitizer.sanitize(&raw_body);
        let excerpt = excerpt(&body_html, self.excerpt_chars);
        let cover_image = cover_image(item, &raw_body, &link);
        let id = entry_id(item, &link, &title, published_at);

        Some(FeedEntry {
            id,
            title,
            link,
            published_at,
            body_html,
            excerpt,
            cover_image,
        })
    }
}

/// Non-empty text of the first child `name`.
fn field(item: &XmlValue, name: &str) -> Option<String> {
    item.get(name).map(XmlValue::text).filter(|s| !s.is_empty())
}

fn decode_title(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    collapse_whitespace(&strip_control_chars(&decoded))
}

/// `<link>` text, then an Atom-style `href`, then a permalink guid.
fn item_link(item: &XmlValue) -> String {
    if let Some(link) = field(item, "link") {
        return link;
    }
    if let Some(href) = item.get("link").and_then(|l| l.attr("href")) {
        let href = href.trim();
        if !href.is_empty() {
            return href.to_string();
        }
    }
    if let Some(guid) = item.get("guid") {
        let is_permalink = guid
            .attr("isPermaLink")
            .map_or(true, |v| !v.trim().eq_ignore_ascii_case("false"));
        let text = guid.text();
        if is_permalink && validate_url(&text).is_ok() {
            return text;
        }
    }
    String::new()
}

fn published(item: &XmlValue) -> Option<DateTime<Utc>> {
    let raw = field(item, "pubDate").or_else(|| field(item, "dc:date"))?;
    let parsed = parse_date(&raw);
    if parsed.is_none() {
        tracing::debug!(date = %raw, "Unparseable publish date");
    }
    parsed
}

/// Parses RFC 2822 (RSS `pubDate`) or RFC 3339 (`dc:date`) timestamps.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Explicit media URL first, then the first `<img>` in the raw body.
fn cover_image(item: &XmlValue, raw_body: &str, link: &str) -> Option<String> {
    if let Some(node) = item.as_node() {
        for name in MEDIA_ELEMENTS {
            for media in node.get_all(name) {
                if !is_image_media(media) {
                    continue;
                }
                let url = media.attr("url").map(str::trim).unwrap_or_default();
                if validate_url(url).is_ok() {
                    return Some(url.to_string());
                }
            }
        }
    }

    // Absolute sources are returned as written; only relative ones are rebuilt
    let base = Some(link).filter(|l| !l.is_empty());
    sniff_first_img(raw_body).and_then(|src| match validate_url(&src) {
        Ok(_) => Some(src),
        Err(_) => resolve_url(&src, base).ok().map(String::from),
    })
}

/// Media elements without a type hint are assumed to be images; a declared
/// non-image type (podcast audio, video) is skipped.
fn is_image_media(media: &XmlValue) -> bool {
    if let Some(medium) = media.attr("medium") {
        return medium.trim().eq_ignore_ascii_case("image");
    }
    media
        .attr("type")
        .map_or(true, |t| t.trim().to_ascii_lowercase().starts_with("image/"))
}

static IMG_SRC_RE: OnceLock<Regex> = OnceLock::new();

/// First `src` of an `<img>` tag, found by pattern match rather than parsing.
///
/// Known limits: unquoted `src=x.png` is not matched, and `data-src` is
/// picked up when an image has no plain `src`.
pub fn sniff_first_img(html: &str) -> Option<String> {
    let re = IMG_SRC_RE
        .get_or_init(|| Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']([^"']+)["']"#).unwrap());
    re.captures(html)
        .map(|caps| html_escape::decode_html_entities(&caps[1]).trim().to_string())
        .filter(|src| !src.is_empty())
}

fn entry_id(
    item: &XmlValue,
    link: &str,
    title: &str,
    published_at: Option<DateTime<Utc>>,
) -> String {
    if let Some(guid) = field(item, "guid") {
        return guid;
    }
    if !link.is_empty() {
        return link.to_string();
    }

    let input = format!(
        "{}|{}|{}",
        link,
        title,
        published_at
            .map(|p| p.timestamp().to_string())
            .unwrap_or_default()
    );
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// Suffixes `-2`, `-3`, ... onto ids already used in this result.
fn unique_id(id: String, seen: &mut HashSet<String>) -> String {
    if seen.insert(id.clone()) {
        return id;
    }

    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", id, n);
        if seen.insert(candidate.clone()) {
            tracing::debug!(id = %id, unique = %candidate, "Duplicate entry id renamed");
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::SanitizerConfig;
    use pretty_assertions::assert_eq;

    fn parser() -> FeedParser {
        FeedParser::new(Sanitizer::new(SanitizerConfig::default()), 220)
    }

    fn rss(items: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:media="http://search.yahoo.com/mrss/" xmlns:dc="http://purl.org/dc/elements/1.1/">
<channel>
<title>Blog</title>
{}
</channel>
</rss>"#,
            items
        )
    }

    fn parse_one(item: &str) -> FeedEntry {
        let mut result = parser().parse(&rss(item)).unwrap();
        assert_eq!(result.entries.len(), 1);
        result.entries.remove(0)
    }

    #[test]
    fn test_end_to_end_single_item() {
        let entry = parse_one(
            "<item><title>Hi</title><link>https://s.example/p</link><pubDate>Mon, 01 Jan 2024 12:00:00 GMT</pubDate><content:encoded><![CDATA[<p>Body</p>]]></content:encoded></item>",
        );
        assert_eq!(entry.title, "Hi");
        assert_eq!(entry.link, "https://s.example/p");
        assert_eq!(
            entry.published_iso().as_deref(),
            Some("2024-01-01T12:00:00.000Z")
        );
        assert_eq!(entry.body_html, "<p>Body</p>");
        assert_eq!(entry.excerpt.as_deref(), Some("Body"));
        assert_eq!(entry.id, "https://s.example/p");
        assert_eq!(entry.cover_image, None);
    }

    #[test]
    fn test_n_items_in_source_order() {
        let items: String = (1..=5)
            .map(|i| format!("<item><title>Post {i}</title><link>https://s.example/{i}</link></item>"))
            .collect();
        let result = parser().parse(&rss(&items)).unwrap();
        let titles: Vec<_> = result.entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Post 1", "Post 2", "Post 3", "Post 4", "Post 5"]);
        assert_eq!(result.skipped, 0);
    }

    #[test]
    fn test_item_without_title_or_link_skipped() {
        let items = "<item><title>A</title></item><item><description>orphan</description></item><item><link>https://s.example/c</link></item>";
        let result = parser().parse(&rss(items)).unwrap();
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.entries[0].title, "A");
        assert_eq!(result.entries[1].link, "https://s.example/c");
        assert_eq!(result.entries[1].title, "");
    }

    #[test]
    fn test_empty_channel() {
        let result = parser().parse(&rss("")).unwrap();
        assert!(result.entries.is_empty());

        let result = parser()
            .parse(r#"<rss version="2.0"><channel/></rss>"#)
            .unwrap();
        assert!(result.entries.is_empty());

        let result = parser().parse(r#"<rss version="2.0"></rss>"#).unwrap();
        assert!(result.entries.is_empty());
    }

    #[test]
    fn test_non_rss_document_rejected() {
        let err = parser()
            .parse(r#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#)
            .unwrap_err();
        assert!(matches!(err, ParseError::NotRss(ref name) if name == "feed"));
    }

    #[test]
    fn test_malformed_xml_rejected() {
        assert!(matches!(
            parser().parse("<rss><channel><item>"),
            Err(ParseError::Xml(_))
        ));
    }

    #[test]
    fn test_title_entities_decoded() {
        let entry = parse_one(
            "<item><title><![CDATA[Rock &amp; Roll&#8217;s &quot;best&quot;]]></title><link>https://s.example/p</link></item>",
        );
        assert_eq!(entry.title, "Rock & Roll\u{2019}s \"best\"");
    }

    #[test]
    fn test_title_object_coerced_to_text() {
        let entry = parse_one(
            r#"<item><title type="html">Hello <b>World</b></title><link>https://s.example/p</link></item>"#,
        );
        assert_eq!(entry.title, "Hello World");
    }

    #[test]
    fn test_content_encoded_preferred_over_description() {
        let entry = parse_one(
            "<item><title>t</title><description>short</description><content:encoded><![CDATA[<p>full body</p>]]></content:encoded></item>",
        );
        assert_eq!(entry.body_html, "<p>full body</p>");
    }

    #[test]
    fn test_description_fallback() {
        let entry = parse_one(
            "<item><title>t</title><description>&lt;p&gt;summary&lt;/p&gt;</description></item>",
        );
        assert_eq!(entry.body_html, "<p>summary</p>");
        assert_eq!(entry.excerpt.as_deref(), Some("summary"));
    }

    #[test]
    fn test_body_sanitized() {
        let entry = parse_one(
            r#"<item><title>t</title><content:encoded><![CDATA[<p onclick="x()">ok</p><script>alert(1)</script><a href="https://e.example/">l</a>]]></content:encoded></item>"#,
        );
        assert_eq!(
            entry.body_html,
            r#"<p>ok</p><a href="https://e.example/" rel="noopener noreferrer" target="_blank">l</a>"#
        );
        assert!(!entry.excerpt.unwrap().contains('<'));
    }

    #[test]
    fn test_cover_from_first_img() {
        let entry = parse_one(
            r#"<item><title>t</title><content:encoded><![CDATA[<p>x</p><img src="https://x/y.png"><img src="https://x/second.png">]]></content:encoded></item>"#,
        );
        assert_eq!(entry.cover_image.as_deref(), Some("https://x/y.png"));
    }

    #[test]
    fn test_enclosure_beats_body_img() {
        let entry = parse_one(
            r#"<item><title>t</title><enclosure url="https://x/z.png" length="0" type="image/png"/><content:encoded><![CDATA[<img src="https://x/y.png">]]></content:encoded></item>"#,
        );
        assert_eq!(entry.cover_image.as_deref(), Some("https://x/z.png"));
    }

    #[test]
    fn test_enclosure_without_type_used() {
        let entry = parse_one(
            r#"<item><title>t</title><enclosure url="https://x/z.png"/></item>"#,
        );
        assert_eq!(entry.cover_image.as_deref(), Some("https://x/z.png"));
    }

    #[test]
    fn test_audio_enclosure_ignored() {
        let entry = parse_one(
            r#"<item><title>t</title><enclosure url="https://x/ep.mp3" type="audio/mpeg"/><content:encoded><![CDATA[<img src="https://x/y.png">]]></content:encoded></item>"#,
        );
        assert_eq!(entry.cover_image.as_deref(), Some("https://x/y.png"));
    }

    #[test]
    fn test_media_content_used() {
        let entry = parse_one(
            r#"<item><title>t</title><media:content url="https://x/m.jpg" medium="image"/></item>"#,
        );
        assert_eq!(entry.cover_image.as_deref(), Some("https://x/m.jpg"));
    }

    #[test]
    fn test_media_thumbnail_fallback() {
        let entry = parse_one(
            r#"<item><title>t</title><media:thumbnail url="https://x/thumb.jpg" width="150"/></item>"#,
        );
        assert_eq!(entry.cover_image.as_deref(), Some("https://x/thumb.jpg"));
    }

    #[test]
    fn test_media_content_beats_thumbnail() {
        let entry = parse_one(
            r#"<item><title>t</title><media:thumbnail url="https://x/thumb.jpg"/><media:content url="https://x/full.jpg" type="image/jpeg"/></item>"#,
        );
        assert_eq!(entry.cover_image.as_deref(), Some("https://x/full.jpg"));
    }

    #[test]
    fn test_cover_url_kept_as_written() {
        let entry = parse_one(
            r#"<item><title>t</title><enclosure url=" https://cdn.example " type="image/png"/></item>"#,
        );
        assert_eq!(entry.cover_image.as_deref(), Some("https://cdn.example"));

        let entry = parse_one(
            r#"<item><title>t</title><description><![CDATA[<img src="https://x/a b.png">]]></description></item>"#,
        );
        assert_eq!(entry.cover_image.as_deref(), Some("https://x/a b.png"));
    }

    #[test]
    fn test_unsafe_enclosure_url_skipped() {
        let entry = parse_one(
            r#"<item><title>t</title><enclosure url="javascript:alert(1)"/></item>"#,
        );
        assert_eq!(entry.cover_image, None);
    }

    #[test]
    fn test_relative_img_resolved_against_link() {
        let entry = parse_one(
            r#"<item><title>t</title><link>https://s.example/p/post</link><description><![CDATA[<img src="/img/a.png">]]></description></item>"#,
        );
        assert_eq!(
            entry.cover_image.as_deref(),
            Some("https://s.example/img/a.png")
        );
    }

    #[test]
    fn test_no_image_is_none() {
        let entry = parse_one("<item><title>t</title><description>text only</description></item>");
        assert_eq!(entry.cover_image, None);
    }

    #[test]
    fn test_sniff_limits() {
        assert_eq!(
            sniff_first_img(r#"<IMG alt="a" SRC='https://x/a.png' />"#).as_deref(),
            Some("https://x/a.png")
        );
        assert_eq!(
            sniff_first_img(r#"<img src="https://x/a.png?w=1&amp;h=2">"#).as_deref(),
            Some("https://x/a.png?w=1&h=2")
        );
        // Unquoted attribute values are not recognized
        assert_eq!(sniff_first_img("<img src=https://x/a.png>"), None);
        // data-src is matched when there is no plain src
        assert_eq!(
            sniff_first_img(r#"<img data-src="https://x/lazy.png">"#).as_deref(),
            Some("https://x/lazy.png")
        );
        assert_eq!(sniff_first_img("<p>no images</p>"), None);
    }

    #[test]
    fn test_guid_text_used_as_id() {
        let entry = parse_one(
            "<item><title>t</title><link>https://s.example/p</link><guid>abc-123</guid></item>",
        );
        assert_eq!(entry.id, "abc-123");
    }

    #[test]
    fn test_guid_with_attribute_unwrapped() {
        let entry = parse_one(
            r#"<item><title>t</title><link>https://s.example/p</link><guid isPermaLink="false">post-42</guid></item>"#,
        );
        assert_eq!(entry.id, "post-42");
        assert_eq!(entry.link, "https://s.example/p");
    }

    #[test]
    fn test_permalink_guid_fills_missing_link() {
        let entry = parse_one(
            r#"<item><title>t</title><guid isPermaLink="true">https://s.example/g</guid></item>"#,
        );
        assert_eq!(entry.link, "https://s.example/g");

        let entry = parse_one(
            r#"<item><title>t</title><guid isPermaLink="false">https://s.example/g</guid></item>"#,
        );
        assert_eq!(entry.link, "");
    }

    #[test]
    fn test_id_digest_fallback() {
        let entry = parse_one("<item><title>Only a title</title></item>");
        assert_eq!(entry.id.len(), 64);
        assert!(entry.id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_duplicate_ids_made_unique() {
        let items = "<item><title>a</title><guid>same</guid></item><item><title>b</title><guid>same</guid></item><item><title>c</title><guid>same</guid></item>";
        let result = parser().parse(&rss(items)).unwrap();
        let ids: Vec<_> = result.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["same", "same-2", "same-3"]);
    }

    #[test]
    fn test_invalid_date_does_not_fail_entry() {
        let entry = parse_one(
            "<item><title>t</title><pubDate>sometime last week</pubDate></item>",
        );
        assert_eq!(entry.published_at, None);
        assert_eq!(entry.title, "t");
    }

    #[test]
    fn test_dc_date_fallback() {
        let entry = parse_one("<item><title>t</title><dc:date>2024-03-05T08:30:00+02:00</dc:date></item>");
        assert_eq!(
            entry.published_iso().as_deref(),
            Some("2024-03-05T06:30:00.000Z")
        );
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("Mon, 01 Jan 2024 12:00:00 GMT").is_some());
        assert!(parse_date("Mon, 1 Jan 2024 12:00:00 +0000").is_some());
        assert!(parse_date("2024-01-01T12:00:00Z").is_some());
        assert!(parse_date("").is_none());
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn test_broken_item_does_not_affect_others() {
        let items = r#"<item><title><b>nested</b> <i/></title><pubDate><x/></pubDate><enclosure/><guid/></item><item><title>fine</title><link>https://s.example/f</link></item>"#;
        let result = parser().parse(&rss(items)).unwrap();
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.entries[0].title, "nested");
        assert_eq!(result.entries[0].published_at, None);
        assert_eq!(result.entries[0].cover_image, None);
        assert_eq!(result.entries[1].title, "fine");
    }

    #[test]
    fn test_excerpt_truncated() {
        let body = "word ".repeat(100);
        let entry = parse_one(&format!(
            "<item><title>t</title><description>{}</description></item>",
            body
        ));
        let excerpt = entry.excerpt.unwrap();
        assert!(excerpt.chars().count() <= 221);
        assert!(excerpt.ends_with('…'));
    }
}
