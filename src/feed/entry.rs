use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// One blog post, ready for rendering.
///
/// Built fresh on every fetch and never persisted. Serializes with camelCase
/// keys (`publishedAt`, `bodyHtml`, `coverImage`) for the page renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    /// guid, else link, else a content digest. Unique within one fetch.
    pub id: String,
    /// Plain text, entities decoded.
    pub title: String,
    /// URL of the original post.
    pub link: String,
    /// Publish time; `None` when the feed's date was missing or unparseable.
    #[serde(serialize_with = "serialize_iso")]
    pub published_at: Option<DateTime<Utc>>,
    /// Sanitized full post body.
    pub body_html: String,
    /// Plain-text preview of the body, no markup.
    pub excerpt: Option<String>,
    /// Lead image URL (http/https only).
    pub cover_image: Option<String>,
}

impl FeedEntry {
    /// `published_at` as ISO-8601 with millisecond precision, e.g.
    /// `2024-01-01T12:00:00.000Z`.
    pub fn published_iso(&self) -> Option<String> {
        self.published_at.as_ref().map(to_iso)
    }
}

fn to_iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_iso<S: Serializer>(
    value: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(dt) => serializer.serialize_str(&to_iso(dt)),
        None => serializer.serialize_none(),
    }
}
