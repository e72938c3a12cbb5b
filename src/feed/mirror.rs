use thiserror::Error;

use crate::config::Config;
use crate::content::Sanitizer;
use crate::feed::entry::FeedEntry;
use crate::feed::fetcher::{fetch_feed, FetchError};
use crate::feed::parser::{FeedParser, ParseError, ParseResult};

/// Why a mirror run produced no entries.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// No feed URL in the config or environment
    #[error("No feed URL configured")]
    NotConfigured,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Feed could not be parsed: {0}")]
    Parse(#[from] ParseError),
}

/// Fetch → parse → extract → sanitize, end to end.
///
/// Stateless between calls: each run re-fetches and re-parses the feed.
/// Cloning is cheap (the HTTP client is reference counted) and clones can
/// be used concurrently.
#[derive(Debug, Clone)]
pub struct FeedMirror {
    client: reqwest::Client,
    config: Config,
    parser: FeedParser,
}

impl FeedMirror {
    /// Builds a mirror with its own HTTP client using `config.user_agent`.
    pub fn new(config: Config) -> Result<Self, MirrorError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(FetchError::Network)?;
        Ok(Self::with_client(config, client))
    }

    /// Builds a mirror around an existing client.
    pub fn with_client(config: Config, client: reqwest::Client) -> Self {
        let parser = FeedParser::new(
            Sanitizer::new(config.sanitizer.clone()),
            config.excerpt_chars,
        );
        Self {
            client,
            config,
            parser,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the pipeline, keeping failure causes apart.
    ///
    /// `Ok` with an empty list means the feed was reachable but had no
    /// posts; every unusable outcome is an `Err`.
    pub async fn try_fetch_entries(&self) -> Result<ParseResult, MirrorError> {
        let url = self.config.feed_url().ok_or(MirrorError::NotConfigured)?;

        let xml = fetch_feed(
            &self.client,
            url,
            self.config.fetch_timeout(),
            self.config.max_feed_bytes,
        )
        .await?;

        let result = self.entries_from_xml(&xml)?;
        if result.skipped > 0 {
            tracing::warn!(
                feed = %url,
                skipped = result.skipped,
                "Items with neither title nor link skipped"
            );
        }
        tracing::debug!(feed = %url, entries = result.entries.len(), "Feed mirrored");

        Ok(result)
    }

    /// Runs the pipeline for rendering; never fails.
    ///
    /// Any error is logged and yields an empty list, so an unreachable or
    /// broken feed renders as a blog with no posts.
    pub async fn fetch_entries(&self) -> Vec<FeedEntry> {
        match self.try_fetch_entries().await {
            Ok(result) => result.entries,
            Err(MirrorError::NotConfigured) => {
                tracing::debug!("No feed URL configured, rendering no posts");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(
                    feed = self.config.feed_url().unwrap_or_default(),
                    error = %e,
                    "Feed unavailable, rendering no posts"
                );
                Vec::new()
            }
        }
    }

    /// Parses, extracts and sanitizes a document already in memory.
    pub fn entries_from_xml(&self, xml: &str) -> Result<ParseResult, ParseError> {
        self.parser.parse(xml)
    }
}
