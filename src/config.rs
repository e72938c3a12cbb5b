//! Configuration file parser for ~/.config/feedmirror/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
//!
//! The feed URL is normally supplied by the hosting environment through
//! `SUBSTACK_FEED_URL`, which takes precedence over the file.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::content::SanitizerConfig;
use crate::util::DEFAULT_EXCERPT_CHARS;

/// Environment variable overriding `feed_url`.
pub const FEED_URL_ENV: &str = "SUBSTACK_FEED_URL";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level pipeline configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RSS feed to mirror. `None` means the blog is not configured and the
    /// pipeline returns no entries.
    pub feed_url: Option<String>,

    /// Upper bound for the whole fetch (connect, headers, body), in milliseconds.
    pub fetch_timeout_ms: u64,

    /// Maximum accepted feed body size in bytes.
    pub max_feed_bytes: usize,

    /// Excerpt length in characters before the ellipsis.
    pub excerpt_chars: usize,

    /// User-Agent header sent with the feed request.
    pub user_agent: String,

    /// HTML sanitizer settings.
    pub sanitizer: SanitizerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: None,
            fetch_timeout_ms: 4_000,
            max_feed_bytes: 10 * 1024 * 1024,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            user_agent: concat!("feedmirror/", env!("CARGO_PKG_VERSION")).to_string(),
            sanitizer: SanitizerConfig::default(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "feed_url",
        "fetch_timeout_ms",
        "max_feed_bytes",
        "excerpt_chars",
        "user_agent",
        "sanitizer",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            feed_configured = config.feed_url.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration from TOML text. Blank input yields defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        Ok(toml::from_str(content)?)
    }

    /// Apply `SUBSTACK_FEED_URL` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using `lookup` in place of `std::env::var`.
    ///
    /// Env var takes precedence over the config file; a blank value is
    /// treated as unset.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(FEED_URL_ENV).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(var = FEED_URL_ENV, "Feed URL taken from environment");
            self.feed_url = Some(url.trim().to_string());
        }
        self
    }

    /// Configured feed URL, ignoring blank values.
    pub fn feed_url(&self) -> Option<&str> {
        self.feed_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================
