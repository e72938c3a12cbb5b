//! Mirrors a Substack blog's RSS feed as sanitized, render-ready entries.
//!
//! The pipeline is fetch → parse XML → extract fields → sanitize HTML. The
//! render-side entry point is [`feed::FeedMirror::fetch_entries`], which
//! never fails: an unreachable or broken feed yields an empty list.
//!
//! ```no_run
//! # async fn run() {
//! use feedmirror::config::Config;
//! use feedmirror::feed::FeedMirror;
//!
//! let config = Config::default().with_env_overrides();
//! let mirror = FeedMirror::new(config).unwrap();
//! for entry in mirror.fetch_entries().await {
//!     println!("{} {}", entry.title, entry.link);
//! }
//! # }
//! ```

pub mod config;
pub mod content;
pub mod feed;
pub mod util;
