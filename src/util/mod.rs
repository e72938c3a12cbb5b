//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL validation**: scheme checks for feed and image URLs
//! - **Text processing**: tag stripping, whitespace collapsing, excerpt truncation
//!
//! # Examples
//!
//! ```
//! use feedmirror::util::{excerpt, validate_url};
//!
//! let url = validate_url("https://example.substack.com/feed").unwrap();
//! assert_eq!(url.scheme(), "https");
//!
//! let text = excerpt("<p>Hello <b>world</b></p>", 220);
//! assert_eq!(text.as_deref(), Some("Hello world"));
//! ```

mod text;
mod url_validator;

pub use text::{collapse_whitespace, excerpt, strip_control_chars, strip_tags, truncate_chars};
pub use url_validator::{resolve_url, validate_url, UrlValidationError};

/// Default excerpt length in characters, shared by config defaults and the extractor
pub const DEFAULT_EXCERPT_CHARS: usize = 220;
