//! Post body handling.
//!
//! Feed bodies are untrusted HTML that ends up rendered in-page, so every
//! body passes through [`Sanitizer`] before it leaves the pipeline.

mod sanitize;

pub use sanitize::{Sanitizer, SanitizerConfig};
