//! Feed ingestion: fetching, XML parsing and entry extraction.
//!
//! - [`xml`] - generic XML tree (`XmlNode`/`XmlValue`) built on `quick-xml`
//! - [`parser`] - walks `rss.channel.item` and builds [`FeedEntry`] values
//! - [`fetcher`] - single bounded HTTP GET for the feed document
//! - [`FeedMirror`] - the whole pipeline behind one call

mod entry;
pub mod fetcher;
mod mirror;
pub mod parser;
pub mod xml;

pub use entry::FeedEntry;
pub use fetcher::{fetch_feed, FetchError};
pub use mirror::{FeedMirror, MirrorError};
pub use parser::{FeedParser, ParseError, ParseResult};
pub use xml::{parse_xml, XmlError, XmlNode, XmlValue};
