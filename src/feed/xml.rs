//! Generic XML → nested value tree.
//!
//! Feeds arrive with loosely-typed shapes: the same element can be plain
//! text in one feed, a CDATA section in another, and an attribute-carrying
//! node in a third. This parser keeps those shapes distinguishable
//! ([`XmlValue`]) and gives the extractor a single normalizing accessor
//! ([`XmlValue::text`]) that always yields a plain string.

use std::borrow::Cow;
use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Maximum element nesting depth. RSS needs about five levels; anything
/// deeper than this is hostile or broken.
const MAX_XML_DEPTH: usize = 128;

/// Errors that can occur while building the value tree.
#[derive(Debug, Error)]
pub enum XmlError {
    /// quick-xml rejected the document (mismatched tags, bad syntax, ...)
    #[error("XML parse error at byte {position}: {message}")]
    Syntax { position: u64, message: String },
    /// Nesting depth exceeds [`MAX_XML_DEPTH`].
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
    /// Document ended while an element was still open.
    #[error("Unclosed element <{0}> at end of document")]
    Unclosed(String),
    /// Document contained no element at all.
    #[error("Document has no root element")]
    NoRootElement,
    /// Bytes could not be decoded as text.
    #[error("Invalid text encoding: {0}")]
    Encoding(String),
}

/// The shape an element's value arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlValue {
    /// Leaf element holding only (entity-decoded) text.
    Text(String),
    /// Leaf element whose content included at least one CDATA section.
    CData(String),
    /// Element with attributes and/or child elements.
    Node(XmlNode),
}

/// An element that carries attributes or children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Attribute values keyed by qualified name, entity-decoded.
    pub attributes: BTreeMap<String, String>,
    /// Child elements in document order.
    pub children: Vec<XmlChild>,
    /// Direct character data: text and CDATA merged, untrimmed.
    pub text: String,
}

/// A named child element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlChild {
    /// Qualified tag name as written (`content:encoded`).
    pub name: String,
    pub value: XmlValue,
    /// Byte offset into the parent's `text` at which this child appeared.
    offset: usize,
}

impl XmlValue {
    /// Best plain-text representation of this value, trimmed.
    ///
    /// Text and CDATA are returned as-is; nodes yield their text content
    /// with descendant text spliced in document order. Never fails.
    pub fn text(&self) -> String {
        self.text_content().trim().to_string()
    }

    fn text_content(&self) -> Cow<'_, str> {
        match self {
            XmlValue::Text(s) | XmlValue::CData(s) => Cow::Borrowed(s),
            XmlValue::Node(node) => Cow::Owned(node.text_content()),
        }
    }

    pub fn as_node(&self) -> Option<&XmlNode> {
        match self {
            XmlValue::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Attribute lookup; leaf values have no attributes.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.as_node().and_then(|n| n.attr(name))
    }

    /// First child element with `name`, if this value is a node.
    pub fn get(&self, name: &str) -> Option<&XmlValue> {
        self.as_node().and_then(|n| n.get(name))
    }
}

impl XmlNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// First child element with `name`.
    pub fn get(&self, name: &str) -> Option<&XmlValue> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.value)
    }

    /// All child elements with `name`, in document order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlValue> + 'a {
        self.children
            .iter()
            .filter(move |c| c.name == name)
            .map(|c| &c.value)
    }

    /// Concatenated text of this node and all descendants, in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::with_capacity(self.text.len());
        let mut pos = 0;
        for child in &self.children {
            out.push_str(&self.text[pos..child.offset]);
            out.push_str(&child.value.text_content());
            pos = child.offset;
        }
        out.push_str(&self.text[pos..]);
        out
    }
}

/// Element under construction.
struct Frame {
    name: String,
    node: XmlNode,
    saw_cdata: bool,
}

impl Frame {
    fn new(name: String, attributes: BTreeMap<String, String>) -> Self {
        Self {
            name,
            node: XmlNode {
                attributes,
                ..XmlNode::default()
            },
            saw_cdata: false,
        }
    }

    fn finish(self) -> (String, XmlValue) {
        let value = if self.node.attributes.is_empty() && self.node.children.is_empty() {
            if self.saw_cdata {
                XmlValue::CData(self.node.text)
            } else {
                XmlValue::Text(self.node.text)
            }
        } else {
            XmlValue::Node(self.node)
        };
        (self.name, value)
    }

    fn attach(&mut self, name: String, value: XmlValue) {
        let offset = self.node.text.len();
        self.node.children.push(XmlChild {
            name,
            value,
            offset,
        });
    }
}

/// Parses an XML document into a tree rooted at a synthetic document node.
///
/// The returned node's children are the document's top-level elements, so
/// an RSS feed is reached via `root.get("rss")`.
///
/// # Errors
///
/// Returns [`XmlError`] for malformed markup, unclosed elements, documents
/// with no root element, or nesting deeper than the safety limit.
///
/// # Security
///
/// `<!DOCTYPE>` and `<!ENTITY>` declarations are skipped, never expanded.
/// Entity references in text resolve only against the fixed XML/HTML
/// named-entity tables.
pub fn parse_xml(xml: &str) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut stack = vec![Frame::new(String::new(), BTreeMap::new())];

    loop {
        let event = reader.read_event().map_err(|e| XmlError::Syntax {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                if stack.len() > MAX_XML_DEPTH {
                    return Err(XmlError::MaxDepthExceeded(MAX_XML_DEPTH));
                }
                let name = decode(&reader, e.name().as_ref())?.into_owned();
                let attributes = read_attributes(&e, &reader)?;
                stack.push(Frame::new(name, attributes));
            }
            Event::Empty(e) => {
                let name = decode(&reader, e.name().as_ref())?.into_owned();
                let attributes = read_attributes(&e, &reader)?;
                let (name, value) = Frame::new(name, attributes).finish();
                if let Some(parent) = stack.last_mut() {
                    parent.attach(name, value);
                }
            }
            Event::End(_) => {
                // quick-xml has already matched the end name against the open tag
                if stack.len() < 2 {
                    return Err(XmlError::Syntax {
                        position: reader.buffer_position() as u64,
                        message: "closing tag without matching opening tag".to_string(),
                    });
                }
                if let Some(frame) = stack.pop() {
                    let (name, value) = frame.finish();
                    if let Some(parent) = stack.last_mut() {
                        parent.attach(name, value);
                    }
                }
            }
            Event::Text(e) => {
                let raw = decode(&reader, &e)?;
                if let Some(top) = stack.last_mut() {
                    top.node
                        .text
                        .push_str(&html_escape::decode_html_entities(&raw));
                }
            }
            Event::CData(e) => {
                let raw = decode(&reader, &e)?;
                if let Some(top) = stack.last_mut() {
                    top.node.text.push_str(&raw);
                    top.saw_cdata = true;
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, DOCTYPE
            _ => {}
        }
    }

    if stack.len() > 1 {
        let name = stack.pop().map(|f| f.name).unwrap_or_default();
        return Err(XmlError::Unclosed(name));
    }

    let root = stack.pop().map(|f| f.node).unwrap_or_default();
    if root.children.is_empty() {
        return Err(XmlError::NoRootElement);
    }

    Ok(root)
}

fn decode<'b>(reader: &Reader<&[u8]>, bytes: &'b [u8]) -> Result<Cow<'b, str>, XmlError> {
    reader
        .decoder()
        .decode(bytes)
        .map_err(|e| XmlError::Encoding(e.to_string()))
}

fn read_attributes(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<BTreeMap<String, String>, XmlError> {
    let mut attributes = BTreeMap::new();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed XML attribute");
                continue;
            }
        };
        let key = decode(reader, attr.key.as_ref())?.into_owned();
        let raw = decode(reader, &attr.value)?;
        let value = html_escape::decode_html_entities(&raw).into_owned();
        attributes.insert(key, value);
    }

    Ok(attributes)
}
