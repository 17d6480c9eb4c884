//! Streaming JSON rendering of node documents.
//!
//! The document shape follows the OSM JSON API:
//!
//! ```json
//! {"version":"0.6","generator":"mapread 0.1.0","elements":[
//!   {"type":"node","id":1,"lat":51.5,"lon":-0.1,...}
//! ],"error":{"message":"..."}}
//! ```
//!
//! Each element is written as soon as it arrives, so memory use does not
//! grow with the number of nodes. The `error` member is only present when a
//! fault was annotated.
//!
//! Every fragment, separator included, is encoded up front and handed to the
//! sink as one unit. A fragment the sink refuses outright leaves the document
//! intact. One the sink accepts only in part tears the document, and the
//! formatter refuses to append anything after it.

use std::{
    error::Error as StdError,
    io::{self, Write},
};

use serde::Serialize;

use crate::{Node, Tags};

use super::{DocumentState, FormatError, OutputFormatter, fault_message};

/// API version reported in every document.
pub const JSON_API_VERSION: &str = "0.6";

const DEFAULT_GENERATOR: &str = concat!("mapread ", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
struct Header<'a> {
    version: &'static str,
    generator: &'a str,
}

#[derive(Serialize)]
struct JsonNode<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: u64,
    lat: f64,
    lon: f64,
    version: u64,
    changeset: u64,
    timestamp: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    #[serde(skip_serializing_if = "no_tags")]
    tags: &'a Tags,
}

fn no_tags(tags: &&Tags) -> bool {
    tags.is_empty()
}

impl<'a> From<&'a Node> for JsonNode<'a> {
    fn from(node: &'a Node) -> Self {
        Self {
            kind: "node",
            id: node.id.get(),
            lat: node.location.y,
            lon: node.location.x,
            version: node.version,
            changeset: node.changeset,
            timestamp: &node.timestamp,
            uid: node.author.as_ref().map(|author| author.uid),
            user: node
                .author
                .as_ref()
                .map(|author| author.display_name.as_str()),
            tags: &node.tags,
        }
    }
}

#[derive(Serialize)]
struct ErrorMarker {
    message: String,
}

/// [`OutputFormatter`] writing OSM-style JSON to any [`Write`] sink.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use mapread_core::{ElementId, JsonFormatter, Node, OutputFormatter};
///
/// let mut formatter = JsonFormatter::with_generator(Vec::new(), "doc");
/// formatter.begin_document()?;
/// formatter.write_node(&Node::new(ElementId::new(1), Coord { x: 1.0, y: 2.0 }))?;
/// formatter.end_document()?;
///
/// let json: serde_json::Value = serde_json::from_slice(&formatter.into_inner())?;
/// assert_eq!(json["elements"][0]["id"], 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct JsonFormatter<W: Write> {
    out: W,
    generator: String,
    state: DocumentState,
    elements: usize,
}

impl<W: Write> JsonFormatter<W> {
    /// Create a formatter reporting the crate version as generator.
    pub fn new(out: W) -> Self {
        Self::with_generator(out, DEFAULT_GENERATOR)
    }

    /// Create a formatter with a custom generator string.
    pub fn with_generator(out: W, generator: impl Into<String>) -> Self {
        Self {
            out,
            generator: generator.into(),
            state: DocumentState::new(),
            elements: 0,
        }
    }

    /// Whether a partially written fragment ended the document early.
    pub const fn is_torn(&self) -> bool {
        self.state.is_torn()
    }

    /// Return the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Write one fragment, tearing the document if the sink took only part
    /// of it.
    fn send(&mut self, fragment: &[u8]) -> Result<(), FormatError> {
        let mut sent = 0;
        while sent < fragment.len() {
            match self.out.write(&fragment[sent..]) {
                Ok(0) => return Err(self.abandon(sent, io::ErrorKind::WriteZero.into())),
                Ok(written) => sent += written,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(self.abandon(sent, err)),
            }
        }
        Ok(())
    }

    fn abandon(&mut self, sent: usize, err: io::Error) -> FormatError {
        if sent > 0 {
            self.state.tear();
        }
        FormatError::Io(err)
    }
}

impl<W: Write> OutputFormatter for JsonFormatter<W> {
    fn begin_document(&mut self) -> Result<(), FormatError> {
        self.state.check_begin()?;
        let header = serde_json::to_string(&Header {
            version: JSON_API_VERSION,
            generator: &self.generator,
        })
        .map_err(FormatError::Encode)?;
        // Reopen the header object so elements can be streamed into it.
        let open = header.strip_suffix('}').unwrap_or(&header);
        let fragment = format!("{open},\"elements\":[");
        self.send(fragment.as_bytes())?;
        self.state.begin()
    }

    fn write_node(&mut self, node: &Node) -> Result<(), FormatError> {
        self.state.node()?;
        let mut fragment = Vec::new();
        if self.elements > 0 {
            fragment.push(b',');
        }
        serde_json::to_writer(&mut fragment, &JsonNode::from(node)).map_err(FormatError::Encode)?;
        self.send(&fragment)?;
        self.elements += 1;
        Ok(())
    }

    fn error(&mut self, fault: &(dyn StdError + 'static)) -> Result<(), FormatError> {
        self.state.check_error()?;
        let marker = serde_json::to_string(&ErrorMarker {
            message: fault_message(fault),
        })
        .map_err(FormatError::Encode)?;
        let fragment = format!("],\"error\":{marker}");
        self.send(fragment.as_bytes())?;
        self.state.error()
    }

    fn end_document(&mut self) -> Result<(), FormatError> {
        self.state.check_end()?;
        let fragment: &[u8] = if self.state.error_written() {
            b"}\n"
        } else {
            b"]}\n"
        };
        self.send(fragment)?;
        self.state.end()?;
        self.out.flush()?;
        Ok(())
    }
}
