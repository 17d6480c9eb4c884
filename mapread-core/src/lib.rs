//! Core of the mapread node read endpoint.
//!
//! A request flows through three pieces:
//!
//! - [`validate_request`] turns a raw transport request into a list of
//!   [`ElementId`] values, or rejects it before any output is produced.
//! - [`NodesResponder`] stages the requested identifiers against a borrowed
//!   [`ReadTransaction`] and drives serialization of the visible matches.
//! - [`OutputFormatter`] implementations render the streamed document in a
//!   concrete wire format.
//!
//! Once a document has begun, failures are written into it as an error
//! marker rather than returned to the caller, and the document is always
//! closed.

#![forbid(unsafe_code)]

mod formatter;
mod id;
mod node;
mod request;
mod responder;
pub mod store;
#[doc(hidden)]
pub mod test_support;

pub use formatter::{DocumentPhase, FormatError, OutputFormatter, fault_message};
#[cfg(feature = "serde")]
pub use formatter::{JSON_API_VERSION, JsonFormatter};
pub use id::ElementId;
pub use node::{COORDINATE_SCALE, Node, NodeAuthor, Tags, scaled_coordinate};
pub use request::{
    HttpRequest, IDS_PARAM, LEGACY_IDS_PARAM, READ_METHOD, RawRequest, RequestError,
    parse_id_list, validate_request,
};
pub use responder::{NodesResponder, WriteFault, WriteReport};
pub use store::{CandidateTable, ReadTransaction, StoreError};
#[cfg(feature = "store-sqlite")]
pub use store::SqliteReadTransaction;
