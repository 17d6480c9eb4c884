//! Facade crate for the mapread node read endpoint.
//!
//! This crate re-exports the request validator, the streaming responder and
//! the formatter contract, with the SQLite store and JSON formatter behind
//! feature flags.

#![forbid(unsafe_code)]

pub use mapread_core::{
    CandidateTable, DocumentPhase, ElementId, FormatError, HttpRequest, Node, NodeAuthor,
    NodesResponder, OutputFormatter, RawRequest, ReadTransaction, RequestError, StoreError, Tags,
    WriteFault, WriteReport, validate_request,
};

#[cfg(feature = "serde")]
pub use mapread_core::JsonFormatter;

#[cfg(feature = "store-sqlite")]
pub use mapread_core::SqliteReadTransaction;
