//! Streaming output contract for node documents.
//!
//! A document is opened once, receives any number of nodes, at most one
//! error marker, and is closed once. Formatters report only transport
//! faults; content never makes a formatter call fail.

use std::{error::Error as StdError, fmt, io};

use thiserror::Error;

use crate::Node;

#[cfg(feature = "serde")]
mod json;

#[cfg(feature = "serde")]
pub use json::{JSON_API_VERSION, JsonFormatter};

/// Lifecycle phase of a streamed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentPhase {
    /// `begin_document` has not been called.
    NotStarted,
    /// The document is open.
    InProgress,
    /// `end_document` has been called.
    Ended,
}

impl fmt::Display for DocumentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotStarted => "not started",
            Self::InProgress => "in progress",
            Self::Ended => "ended",
        };
        f.write_str(label)
    }
}

/// Transport faults raised by an [`OutputFormatter`].
#[derive(Debug, Error)]
pub enum FormatError {
    /// Writing to the underlying stream failed.
    #[error("failed to write to the output stream: {0}")]
    Io(#[from] io::Error),
    /// Encoding a node failed.
    #[cfg(feature = "serde")]
    #[error("failed to encode node: {0}")]
    Encode(#[source] serde_json::Error),
    /// A call arrived in the wrong document phase.
    #[error("{operation} called while the document is {phase}")]
    Sequence {
        /// Formatter operation that was rejected.
        operation: &'static str,
        /// Phase the document was in.
        phase: DocumentPhase,
    },
    /// A second error marker was requested.
    #[error("the document already carries an error marker")]
    DuplicateError,
    /// An earlier write left a partial fragment in the output stream.
    #[error("{operation} refused because the output holds a partially written fragment")]
    Torn {
        /// Formatter operation that was refused.
        operation: &'static str,
    },
}

/// Sink for a streamed node document in one wire format.
///
/// New wire formats implement this trait; the responder never needs to
/// change to support them.
pub trait OutputFormatter {
    /// Open the document. Called exactly once, before anything else.
    fn begin_document(&mut self) -> Result<(), FormatError>;

    /// Serialize one node into the open document.
    fn write_node(&mut self, node: &Node) -> Result<(), FormatError>;

    /// Append a self-describing error marker without closing the document.
    ///
    /// Called at most once, after [`begin_document`](Self::begin_document).
    fn error(&mut self, fault: &(dyn StdError + 'static)) -> Result<(), FormatError>;

    /// Close the document. Valid even when nothing was written.
    fn end_document(&mut self) -> Result<(), FormatError>;
}

impl<F: OutputFormatter + ?Sized> OutputFormatter for &mut F {
    fn begin_document(&mut self) -> Result<(), FormatError> {
        (**self).begin_document()
    }

    fn write_node(&mut self, node: &Node) -> Result<(), FormatError> {
        (**self).write_node(node)
    }

    fn error(&mut self, fault: &(dyn StdError + 'static)) -> Result<(), FormatError> {
        (**self).error(fault)
    }

    fn end_document(&mut self) -> Result<(), FormatError> {
        (**self).end_document()
    }
}

impl<F: OutputFormatter + ?Sized> OutputFormatter for Box<F> {
    fn begin_document(&mut self) -> Result<(), FormatError> {
        (**self).begin_document()
    }

    fn write_node(&mut self, node: &Node) -> Result<(), FormatError> {
        (**self).write_node(node)
    }

    fn error(&mut self, fault: &(dyn StdError + 'static)) -> Result<(), FormatError> {
        (**self).error(fault)
    }

    fn end_document(&mut self) -> Result<(), FormatError> {
        (**self).end_document()
    }
}

/// Render a fault and its source chain as one line.
///
/// # Examples
/// ```
/// use mapread_core::{ElementId, StoreError, fault_message};
///
/// let fault = StoreError::MissingNode { id: ElementId::new(9) };
/// assert_eq!(
///     fault_message(&fault),
///     "node 9 listed as a candidate is missing from the store"
/// );
/// ```
pub fn fault_message(fault: &(dyn StdError + 'static)) -> String {
    let mut message = fault.to_string();
    let mut source = fault.source();
    while let Some(cause) = source {
        let detail = cause.to_string();
        if !message.contains(&detail) {
            message.push_str(": ");
            message.push_str(&detail);
        }
        source = cause.source();
    }
    message
}

/// Phase bookkeeping shared by the concrete formatters.
///
/// The `check_*` methods validate a call without recording it, so a
/// formatter can commit the transition only once its bytes are out. A torn
/// state refuses every further call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DocumentState {
    phase: DocumentPhase,
    error_written: bool,
    torn: bool,
}

impl DocumentState {
    pub(crate) const fn new() -> Self {
        Self {
            phase: DocumentPhase::NotStarted,
            error_written: false,
            torn: false,
        }
    }

    pub(crate) const fn error_written(&self) -> bool {
        self.error_written
    }

    pub(crate) const fn is_torn(&self) -> bool {
        self.torn
    }

    /// Record that a write stopped partway through a fragment.
    pub(crate) fn tear(&mut self) {
        self.torn = true;
    }

    pub(crate) fn check_begin(&self) -> Result<(), FormatError> {
        self.expect_phase("begin_document", DocumentPhase::NotStarted)
    }

    pub(crate) fn begin(&mut self) -> Result<(), FormatError> {
        self.check_begin()?;
        self.phase = DocumentPhase::InProgress;
        Ok(())
    }

    pub(crate) fn node(&self) -> Result<(), FormatError> {
        self.expect_phase("write_node", DocumentPhase::InProgress)?;
        if self.error_written {
            return Err(FormatError::Sequence {
                operation: "write_node after error",
                phase: self.phase,
            });
        }
        Ok(())
    }

    pub(crate) fn check_error(&self) -> Result<(), FormatError> {
        self.expect_phase("error", DocumentPhase::InProgress)?;
        if self.error_written {
            return Err(FormatError::DuplicateError);
        }
        Ok(())
    }

    pub(crate) fn error(&mut self) -> Result<(), FormatError> {
        self.check_error()?;
        self.error_written = true;
        Ok(())
    }

    pub(crate) fn check_end(&self) -> Result<(), FormatError> {
        self.expect_phase("end_document", DocumentPhase::InProgress)
    }

    pub(crate) fn end(&mut self) -> Result<(), FormatError> {
        self.check_end()?;
        self.phase = DocumentPhase::Ended;
        Ok(())
    }

    fn expect_phase(&self, operation: &'static str, expected: DocumentPhase) -> Result<(), FormatError> {
        if self.torn {
            return Err(FormatError::Torn { operation });
        }
        if self.phase == expected {
            Ok(())
        } else {
            Err(FormatError::Sequence {
                operation,
                phase: self.phase,
            })
        }
    }
}
