//! Responder answering one nodes request.
//!
//! Construction stages the candidate set; [`NodesResponder::write`] then
//! streams it. Once the document has been opened every failure becomes an
//! error marker inside the document, and the document is always closed.

use std::{error::Error as StdError, fmt, thread};

use log::{debug, error, warn};
use thiserror::Error;

use crate::{
    CandidateTable, ElementId, FormatError, OutputFormatter, ReadTransaction, StoreError,
};

/// Fault folded into a document after streaming began.
#[derive(Debug, Error)]
pub enum WriteFault {
    /// The store failed while reading candidates or nodes.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The formatter failed while writing a node.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// Streaming unwound before the document was closed.
    #[error("response generation was interrupted")]
    Interrupted,
}

/// Outcome of [`NodesResponder::write`].
#[derive(Debug)]
pub struct WriteReport {
    /// Nodes serialized before the document was closed.
    pub nodes_written: usize,
    /// Fault annotated in the document, if any.
    pub fault: Option<WriteFault>,
}

impl WriteReport {
    /// Whether every candidate was written without a fault.
    pub const fn is_complete(&self) -> bool {
        self.fault.is_none()
    }
}

/// Streams the visible subset of a requested identifier list.
///
/// The responder borrows the caller's transaction for read operations only;
/// committing or rolling it back stays with the caller.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use mapread_core::test_support::{DocumentEvent, MemoryStore, RecordingFormatter};
/// use mapread_core::{ElementId, HttpRequest, Node, NodesResponder, validate_request};
///
/// let store = MemoryStore::with_nodes([
///     Node::new(ElementId::new(1), Coord { x: 0.0, y: 0.0 }),
///     Node::new(ElementId::new(2), Coord { x: 1.0, y: 1.0 }).deleted(),
/// ]);
/// let ids = validate_request(&HttpRequest::get("ids=1,2,3"))?;
/// let responder = NodesResponder::new(ids, &store)?;
///
/// let mut formatter = RecordingFormatter::default();
/// let report = responder.write(&mut formatter)?;
///
/// assert!(report.is_complete());
/// assert_eq!(
///     formatter.events(),
///     [
///         DocumentEvent::Begin,
///         DocumentEvent::Node(ElementId::new(1)),
///         DocumentEvent::End,
///     ]
/// );
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct NodesResponder<'t, T: ReadTransaction + ?Sized> {
    requested: Vec<ElementId>,
    transaction: &'t T,
    candidates: CandidateTable,
}

impl<T: ReadTransaction + ?Sized> fmt::Debug for NodesResponder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodesResponder")
            .field("requested", &self.requested.len())
            .field("candidates", &self.candidates)
            .finish_non_exhaustive()
    }
}

impl<'t, T: ReadTransaction + ?Sized> NodesResponder<'t, T> {
    /// Stage `requested` against `transaction`.
    ///
    /// # Errors
    ///
    /// Returns the store's error when the candidate set cannot be staged.
    /// Nothing has been written at that point, so callers can still answer
    /// with a transport-level failure.
    pub fn new(requested: Vec<ElementId>, transaction: &'t T) -> Result<Self, StoreError> {
        let candidates = transaction.stage_candidates(&requested)?;
        debug!(
            "staged {} requested node ids as {}",
            requested.len(),
            candidates.name()
        );
        Ok(Self {
            requested,
            transaction,
            candidates,
        })
    }

    /// Identifiers as requested, including duplicates.
    pub fn requested(&self) -> &[ElementId] {
        &self.requested
    }

    /// Handle of the staged candidate set.
    pub const fn candidates(&self) -> &CandidateTable {
        &self.candidates
    }

    /// Stream the staged nodes into `formatter`.
    ///
    /// `begin_document` is always called first. Once it succeeds,
    /// `end_document` is always called last, and a store or formatter fault
    /// in between is written into the document through `error` and reported
    /// in the returned [`WriteReport`] instead of being returned.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError`] when the formatter fails to open or to close
    /// the document, which means the transport is gone. A document that
    /// never opened receives no further calls.
    pub fn write<F>(&self, formatter: &mut F) -> Result<WriteReport, FormatError>
    where
        F: OutputFormatter + ?Sized,
    {
        let mut document = OpenDocument::begin(formatter)
            .inspect_err(|err| error!("failed to open nodes document: {err}"))?;
        let mut nodes_written = 0;
        let fault = self
            .stream_nodes(document.formatter(), &mut nodes_written)
            .err();
        if let Some(fault) = &fault {
            warn!("nodes response failed after {nodes_written} nodes: {fault}");
            document.annotate(fault);
        }
        document
            .finish()
            .inspect_err(|err| error!("failed to close nodes document: {err}"))?;
        Ok(WriteReport {
            nodes_written,
            fault,
        })
    }

    fn stream_nodes<F>(&self, formatter: &mut F, written: &mut usize) -> Result<(), WriteFault>
    where
        F: OutputFormatter + ?Sized,
    {
        for id in self.transaction.candidate_ids(&self.candidates)? {
            let node = self.transaction.fetch_node(id)?;
            formatter.write_node(&node)?;
            *written += 1;
        }
        Ok(())
    }
}

/// Scope guard owning a document that has been opened.
///
/// `finish` closes the document and reports the result; dropping the guard
/// without finishing, e.g. while unwinding, still annotates and closes it.
struct OpenDocument<'f, F: OutputFormatter + ?Sized> {
    formatter: &'f mut F,
    annotated: bool,
    closed: bool,
}

impl<'f, F: OutputFormatter + ?Sized> OpenDocument<'f, F> {
    fn begin(formatter: &'f mut F) -> Result<Self, FormatError> {
        formatter.begin_document()?;
        Ok(Self {
            formatter,
            annotated: false,
            closed: false,
        })
    }

    fn formatter(&mut self) -> &mut F {
        &mut *self.formatter
    }

    fn annotate(&mut self, fault: &(dyn StdError + 'static)) {
        if self.annotated {
            return;
        }
        self.annotated = true;
        if let Err(err) = self.formatter.error(fault) {
            warn!("failed to write error marker into nodes document: {err}");
        }
    }

    fn finish(mut self) -> Result<(), FormatError> {
        self.closed = true;
        self.formatter.end_document()
    }
}

impl<F: OutputFormatter + ?Sized> Drop for OpenDocument<'_, F> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if thread::panicking() {
            self.annotate(&WriteFault::Interrupted);
        }
        if let Err(err) = self.formatter.end_document() {
            error!("failed to close nodes document: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Node;
    use crate::test_support::{DocumentEvent, MemoryStore, RecordingFormatter};
    use geo::Coord;
    use rstest::{fixture, rstest};
    use std::panic::{AssertUnwindSafe, catch_unwind};

    fn node(id: u64) -> Node {
        Node::new(ElementId::new(id), Coord { x: 0.0, y: 0.0 })
    }

    fn ids(raw: &[u64]) -> Vec<ElementId> {
        raw.iter().copied().map(ElementId::new).collect()
    }

    #[fixture]
    fn store() -> MemoryStore {
        MemoryStore::with_nodes([node(1), node(2).deleted(), node(5), node(6), node(9)])
    }

    fn run(store: &MemoryStore, requested: &[u64]) -> (RecordingFormatter, WriteReport) {
        let responder = NodesResponder::new(ids(requested), store).expect("stage candidates");
        let mut formatter = RecordingFormatter::default();
        let report = responder.write(&mut formatter).expect("close document");
        (formatter, report)
    }

    #[rstest]
    fn empty_request_yields_empty_document(store: MemoryStore) {
        let (formatter, report) = run(&store, &[]);
        assert_eq!(formatter.events(), [DocumentEvent::Begin, DocumentEvent::End]);
        assert_eq!(report.nodes_written, 0);
        assert!(report.is_complete());
    }

    #[rstest]
    fn emits_only_visible_existing_nodes(store: MemoryStore) {
        let (formatter, report) = run(&store, &[1, 2, 3]);
        assert_eq!(formatter.node_ids(), ids(&[1]));
        assert!(!formatter.has_error());
        assert_eq!(report.nodes_written, 1);
    }

    #[rstest]
    fn duplicates_are_emitted_once(store: MemoryStore) {
        let (formatter, _) = run(&store, &[5, 5, 1, 5]);
        assert_eq!(formatter.node_ids(), ids(&[1, 5]));
    }

    #[rstest]
    fn sub_structure_fault_becomes_error_marker(store: MemoryStore) {
        let store = store.failing_fetch(ElementId::new(9));
        let (formatter, report) = run(&store, &[9]);
        assert!(matches!(
            formatter.events(),
            [DocumentEvent::Begin, DocumentEvent::Error(_), DocumentEvent::End]
        ));
        assert!(matches!(
            report.fault,
            Some(WriteFault::Store(StoreError::Unavailable { .. }))
        ));
    }

    #[rstest]
    fn fault_midway_keeps_earlier_nodes(store: MemoryStore) {
        let store = store.failing_fetch(ElementId::new(6));
        let (formatter, report) = run(&store, &[1, 5, 6, 9]);
        assert_eq!(formatter.node_ids(), ids(&[1, 5]));
        assert_eq!(formatter.error_count(), 1);
        assert_eq!(formatter.events().last(), Some(&DocumentEvent::End));
        assert_eq!(report.nodes_written, 2);
    }

    #[rstest]
    fn candidate_read_fault_is_annotated(store: MemoryStore) {
        let responder = NodesResponder::new(ids(&[1, 5]), &store).expect("stage candidates");
        store.lose_staged_tables();
        let mut formatter = RecordingFormatter::default();
        let report = responder.write(&mut formatter).expect("close document");
        assert!(formatter.node_ids().is_empty());
        assert_eq!(formatter.error_count(), 1);
        assert!(matches!(
            report.fault,
            Some(WriteFault::Store(StoreError::UnknownCandidates { .. }))
        ));
    }

    #[rstest]
    fn formatter_fault_is_annotated(store: MemoryStore) {
        let responder = NodesResponder::new(ids(&[1, 5, 6]), &store).expect("stage candidates");
        let mut formatter = RecordingFormatter::default().failing_after(2);
        let report = responder.write(&mut formatter).expect("close document");
        assert_eq!(formatter.node_ids(), ids(&[1, 5]));
        assert_eq!(formatter.error_count(), 1);
        assert!(matches!(report.fault, Some(WriteFault::Format(_))));
    }

    #[rstest]
    fn failing_error_marker_still_closes(store: MemoryStore) {
        let store = store.failing_fetch(ElementId::new(1));
        let responder = NodesResponder::new(ids(&[1]), &store).expect("stage candidates");
        let mut formatter = RecordingFormatter::default().rejecting_errors();
        let report = responder.write(&mut formatter).expect("close document");
        assert_eq!(formatter.events(), [DocumentEvent::Begin, DocumentEvent::End]);
        assert!(report.fault.is_some());
    }

    #[rstest]
    fn closing_failure_is_returned(store: MemoryStore) {
        let responder = NodesResponder::new(ids(&[1]), &store).expect("stage candidates");
        let mut formatter = RecordingFormatter::default().rejecting_end();
        let err = responder
            .write(&mut formatter)
            .expect_err("closing failure should surface");
        assert!(matches!(err, FormatError::Io(_)));
        assert_eq!(formatter.node_ids(), ids(&[1]));
    }

    #[rstest]
    fn failing_begin_sends_nothing_else(store: MemoryStore) {
        let responder = NodesResponder::new(ids(&[1, 5]), &store).expect("stage candidates");
        let mut formatter = RecordingFormatter::default().rejecting_begin();
        let err = responder
            .write(&mut formatter)
            .expect_err("opening failure should surface");
        assert!(matches!(err, FormatError::Io(_)));
        assert!(formatter.events().is_empty());
    }

    #[rstest]
    fn keeps_the_request_and_its_staged_set(store: MemoryStore) {
        let responder = NodesResponder::new(ids(&[5, 5, 1]), &store).expect("stage candidates");
        assert_eq!(responder.requested(), ids(&[5, 5, 1]));
        assert!(responder.candidates().name().starts_with("tmp_nodes_"));
        assert_eq!(
            store.candidate_ids(responder.candidates()).expect("staged set"),
            ids(&[1, 5])
        );
    }

    #[rstest]
    fn staging_fault_precedes_any_output(store: MemoryStore) {
        let store = store.failing_staging();
        let err = NodesResponder::new(ids(&[1]), &store).expect_err("staging should fail");
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[rstest]
    fn panics_still_close_the_document(store: MemoryStore) {
        let store = store.panicking_fetch(ElementId::new(5));
        let responder = NodesResponder::new(ids(&[1, 5]), &store).expect("stage candidates");
        let mut formatter = RecordingFormatter::default();
        let outcome = catch_unwind(AssertUnwindSafe(|| responder.write(&mut formatter)));
        assert!(outcome.is_err(), "the store panic should propagate");
        assert_eq!(
            formatter.events(),
            [
                DocumentEvent::Begin,
                DocumentEvent::Node(ElementId::new(1)),
                DocumentEvent::Error(String::from("response generation was interrupted")),
                DocumentEvent::End,
            ]
        );
    }
}
