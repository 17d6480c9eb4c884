//! Test doubles for the node read path, shared by unit and behaviour tests.

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    error::Error as StdError,
    io,
};

use crate::{
    CandidateTable, ElementId, FormatError, Node, OutputFormatter, ReadTransaction, StoreError,
    fault_message, formatter::DocumentState,
};

/// In-memory [`ReadTransaction`] with scriptable faults.
///
/// Candidate sets live in a map keyed by table name, so the store behaves
/// like a transaction that only knows the sets it staged itself.
#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: BTreeMap<ElementId, Node>,
    staged: RefCell<BTreeMap<String, Vec<ElementId>>>,
    failing_fetch: BTreeSet<ElementId>,
    panicking_fetch: BTreeSet<ElementId>,
    failing_staging: bool,
}

impl MemoryStore {
    /// Create a store from a collection of nodes, deleted ones included.
    pub fn with_nodes<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = Node>,
    {
        Self {
            nodes: nodes.into_iter().map(|node| (node.id, node)).collect(),
            ..Self::default()
        }
    }

    /// Make fetching `id` fail with [`StoreError::Unavailable`].
    #[must_use]
    pub fn failing_fetch(mut self, id: ElementId) -> Self {
        self.failing_fetch.insert(id);
        self
    }

    /// Make fetching `id` panic.
    #[must_use]
    pub fn panicking_fetch(mut self, id: ElementId) -> Self {
        self.panicking_fetch.insert(id);
        self
    }

    /// Make staging fail with [`StoreError::Unavailable`].
    #[must_use]
    pub fn failing_staging(mut self) -> Self {
        self.failing_staging = true;
        self
    }

    /// Forget every staged candidate set, as if the transaction was reset.
    pub fn lose_staged_tables(&self) {
        self.staged.borrow_mut().clear();
    }

    /// Number of candidate sets currently staged.
    pub fn staged_tables(&self) -> usize {
        self.staged.borrow().len()
    }
}

impl ReadTransaction for MemoryStore {
    fn stage_candidates(&self, ids: &[ElementId]) -> Result<CandidateTable, StoreError> {
        if self.failing_staging {
            return Err(StoreError::Unavailable {
                reason: String::from("staging disabled"),
            });
        }
        let table = CandidateTable::allocate();
        let rows: BTreeSet<ElementId> = ids
            .iter()
            .copied()
            .filter(|id| self.nodes.get(id).is_some_and(|node| node.visible))
            .collect();
        self.staged
            .borrow_mut()
            .insert(table.name().to_owned(), rows.into_iter().collect());
        Ok(table)
    }

    fn candidate_ids(&self, candidates: &CandidateTable) -> Result<Vec<ElementId>, StoreError> {
        self.staged
            .borrow()
            .get(candidates.name())
            .cloned()
            .ok_or_else(|| StoreError::UnknownCandidates {
                table: candidates.name().to_owned(),
            })
    }

    fn fetch_node(&self, id: ElementId) -> Result<Node, StoreError> {
        if self.panicking_fetch.contains(&id) {
            panic!("scripted panic while fetching node {id}");
        }
        if self.failing_fetch.contains(&id) {
            return Err(StoreError::Unavailable {
                reason: format!("node {id} could not be read"),
            });
        }
        self.nodes
            .get(&id)
            .cloned()
            .ok_or(StoreError::MissingNode { id })
    }
}

/// One call observed by a [`RecordingFormatter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// `begin_document`.
    Begin,
    /// `write_node` for the given node.
    Node(ElementId),
    /// `error` with the rendered fault message.
    Error(String),
    /// `end_document`.
    End,
}

/// [`OutputFormatter`] recording accepted calls, with scriptable faults.
///
/// Calls arriving in the wrong phase are rejected the same way the real
/// formatters reject them. Rejected calls are not recorded.
#[derive(Debug)]
pub struct RecordingFormatter {
    events: Vec<DocumentEvent>,
    state: DocumentState,
    node_budget: Option<usize>,
    reject_begin: bool,
    reject_errors: bool,
    reject_end: bool,
}

impl Default for RecordingFormatter {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            state: DocumentState::new(),
            node_budget: None,
            reject_begin: false,
            reject_errors: false,
            reject_end: false,
        }
    }
}

fn transport_fault(operation: &str) -> FormatError {
    FormatError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("{operation} rejected by the test transport"),
    ))
}

impl RecordingFormatter {
    /// Fail every `write_node` call after the first `nodes` succeed.
    #[must_use]
    pub fn failing_after(mut self, nodes: usize) -> Self {
        self.node_budget = Some(nodes);
        self
    }

    /// Fail every `begin_document` call.
    #[must_use]
    pub fn rejecting_begin(mut self) -> Self {
        self.reject_begin = true;
        self
    }

    /// Fail every `error` call.
    #[must_use]
    pub fn rejecting_errors(mut self) -> Self {
        self.reject_errors = true;
        self
    }

    /// Fail every `end_document` call.
    #[must_use]
    pub fn rejecting_end(mut self) -> Self {
        self.reject_end = true;
        self
    }

    /// Calls accepted so far, in order.
    pub fn events(&self) -> &[DocumentEvent] {
        &self.events
    }

    /// Identifiers of the nodes written so far.
    pub fn node_ids(&self) -> Vec<ElementId> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DocumentEvent::Node(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Number of error markers written.
    pub fn error_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, DocumentEvent::Error(_)))
            .count()
    }

    /// Whether an error marker was written.
    pub fn has_error(&self) -> bool {
        self.error_count() > 0
    }

    /// Rendered message of the error marker, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.events.iter().find_map(|event| match event {
            DocumentEvent::Error(message) => Some(message.as_str()),
            _ => None,
        })
    }

    /// Whether the document was opened and then closed.
    pub fn is_closed(&self) -> bool {
        self.events.first() == Some(&DocumentEvent::Begin)
            && self.events.last() == Some(&DocumentEvent::End)
    }
}

impl OutputFormatter for RecordingFormatter {
    fn begin_document(&mut self) -> Result<(), FormatError> {
        if self.reject_begin {
            return Err(transport_fault("begin_document"));
        }
        self.state.begin()?;
        self.events.push(DocumentEvent::Begin);
        Ok(())
    }

    fn write_node(&mut self, node: &Node) -> Result<(), FormatError> {
        self.state.node()?;
        if let Some(budget) = self.node_budget {
            if budget == 0 {
                return Err(transport_fault("write_node"));
            }
            self.node_budget = Some(budget - 1);
        }
        self.events.push(DocumentEvent::Node(node.id));
        Ok(())
    }

    fn error(&mut self, fault: &(dyn StdError + 'static)) -> Result<(), FormatError> {
        if self.reject_errors {
            return Err(transport_fault("error"));
        }
        self.state.error()?;
        self.events.push(DocumentEvent::Error(fault_message(fault)));
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), FormatError> {
        if self.reject_end {
            return Err(transport_fault("end_document"));
        }
        self.state.end()?;
        self.events.push(DocumentEvent::End);
        Ok(())
    }
}

#[cfg(feature = "store-sqlite")]
mod sqlite {
    use std::path::Path;

    use rusqlite::{Connection, params};

    use crate::{COORDINATE_SCALE, Node};

    const SCHEMA: &str = "
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            display_name TEXT NOT NULL,
            data_public BOOLEAN NOT NULL DEFAULT 0
        );
        CREATE TABLE changesets (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users (id)
        );
        CREATE TABLE current_nodes (
            id INTEGER PRIMARY KEY,
            latitude INTEGER NOT NULL,
            longitude INTEGER NOT NULL,
            changeset_id INTEGER NOT NULL,
            visible BOOLEAN NOT NULL,
            timestamp TEXT NOT NULL,
            version INTEGER NOT NULL
        );
        CREATE TABLE current_node_tags (
            node_id INTEGER NOT NULL REFERENCES current_nodes (id),
            k TEXT NOT NULL,
            v TEXT NOT NULL,
            PRIMARY KEY (node_id, k)
        );";

    /// Create the current-state node tables.
    pub fn create_schema(connection: &Connection) -> rusqlite::Result<()> {
        connection.execute_batch(SCHEMA)
    }

    /// Insert a user whose edits are public when `public` is set.
    pub fn insert_user(
        connection: &Connection,
        uid: u64,
        display_name: &str,
        public: bool,
    ) -> rusqlite::Result<()> {
        connection.execute(
            "INSERT OR REPLACE INTO users (id, display_name, data_public) VALUES (?1, ?2, ?3)",
            params![uid, display_name, public],
        )?;
        Ok(())
    }

    fn fixed_point(degrees: f64) -> i64 {
        (degrees * COORDINATE_SCALE as f64).round() as i64
    }

    /// Insert `node` with its tags.
    ///
    /// Authored nodes also get a public user and a changeset linking the
    /// two. Unauthored nodes reference their changeset without inserting it.
    pub fn insert_node(connection: &Connection, node: &Node) -> rusqlite::Result<()> {
        if let Some(author) = &node.author {
            insert_user(connection, author.uid, &author.display_name, true)?;
            connection.execute(
                "INSERT OR REPLACE INTO changesets (id, user_id) VALUES (?1, ?2)",
                params![node.changeset, author.uid],
            )?;
        }
        connection.execute(
            "INSERT INTO current_nodes
                (id, latitude, longitude, changeset_id, visible, timestamp, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                node.id.get(),
                fixed_point(node.location.y),
                fixed_point(node.location.x),
                node.changeset,
                node.visible,
                node.timestamp,
                node.version,
            ],
        )?;
        let mut insert_tag = connection
            .prepare("INSERT INTO current_node_tags (node_id, k, v) VALUES (?1, ?2, ?3)")?;
        for (key, value) in &node.tags {
            insert_tag.execute(params![node.id.get(), key, value])?;
        }
        Ok(())
    }

    /// Persist `nodes` into a fresh SQLite database at `path`.
    pub fn write_sqlite_database(path: &Path, nodes: &[Node]) -> rusqlite::Result<()> {
        let mut connection = Connection::open(path)?;
        let transaction = connection.transaction()?;
        create_schema(&transaction)?;
        for node in nodes {
            insert_node(&transaction, node)?;
        }
        transaction.commit()
    }
}

#[cfg(feature = "store-sqlite")]
pub use sqlite::{create_schema, insert_node, insert_user, write_sqlite_database};
