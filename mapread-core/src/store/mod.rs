//! Read access to stored nodes through a borrowed transaction.
//!
//! A [`ReadTransaction`] stages the requested identifiers as a candidate set
//! in one bulk operation, then hands out the staged identifiers and the
//! nodes behind them one at a time. Implementations only ever read; the
//! transaction's lifecycle belongs to whoever opened it.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::{ElementId, Node};

#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteReadTransaction;

/// Prefix shared by every staged candidate table.
pub const CANDIDATE_TABLE_PREFIX: &str = "tmp_nodes";

static NEXT_CANDIDATE_TABLE: AtomicU64 = AtomicU64::new(0);

/// Handle naming one staged candidate set.
///
/// Names are unique within the process, so candidate sets staged by
/// concurrent requests over pooled connections never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateTable {
    name: String,
}

impl CandidateTable {
    /// Reserve a fresh, process-unique candidate table name.
    ///
    /// # Examples
    /// ```
    /// use mapread_core::CandidateTable;
    ///
    /// let first = CandidateTable::allocate();
    /// let second = CandidateTable::allocate();
    /// assert_ne!(first.name(), second.name());
    /// assert!(first.name().starts_with("tmp_nodes_"));
    /// ```
    pub fn allocate() -> Self {
        let serial = NEXT_CANDIDATE_TABLE.fetch_add(1, Ordering::Relaxed);
        Self {
            name: format!("{CANDIDATE_TABLE_PREFIX}_{serial}"),
        }
    }

    /// Name of the staged table. Only ASCII letters, digits and underscores.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Errors raised by a [`ReadTransaction`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Materializing the candidate set failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to stage candidate table {table}: {source}")]
    Stage {
        /// Name of the candidate table being created.
        table: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Reading identifiers back from the candidate set failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to read candidate table {table}: {source}")]
    ReadCandidates {
        /// Name of the candidate table being read.
        table: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Fetching a node or its tags failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to fetch node {id}: {source}")]
    FetchNode {
        /// Identifier of the node being fetched.
        id: ElementId,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Encoding the requested identifiers for the store failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to encode requested identifiers: {0}")]
    EncodeIds(#[source] serde_json::Error),
    /// A staged candidate was missing when its node was fetched.
    #[error("node {id} listed as a candidate is missing from the store")]
    MissingNode {
        /// Identifier of the missing node.
        id: ElementId,
    },
    /// The candidate set was not staged through this transaction.
    #[error("candidate table {table} was not staged by this transaction")]
    UnknownCandidates {
        /// Name of the unknown candidate table.
        table: String,
    },
    /// The store could not be reached.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Human-readable explanation.
        reason: String,
    },
}

/// Read operations the nodes responder issues against an active transaction.
///
/// Implementations borrow a transaction owned by the caller. They must not
/// commit, roll back or close it, and staged candidate sets must not outlive
/// it.
///
/// # Examples
///
/// ```rust
/// use std::{cell::RefCell, collections::BTreeMap};
/// use geo::Coord;
/// use mapread_core::{CandidateTable, ElementId, Node, ReadTransaction, StoreError};
///
/// struct SingleNode {
///     node: Node,
///     staged: RefCell<BTreeMap<String, Vec<ElementId>>>,
/// }
///
/// impl ReadTransaction for SingleNode {
///     fn stage_candidates(&self, ids: &[ElementId]) -> Result<CandidateTable, StoreError> {
///         let table = CandidateTable::allocate();
///         let hit = ids.contains(&self.node.id) && self.node.visible;
///         let rows = if hit { vec![self.node.id] } else { Vec::new() };
///         self.staged.borrow_mut().insert(table.name().to_owned(), rows);
///         Ok(table)
///     }
///
///     fn candidate_ids(&self, table: &CandidateTable) -> Result<Vec<ElementId>, StoreError> {
///         self.staged
///             .borrow()
///             .get(table.name())
///             .cloned()
///             .ok_or_else(|| StoreError::UnknownCandidates { table: table.name().to_owned() })
///     }
///
///     fn fetch_node(&self, id: ElementId) -> Result<Node, StoreError> {
///         if id == self.node.id {
///             Ok(self.node.clone())
///         } else {
///             Err(StoreError::MissingNode { id })
///         }
///     }
/// }
///
/// let store = SingleNode {
///     node: Node::new(ElementId::new(1), Coord { x: 0.0, y: 0.0 }),
///     staged: RefCell::new(BTreeMap::new()),
/// };
/// let table = store.stage_candidates(&[ElementId::new(1), ElementId::new(2)])?;
/// assert_eq!(store.candidate_ids(&table)?, vec![ElementId::new(1)]);
/// # Ok::<(), StoreError>(())
/// ```
pub trait ReadTransaction {
    /// Stage the identifiers in `ids` that exist and are visible.
    ///
    /// This is a single bulk operation: the staged set reflects one
    /// consistent view of the store, and later visibility changes do not
    /// affect it. Duplicate identifiers stage a single row.
    fn stage_candidates(&self, ids: &[ElementId]) -> Result<CandidateTable, StoreError>;

    /// Return the staged identifiers in ascending order.
    fn candidate_ids(&self, candidates: &CandidateTable) -> Result<Vec<ElementId>, StoreError>;

    /// Fetch one node with its tags and author.
    fn fetch_node(&self, id: ElementId) -> Result<Node, StoreError>;
}

impl<T: ReadTransaction + ?Sized> ReadTransaction for &T {
    fn stage_candidates(&self, ids: &[ElementId]) -> Result<CandidateTable, StoreError> {
        (**self).stage_candidates(ids)
    }

    fn candidate_ids(&self, candidates: &CandidateTable) -> Result<Vec<ElementId>, StoreError> {
        (**self).candidate_ids(candidates)
    }

    fn fetch_node(&self, id: ElementId) -> Result<Node, StoreError> {
        (**self).fetch_node(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;
    use geo::Coord;
    use rstest::{fixture, rstest};

    fn node(id: u64) -> Node {
        Node::new(ElementId::new(id), Coord { x: 0.0, y: 0.0 })
    }

    #[fixture]
    fn store() -> MemoryStore {
        MemoryStore::with_nodes([node(1), node(2).deleted(), node(4), node(5)])
    }

    #[rstest]
    fn allocated_names_are_unique() {
        let names: std::collections::BTreeSet<_> = (0..32)
            .map(|_| CandidateTable::allocate().name().to_owned())
            .collect();
        assert_eq!(names.len(), 32);
        assert!(names.iter().all(|name| {
            name.chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }));
    }

    #[rstest]
    fn stages_only_requested_visible_nodes(store: MemoryStore) {
        let requested = [5, 2, 3, 1, 5].map(ElementId::new);
        let table = store.stage_candidates(&requested).expect("stage candidates");
        let staged = store.candidate_ids(&table).expect("read candidates");
        assert_eq!(staged, vec![ElementId::new(1), ElementId::new(5)]);
    }

    #[rstest]
    fn staged_sets_are_independent(store: MemoryStore) {
        let first = store
            .stage_candidates(&[ElementId::new(1)])
            .expect("stage first");
        let second = store
            .stage_candidates(&[ElementId::new(4)])
            .expect("stage second");
        assert_ne!(first, second);
        assert_eq!(store.staged_tables(), 2);
        assert_eq!(
            store.candidate_ids(&first).expect("read first"),
            vec![ElementId::new(1)]
        );
        assert_eq!(
            store.candidate_ids(&second).expect("read second"),
            vec![ElementId::new(4)]
        );
    }

    #[rstest]
    fn rejects_foreign_candidate_tables(store: MemoryStore) {
        let foreign = CandidateTable::allocate();
        let err = store
            .candidate_ids(&foreign)
            .expect_err("foreign table should be rejected");
        assert!(matches!(err, StoreError::UnknownCandidates { .. }));
    }
}
