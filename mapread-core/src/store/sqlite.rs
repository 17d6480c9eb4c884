//! SQLite-backed [`ReadTransaction`] over a borrowed `rusqlite` transaction.
//!
//! The store expects the current-state tables of an OSM database:
//!
//! - `current_nodes (id, latitude, longitude, changeset_id, visible,
//!   timestamp, version)` with coordinates scaled by
//!   [`COORDINATE_SCALE`](crate::COORDINATE_SCALE),
//! - `current_node_tags (node_id, k, v)`,
//! - `changesets (id, user_id)` and `users (id, display_name, data_public)`.
//!
//! Candidate sets are staged as `TEMP` tables. They are created inside the
//! borrowed transaction and disappear when its owner rolls it back.

use std::fmt;

use log::debug;
use rusqlite::{OptionalExtension, Transaction};

use crate::{ElementId, Node, NodeAuthor, Tags, scaled_coordinate};

use super::{CandidateTable, ReadTransaction, StoreError};

const NODE_QUERY: &str = "SELECT n.longitude, n.latitude, n.version, n.changeset_id, n.timestamp,
        n.visible, u.id, u.display_name, u.data_public
    FROM current_nodes n
    LEFT JOIN changesets c ON c.id = n.changeset_id
    LEFT JOIN users u ON u.id = c.user_id
    WHERE n.id = ?1";

const TAGS_QUERY: &str = "SELECT k, v FROM current_node_tags WHERE node_id = ?1 ORDER BY k";

/// Read-only view of an active SQLite transaction.
///
/// The wrapper only holds a shared reference, so it cannot commit or roll
/// back the transaction it was given.
pub struct SqliteReadTransaction<'t, 'conn> {
    transaction: &'t Transaction<'conn>,
}

impl fmt::Debug for SqliteReadTransaction<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteReadTransaction")
            .field("autocommit", &self.transaction.is_autocommit())
            .finish_non_exhaustive()
    }
}

impl<'t, 'conn> SqliteReadTransaction<'t, 'conn> {
    /// Borrow `transaction` for read operations.
    pub const fn new(transaction: &'t Transaction<'conn>) -> Self {
        Self { transaction }
    }

    fn fetch_tags(&self, id: ElementId) -> Result<Tags, rusqlite::Error> {
        let mut statement = self.transaction.prepare_cached(TAGS_QUERY)?;
        let rows = statement.query_map([id.get()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect()
    }
}

/// Columns of a `current_nodes` row joined with its author.
struct NodeRow {
    longitude: i64,
    latitude: i64,
    version: u64,
    changeset: u64,
    timestamp: String,
    visible: bool,
    uid: Option<u64>,
    display_name: Option<String>,
    data_public: Option<bool>,
}

impl NodeRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            longitude: row.get(0)?,
            latitude: row.get(1)?,
            version: row.get(2)?,
            changeset: row.get(3)?,
            timestamp: row.get(4)?,
            visible: row.get(5)?,
            uid: row.get(6)?,
            display_name: row.get(7)?,
            data_public: row.get(8)?,
        })
    }

    fn into_node(self, id: ElementId, tags: Tags) -> Node {
        let author = match (self.uid, self.display_name, self.data_public) {
            (Some(uid), Some(display_name), Some(true)) => Some(NodeAuthor { uid, display_name }),
            _ => None,
        };
        Node {
            id,
            location: scaled_coordinate(self.longitude, self.latitude),
            version: self.version,
            changeset: self.changeset,
            timestamp: self.timestamp,
            visible: self.visible,
            author,
            tags,
        }
    }
}

impl ReadTransaction for SqliteReadTransaction<'_, '_> {
    fn stage_candidates(&self, ids: &[ElementId]) -> Result<CandidateTable, StoreError> {
        let table = CandidateTable::allocate();
        let name = table.name();
        let stage_error = |source| StoreError::Stage {
            table: name.to_owned(),
            source,
        };

        self.transaction
            .execute(
                &format!("CREATE TEMP TABLE {name} (id INTEGER PRIMARY KEY)"),
                [],
            )
            .map_err(stage_error)?;

        // One statement resolves the whole request; json_each turns the
        // identifier array into a set.
        let requested = serde_json::to_string(ids).map_err(StoreError::EncodeIds)?;
        let staged = self
            .transaction
            .execute(
                &format!(
                    "INSERT INTO {name} (id)
                     SELECT id FROM current_nodes
                     WHERE id IN (SELECT value FROM json_each(?1)) AND visible"
                ),
                [requested],
            )
            .map_err(stage_error)?;

        debug!(
            "staged {staged} of {} requested node ids into {name}",
            ids.len()
        );
        Ok(table)
    }

    fn candidate_ids(&self, candidates: &CandidateTable) -> Result<Vec<ElementId>, StoreError> {
        let name = candidates.name();
        let read_error = |source| StoreError::ReadCandidates {
            table: name.to_owned(),
            source,
        };
        let mut statement = self
            .transaction
            .prepare(&format!("SELECT id FROM {name} ORDER BY id"))
            .map_err(read_error)?;
        let rows = statement
            .query_map([], |row| row.get::<_, u64>(0).map(ElementId::new))
            .map_err(read_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(read_error)
    }

    fn fetch_node(&self, id: ElementId) -> Result<Node, StoreError> {
        let fetch_error = |source| StoreError::FetchNode { id, source };
        let row = self
            .transaction
            .prepare_cached(NODE_QUERY)
            .and_then(|mut statement| {
                statement
                    .query_row([id.get()], NodeRow::from_row)
                    .optional()
            })
            .map_err(fetch_error)?;
        let Some(row) = row else {
            return Err(StoreError::MissingNode { id });
        };
        let tags = self.fetch_tags(id).map_err(fetch_error)?;
        Ok(row.into_node(id, tags))
    }
}
