//! Test helpers for building node databases and running the nodes command.

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use mapread_core::{ElementId, Node, WriteReport, test_support::write_sqlite_database};
use tempfile::TempDir;

use crate::nodes::{NodesArgs, run_nodes};
use super::*;

/// SQLite database with tagged node 1, deleted node 2 and plain node 3.
pub(super) struct NodesDatabase {
    _dir: TempDir,
    path: Utf8PathBuf,
}

impl NodesDatabase {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
        let path = root.join("nodes.db");
        let nodes = [
            Node::new(ElementId::new(1), Coord { x: -0.1, y: 51.5 })
                .with_revision(2, 5, "2024-06-01T12:00:00Z")
                .with_author(7, "surveyor")
                .with_tag("amenity", "bench"),
            Node::new(ElementId::new(2), Coord { x: 0.0, y: 0.0 }).deleted(),
            Node::new(ElementId::new(3), Coord { x: 13.4, y: 52.5 }),
        ];
        write_sqlite_database(path.as_std_path(), &nodes).expect("write nodes database");
        Self { _dir: dir, path }
    }

    pub(super) fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub(super) fn root(&self) -> &Utf8Path {
        self.path.parent().expect("database lives in a directory")
    }
}

impl std::fmt::Debug for NodesDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodesDatabase")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Parse `argv` and run the nodes command, capturing stdout.
pub(super) fn run_cli(argv: &[String]) -> (Result<WriteReport, CliError>, Vec<u8>) {
    let mut stdout = Vec::new();
    let outcome = Cli::try_parse_from(argv)
        .map_err(CliError::ArgumentParsing)
        .and_then(|cli| match cli.command {
            Command::Nodes(args) => run_nodes(args, &mut stdout),
        });
    (outcome, stdout)
}

/// Build `NodesArgs` pointing at `database` with the given query.
pub(super) fn args_for(database: &Utf8Path, query: &str) -> NodesArgs {
    NodesArgs {
        database: Some(database.to_path_buf()),
        query: Some(query.to_owned()),
        ..NodesArgs::default()
    }
}
