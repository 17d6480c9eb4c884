//! Error types emitted by the mapread CLI.
//!
//! Only failures that happen before the document begins, or that prevent it
//! from being closed, surface here. Faults inside the document are written
//! into it by the responder.

use std::sync::Arc;

use camino::Utf8PathBuf;
use mapread_core::{FormatError, RequestError, StoreError};
use thiserror::Error;

/// Errors emitted by the mapread CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A referenced input path does not exist on disk or is not a file.
    #[error("{field} path {path:?} does not exist or is not a file")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// The requested output format is not supported.
    #[error("unsupported output format {format:?} (expected one of: json)")]
    UnsupportedFormat { format: String },
    /// The request was rejected before the document began.
    #[error("request rejected with status {}: {}", .0.status(), .0.reason())]
    Request(#[from] RequestError),
    /// Opening the SQLite database failed.
    #[error("failed to open database {path:?}: {source}")]
    OpenDatabase {
        path: Utf8PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    /// Starting the read transaction failed.
    #[error("failed to begin read transaction: {0}")]
    BeginTransaction(#[source] rusqlite::Error),
    /// Rolling back the read transaction failed.
    #[error("failed to end read transaction: {0}")]
    EndTransaction(#[source] rusqlite::Error),
    /// Staging the candidate set failed before the document began.
    #[error("failed to stage requested nodes: {0}")]
    Stage(#[from] StoreError),
    /// The document could not be closed on the output stream.
    #[error("failed to write nodes document: {0}")]
    WriteOutput(#[from] FormatError),
}
