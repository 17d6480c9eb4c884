//! Nodes command implementation for the mapread CLI.

use std::{io::Write, str::FromStr};

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::warn;
use mapread_core::{
    HttpRequest, JsonFormatter, NodesResponder, OutputFormatter, READ_METHOD,
    SqliteReadTransaction, WriteReport, validate_request,
};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::{ARG_DATABASE, ARG_FORMAT, ARG_METHOD, ARG_QUERY, CliError, ENV_DATABASE};

/// CLI arguments for the `nodes` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Answer one nodes request against a SQLite database. The \
                 request is given as a method and a raw query string such \
                 as `ids=1,2,3`; the visible matches are streamed to stdout \
                 in ascending identifier order.",
    about = "Stream nodes by identifier"
)]
#[ortho_config(prefix = "MAPREAD")]
pub(crate) struct NodesArgs {
    /// Path to the SQLite database holding the current node tables.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Request method; anything but GET is rejected.
    #[arg(long = ARG_METHOD, value_name = "method")]
    #[serde(default)]
    pub(crate) method: Option<String>,
    /// Raw query string, e.g. `ids=1,2,3`.
    #[arg(long = ARG_QUERY, value_name = "query")]
    #[serde(default)]
    pub(crate) query: Option<String>,
    /// Output format of the streamed document.
    #[arg(long = ARG_FORMAT, value_name = "format")]
    #[serde(default)]
    pub(crate) format: Option<String>,
}

impl NodesArgs {
    pub(crate) fn into_config(self) -> Result<NodesConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        NodesConfig::try_from(merged)
    }
}

/// Wire formats the CLI can stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum OutputFormat {
    #[default]
    Json,
}

impl OutputFormat {
    fn formatter<'w, W: Write + 'w>(self, out: W) -> Box<dyn OutputFormatter + 'w> {
        match self {
            Self::Json => Box::new(JsonFormatter::new(out)),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(CliError::UnsupportedFormat {
                format: value.to_owned(),
            })
        }
    }
}

/// Resolved `nodes` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodesConfig {
    /// Path to the SQLite database.
    pub(crate) database: Utf8PathBuf,
    /// Request method handed to validation.
    pub(crate) method: String,
    /// Raw query string handed to validation.
    pub(crate) query: String,
    /// Output format of the document.
    pub(crate) format: OutputFormat,
}

impl NodesConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        Self::require_existing(&self.database, ARG_DATABASE)
    }

    fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
        if path.is_file() {
            Ok(())
        } else {
            Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            })
        }
    }

    fn request(&self) -> HttpRequest {
        HttpRequest::new(self.method.as_str(), self.query.as_str())
    }
}

impl TryFrom<NodesArgs> for NodesConfig {
    type Error = CliError;

    fn try_from(args: NodesArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_DATABASE,
        })?;
        let format = args
            .format
            .as_deref()
            .map_or(Ok(OutputFormat::default()), OutputFormat::from_str)?;
        Ok(Self {
            database,
            method: args.method.unwrap_or_else(|| READ_METHOD.to_owned()),
            query: args.query.unwrap_or_default(),
            format,
        })
    }
}

pub(crate) fn run_nodes(args: NodesArgs, out: &mut dyn Write) -> Result<WriteReport, CliError> {
    let config = resolve_nodes_config(args)?;
    execute(&config, out)
}

fn resolve_nodes_config(args: NodesArgs) -> Result<NodesConfig, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    Ok(config)
}

/// Answer the configured request, streaming the document into `out`.
///
/// The request is validated before the database is touched. The read
/// transaction is always rolled back; nothing is ever committed.
pub(crate) fn execute(config: &NodesConfig, out: &mut dyn Write) -> Result<WriteReport, CliError> {
    let ids = validate_request(&config.request())?;
    let mut connection =
        Connection::open_with_flags(config.database.as_std_path(), OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|source| CliError::OpenDatabase {
                path: config.database.clone(),
                source,
            })?;
    let transaction = connection
        .transaction()
        .map_err(CliError::BeginTransaction)?;

    let report = {
        let store = SqliteReadTransaction::new(&transaction);
        let responder = NodesResponder::new(ids, &store)?;
        let mut formatter = config.format.formatter(out);
        responder.write(&mut formatter)?
    };
    if let Some(fault) = &report.fault {
        warn!(
            "nodes document for {:?} ended early after {} nodes: {fault}",
            config.query, report.nodes_written
        );
    }

    transaction.rollback().map_err(CliError::EndTransaction)?;
    Ok(report)
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<NodesConfig, CliError> {
    let merged = NodesArgs::merge_from_layers(layers).map_err(CliError::from)?;
    NodesConfig::try_from(merged)
}
