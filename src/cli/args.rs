//! Command-line arguments for the `queryparser` filter.
//!
//! The query itself always arrives on standard input; arguments only select
//! what is printed for it and how the runtime is configured.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::config::{DialectKind, TreeFormat};

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "queryparser",
    version,
    about = "Reads one SQL query from standard input and prints its syntax tree."
)]
pub struct QueryParserArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Tree output format. Overrides the configuration file.
    #[arg(long, value_enum, global = true)]
    pub format: Option<TreeFormat>,

    /// SQL dialect. Overrides the configuration file.
    #[arg(long, value_enum, global = true)]
    pub dialect: Option<DialectKind>,

    /// YAML runtime configuration.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log to stderr; repeat for more detail.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// What to print for the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Subcommand)]
pub enum Command {
    /// Print the syntax tree (default).
    #[default]
    Parse,
    /// Print the query with constants replaced by `$N` placeholders.
    Normalize,
    /// Print a hash shared by queries that differ only in constants.
    Fingerprint,
    /// Print the relations the query references as a JSON array.
    Tables,
}
