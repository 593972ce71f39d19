//! Embeddable SQL query parsing.
//!
//! Each call parses one query inside its own arena and yields a
//! [`ParseOutcome`]: the rendered syntax tree, an empty-tree marker, or a
//! syntax error with a 1-based character offset.
//!
//! ```no_run
//! use queryparser::{do_parse, initialize_runtime, ParseStatus, RuntimeConfig};
//!
//! initialize_runtime(RuntimeConfig::default())?;
//! let (status, output) = do_parse("SELECT 1;")?;
//! assert_eq!(status, ParseStatus::Success);
//! println!("{output}");
//! # Ok::<(), queryparser::QueryParserError>(())
//! ```

pub use crate::config::{DialectKind, RuntimeConfig, TreeFormat};
pub use crate::errors::{format_diagnostic, QueryParserError, Result, SyntaxDiagnostic};
pub use crate::pipeline::{
    do_parse, fingerprint, normalize, parse, parse_as, tables, ParseOutcome, ParseStatus,
    Rendering, EMPTY_TREE_MARKER,
};
pub use crate::runtime::{initialize_runtime, runtime, Runtime, StatsSnapshot};

pub mod analysis;
pub mod arena;
pub mod cli;
pub mod config;
pub mod errors;
pub mod ffi;
pub mod grammar;
pub mod pipeline;
pub mod runtime;
