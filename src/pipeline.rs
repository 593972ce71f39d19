//! Parse-and-Translate Pipeline
//!
//! Runs the grammar inside a call arena and turns whatever happens into a
//! [`ParseOutcome`]. Grammar failures, panics included, are intercepted at
//! exactly one boundary ([`intercept`]) and never travel past the arena.
//!
//! Per call: `Idle → ArenaOpen → Parsing → {Serializing | ErrorCaptured} →
//! Done → ArenaClosed`.

use std::any::Any;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;
use tracing::{debug, trace};

use crate::analysis;
use crate::arena::{with_scoped_arena, CallArena};
use crate::config::TreeFormat;
use crate::errors::{format_diagnostic, Result, SyntaxDiagnostic};
use crate::grammar::{self, StructuredError, TreeHandle};
use crate::runtime::{runtime, Runtime};

/// Output for input that contains no statement.
pub const EMPTY_TREE_MARKER: &str = "[]";

// ============================================================================
// OUTCOMES
// ============================================================================

/// The result of one parse call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ParseOutcome {
    /// The tree, rendered as requested.
    Parsed { tree_text: String },
    /// The input held no statement (blank, comment-only, bare `;`).
    Empty,
    /// The input is not valid SQL.
    SyntaxError {
        message: String,
        /// 1-based character position of the failure.
        offset: Option<u32>,
    },
}

/// Two-way status reported to embedders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Success,
    Error,
}

impl ParseOutcome {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ParseOutcome::Parsed { .. })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ParseOutcome::Empty)
    }

    pub fn is_syntax_error(&self) -> bool {
        matches!(self, ParseOutcome::SyntaxError { .. })
    }

    pub fn status(&self) -> ParseStatus {
        match self {
            ParseOutcome::Parsed { .. } | ParseOutcome::Empty => ParseStatus::Success,
            ParseOutcome::SyntaxError { .. } => ParseStatus::Error,
        }
    }

    /// `"<message> (pos:<offset>)"` for syntax errors.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            ParseOutcome::SyntaxError { message, offset } => Some(format_diagnostic(message, *offset)),
            _ => None,
        }
    }

    /// A renderable diagnostic for syntax errors, bound to `query`.
    pub fn to_report(&self, query: &str) -> Option<SyntaxDiagnostic> {
        match self {
            ParseOutcome::SyntaxError { message, offset } => {
                Some(SyntaxDiagnostic::new(query, message, *offset))
            }
            _ => None,
        }
    }

    /// Collapses the outcome into the `(status, output)` pair embedders see.
    pub fn into_output(self) -> (ParseStatus, String) {
        match self {
            ParseOutcome::Parsed { tree_text } => (ParseStatus::Success, tree_text),
            ParseOutcome::Empty => (ParseStatus::Success, EMPTY_TREE_MARKER.to_string()),
            ParseOutcome::SyntaxError { message, offset } => {
                (ParseStatus::Error, format_diagnostic(&message, offset))
            }
        }
    }
}

/// What a successfully parsed tree is turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendering {
    Tree(TreeFormat),
    /// SQL with constants replaced by `$N` placeholders.
    Normalized,
    /// Hex SHA-256 of the normalized SQL.
    Fingerprint,
    /// JSON array of referenced relations.
    Tables,
}

impl From<TreeFormat> for Rendering {
    fn from(format: TreeFormat) -> Self {
        Rendering::Tree(format)
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Embedding entry point: parses with the configured tree format and returns
/// `(status, output)`. The output is owned by the caller.
pub fn do_parse(query: &str) -> Result<(ParseStatus, String)> {
    parse(query).map(ParseOutcome::into_output)
}

/// Parses `query`, rendering the tree in the runtime's configured format.
pub fn parse(query: &str) -> Result<ParseOutcome> {
    let format = runtime()?.config().tree_format;
    parse_as(query, Rendering::Tree(format))
}

/// Parses `query` inside a fresh call arena and renders it as requested.
///
/// Syntax errors come back as [`ParseOutcome::SyntaxError`]; `Err` is
/// reserved for fatal conditions (runtime not initialized, arena exhaustion,
/// rendering failure).
pub fn parse_as(query: &str, rendering: impl Into<Rendering>) -> Result<ParseOutcome> {
    let rendering = rendering.into();
    let runtime = runtime()?;
    let stats = runtime.stats_recorder();
    stats.record_call();

    let outcome = with_scoped_arena("parse", |arena| translate(runtime, arena, query, rendering))??;

    match &outcome {
        ParseOutcome::Parsed { tree_text } => {
            stats.record_parsed();
            debug!(?rendering, bytes = tree_text.len(), "query parsed");
        }
        ParseOutcome::Empty => {
            stats.record_empty();
            debug!("query holds no statement");
        }
        ParseOutcome::SyntaxError { message, offset } => {
            stats.record_syntax_error();
            debug!(%message, ?offset, "syntax error");
        }
    }
    Ok(outcome)
}

/// Replaces literal constants with `$N` placeholders.
pub fn normalize(query: &str) -> Result<ParseOutcome> {
    parse_as(query, Rendering::Normalized)
}

/// Fingerprint shared by queries that differ only in constants and layout.
pub fn fingerprint(query: &str) -> Result<ParseOutcome> {
    parse_as(query, Rendering::Fingerprint)
}

/// Relations referenced by `query`, as a JSON array.
pub fn tables(query: &str) -> Result<ParseOutcome> {
    parse_as(query, Rendering::Tables)
}

// ============================================================================
// PIPELINE BODY
// ============================================================================

fn translate(
    runtime: &Runtime,
    arena: &CallArena<'_>,
    query: &str,
    rendering: Rendering,
) -> Result<ParseOutcome> {
    let text = arena.alloc_str(query);
    trace!(arena = %arena.id(), chars = text.chars().count(), "parsing");

    match intercept(|| grammar::raw_parse(runtime, arena, text)) {
        Ok(tree) if tree.is_empty() => Ok(ParseOutcome::Empty),
        Ok(mut tree) => {
            trace!(arena = %arena.id(), statements = tree.len(), "serializing");
            let scratch = arena.child("serialize")?;
            let _current = scratch.make_current();
            let mut buffer = scratch.buffer();
            render(&mut tree, rendering, &scratch, &mut buffer)?;
            Ok(ParseOutcome::Parsed {
                tree_text: buffer.to_owned_string()?,
            })
        }
        Err(StructuredError { message, offset }) => {
            trace!(arena = %arena.id(), ?offset, "error captured");
            Ok(ParseOutcome::SyntaxError { message, offset })
        }
    }
}

fn render<W: io::Write>(
    tree: &mut TreeHandle<'_>,
    rendering: Rendering,
    scratch: &CallArena<'_>,
    sink: &mut W,
) -> Result<()> {
    match rendering {
        Rendering::Tree(format) => grammar::stringify(tree, format, sink),
        Rendering::Normalized => analysis::write_normalized(tree, sink),
        Rendering::Fingerprint => analysis::write_fingerprint(tree, scratch, sink),
        Rendering::Tables => analysis::write_tables(tree, sink),
    }
}

/// Runs the grammar, converting a panic into a structured failure.
fn intercept<'arena>(
    parse: impl FnOnce() -> std::result::Result<TreeHandle<'arena>, StructuredError>,
) -> std::result::Result<TreeHandle<'arena>, StructuredError> {
    catch_unwind(AssertUnwindSafe(parse)).unwrap_or_else(|payload| {
        Err(StructuredError::new(
            format!("internal parser failure: {}", panic_message(payload.as_ref())),
            None,
        ))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod pipeline_tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::arena::{context_depth, live_arenas};
    use crate::config::RuntimeConfig;
    use crate::runtime::initialize_runtime;

    fn init() {
        initialize_runtime(RuntimeConfig::default()).unwrap();
    }

    fn tree_text(outcome: ParseOutcome) -> String {
        match outcome {
            ParseOutcome::Parsed { tree_text } => tree_text,
            other => panic!("expected a parsed tree, got {:?}", other),
        }
    }

    #[test]
    fn test_select_one_is_parsed() {
        init();
        let text = tree_text(parse_as("SELECT 1;", TreeFormat::Json).unwrap());
        assert!(text.starts_with('['));
        assert!(text.contains("Query"));
        assert!(text.contains("\"1\""));
    }

    #[test]
    fn test_misspelled_keyword_is_syntax_error() {
        init();
        let outcome = parse_as("SELEC 1;", TreeFormat::Json).unwrap();
        assert!(outcome.is_syntax_error());
        let ParseOutcome::SyntaxError { message, offset } = &outcome else {
            unreachable!()
        };
        assert!(message.contains("syntax error"));
        assert_eq!(*offset, Some(1));
        assert_eq!(outcome.status(), ParseStatus::Error);
    }

    #[test]
    fn test_empty_input_is_empty_outcome() {
        init();
        for query in ["", "   \n\t", "-- just a comment", "/* block */", ";"] {
            let outcome = parse_as(query, TreeFormat::Json).unwrap();
            assert_eq!(outcome, ParseOutcome::Empty, "input {:?}", query);
            assert_eq!(outcome.status(), ParseStatus::Success);
        }
    }

    #[test]
    fn test_truncated_query_reports_end_of_input() {
        init();
        let outcome = parse_as("SELECT * FROM t WHERE", TreeFormat::Json).unwrap();
        assert!(matches!(outcome, ParseOutcome::SyntaxError { offset: Some(22), .. }));
    }

    #[test]
    fn test_sequential_calls_are_independent() {
        init();
        let one = tree_text(parse_as("SELECT 1;", TreeFormat::Sql).unwrap());
        let two = tree_text(parse_as("SELECT 2;", TreeFormat::Sql).unwrap());
        assert_eq!(one, "SELECT 1");
        assert_eq!(two, "SELECT 2");
    }

    #[test]
    fn test_arenas_are_reclaimed_on_every_path() {
        init();
        for query in ["SELECT 1", "SELEC 1", "", "SELECT * FROM t WHERE"] {
            parse_as(query, TreeFormat::Json).unwrap();
            assert_eq!(live_arenas(), 0, "after {:?}", query);
            assert_eq!(context_depth(), 0, "after {:?}", query);
        }
    }

    #[test]
    fn test_debug_format_dumps_nodes() {
        init();
        let text = tree_text(parse_as("SELECT a FROM t", TreeFormat::Debug).unwrap());
        assert!(text.contains("Query"));
        assert!(text.contains("Select"));
    }

    #[test]
    fn test_sql_format_joins_statements() {
        init();
        let text = tree_text(parse_as("select 1; select a from t", TreeFormat::Sql).unwrap());
        assert_eq!(text, "SELECT 1;\nSELECT a FROM t");
    }

    #[test]
    fn test_into_output_pairs() {
        assert_eq!(
            ParseOutcome::Empty.into_output(),
            (ParseStatus::Success, EMPTY_TREE_MARKER.to_string())
        );
        let error = ParseOutcome::SyntaxError {
            message: "syntax error: bad".to_string(),
            offset: Some(4),
        };
        assert_eq!(error.diagnostic().as_deref(), Some("syntax error: bad (pos:4)"));
        assert_eq!(
            error.into_output(),
            (ParseStatus::Error, "syntax error: bad (pos:4)".to_string())
        );
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let json = serde_json::to_string(&ParseOutcome::SyntaxError {
            message: "syntax error: x".to_string(),
            offset: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"outcome":"syntax_error","message":"syntax error: x","offset":null}"#);
    }

    #[test]
    fn test_intercept_turns_panic_into_failure() {
        let failure = intercept(|| panic!("grammar exploded")).unwrap_err();
        assert_eq!(failure.message, "internal parser failure: grammar exploded");
        assert_eq!(failure.offset, None);
    }

    #[test]
    fn test_normalize_and_fingerprint() {
        init();
        let normalized = tree_text(normalize("SELECT * FROM mytable WHERE col1 = 1").unwrap());
        assert_eq!(normalized, "SELECT * FROM mytable WHERE col1 = $1");

        let a = tree_text(fingerprint("SELECT * FROM mytable WHERE col1 = 1").unwrap());
        let b = tree_text(fingerprint("SELECT * FROM mytable WHERE col1 = 2").unwrap());
        let c = tree_text(fingerprint("select *\n  from mytable\n  where col1 = 2").unwrap());
        let d = tree_text(fingerprint("SELECT * FROM othertable WHERE col1 = 1").unwrap());
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_fingerprint_keeps_parameter_layout_apart() {
        init();
        let a = tree_text(fingerprint("SELECT * FROM t WHERE a = $1 AND b = 5").unwrap());
        let b = tree_text(fingerprint("SELECT * FROM t WHERE a = 7 AND b = $1").unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn test_tables_rendering() {
        init();
        let text = tree_text(tables("SELECT * FROM b JOIN a ON a.id = b.id").unwrap());
        assert_eq!(text, r#"["a","b"]"#);
    }

    #[test]
    fn test_analysis_reports_syntax_errors_too() {
        init();
        assert!(normalize("SELECT * FRO t").unwrap().is_syntax_error());
        assert!(fingerprint("").unwrap().is_empty());
    }
}
