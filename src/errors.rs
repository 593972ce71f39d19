//! queryparser Error Handling
//!
//! Two families of failure exist and they never mix:
//!
//! - [`QueryParserError`]: conditions that end a call without an outcome
//!   (runtime not initialized, arena exhaustion, bad configuration, I/O).
//! - Syntax errors, which are ordinary [`crate::ParseOutcome`] values. For rich
//!   rendering they can be wrapped in a [`SyntaxDiagnostic`].

use std::sync::Arc;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

// ============================================================================
// FATAL ERRORS - Conditions that terminate a call
// ============================================================================

/// Unified error type for every failure that is not a syntax error.
#[derive(Debug, Error, Diagnostic)]
pub enum QueryParserError {
    /// An entry point was used before [`crate::initialize_runtime`].
    #[error("parser runtime is not initialized")]
    #[diagnostic(
        code(queryparser::runtime::uninitialized),
        help("call `initialize_runtime` once before the first parse")
    )]
    RuntimeNotInitialized,

    /// The call arena could not reserve its initial region.
    #[error("unable to allocate a call arena of {capacity} bytes")]
    #[diagnostic(code(queryparser::arena::exhausted))]
    ArenaExhausted { capacity: usize },

    /// Invalid runtime configuration.
    #[error("invalid configuration: {message}")]
    #[diagnostic(code(queryparser::config))]
    Config { message: String },

    /// The serializer failed while writing a tree.
    #[error("failed to render parse tree: {message}")]
    #[diagnostic(code(queryparser::render))]
    Render { message: String },

    #[error("io error: {0}")]
    #[diagnostic(code(queryparser::io))]
    Io(#[from] std::io::Error),
}

impl QueryParserError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        QueryParserError::Config {
            message: message.into(),
        }
    }

    pub(crate) fn render(message: impl std::fmt::Display) -> Self {
        QueryParserError::Render {
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for QueryParserError {
    fn from(err: serde_json::Error) -> Self {
        QueryParserError::render(err)
    }
}

impl From<serde_yaml::Error> for QueryParserError {
    fn from(err: serde_yaml::Error) -> Self {
        QueryParserError::config(err.to_string())
    }
}

/// Standard result alias.
pub type Result<T> = std::result::Result<T, QueryParserError>;

// ============================================================================
// SYNTAX DIAGNOSTICS - Presentation of syntax-error outcomes
// ============================================================================

/// A syntax-error outcome bound to the query it came from.
///
/// The `Display` text is the single-line diagnostic (`"<message> (pos:<offset>)"`),
/// and the label points at the offending character when the offset is known.
#[derive(Debug, Error, Diagnostic)]
#[error("{diagnostic}")]
#[diagnostic(code(queryparser::syntax))]
pub struct SyntaxDiagnostic {
    diagnostic: String,
    #[source_code]
    source_code: Arc<NamedSource<String>>,
    #[label("{label}")]
    span: Option<SourceSpan>,
    label: String,
}

impl SyntaxDiagnostic {
    /// Builds a diagnostic from a message and a 1-based character offset.
    pub fn new(query: &str, message: &str, offset: Option<u32>) -> Self {
        let span = offset.and_then(|pos| char_offset_to_span(query, pos));
        Self {
            diagnostic: format_diagnostic(message, offset),
            source_code: Arc::new(NamedSource::new("query", query.to_string())),
            span,
            label: message.to_string(),
        }
    }

    /// The single-line diagnostic text.
    pub fn diagnostic(&self) -> &str {
        &self.diagnostic
    }

    /// Byte span of the label, if the offset could be located.
    pub fn span(&self) -> Option<SourceSpan> {
        self.span
    }
}

/// Formats a syntax error the way every embedding reports it.
pub fn format_diagnostic(message: &str, offset: Option<u32>) -> String {
    match offset {
        Some(pos) => format!("{} (pos:{})", message, pos),
        None => message.to_string(),
    }
}

/// Converts a 1-based character position into a one-character byte span.
/// Positions one past the end map to an empty span at the end of input.
fn char_offset_to_span(query: &str, pos: u32) -> Option<SourceSpan> {
    let index = (pos as usize).checked_sub(1)?;
    match query.char_indices().nth(index) {
        Some((start, ch)) => Some(SourceSpan::new(start.into(), ch.len_utf8())),
        None if index == query.chars().count() => Some(SourceSpan::new(query.len().into(), 0)),
        None => None,
    }
}
