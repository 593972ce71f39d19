//! Grammar bridge.
//!
//! The SQL grammar and its AST come from `sqlparser`. This module exposes the
//! two capabilities the pipeline consumes, [`raw_parse`] and [`stringify`],
//! and turns the grammar's error text into a [`StructuredError`] with a
//! 1-based character offset.

use std::io;

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::parser::{Parser, ParserError};

use crate::arena::CallArena;
use crate::config::TreeFormat;
use crate::errors::Result;
use crate::runtime::Runtime;

/// Prefix of every syntax-error message.
pub const SYNTAX_ERROR_PREFIX: &str = "syntax error: ";

/// Location suffix the grammar appends to its messages. Older grammar
/// releases print `Column` without a colon.
static LOCATION_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(?P<message>.*?)\s*at Line: (?P<line>\d+), Column:? (?P<column>\d+)\s*$")
        .expect("location pattern is valid")
});

// ============================================================================
// TREE HANDLE
// ============================================================================

/// Parsed statements, owned by the arena of the call that produced them.
pub struct TreeHandle<'arena> {
    statements: bumpalo::boxed::Box<'arena, Vec<Statement>>,
}

impl TreeHandle<'_> {
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn statements_mut(&mut self) -> &mut Vec<Statement> {
        &mut self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// True for statement-less input (blank, comments, bare `;`).
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl std::fmt::Debug for TreeHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeHandle")
            .field("statements", &self.statements.len())
            .finish()
    }
}

/// A failure raised by the grammar: what went wrong and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredError {
    pub message: String,
    /// 1-based character position in the query text.
    pub offset: Option<u32>,
}

impl StructuredError {
    pub fn new(message: impl Into<String>, offset: Option<u32>) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

// ============================================================================
// CAPABILITIES
// ============================================================================

/// Parses `text` with the runtime's dialect, boxing the tree into `arena`.
pub fn raw_parse<'arena>(
    runtime: &Runtime,
    arena: &'arena CallArena<'_>,
    text: &str,
) -> std::result::Result<TreeHandle<'arena>, StructuredError> {
    let statements = Parser::new(runtime.dialect())
        .with_recursion_limit(runtime.config().recursion_limit)
        .try_with_sql(text)
        .and_then(|mut parser| parser.parse_statements())
        .map_err(|err| translate_error(err, text))?;

    Ok(TreeHandle {
        statements: bumpalo::boxed::Box::new_in(statements, arena.bump()),
    })
}

/// Writes the tree to `sink` in the requested format.
pub fn stringify<W: io::Write>(tree: &TreeHandle<'_>, format: TreeFormat, sink: &mut W) -> Result<()> {
    let statements = tree.statements();
    match format {
        TreeFormat::Json => serde_json::to_writer(&mut *sink, statements)?,
        TreeFormat::PrettyJson => serde_json::to_writer_pretty(&mut *sink, statements)?,
        TreeFormat::Debug => write!(sink, "{:#?}", statements)?,
        TreeFormat::Sql => write_sql(statements, sink)?,
    }
    Ok(())
}

/// Canonical SQL for a statement list, one statement per line.
pub(crate) fn write_sql<W: io::Write>(statements: &[Statement], sink: &mut W) -> io::Result<()> {
    for (i, statement) in statements.iter().enumerate() {
        if i > 0 {
            sink.write_all(b";\n")?;
        }
        write!(sink, "{}", statement)?;
    }
    Ok(())
}

// ============================================================================
// ERROR TRANSLATION
// ============================================================================

pub(crate) fn translate_error(err: ParserError, text: &str) -> StructuredError {
    let detail = match err {
        ParserError::TokenizerError(detail) | ParserError::ParserError(detail) => detail,
        ParserError::RecursionLimitExceeded => {
            return StructuredError::new(
                format!("{SYNTAX_ERROR_PREFIX}statement nesting exceeds the recursion limit"),
                None,
            )
        }
    };
    let (message, offset) = split_location(&detail, text);
    StructuredError::new(format!("{SYNTAX_ERROR_PREFIX}{message}"), offset)
}

/// Separates the grammar's location suffix from its message.
///
/// End-of-input failures carry no location; they are reported one past the
/// last character.
fn split_location(detail: &str, text: &str) -> (String, Option<u32>) {
    if let Some(caps) = LOCATION_SUFFIX.captures(detail) {
        let line = caps["line"].parse::<u64>().ok();
        let column = caps["column"].parse::<u64>().ok();
        let offset = line
            .zip(column)
            .and_then(|(line, column)| line_column_to_offset(text, line, column));
        return (caps["message"].to_string(), offset);
    }
    if detail.ends_with("found: EOF") {
        return (detail.to_string(), end_of_input(text));
    }
    (detail.to_string(), None)
}

/// Converts a 1-based (line, column) pair into a 1-based character offset.
/// Lines are separated by `\n`; columns count characters.
pub(crate) fn line_column_to_offset(text: &str, line: u64, column: u64) -> Option<u32> {
    if line == 0 || column == 0 {
        return None;
    }
    let mut current_line = 1;
    let mut chars_before: u64 = 0;
    for ch in text.chars() {
        if current_line == line {
            break;
        }
        chars_before += 1;
        if ch == '\n' {
            current_line += 1;
        }
    }
    if current_line != line {
        return None;
    }
    u32::try_from(chars_before + column).ok()
}

fn end_of_input(text: &str) -> Option<u32> {
    u32::try_from(text.chars().count() + 1).ok()
}

#[cfg(test)]
mod grammar_tests {
    use sqlparser::dialect::PostgreSqlDialect;

    use super::*;

    fn failure(sql: &str) -> StructuredError {
        let err = Parser::parse_sql(&PostgreSqlDialect {}, sql).unwrap_err();
        translate_error(err, sql)
    }

    #[test]
    fn test_line_column_on_first_line() {
        assert_eq!(line_column_to_offset("SELEC 1", 1, 1), Some(1));
        assert_eq!(line_column_to_offset("SELECT * FRO t", 1, 10), Some(10));
    }

    #[test]
    fn test_line_column_on_later_lines() {
        let text = "SELECT *\nFROM t\nWHER x";
        // "SELECT *\n" is 9 chars, "FROM t\n" is 7 more.
        assert_eq!(line_column_to_offset(text, 2, 1), Some(10));
        assert_eq!(line_column_to_offset(text, 3, 1), Some(17));
    }

    #[test]
    fn test_line_column_counts_characters_not_bytes() {
        assert_eq!(line_column_to_offset("'ü'\nx", 2, 1), Some(5));
    }

    #[test]
    fn test_line_column_out_of_range() {
        assert_eq!(line_column_to_offset("SELECT 1", 3, 1), None);
        assert_eq!(line_column_to_offset("SELECT 1", 0, 0), None);
    }

    #[test]
    fn test_split_location_strips_suffix() {
        let (message, offset) =
            split_location("Expected: an SQL statement, found: SELEC at Line: 1, Column: 1", "SELEC 1");
        assert_eq!(message, "Expected: an SQL statement, found: SELEC");
        assert_eq!(offset, Some(1));
    }

    #[test]
    fn test_split_location_accepts_legacy_column_format() {
        let (_, offset) = split_location("Expected end of statement, found: x at Line: 1, Column 3", "a  x");
        assert_eq!(offset, Some(3));
    }

    #[test]
    fn test_split_location_eof_points_past_end() {
        let (message, offset) = split_location("Expected: an expression, found: EOF", "SELECT 1 +");
        assert_eq!(message, "Expected: an expression, found: EOF");
        assert_eq!(offset, Some(11));
    }

    #[test]
    fn test_split_location_without_any_position() {
        assert_eq!(split_location("odd failure", "x"), ("odd failure".to_string(), None));
    }

    #[test]
    fn test_misspelled_keyword_points_at_first_character() {
        let err = failure("SELEC 1;");
        assert!(err.message.starts_with(SYNTAX_ERROR_PREFIX));
        assert!(err.message.contains("SELEC"));
        assert_eq!(err.offset, Some(1));
    }

    #[test]
    fn test_truncated_query_points_at_end_of_input() {
        let sql = "SELECT * FROM t WHERE";
        assert_eq!(failure(sql).offset, Some(22));
    }

    #[test]
    fn test_unterminated_string_is_positioned() {
        let err = failure("SELECT 'abc");
        assert!(err.message.starts_with(SYNTAX_ERROR_PREFIX));
        // The opening quote is character 8; input ends after character 11.
        assert!(matches!(err.offset, Some(8..=12)), "{:?}", err);
    }

    #[test]
    fn test_recursion_limit_has_no_offset() {
        let err = translate_error(ParserError::RecursionLimitExceeded, "SELECT 1");
        assert!(err.message.contains("recursion limit"));
        assert_eq!(err.offset, None);
    }
}
