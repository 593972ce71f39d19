//! User-facing output for the CLI.
//!
//! Results go to stdout uncolored so they can be piped. Notes and reports go
//! to stderr, colored only when stderr is a terminal.

use std::io::{self, IsTerminal, Write};

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::errors::{QueryParserError, SyntaxDiagnostic};

// ============================================================================
// RESULTS
// ============================================================================

/// Prints one rendering result on its own line.
pub fn print_result(text: &str) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", text)?;
    stdout.flush()
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

/// Renders a syntax error with the query and a label at the offset.
pub fn print_syntax_error(diagnostic: SyntaxDiagnostic) {
    let report = miette::Report::new(diagnostic);
    eprintln!("{report:?}");
}

/// Renders a fatal error.
pub fn print_error(error: QueryParserError) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}

/// A short colored note on stderr, e.g. why a line was skipped.
pub fn print_note(label: &str, message: &str) {
    let mut stderr = StandardStream::stderr(stderr_color_choice());
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));
    let _ = write!(stderr, "{label}:");
    let _ = stderr.reset();
    let _ = writeln!(stderr, " {message}");
}

fn stderr_color_choice() -> ColorChoice {
    if io::stderr().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}
