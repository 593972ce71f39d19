//! The `queryparser` command-line filter.
//!
//! Reads exactly one line from standard input, runs it through the pipeline
//! and reports the result through the exit status:
//!
//! | status | meaning                                                  |
//! |--------|----------------------------------------------------------|
//! | 0      | parsed (an empty tree included)                          |
//! | 1      | syntax error, or an empty / `#` line that was skipped    |
//! | 2      | nothing could be read                                    |
//! | 3      | the line has no terminating newline (or is too long)     |
//! | 4      | fatal error (configuration, runtime, arena, I/O)         |

use std::io::{self, BufRead, Read};
use std::process;

use clap::Parser;
use tracing::{debug, level_filters::LevelFilter};

use crate::cli::args::{Command, QueryParserArgs};
use crate::config::RuntimeConfig;
use crate::errors::{QueryParserError, Result};
use crate::pipeline::{parse_as, ParseOutcome, Rendering, EMPTY_TREE_MARKER};
use crate::runtime::{initialize_runtime, Runtime};

pub mod args;
pub mod output;

/// Size of the stdin line buffer. A line, newline included, must fit in
/// `MAX_LINE_BYTES - 1` bytes.
pub const MAX_LINE_BYTES: usize = 32 * 1024;

/// Process exit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Parsed = 0,
    Rejected = 1,
    NoInput = 2,
    Unterminated = 3,
    Fatal = 4,
}

/// Outcome of reading the single input line.
#[derive(Debug, PartialEq, Eq)]
pub enum InputLine {
    /// End of input before any byte.
    Missing,
    /// No newline within the line buffer.
    Unterminated,
    /// The line, newline stripped.
    Line(String),
}

// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

/// The main entry point for the CLI.
pub fn run() {
    let args = QueryParserArgs::parse();
    init_logging(args.verbose);

    let stdin = io::stdin();
    let exit = execute(&args, &mut stdin.lock());
    process::exit(exit as i32);
}

/// Runs one invocation against `input` and returns the exit status.
pub fn execute<R: BufRead>(args: &QueryParserArgs, input: &mut R) -> Exit {
    let runtime = match install_runtime(args) {
        Ok(runtime) => runtime,
        Err(e) => {
            output::print_error(e);
            return Exit::Fatal;
        }
    };

    let line = match read_query_line(input) {
        Ok(InputLine::Line(line)) => line,
        Ok(InputLine::Missing) => return Exit::NoInput,
        Ok(InputLine::Unterminated) => {
            output::print_note(
                "error",
                &format!("input must be a single line shorter than {MAX_LINE_BYTES} bytes"),
            );
            return Exit::Unterminated;
        }
        Err(QueryParserError::Io(e)) if e.kind() != io::ErrorKind::InvalidData => {
            debug!(error = %e, "stdin unreadable");
            return Exit::NoInput;
        }
        Err(e) => {
            output::print_error(e);
            return Exit::Fatal;
        }
    };

    if line.is_empty() {
        output::print_note("skipped", "empty line");
        return Exit::Rejected;
    }
    if line.starts_with('#') {
        output::print_note("skipped", "comment line");
        return Exit::Rejected;
    }

    match parse_as(&line, rendering(args, runtime)) {
        Ok(ParseOutcome::Parsed { tree_text }) => report_result(&tree_text),
        Ok(ParseOutcome::Empty) => report_result(EMPTY_TREE_MARKER),
        Ok(outcome @ ParseOutcome::SyntaxError { .. }) => {
            if let Some(diagnostic) = outcome.to_report(&line) {
                output::print_syntax_error(diagnostic);
            }
            Exit::Rejected
        }
        Err(e) => {
            output::print_error(e);
            Exit::Fatal
        }
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Reads one line of at most `MAX_LINE_BYTES - 1` bytes, newline included.
pub fn read_query_line<R: BufRead>(input: &mut R) -> Result<InputLine> {
    let mut bytes = Vec::new();
    let read = input
        .take(MAX_LINE_BYTES as u64 - 1)
        .read_until(b'\n', &mut bytes)?;
    if read == 0 {
        return Ok(InputLine::Missing);
    }
    if bytes.pop() != Some(b'\n') {
        return Ok(InputLine::Unterminated);
    }
    let line = String::from_utf8(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(InputLine::Line(line))
}

fn install_runtime(args: &QueryParserArgs) -> Result<&'static Runtime> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_path(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(dialect) = args.dialect {
        config = config.with_dialect(dialect);
    }
    if let Some(format) = args.format {
        config = config.with_tree_format(format);
    }
    initialize_runtime(config)
}

fn rendering(args: &QueryParserArgs, runtime: &Runtime) -> Rendering {
    match args.command.unwrap_or_default() {
        Command::Parse => Rendering::Tree(runtime.config().tree_format),
        Command::Normalize => Rendering::Normalized,
        Command::Fingerprint => Rendering::Fingerprint,
        Command::Tables => Rendering::Tables,
    }
}

fn report_result(text: &str) -> Exit {
    match output::print_result(text) {
        Ok(()) => Exit::Parsed,
        Err(e) => {
            output::print_error(e.into());
            Exit::Fatal
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
