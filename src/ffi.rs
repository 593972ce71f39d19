//! Stable C ABI for embedding the parser in a host process.
//!
//! Exports:
//! - `queryparser_init`: idempotent runtime setup with the default configuration
//! - `queryparser_do_parse`: parse one query into JSON or a diagnostic
//! - `queryparser_annotate`: same, with the database function's `pretty` flag
//! - `queryparser_free`: release strings handed out by the library
//!
//! Status contract: every fallible function returns a [`QpStatusCode`].
//! On `Ok` and `SyntaxError`, `*output` receives a NUL-terminated string the
//! caller owns and must pass to `queryparser_free`. On `Fatal`, `*output` is
//! set to an error message when one can be produced, otherwise NULL.

use std::ffi::{c_char, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::config::{RuntimeConfig, TreeFormat};
use crate::errors::QueryParserError;
use crate::pipeline::{parse_as, ParseStatus};
use crate::runtime::initialize_runtime;

/// Stable status code set for C ABI calls.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpStatusCode {
    /// Parsed, or the input held no statement.
    Ok = 0,
    /// The input is not valid SQL; `*output` holds the diagnostic.
    SyntaxError = 1,
    /// Uninitialized runtime, exhausted arena, invalid argument or panic.
    Fatal = 2,
}

impl From<ParseStatus> for QpStatusCode {
    fn from(status: ParseStatus) -> Self {
        match status {
            ParseStatus::Success => QpStatusCode::Ok,
            ParseStatus::Error => QpStatusCode::SyntaxError,
        }
    }
}

fn parse_cstr(ptr: *const c_char) -> Result<String, QueryParserError> {
    if ptr.is_null() {
        return Err(QueryParserError::config("query pointer is null"));
    }
    // SAFETY: ptr checked for null; caller promises a NUL-terminated string.
    let raw = unsafe { CStr::from_ptr(ptr) };
    raw.to_str()
        .map(str::to_owned)
        .map_err(|e| QueryParserError::config(format!("query is not valid UTF-8: {e}")))
}

fn write_output(output: *mut *mut c_char, text: String) {
    if output.is_null() {
        return;
    }
    let value = CString::new(text).map_or(std::ptr::null_mut(), CString::into_raw);
    // SAFETY: output checked for null; caller provides a writable pointer slot.
    unsafe {
        *output = value;
    }
}

fn run(query: *const c_char, format: TreeFormat, output: *mut *mut c_char) -> QpStatusCode {
    if output.is_null() {
        return QpStatusCode::Fatal;
    }
    let result = catch_unwind(AssertUnwindSafe(|| {
        let query = parse_cstr(query)?;
        parse_as(&query, format).map(|outcome| outcome.into_output())
    }));
    let (status, text) = match result {
        Ok(Ok((status, text))) => (status.into(), text),
        Ok(Err(err)) => (QpStatusCode::Fatal, err.to_string()),
        Err(_) => (QpStatusCode::Fatal, "panic while parsing query".to_string()),
    };
    write_output(output, text);
    status
}

/// Initializes the parser runtime with the default configuration.
#[no_mangle]
pub extern "C" fn queryparser_init() -> QpStatusCode {
    match catch_unwind(|| initialize_runtime(RuntimeConfig::default()).is_ok()) {
        Ok(true) => QpStatusCode::Ok,
        _ => QpStatusCode::Fatal,
    }
}

/// Parses `query` into compact JSON.
///
/// # Safety
/// `query` must be NULL or a valid NUL-terminated string. `output` must be
/// NULL or point to writable storage for one pointer.
#[no_mangle]
pub unsafe extern "C" fn queryparser_do_parse(
    query: *const c_char,
    output: *mut *mut c_char,
) -> QpStatusCode {
    run(query, TreeFormat::Json, output)
}

/// Parses `query` into JSON, indented when `pretty` is true.
///
/// # Safety
/// Same contract as [`queryparser_do_parse`].
#[no_mangle]
pub unsafe extern "C" fn queryparser_annotate(
    query: *const c_char,
    pretty: bool,
    output: *mut *mut c_char,
) -> QpStatusCode {
    let format = if pretty {
        TreeFormat::PrettyJson
    } else {
        TreeFormat::Json
    };
    run(query, format, output)
}

/// Releases a string returned by this library. NULL is ignored.
///
/// # Safety
/// `text` must be NULL or a pointer previously returned through an `output`
/// argument of this library and not yet freed.
#[no_mangle]
pub unsafe extern "C" fn queryparser_free(text: *mut c_char) {
    if text.is_null() {
        return;
    }
    // SAFETY: caller guarantees the pointer came from `CString::into_raw`.
    drop(unsafe { CString::from_raw(text) });
}
