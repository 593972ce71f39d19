//! Query analysis renderings.
//!
//! - **Normalization**: literal constants become `$N` placeholders in source
//!   order, numbered after any `$N` parameters the query already has.
//! - **Fingerprint**: SHA-256 of the normalized SQL, so queries that differ only
//!   in constants, spacing or keyword case collide on purpose.
//! - **Tables**: the relations a query references.
//!
//! All three work on a [`TreeHandle`] inside the caller's arena.

use std::collections::BTreeSet;
use std::io;
use std::ops::ControlFlow;

use sha2::{Digest, Sha256};
use sqlparser::ast::{visit_expressions, visit_expressions_mut, visit_relations, Expr, ObjectName, Statement, Value};

use crate::arena::CallArena;
use crate::errors::Result;
use crate::grammar::{write_sql, TreeHandle};

/// Replaces every literal constant with a positional placeholder.
/// Numbering continues after the highest `$N` already in the query.
/// Returns the number of placeholders introduced.
pub fn normalize_constants(statements: &mut Vec<Statement>) -> usize {
    let first = highest_parameter(statements);
    let mut count = 0;
    let _ = visit_expressions_mut(statements, |expr| {
        if let Expr::Value(value) = expr {
            if is_constant(value) {
                count += 1;
                *value = Value::Placeholder(format!("${}", first + count));
            }
        }
        ControlFlow::<()>::Continue(())
    });
    count
}

/// Largest `$N` parameter number in the statements, 0 if there is none.
fn highest_parameter(statements: &[Statement]) -> usize {
    let mut highest = 0;
    for statement in statements {
        let _ = visit_expressions(statement, |expr| {
            if let Expr::Value(Value::Placeholder(name)) = expr {
                if let Some(n) = name.strip_prefix('$').and_then(|n| n.parse::<usize>().ok()) {
                    highest = highest.max(n);
                }
            }
            ControlFlow::<()>::Continue(())
        });
    }
    highest
}

fn is_constant(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Placeholder(_))
}

/// Referenced relation names, sorted and de-duplicated.
pub fn referenced_tables(statements: &[Statement]) -> BTreeSet<String> {
    let mut tables = BTreeSet::new();
    for statement in statements {
        let _ = visit_relations(statement, |relation: &ObjectName| {
            tables.insert(relation.to_string());
            ControlFlow::<()>::Continue(())
        });
    }
    tables
}

pub(crate) fn write_normalized<W: io::Write>(tree: &mut TreeHandle<'_>, sink: &mut W) -> Result<()> {
    normalize_constants(tree.statements_mut());
    write_sql(tree.statements(), sink)?;
    Ok(())
}

/// Hashes the normalized SQL. The intermediate text lives in `scratch`.
pub(crate) fn write_fingerprint<W: io::Write>(
    tree: &mut TreeHandle<'_>,
    scratch: &CallArena<'_>,
    sink: &mut W,
) -> Result<()> {
    let mut normalized = scratch.buffer();
    write_normalized(tree, &mut normalized)?;
    let digest = Sha256::digest(normalized.as_bytes());
    write!(sink, "{:x}", digest)?;
    Ok(())
}

pub(crate) fn write_tables<W: io::Write>(tree: &TreeHandle<'_>, sink: &mut W) -> Result<()> {
    let tables = referenced_tables(tree.statements());
    serde_json::to_writer(&mut *sink, &tables)?;
    Ok(())
}
