//! Runtime configuration.
//!
//! Everything the process-wide runtime needs is collected in [`RuntimeConfig`].
//! It can be built in code, loaded from YAML, and overridden by the CLI.

use std::fmt;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sqlparser::dialect::{
    AnsiDialect, Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};

use crate::errors::{QueryParserError, Result};

/// Default nesting depth accepted by the grammar before it gives up.
pub const DEFAULT_RECURSION_LIMIT: usize = 50;

/// Default initial size of a call arena, in bytes.
pub const DEFAULT_ARENA_CAPACITY: usize = 8 * 1024;

/// SQL dialect understood by the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Postgres,
    Generic,
    Mysql,
    Sqlite,
    Ansi,
}

impl DialectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::Generic => "generic",
            DialectKind::Mysql => "mysql",
            DialectKind::Sqlite => "sqlite",
            DialectKind::Ansi => "ansi",
        }
    }

    /// Instantiates the grammar dialect.
    pub(crate) fn dialect(&self) -> Box<dyn Dialect + Send + Sync> {
        match self {
            DialectKind::Postgres => Box::new(PostgreSqlDialect {}),
            DialectKind::Generic => Box::new(GenericDialect {}),
            DialectKind::Mysql => Box::new(MySqlDialect {}),
            DialectKind::Sqlite => Box::new(SQLiteDialect {}),
            DialectKind::Ansi => Box::new(AnsiDialect {}),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Text form of a parsed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TreeFormat {
    /// Compact JSON.
    #[default]
    Json,
    /// Indented JSON.
    PrettyJson,
    /// Debug node dump.
    Debug,
    /// Canonical SQL re-rendering.
    Sql,
}

/// Process-wide parser settings, fixed at initialization.
///
/// # Examples
///
/// ```rust
/// use queryparser::config::{DialectKind, RuntimeConfig};
/// let config = RuntimeConfig::from_yaml_str("dialect: sqlite\nrecursion_limit: 20\n").unwrap();
/// assert_eq!(config.dialect, DialectKind::Sqlite);
/// assert_eq!(config.recursion_limit, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub dialect: DialectKind,
    pub recursion_limit: usize,
    pub arena_capacity: usize,
    pub tree_format: TreeFormat,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::default(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            arena_capacity: DEFAULT_ARENA_CAPACITY,
            tree_format: TreeFormat::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parses a YAML document. Missing keys keep their defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: RuntimeConfig = serde_yaml::from_str(text)?;
        config.validate()
    }

    /// Loads a YAML configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    pub fn with_dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_tree_format(mut self, format: TreeFormat) -> Self {
        self.tree_format = format;
        self
    }

    pub(crate) fn validate(self) -> Result<Self> {
        if self.recursion_limit == 0 {
            return Err(QueryParserError::config("recursion_limit must be at least 1"));
        }
        Ok(self)
    }
}
