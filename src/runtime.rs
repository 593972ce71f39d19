//! Process runtime for the parser.
//!
//! The runtime is established once per process by [`initialize_runtime`] and
//! only read afterwards. It carries the grammar dialect, the recursion limit,
//! arena sizing, and call statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;
use serde::Serialize;
use sqlparser::dialect::Dialect;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::errors::{QueryParserError, Result};

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

// ============================================================================
// RUNTIME STATE
// ============================================================================

/// Global, read-mostly parser state.
pub struct Runtime {
    config: RuntimeConfig,
    dialect: Box<dyn Dialect + Send + Sync>,
    stats: RuntimeStats,
}

impl Runtime {
    fn new(config: RuntimeConfig) -> Result<Self> {
        let config = config.validate()?;
        Ok(Self {
            dialect: config.dialect.dialect(),
            config,
            stats: RuntimeStats::default(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub(crate) fn stats_recorder(&self) -> &RuntimeStats {
        &self.stats
    }

    /// Point-in-time copy of the call counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

/// Initializes the process runtime.
///
/// Must run once before the first parse. Later calls are harmless: they
/// return the runtime installed by the first call, and a differing
/// configuration is ignored with a warning.
pub fn initialize_runtime(config: RuntimeConfig) -> Result<&'static Runtime> {
    let mut installed = false;
    let runtime = RUNTIME.get_or_try_init(|| {
        installed = true;
        Runtime::new(config.clone())
    })?;

    if installed {
        info!(
            dialect = %runtime.config.dialect,
            recursion_limit = runtime.config.recursion_limit,
            arena_capacity = runtime.config.arena_capacity,
            "parser runtime initialized"
        );
    } else if runtime.config != config {
        warn!(
            requested = ?config,
            active = ?runtime.config,
            "parser runtime already initialized; ignoring new configuration"
        );
    }
    Ok(runtime)
}

/// Returns the initialized runtime.
pub fn runtime() -> Result<&'static Runtime> {
    RUNTIME.get().ok_or(QueryParserError::RuntimeNotInitialized)
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct RuntimeStats {
    calls: AtomicU64,
    parsed: AtomicU64,
    empty: AtomicU64,
    syntax_errors: AtomicU64,
}

impl RuntimeStats {
    pub(crate) fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parsed(&self) {
        self.parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty(&self) {
        self.empty.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_syntax_error(&self) {
        self.syntax_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            parsed: self.parsed.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            syntax_errors: self.syntax_errors.load(Ordering::Relaxed),
        }
    }
}

/// Call counters since the runtime was initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub calls: u64,
    pub parsed: u64,
    pub empty: u64,
    pub syntax_errors: u64,
}

#[cfg(test)]
mod runtime_tests {
    use super::*;
    use crate::config::DialectKind;

    #[test]
    fn test_initialize_is_idempotent() {
        let first = initialize_runtime(RuntimeConfig::default()).unwrap();
        let second = initialize_runtime(RuntimeConfig::default()).unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(std::ptr::eq(runtime().unwrap(), first));
    }

    #[test]
    fn test_reinitialize_keeps_first_config() {
        let active = initialize_runtime(RuntimeConfig::default()).unwrap();
        let again =
            initialize_runtime(RuntimeConfig::default().with_dialect(DialectKind::Mysql)).unwrap();
        assert_eq!(again.config().dialect, active.config().dialect);
    }

    #[test]
    fn test_stats_counters() {
        let stats = RuntimeStats::default();
        stats.record_call();
        stats.record_call();
        stats.record_parsed();
        stats.record_syntax_error();
        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                calls: 2,
                parsed: 1,
                empty: 0,
                syntax_errors: 1
            }
        );
    }
}
