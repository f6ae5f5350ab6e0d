//! Process-wide configuration, read from the environment.
//!
//! Mirrors the validated-defaults shape of a scheduler config struct, but
//! this crate exposes two knobs rather than a builder: the pool reads a
//! single environment variable at startup and a boolean flag gates verbose
//! tracing.

use std::env;

const MIN_THREADPOOL_SIZE: usize = 1;
const MAX_THREADPOOL_SIZE: usize = 1024;
const DEFAULT_THREADPOOL_SIZE: usize = 4;

/// Configuration for the thread pool and tracing setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads, clamped to `[1, 1024]`.
    pub threadpool_size: usize,
    /// Whether verbose tracing spans are enabled for the pool/gateway/replication path.
    pub trace_enabled: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threadpool_size: DEFAULT_THREADPOOL_SIZE,
            trace_enabled: false,
        }
    }
}

impl PoolConfig {
    /// Build a configuration from `POOL_THREADPOOL_SIZE` and `LATTICEDB_TRACE`.
    ///
    /// Unset or unparsable `POOL_THREADPOOL_SIZE` falls back to the default
    /// of 4; any value is clamped into `[1, 1024]` rather than rejected.
    pub fn from_env() -> Self {
        let threadpool_size = env::var("POOL_THREADPOOL_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|n| n.clamp(MIN_THREADPOOL_SIZE, MAX_THREADPOOL_SIZE))
            .unwrap_or(DEFAULT_THREADPOOL_SIZE);

        let trace_enabled = env::var("LATTICEDB_TRACE")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
            .unwrap_or(false);

        Self {
            threadpool_size,
            trace_enabled,
        }
    }

    /// Validate the configuration. `from_env` always produces a valid value;
    /// this exists for configs assembled by hand (e.g. in tests).
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.threadpool_size < MIN_THREADPOOL_SIZE {
            return Err("threadpool_size must be at least 1");
        }
        if self.threadpool_size > MAX_THREADPOOL_SIZE {
            return Err("threadpool_size exceeds maximum of 1024");
        }
        Ok(())
    }
}
