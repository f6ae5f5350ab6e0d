//! Tracing setup for the pool/gateway/replication path.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the global `tracing` subscriber exactly once per process.
///
/// Verbose (`debug`) spans are gated by `PoolConfig::trace_enabled`; the
/// default filter is `warn` so a production embedding stays quiet unless
/// `LATTICEDB_TRACE` is set.
pub fn init(trace_enabled: bool) {
    INIT.call_once(|| {
        let default_level = if trace_enabled { "debug" } else { "warn" };
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .ok();
    });
}
