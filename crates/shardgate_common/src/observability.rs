//! Observability setup: structured logging and router metrics.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with structured logging.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shardgate=debug"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

/// Record one route execution.
pub fn record_route_metrics(opcode: &str, duration_us: u64, success: bool) {
    metrics::counter!(
        "shardgate_route_executions_total",
        "opcode" => opcode.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
    metrics::histogram!("shardgate_route_duration_us", "opcode" => opcode.to_string())
        .record(duration_us as f64);
}

/// Record the fan-out width of one scatter.
pub fn record_scatter_shards(shards: usize) {
    metrics::histogram!("shardgate_scatter_shards").record(shards as f64);
}

/// Record a lookup-vindex maintenance operation.
/// `op` should be one of: "create", "delete", "verify".
pub fn record_lookup_op(op: &str) {
    metrics::counter!("shardgate_lookup_ops_total", "op" => op.to_string()).increment(1);
}

/// Record sequence values handed out.
pub fn record_sequence_values(count: u64) {
    metrics::counter!("shardgate_sequence_values_total").increment(count);
}
