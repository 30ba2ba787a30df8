//! Distributed execution: scatter one query (or one query per shard) over
//! target shards concurrently and gather the results.
//!
//! - **Strict**: every dispatched shard must reach an outcome before the
//!   merge; any failure fails the request.
//! - **Timeout**: the whole fan-out is bounded by `scatter.timeout_ms`.
//! - **Parallelism**: optionally capped by a semaphore.
//! - **Cancellation**: dropping the request future aborts outstanding
//!   shard calls.

pub mod gather;
pub mod scatter;

pub use gather::{merge_results, StreamFields};
pub use scatter::ScatterConn;

/// Outcome summary of one fan-out, logged at debug level.
#[derive(Debug, Clone, Default)]
pub struct ScatterMetrics {
    pub shards_participated: usize,
    pub failed_shards: Vec<String>,
}
