//! Request identity for tracing and log correlation.
//!
//! Every routed request carries a `RequestId` that is attached to its
//! tracing span and to the failure log line of the request.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global monotonic request ID counter.
static GLOBAL_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a new unique request ID.
pub fn next_request_id() -> u64 {
    GLOBAL_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub struct RequestId {
    /// Unique per routed request (monotonic).
    pub request_id: u64,
    /// Client session this request belongs to (0 when sessionless).
    pub session_id: u64,
}

impl RequestId {
    pub fn new(session_id: u64) -> Self {
        Self {
            request_id: next_request_id(),
            session_id,
        }
    }

    /// Create with explicit IDs (for testing).
    pub fn with_ids(request_id: u64, session_id: u64) -> Self {
        Self {
            request_id,
            session_id,
        }
    }

    /// Format as a structured context string for log messages.
    pub fn as_context_str(&self) -> String {
        format!("request_id={}, session_id={}", self.request_id, self.session_id)
    }
}
