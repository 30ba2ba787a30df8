//! Client session state shared between a request and the shard calls it
//! makes. The router never interprets it beyond passing it along; the shard
//! executor records which shards joined an open transaction.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use shardgate_common::types::TabletType;

/// One shard participating in the session's transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSession {
    pub keyspace: String,
    pub shard: String,
    pub tablet_type: TabletType,
    pub transaction_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub in_transaction: bool,
    pub shard_sessions: Vec<ShardSession>,
}

/// Mutex-guarded session handle, cheap to clone into concurrent shard calls.
#[derive(Debug, Clone, Default)]
pub struct SafeSession {
    inner: Arc<Mutex<Session>>,
}

impl SafeSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn begin() -> Self {
        Self::new(Session {
            in_transaction: true,
            shard_sessions: Vec::new(),
        })
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.lock().in_transaction
    }

    /// Transaction id already open on `(keyspace, shard)`, if any.
    pub fn find(&self, keyspace: &str, shard: &str, tablet_type: TabletType) -> Option<u64> {
        self.inner
            .lock()
            .shard_sessions
            .iter()
            .find(|s| s.keyspace == keyspace && s.shard == shard && s.tablet_type == tablet_type)
            .map(|s| s.transaction_id)
    }

    /// Record a shard joining the transaction. Ignored outside a transaction
    /// or when the shard is already recorded.
    pub fn append(&self, shard_session: ShardSession) {
        let mut s = self.inner.lock();
        if !s.in_transaction {
            return;
        }
        let present = s.shard_sessions.iter().any(|e| {
            e.keyspace == shard_session.keyspace
                && e.shard == shard_session.shard
                && e.tablet_type == shard_session.tablet_type
        });
        if !present {
            s.shard_sessions.push(shard_session);
        }
    }

    pub fn snapshot(&self) -> Session {
        self.inner.lock().clone()
    }
}

/// Per-request options forwarded to every shard call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Ask shards to return field descriptors with results.
    pub include_fields: bool,
    /// Client-supplied workload tag for shard-side accounting.
    pub workload: Option<String>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            include_fields: true,
            workload: None,
        }
    }
}
