//! Topology: which shards a keyspace has for a given tablet type.
//!
//! The router only consumes topology through [`SrvTopology`]. The in-memory
//! [`StaticTopology`] serves immutable snapshots; `refresh` swaps in a new
//! one without disturbing requests still holding the old.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use shardgate_common::error::{GateResult, TopologyError};
use shardgate_common::types::TabletType;

use crate::routing::shard_map::{validate_contiguous, ShardReference};

/// A keyspace as resolved for one tablet type.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedKeyspace {
    /// Canonical name after served-from redirection.
    pub name: String,
    /// Column the keyspace is range-sharded on; empty when unsharded.
    pub sharding_column_name: String,
    pub shards: Vec<ShardReference>,
}

impl ResolvedKeyspace {
    /// The single shard of an unsharded keyspace.
    pub fn single_shard(&self) -> GateResult<&ShardReference> {
        match self.shards.as_slice() {
            [only] => Ok(only),
            [] => Err(TopologyError::NoShards(self.name.clone()).into()),
            many => Err(TopologyError::UnshardedMultipleShards {
                keyspace: self.name.clone(),
                count: many.len(),
            }
            .into()),
        }
    }

    pub fn shard_names(&self) -> Vec<String> {
        self.shards.iter().map(|s| s.name.clone()).collect()
    }
}

#[async_trait]
pub trait SrvTopology: Send + Sync {
    async fn resolve_keyspace(
        &self,
        keyspace: &str,
        tablet_type: TabletType,
    ) -> GateResult<Arc<ResolvedKeyspace>>;

    /// Pick any one shard of `keyspace`, returning `(canonical keyspace, shard)`.
    async fn resolve_any_shard(
        &self,
        keyspace: &str,
        tablet_type: TabletType,
    ) -> GateResult<(String, String)> {
        let ks = self.resolve_keyspace(keyspace, tablet_type).await?;
        let shard = ks
            .shards
            .first()
            .ok_or_else(|| TopologyError::NoShards(ks.name.clone()))?;
        Ok((ks.name.clone(), shard.name.clone()))
    }
}

/// Immutable topology data.
#[derive(Debug, Clone, Default)]
pub struct TopologySnapshot {
    keyspaces: HashMap<String, Arc<ResolvedKeyspace>>,
    served_from: HashMap<(String, TabletType), String>,
}

impl TopologySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a keyspace from range-style shard names (`"-80"`, `"80-"`, or
    /// `"0"` for an unsharded keyspace). Ranges must tile the keyspace.
    pub fn with_keyspace(
        mut self,
        name: &str,
        sharding_column_name: &str,
        shard_names: &[&str],
    ) -> GateResult<Self> {
        let shards = shard_names
            .iter()
            .map(|n| ShardReference::from_name(n))
            .collect::<GateResult<Vec<_>>>()?;
        if shards.is_empty() {
            return Err(TopologyError::NoShards(name.to_string()).into());
        }
        validate_contiguous(&shards)?;
        self.keyspaces.insert(
            name.to_string(),
            Arc::new(ResolvedKeyspace {
                name: name.to_string(),
                sharding_column_name: sharding_column_name.to_string(),
                shards,
            }),
        );
        Ok(self)
    }

    /// Serve `keyspace` from `target` for one tablet type.
    pub fn with_served_from(mut self, keyspace: &str, tablet_type: TabletType, target: &str) -> Self {
        self.served_from
            .insert((keyspace.to_string(), tablet_type), target.to_string());
        self
    }

    fn resolve(&self, keyspace: &str, tablet_type: TabletType) -> GateResult<Arc<ResolvedKeyspace>> {
        let canonical = self
            .served_from
            .get(&(keyspace.to_string(), tablet_type))
            .map(String::as_str)
            .unwrap_or(keyspace);
        self.keyspaces
            .get(canonical)
            .cloned()
            .ok_or_else(|| TopologyError::KeyspaceNotFound(keyspace.to_string()).into())
    }
}

/// In-memory topology serving swappable snapshots.
#[derive(Debug, Default)]
pub struct StaticTopology {
    snapshot: RwLock<Arc<TopologySnapshot>>,
}

impl StaticTopology {
    pub fn new(snapshot: TopologySnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<TopologySnapshot> {
        self.snapshot.read().clone()
    }

    /// Replace the served snapshot.
    pub fn refresh(&self, snapshot: TopologySnapshot) {
        let keyspaces = snapshot.keyspaces.len();
        *self.snapshot.write() = Arc::new(snapshot);
        tracing::info!(keyspaces, "Topology snapshot refreshed");
    }
}

#[async_trait]
impl SrvTopology for StaticTopology {
    async fn resolve_keyspace(
        &self,
        keyspace: &str,
        tablet_type: TabletType,
    ) -> GateResult<Arc<ResolvedKeyspace>> {
        self.snapshot().resolve(keyspace, tablet_type)
    }
}
