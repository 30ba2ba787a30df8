use std::collections::BTreeMap;

use shardgate_common::datum::Datum;
use shardgate_common::keyspace_id::KeyspaceId;

use crate::bind_vars::BindVars;

/// Bind variable carrying a shard's own key list for IN routing.
pub const LIST_VAR_NAME: &str = "__vals";

/// Destination shard → keys routed there, in first-seen order.
///
/// Iteration over shards is by name, so two maps built from the same keys
/// in different orders compare equal shard-by-shard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingMap {
    shards: BTreeMap<String, Vec<Datum>>,
}

impl RoutingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` for `shard`. Duplicate keys on one shard are kept once.
    pub fn add(&mut self, shard: &str, key: Datum) {
        let keys = self.shards.entry(shard.to_string()).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn shards(&self) -> Vec<String> {
        self.shards.keys().cloned().collect()
    }

    pub fn keys(&self, shard: &str) -> Option<&[Datum]> {
        self.shards.get(shard).map(Vec::as_slice)
    }

    /// Per-shard bind variables: `base` plus that shard's keys under
    /// [`LIST_VAR_NAME`].
    pub fn shard_vars(&self, base: &BindVars) -> BTreeMap<String, BindVars> {
        self.shards
            .iter()
            .map(|(shard, keys)| {
                let mut bv = base.clone();
                bv.insert(LIST_VAR_NAME.to_string(), Datum::List(keys.clone()));
                (shard.clone(), bv)
            })
            .collect()
    }
}

/// Row placement produced while routing a sharded insert.
#[derive(Debug, Clone, Default)]
pub struct InsertRouting {
    /// Destination shard → indices into the route's row matrix, ascending.
    pub rows: BTreeMap<String, Vec<usize>>,
    /// Destination shard → keyspace ids of those rows, same order.
    pub keyspace_ids: BTreeMap<String, Vec<KeyspaceId>>,
}

impl InsertRouting {
    pub fn add(&mut self, shard: &str, row: usize, ksid: KeyspaceId) {
        self.rows.entry(shard.to_string()).or_default().push(row);
        self.keyspace_ids
            .entry(shard.to_string())
            .or_default()
            .push(ksid);
    }

    pub fn shards(&self) -> Vec<String> {
        self.rows.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
