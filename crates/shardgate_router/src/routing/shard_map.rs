use std::fmt;

use serde::{Deserialize, Serialize};

use shardgate_common::error::{GateResult, TopologyError};
use shardgate_common::keyspace_id::KeyspaceId;

/// Half-open keyspace-id range `[start, end)`.
///
/// An empty `start` is the lowest possible id, an empty `end` is unbounded.
/// Both empty is the full range of an unsharded keyspace's single shard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn full() -> Self {
        Self::default()
    }

    pub fn is_full(&self) -> bool {
        self.start.is_empty() && self.end.is_empty()
    }

    pub fn contains(&self, ksid: &KeyspaceId) -> bool {
        let k = ksid.as_bytes();
        k >= self.start.as_slice() && (self.end.is_empty() || k < self.end.as_slice())
    }

    /// Parse a shard name of the form `"40-80"`, `"-80"`, `"80-"` or `"-"`.
    /// A name without `-` (e.g. `"0"`) is the full range.
    pub fn from_shard_name(name: &str) -> GateResult<Self> {
        let Some((start, end)) = name.split_once('-') else {
            return Ok(Self::full());
        };
        let parse = |hex: &str| -> GateResult<Vec<u8>> {
            KeyspaceId::from_hex(hex)
                .map(KeyspaceId::into_bytes)
                .ok_or_else(|| {
                    TopologyError::InvalidKeyRange {
                        shard: name.to_string(),
                        reason: format!("bad hex bound {:?}", hex),
                    }
                    .into()
                })
        };
        let range = Self::new(parse(start)?, parse(end)?);
        if !range.end.is_empty() && range.start >= range.end {
            return Err(TopologyError::InvalidKeyRange {
                shard: name.to_string(),
                reason: "start must be below end".into(),
            }
            .into());
        }
        Ok(range)
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.start {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "-")?;
        for b in &self.end {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// A shard of a keyspace as published by the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardReference {
    pub name: String,
    pub key_range: KeyRange,
}

impl ShardReference {
    pub fn new(name: impl Into<String>, key_range: KeyRange) -> Self {
        Self {
            name: name.into(),
            key_range,
        }
    }

    /// Build from a range-style shard name.
    pub fn from_name(name: &str) -> GateResult<Self> {
        Ok(Self::new(name, KeyRange::from_shard_name(name)?))
    }
}

/// Locate the shard whose range contains `ksid`.
pub fn shard_for_keyspace_id<'a>(
    keyspace: &str,
    shards: &'a [ShardReference],
    ksid: &KeyspaceId,
) -> GateResult<&'a ShardReference> {
    shards
        .iter()
        .find(|s| s.key_range.contains(ksid))
        .ok_or_else(|| {
            TopologyError::NoShardForKeyspaceId {
                keyspace: keyspace.to_string(),
                ksid: ksid.clone(),
            }
            .into()
        })
}

/// Check that `shards`, sorted by start, tile the keyspace without gaps or
/// overlaps.
pub fn validate_contiguous(shards: &[ShardReference]) -> GateResult<()> {
    let mut sorted: Vec<&ShardReference> = shards.iter().collect();
    sorted.sort_by(|a, b| a.key_range.start.cmp(&b.key_range.start));
    let mut expected_start: Vec<u8> = Vec::new();
    for (i, s) in sorted.iter().enumerate() {
        if s.key_range.start != expected_start {
            return Err(TopologyError::InvalidKeyRange {
                shard: s.name.clone(),
                reason: format!(
                    "range {} does not start where the previous shard ends",
                    s.key_range
                ),
            }
            .into());
        }
        if s.key_range.end.is_empty() && i + 1 != sorted.len() {
            return Err(TopologyError::InvalidKeyRange {
                shard: s.name.clone(),
                reason: "unbounded range must be the last shard".into(),
            }
            .into());
        }
        expected_start = s.key_range.end.clone();
    }
    if !expected_start.is_empty() {
        return Err(TopologyError::InvalidKeyRange {
            shard: sorted.last().map(|s| s.name.clone()).unwrap_or_default(),
            reason: "last shard must be unbounded".into(),
        }
        .into());
    }
    Ok(())
}
