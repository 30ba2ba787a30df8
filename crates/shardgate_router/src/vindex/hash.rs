use async_trait::async_trait;

use shardgate_common::datum::Datum;
use shardgate_common::error::{GateResult, MappingError};
use shardgate_common::keyspace_id::KeyspaceId;

use super::{key_as_u64, ReversibleVindex, UniqueVindex, Vindex};
use crate::cursor::VCursor;

/// Reversible hash of unsigned integer ids.
///
/// Keyspace ids are the splitmix64 finalizer of the value, big-endian. The
/// finalizer is a bijection on u64, so consecutive ids spread evenly over
/// the key space and the original id can be recovered from its keyspace id.
#[derive(Debug, Clone)]
pub struct HashVindex {
    name: String,
}

impl HashVindex {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn hash(id: u64) -> KeyspaceId {
        KeyspaceId::from_u64(mix(id))
    }
}

fn mix(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^= x >> 31;
    x
}

fn unmix(mut x: u64) -> u64 {
    x = (x ^ (x >> 31) ^ (x >> 62)).wrapping_mul(0x3196_42b2_d24d_8ec3);
    x = (x ^ (x >> 27) ^ (x >> 54)).wrapping_mul(0x96de_1b17_3f11_9089);
    x ^ (x >> 30) ^ (x >> 60)
}

#[async_trait]
impl Vindex for HashVindex {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "hash"
    }

    fn cost(&self) -> u32 {
        1
    }

    async fn verify(
        &self,
        _cursor: &dyn VCursor,
        value: &Datum,
        ksid: &KeyspaceId,
    ) -> GateResult<bool> {
        Ok(Self::hash(key_as_u64(&self.name, value)?) == *ksid)
    }

    fn as_unique(&self) -> Option<&dyn UniqueVindex> {
        Some(self)
    }

    fn as_reversible(&self) -> Option<&dyn ReversibleVindex> {
        Some(self)
    }
}

#[async_trait]
impl UniqueVindex for HashVindex {
    async fn map(&self, _cursor: &dyn VCursor, keys: &[Datum]) -> GateResult<Vec<KeyspaceId>> {
        keys.iter()
            .map(|k| Ok(Self::hash(key_as_u64(&self.name, k)?)))
            .collect()
    }
}

#[async_trait]
impl ReversibleVindex for HashVindex {
    async fn reverse_map(&self, _cursor: &dyn VCursor, ksid: &KeyspaceId) -> GateResult<Datum> {
        let hashed = ksid.to_u64().ok_or_else(|| MappingError::InvalidValue {
            vindex: self.name.clone(),
            value: ksid.to_hex(),
            reason: format!("keyspace id must be 8 bytes, got {}", ksid.len()),
        })?;
        Ok(Datum::UInt64(unmix(hashed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vindex::test_support::NoQueryCursor;

    #[test]
    fn test_known_values() {
        assert_eq!(mix(0), 0);
        assert_eq!(mix(1), 0x5692_161d_100b_05e5);
        assert_eq!(mix(2), 0xdbd2_3897_3a2b_148a);
        assert_eq!(mix(20), 0x0eb9_0a33_5264_0af2);
    }

    #[test]
    fn test_unmix_inverts_mix() {
        for v in [0u64, 1, 2, 99, 1 << 40, u64::MAX, 0x8000_0000_0000_0000] {
            assert_eq!(unmix(mix(v)), v, "value {v}");
        }
    }

    #[tokio::test]
    async fn test_map_then_reverse() {
        let v = HashVindex::new("user_idx");
        let ksids = v
            .map(&NoQueryCursor, &[Datum::Int64(1), Datum::UInt64(2)])
            .await
            .unwrap();
        assert_eq!(ksids[0].to_hex(), "5692161d100b05e5");
        assert_eq!(ksids[1].to_hex(), "dbd238973a2b148a");
        assert_eq!(
            v.reverse_map(&NoQueryCursor, &ksids[1]).await.unwrap(),
            Datum::UInt64(2)
        );
    }

    #[tokio::test]
    async fn test_verify() {
        let v = HashVindex::new("user_idx");
        let ksid = HashVindex::hash(7);
        assert!(v.verify(&NoQueryCursor, &Datum::Int64(7), &ksid).await.unwrap());
        assert!(!v.verify(&NoQueryCursor, &Datum::Int64(8), &ksid).await.unwrap());
    }
}
