use async_trait::async_trait;

use shardgate_common::datum::Datum;
use shardgate_common::error::{GateResult, MappingError};
use shardgate_common::keyspace_id::KeyspaceId;

use super::{key_as_u64, ReversibleVindex, UniqueVindex, Vindex};
use crate::cursor::VCursor;

/// Identity vindex: the keyspace id is the big-endian encoding of the value.
#[derive(Debug, Clone)]
pub struct NumericVindex {
    name: String,
}

impl NumericVindex {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Vindex for NumericVindex {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "numeric"
    }

    fn cost(&self) -> u32 {
        0
    }

    async fn verify(
        &self,
        _cursor: &dyn VCursor,
        value: &Datum,
        ksid: &KeyspaceId,
    ) -> GateResult<bool> {
        Ok(KeyspaceId::from_u64(key_as_u64(&self.name, value)?) == *ksid)
    }

    fn as_unique(&self) -> Option<&dyn UniqueVindex> {
        Some(self)
    }

    fn as_reversible(&self) -> Option<&dyn ReversibleVindex> {
        Some(self)
    }
}

#[async_trait]
impl UniqueVindex for NumericVindex {
    async fn map(&self, _cursor: &dyn VCursor, keys: &[Datum]) -> GateResult<Vec<KeyspaceId>> {
        keys.iter()
            .map(|k| Ok(KeyspaceId::from_u64(key_as_u64(&self.name, k)?)))
            .collect()
    }
}

#[async_trait]
impl ReversibleVindex for NumericVindex {
    async fn reverse_map(&self, _cursor: &dyn VCursor, ksid: &KeyspaceId) -> GateResult<Datum> {
        ksid.to_u64().map(Datum::UInt64).ok_or_else(|| {
            MappingError::InvalidValue {
                vindex: self.name.clone(),
                value: ksid.to_hex(),
                reason: format!("keyspace id must be 8 bytes, got {}", ksid.len()),
            }
            .into()
        })
    }
}
