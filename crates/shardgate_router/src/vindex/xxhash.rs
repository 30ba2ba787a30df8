use async_trait::async_trait;
use xxhash_rust::xxh3::xxh3_64;

use shardgate_common::datum::Datum;
use shardgate_common::error::{GateResult, MappingError};
use shardgate_common::keyspace_id::KeyspaceId;

use super::{UniqueVindex, Vindex};
use crate::cursor::VCursor;

/// xxHash3 over a type-tagged encoding of the value. Accepts any scalar,
/// not reversible.
#[derive(Debug, Clone)]
pub struct XxHashVindex {
    name: String,
}

impl XxHashVindex {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn hash(&self, value: &Datum) -> GateResult<KeyspaceId> {
        let mut buf = Vec::with_capacity(16);
        encode_datum_for_hash(&mut buf, value).map_err(|reason| MappingError::InvalidValue {
            vindex: self.name.clone(),
            value: value.to_string(),
            reason,
        })?;
        Ok(KeyspaceId::from_u64(xxh3_64(&buf)))
    }
}

/// Values that compare equal encode identically: non-negative Int64 and
/// UInt64 share a tag, as do Text and Bytes.
fn encode_datum_for_hash(buf: &mut Vec<u8>, datum: &Datum) -> Result<(), String> {
    match datum {
        Datum::Null => return Err("NULL has no keyspace id".into()),
        Datum::Boolean(b) => {
            buf.push(0x01);
            buf.push(u8::from(*b));
        }
        Datum::Int64(v) if *v < 0 => {
            buf.push(0x02);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Datum::Int64(v) => {
            buf.push(0x03);
            buf.extend_from_slice(&(*v as u64).to_le_bytes());
        }
        Datum::UInt64(v) => {
            buf.push(0x03);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Datum::Float64(v) => {
            buf.push(0x04);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Datum::Text(s) => {
            buf.push(0x05);
            buf.extend_from_slice(s.as_bytes());
        }
        Datum::Bytes(b) => {
            buf.push(0x05);
            buf.extend_from_slice(b);
        }
        Datum::List(_) => return Err("tuples cannot be hashed".into()),
    }
    Ok(())
}

#[async_trait]
impl Vindex for XxHashVindex {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "xxhash"
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
        Ok(self.hash(value)? == *ksid)
    }

    fn as_unique(&self) -> Option<&dyn UniqueVindex> {
        Some(self)
    }
}

#[async_trait]
impl UniqueVindex for XxHashVindex {
    async fn map(&self, _cursor: &dyn VCursor, keys: &[Datum]) -> GateResult<Vec<KeyspaceId>> {
        keys.iter().map(|k| self.hash(k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vindex::test_support::NoQueryCursor;

    #[tokio::test]
    async fn test_equal_values_hash_equal() {
        let v = XxHashVindex::new("name_hash");
        let ksids = v
            .map(
                &NoQueryCursor,
                &[
                    Datum::Int64(5),
                    Datum::UInt64(5),
                    Datum::Text("bob".into()),
                    Datum::Bytes(b"bob".to_vec()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(ksids[0], ksids[1]);
        assert_eq!(ksids[2], ksids[3]);
        assert_ne!(ksids[0], ksids[2]);
        assert_eq!(ksids[0].len(), 8);
    }

    #[tokio::test]
    async fn test_null_is_rejected() {
        let v = XxHashVindex::new("name_hash");
        let err = v.map(&NoQueryCursor, &[Datum::Null]).await.unwrap_err();
        assert!(err.to_string().contains("NULL has no keyspace id"), "{err}");
    }

    #[tokio::test]
    async fn test_verify_matches_map() {
        let v = XxHashVindex::new("name_hash");
        let ksid = v.map(&NoQueryCursor, &[Datum::Text("alice".into())]).await.unwrap()[0].clone();
        assert!(v
            .verify(&NoQueryCursor, &Datum::Text("alice".into()), &ksid)
            .await
            .unwrap());
        assert!(!v
            .verify(&NoQueryCursor, &Datum::Text("alicia".into()), &ksid)
            .await
            .unwrap());
    }
}
