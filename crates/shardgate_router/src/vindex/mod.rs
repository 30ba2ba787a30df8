//! Vindexes: functions from column values to keyspace ids.
//!
//! Every vindex can `verify` a (value, keyspace id) pair. What else it can
//! do is a capability, queried with the `as_*` accessors:
//!
//! - [`UniqueVindex`]: each value maps to at most one keyspace id.
//! - [`NonUniqueVindex`]: each value maps to any number of keyspace ids.
//! - [`ReversibleVindex`]: a keyspace id can be turned back into its value.
//! - [`LookupVindex`]: rows in a lookup table the router maintains when it
//!   owns the vindex.
//!
//! An unmapped value is reported as [`KeyspaceId::empty`], never as an error.

use std::fmt;

use async_trait::async_trait;

use shardgate_common::datum::Datum;
use shardgate_common::error::GateResult;
use shardgate_common::keyspace_id::KeyspaceId;

use crate::cursor::VCursor;

pub mod hash;
pub mod lookup;
pub mod numeric;
pub mod registry;
pub mod xxhash;

pub use hash::HashVindex;
pub use lookup::{LookupNonUnique, LookupParams, LookupUnique};
pub use numeric::NumericVindex;
pub use registry::{create_vindex, KeyspaceSchema, VSchema};
pub use xxhash::XxHashVindex;

#[async_trait]
pub trait Vindex: Send + Sync + fmt::Debug {
    /// Instance name from the vschema.
    fn name(&self) -> &str;

    /// Vindex type, e.g. `"hash"` or `"lookup_unique"`.
    fn kind(&self) -> &'static str;

    /// Relative cost of a map call; functional vindexes are cheaper than
    /// ones that issue queries.
    fn cost(&self) -> u32;

    /// Does `value` map to `ksid`?
    async fn verify(
        &self,
        cursor: &dyn VCursor,
        value: &Datum,
        ksid: &KeyspaceId,
    ) -> GateResult<bool>;

    fn as_unique(&self) -> Option<&dyn UniqueVindex> {
        None
    }

    fn as_non_unique(&self) -> Option<&dyn NonUniqueVindex> {
        None
    }

    fn as_reversible(&self) -> Option<&dyn ReversibleVindex> {
        None
    }

    fn as_lookup(&self) -> Option<&dyn LookupVindex> {
        None
    }
}

#[async_trait]
pub trait UniqueVindex: Vindex {
    /// One keyspace id per key, [`KeyspaceId::empty`] where unmapped.
    async fn map(&self, cursor: &dyn VCursor, keys: &[Datum]) -> GateResult<Vec<KeyspaceId>>;
}

#[async_trait]
pub trait NonUniqueVindex: Vindex {
    /// A (possibly empty) list of keyspace ids per key.
    async fn map_multi(
        &self,
        cursor: &dyn VCursor,
        keys: &[Datum],
    ) -> GateResult<Vec<Vec<KeyspaceId>>>;
}

#[async_trait]
pub trait ReversibleVindex: Vindex {
    async fn reverse_map(&self, cursor: &dyn VCursor, ksid: &KeyspaceId) -> GateResult<Datum>;
}

#[async_trait]
pub trait LookupVindex: Vindex {
    async fn create(
        &self,
        cursor: &dyn VCursor,
        value: &Datum,
        ksid: &KeyspaceId,
    ) -> GateResult<()>;

    /// Remove the entries for each of `values` pointing at `ksid`.
    async fn delete(
        &self,
        cursor: &dyn VCursor,
        values: &[Datum],
        ksid: &KeyspaceId,
    ) -> GateResult<()>;
}

/// Map keys through whichever of unique / non-unique `vindex` supports,
/// dropping unmapped ids.
pub async fn map_keys(
    vindex: &dyn Vindex,
    cursor: &dyn VCursor,
    keys: &[Datum],
) -> GateResult<Vec<Vec<KeyspaceId>>> {
    if let Some(unique) = vindex.as_unique() {
        let ksids = unique.map(cursor, keys).await?;
        return Ok(ksids
            .into_iter()
            .map(|k| if k.is_unmapped() { Vec::new() } else { vec![k] })
            .collect());
    }
    if let Some(non_unique) = vindex.as_non_unique() {
        let lists = non_unique.map_multi(cursor, keys).await?;
        return Ok(lists
            .into_iter()
            .map(|l| l.into_iter().filter(|k| !k.is_unmapped()).collect())
            .collect());
    }
    Err(shardgate_common::error::PlanError::MissingCapability {
        vindex: vindex.name().to_string(),
        capability: "map".into(),
    }
    .into())
}

/// Integer view of a key for functional vindexes.
pub(crate) fn key_as_u64(vindex: &str, key: &Datum) -> GateResult<u64> {
    key.as_u64().ok_or_else(|| {
        shardgate_common::error::MappingError::InvalidValue {
            vindex: vindex.to_string(),
            value: key.to_string(),
            reason: format!("{} is not an unsigned integer", key.type_name()),
        }
        .into()
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::NoQueryCursor;
    use super::*;

    #[tokio::test]
    async fn test_map_keys_unique_drops_unmapped() {
        let v = NumericVindex::new("num");
        let out = map_keys(&v, &NoQueryCursor, &[Datum::Int64(3), Datum::Int64(-1)])
            .await;
        // Negative values are not mappable by a numeric vindex at all.
        assert!(out.is_err());

        let out = map_keys(&v, &NoQueryCursor, &[Datum::Int64(3)]).await.unwrap();
        assert_eq!(out, vec![vec![KeyspaceId::from_u64(3)]]);
    }

    #[test]
    fn test_capabilities_of_functional_vindexes() {
        let num = NumericVindex::new("n");
        assert!(num.as_unique().is_some());
        assert!(num.as_reversible().is_some());
        assert!(num.as_lookup().is_none());
        assert!(num.as_non_unique().is_none());

        let xx = XxHashVindex::new("x");
        assert!(xx.as_unique().is_some());
        assert!(xx.as_reversible().is_none());
    }
}
