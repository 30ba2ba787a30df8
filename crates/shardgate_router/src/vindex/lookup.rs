//! Lookup vindexes backed by a two-column table `(from, to)` in an
//! unsharded keyspace, where `to` holds the keyspace id.

use std::collections::HashMap;

use async_trait::async_trait;

use shardgate_common::datum::Datum;
use shardgate_common::error::{GateError, GateResult, MappingError};
use shardgate_common::keyspace_id::KeyspaceId;
use shardgate_common::observability::record_lookup_op;
use shardgate_common::types::QueryResult;

use super::{LookupVindex, NonUniqueVindex, UniqueVindex, Vindex};
use crate::bind_vars::BindVars;
use crate::cursor::VCursor;

/// Parameters shared by both lookup flavours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupParams {
    pub table: String,
    pub from: String,
    pub to: String,
    /// Unsharded keyspace holding `table`.
    pub keyspace: String,
}

impl LookupParams {
    pub fn from_map(vindex: &str, params: &HashMap<String, String>) -> GateResult<Self> {
        let get = |key: &str| -> GateResult<String> {
            match params.get(key) {
                Some(v) if !v.is_empty() => Ok(v.clone()),
                _ => Err(GateError::Config(format!(
                    "lookup vindex {} requires parameter {:?}",
                    vindex, key
                ))),
            }
        };
        Ok(Self {
            table: get("table")?,
            from: get("from")?,
            to: get("to")?,
            keyspace: get("keyspace")?,
        })
    }
}

/// Query text and plumbing common to both flavours.
#[derive(Debug, Clone)]
struct LookupTable {
    params: LookupParams,
    sel: String,
    ver: String,
    ins: String,
    del: String,
}

impl LookupTable {
    fn new(params: LookupParams) -> Self {
        let LookupParams { table, from, to, .. } = &params;
        Self {
            sel: format!("select {to} from {table} where {from} = :{from}"),
            ver: format!("select {from} from {table} where {from} = :{from} and {to} = :{to}"),
            ins: format!("insert into {table}({from}, {to}) values(:{from}, :{to})"),
            del: format!("delete from {table} where {from} = :{from} and {to} = :{to}"),
            params,
        }
    }

    fn vars(&self, value: &Datum, ksid: Option<&KeyspaceId>) -> BindVars {
        let mut bv = BindVars::new();
        bv.insert(self.params.from.clone(), value.clone());
        if let Some(ksid) = ksid {
            bv.insert(
                self.params.to.clone(),
                Datum::Bytes(ksid.as_bytes().to_vec()),
            );
        }
        bv
    }

    async fn run(&self, cursor: &dyn VCursor, query: &str, bv: BindVars) -> GateResult<QueryResult> {
        cursor
            .execute_keyspace(&self.params.keyspace, query, bv)
            .await
    }

    /// Keyspace ids stored for `value`.
    async fn lookup(&self, vindex: &str, cursor: &dyn VCursor, value: &Datum) -> GateResult<Vec<KeyspaceId>> {
        let result = self.run(cursor, &self.sel, self.vars(value, None)).await?;
        let mut ksids = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            match row.get(0) {
                Some(Datum::Bytes(b)) => ksids.push(KeyspaceId::new(b.clone())),
                Some(Datum::Text(s)) => ksids.push(KeyspaceId::new(s.as_bytes().to_vec())),
                other => {
                    return Err(MappingError::Lookup {
                        vindex: vindex.to_string(),
                        reason: format!("unexpected keyspace id column {:?}", other),
                    }
                    .into())
                }
            }
        }
        Ok(ksids)
    }

    async fn verify(&self, cursor: &dyn VCursor, value: &Datum, ksid: &KeyspaceId) -> GateResult<bool> {
        record_lookup_op("verify");
        let result = self.run(cursor, &self.ver, self.vars(value, Some(ksid))).await?;
        Ok(!result.rows.is_empty())
    }

    async fn create(&self, vindex: &str, cursor: &dyn VCursor, value: &Datum, ksid: &KeyspaceId) -> GateResult<()> {
        record_lookup_op("create");
        tracing::debug!(vindex, table = %self.params.table, value = %value, ksid = %ksid, "Creating lookup entry");
        self.run(cursor, &self.ins, self.vars(value, Some(ksid)))
            .await
            .map(|_| ())
            .map_err(|e| e.with_context(format!("lookup create {} ({})", vindex, value)))
    }

    async fn delete(&self, vindex: &str, cursor: &dyn VCursor, values: &[Datum], ksid: &KeyspaceId) -> GateResult<()> {
        for value in values {
            record_lookup_op("delete");
            tracing::debug!(vindex, table = %self.params.table, value = %value, ksid = %ksid, "Deleting lookup entry");
            self.run(cursor, &self.del, self.vars(value, Some(ksid)))
                .await
                .map_err(|e| e.with_context(format!("lookup delete {} ({})", vindex, value)))?;
        }
        Ok(())
    }
}

// ── lookup (non-unique) ──────────────────────────────────────────────────────

/// Non-unique lookup: a value may be stored against many keyspace ids.
#[derive(Debug, Clone)]
pub struct LookupNonUnique {
    name: String,
    table: LookupTable,
}

impl LookupNonUnique {
    pub fn new(name: impl Into<String>, params: LookupParams) -> Self {
        Self {
            name: name.into(),
            table: LookupTable::new(params),
        }
    }

    pub fn params(&self) -> &LookupParams {
        &self.table.params
    }
}

#[async_trait]
impl Vindex for LookupNonUnique {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "lookup"
    }

    fn cost(&self) -> u32 {
        20
    }

    async fn verify(&self, cursor: &dyn VCursor, value: &Datum, ksid: &KeyspaceId) -> GateResult<bool> {
        self.table.verify(cursor, value, ksid).await
    }

    fn as_non_unique(&self) -> Option<&dyn NonUniqueVindex> {
        Some(self)
    }

    fn as_lookup(&self) -> Option<&dyn LookupVindex> {
        Some(self)
    }
}

#[async_trait]
impl NonUniqueVindex for LookupNonUnique {
    async fn map_multi(&self, cursor: &dyn VCursor, keys: &[Datum]) -> GateResult<Vec<Vec<KeyspaceId>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.table.lookup(&self.name, cursor, key).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl LookupVindex for LookupNonUnique {
    async fn create(&self, cursor: &dyn VCursor, value: &Datum, ksid: &KeyspaceId) -> GateResult<()> {
        self.table.create(&self.name, cursor, value, ksid).await
    }

    async fn delete(&self, cursor: &dyn VCursor, values: &[Datum], ksid: &KeyspaceId) -> GateResult<()> {
        self.table.delete(&self.name, cursor, values, ksid).await
    }
}

// ── lookup_unique ────────────────────────────────────────────────────────────

/// Unique lookup: at most one keyspace id per value.
#[derive(Debug, Clone)]
pub struct LookupUnique {
    name: String,
    table: LookupTable,
}

impl LookupUnique {
    pub fn new(name: impl Into<String>, params: LookupParams) -> Self {
        Self {
            name: name.into(),
            table: LookupTable::new(params),
        }
    }

    pub fn params(&self) -> &LookupParams {
        &self.table.params
    }
}

#[async_trait]
impl Vindex for LookupUnique {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "lookup_unique"
    }

    fn cost(&self) -> u32 {
        10
    }

    async fn verify(&self, cursor: &dyn VCursor, value: &Datum, ksid: &KeyspaceId) -> GateResult<bool> {
        self.table.verify(cursor, value, ksid).await
    }

    fn as_unique(&self) -> Option<&dyn UniqueVindex> {
        Some(self)
    }

    fn as_lookup(&self) -> Option<&dyn LookupVindex> {
        Some(self)
    }
}

#[async_trait]
impl UniqueVindex for LookupUnique {
    async fn map(&self, cursor: &dyn VCursor, keys: &[Datum]) -> GateResult<Vec<KeyspaceId>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let mut ksids = self.table.lookup(&self.name, cursor, key).await?;
            match ksids.len() {
                0 => out.push(KeyspaceId::empty()),
                1 => out.push(ksids.remove(0)),
                n => {
                    return Err(MappingError::Lookup {
                        vindex: self.name.clone(),
                        reason: format!("unique lookup returned {} rows for {}", n, key),
                    }
                    .into())
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl LookupVindex for LookupUnique {
    async fn create(&self, cursor: &dyn VCursor, value: &Datum, ksid: &KeyspaceId) -> GateResult<()> {
        self.table.create(&self.name, cursor, value, ksid).await
    }

    async fn delete(&self, cursor: &dyn VCursor, values: &[Datum], ksid: &KeyspaceId) -> GateResult<()> {
        self.table.delete(&self.name, cursor, values, ksid).await
    }
}
