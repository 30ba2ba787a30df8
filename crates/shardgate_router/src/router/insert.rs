use shardgate_common::datum::Datum;
use shardgate_common::error::{ConsistencyError, GateResult, MappingError, PlanError};
use shardgate_common::keyspace_id::KeyspaceId;
use shardgate_common::types::QueryResult;

use crate::bind_vars::{resolve_keys, BindScope};
use crate::cursor::VCursor;
use crate::distributed_exec::merge_results;
use crate::route::{ColumnVindex, Route, RouteValues, ROW_VALUES_PLACEHOLDER};
use crate::routing::{shard_for_keyspace_id, InsertRouting};

use super::{RequestContext, RouteCursor, Router};

impl Router {
    pub(crate) async fn exec_insert_unsharded(
        &self,
        ctx: &RequestContext,
        route: &Route,
        scope: &mut BindScope<'_>,
    ) -> GateResult<QueryResult> {
        let generated = self.handle_generate(route.generate.as_ref(), scope).await?;
        let ks = self.resolve_keyspace(ctx, &route.keyspace).await?;
        let shard = ks.single_shard()?;
        let req = self.shard_request(
            ctx,
            &ks.name,
            &shard.name,
            self.with_comments(ctx, &route.query),
            scope.flatten(),
        );
        let mut result = self.scatter.execute_one(req).await?;
        generated.apply(&mut result)?;
        Ok(result)
    }

    /// Route every row by its primary vindex, maintain the other vindexes,
    /// then send each destination shard the subset of rows it owns.
    pub(crate) async fn exec_insert_sharded(
        &self,
        ctx: &RequestContext,
        route: &Route,
        scope: &mut BindScope<'_>,
    ) -> GateResult<QueryResult> {
        let generated = self.handle_generate(route.generate.as_ref(), scope).await?;
        let table = route.table()?;
        let RouteValues::Rows(rows) = &route.values else {
            return Err(PlanError::Malformed("InsertSharded needs per-row vindex values".into()).into());
        };
        let ks = self.resolve_keyspace(ctx, &route.keyspace).await?;
        let cursor = RouteCursor::new(self, ctx);

        let mut routing = InsertRouting::default();
        for (row_num, row) in rows.iter().enumerate() {
            let keys = resolve_keys(row, scope)?;
            let ksid = handle_primary(&cursor, &keys[0], table.primary(), scope, row_num).await?;
            let shard = shard_for_keyspace_id(&ks.name, &ks.shards, &ksid)?;
            for (cv, key) in table.column_vindexes.iter().zip(keys).skip(1) {
                handle_non_primary(&cursor, key, cv, scope, &ksid, row_num).await?;
            }
            routing.add(&shard.name, row_num, ksid);
        }

        let bind_vars = scope.flatten();
        let mut requests = Vec::with_capacity(routing.len());
        for (shard, row_nums) in &routing.rows {
            let query = rewrite_query(route, row_nums)?;
            let ksids = routing
                .keyspace_ids
                .get(shard)
                .map(Vec::as_slice)
                .unwrap_or_default();
            requests.push(self.shard_request(
                ctx,
                &ks.name,
                shard,
                self.annotate(ctx, &query, ksids),
                bind_vars.clone(),
            ));
        }
        tracing::debug!(
            keyspace = %ks.name,
            rows = rows.len(),
            shards = requests.len(),
            "Routed sharded insert"
        );

        let results = self.scatter.execute_each(requests).await?;
        if generated.count > 0 && results.iter().any(|r| r.insert_id != 0) {
            return Err(ConsistencyError::DualInsertId.into());
        }
        let mut result = merge_results(results);
        generated.apply(&mut result)?;
        Ok(result)
    }
}

fn row_var(column: &str, row: usize) -> String {
    format!("_{}{}", column, row)
}

/// Map the primary vindex value of one row. The value must be present and
/// must map.
async fn handle_primary(
    cursor: &dyn VCursor,
    value: &Datum,
    cv: &ColumnVindex,
    scope: &mut BindScope<'_>,
    row: usize,
) -> GateResult<KeyspaceId> {
    if value.is_null() {
        return Err(MappingError::ValueNotSupplied {
            column: cv.column.clone(),
        }
        .into());
    }
    let unique = cv.vindex.as_unique().ok_or_else(|| PlanError::MissingCapability {
        vindex: cv.vindex.name().to_string(),
        capability: "unique".into(),
    })?;
    let ksid = unique
        .map(cursor, std::slice::from_ref(value))
        .await?
        .into_iter()
        .next()
        .unwrap_or_default();
    if ksid.is_unmapped() {
        return Err(MappingError::Unmapped {
            value: value.to_string(),
        }
        .into());
    }
    scope.set(row_var(&cv.column, row), value.clone());
    Ok(ksid)
}

/// Owned vindexes get a lookup entry; unowned ones are verified, or their
/// value computed from the keyspace id when it was left out.
async fn handle_non_primary(
    cursor: &dyn VCursor,
    value: Datum,
    cv: &ColumnVindex,
    scope: &mut BindScope<'_>,
    ksid: &KeyspaceId,
    row: usize,
) -> GateResult<()> {
    let value = if cv.owned {
        if value.is_null() {
            return Err(MappingError::ValueNotSupplied {
                column: cv.column.clone(),
            }
            .into());
        }
        let lookup = cv.vindex.as_lookup().ok_or_else(|| PlanError::MissingCapability {
            vindex: cv.vindex.name().to_string(),
            capability: "lookup".into(),
        })?;
        lookup.create(cursor, &value, ksid).await?;
        value
    } else if value.is_null() {
        let reversible = cv.vindex.as_reversible().ok_or_else(|| MappingError::NotReversible {
            column: cv.column.clone(),
        })?;
        reversible.reverse_map(cursor, ksid).await?
    } else {
        if !cv.vindex.verify(cursor, &value, ksid).await? {
            return Err(ConsistencyError::VerifyFailed {
                value: value.to_string(),
                column: cv.column.clone(),
                ksid: ksid.clone(),
            }
            .into());
        }
        value
    };
    scope.set(row_var(&cv.column, row), value);
    Ok(())
}

/// The insert query with the placeholder replaced by the tuples of `rows`.
fn rewrite_query(route: &Route, rows: &[usize]) -> GateResult<String> {
    let mut tuples = Vec::with_capacity(rows.len());
    for &i in rows {
        let row = route
            .rows
            .get(i)
            .ok_or_else(|| PlanError::Malformed(format!("insert row {} out of range", i)))?;
        let values: Vec<String> = row.iter().map(|v| v.to_sql()).collect();
        tuples.push(format!("({})", values.join(", ")));
    }
    Ok(route.query.replace(ROW_VALUES_PLACEHOLDER, &tuples.join(", ")))
}
