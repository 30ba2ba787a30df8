use std::collections::BTreeSet;

use shardgate_common::datum::Datum;
use shardgate_common::error::{ConsistencyError, GateResult, PlanError, ResultExt};
use shardgate_common::keyspace_id::KeyspaceId;
use shardgate_common::types::QueryResult;

use crate::bind_vars::BindScope;
use crate::cursor::VCursor;
use crate::executor::ShardRequest;
use crate::route::Route;
use crate::routing::shard_for_keyspace_id;

use super::{single_value, RequestContext, RouteCursor, Router};

impl Router {
    pub(crate) async fn exec_update_equal(
        &self,
        ctx: &RequestContext,
        route: &Route,
        scope: &mut BindScope<'_>,
    ) -> GateResult<QueryResult> {
        let cursor = RouteCursor::new(self, ctx);
        let Some((req, _)) = self.equal_request(ctx, &cursor, route, scope).await? else {
            return Ok(QueryResult::empty());
        };
        self.scatter.execute_one(req).await
    }

    /// Delete by unique key. Owned lookup entries of the doomed rows are
    /// removed first, from the pre-image read by the route's subquery.
    pub(crate) async fn exec_delete_equal(
        &self,
        ctx: &RequestContext,
        route: &Route,
        scope: &mut BindScope<'_>,
    ) -> GateResult<QueryResult> {
        let cursor = RouteCursor::new(self, ctx);
        let Some((req, ksid)) = self.equal_request(ctx, &cursor, route, scope).await? else {
            return Ok(QueryResult::empty());
        };
        if !route.subquery.is_empty() {
            self.delete_vindex_entries(ctx, &cursor, route, &req, &ksid)
                .await
                .op_context("delete_vindex_entries")?;
        }
        self.scatter.execute_one(req).await
    }

    /// The single-shard request of an `Equal` write, with its keyspace id.
    /// `None` when the key maps nowhere.
    async fn equal_request(
        &self,
        ctx: &RequestContext,
        cursor: &dyn VCursor,
        route: &Route,
        scope: &BindScope<'_>,
    ) -> GateResult<Option<(ShardRequest, KeyspaceId)>> {
        let key = single_value(route)?.resolve(scope)?;
        let vindex = route.vindex()?;
        let unique = vindex.as_unique().ok_or_else(|| PlanError::MissingCapability {
            vindex: vindex.name().to_string(),
            capability: "unique".into(),
        })?;
        let ksid = unique
            .map(cursor, std::slice::from_ref(&key))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        if ksid.is_unmapped() {
            tracing::debug!(key = %key, "Write key maps to no keyspace id");
            return Ok(None);
        }

        let ks = self.resolve_keyspace(ctx, &route.keyspace).await?;
        let shard = shard_for_keyspace_id(&ks.name, &ks.shards, &ksid)?;
        let query = self.annotate(ctx, &route.query, std::slice::from_ref(&ksid));
        let req = self.shard_request(ctx, &ks.name, &shard.name, query, scope.flatten());
        Ok(Some((req, ksid)))
    }

    async fn delete_vindex_entries(
        &self,
        ctx: &RequestContext,
        cursor: &dyn VCursor,
        route: &Route,
        target: &ShardRequest,
        ksid: &KeyspaceId,
    ) -> GateResult<()> {
        let pre_image = self.shard_request(
            ctx,
            &target.keyspace,
            &target.shard,
            self.with_comments(ctx, &route.subquery),
            target.bind_vars.clone(),
        );
        let result = self.scatter.execute_one(pre_image).await?;
        if result.rows.is_empty() {
            return Ok(());
        }

        let table = route.table()?;
        let owned: Vec<_> = table.owned().collect();
        if let Some((row, r)) = result
            .rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() < owned.len())
        {
            return Err(ConsistencyError::PreImageShape {
                row,
                expected: owned.len(),
                got: r.len(),
            }
            .into());
        }

        for (col, cv) in owned.iter().enumerate() {
            let values: Vec<Datum> = result
                .rows
                .iter()
                .map(|r| r.values[col].clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let lookup = cv.vindex.as_lookup().ok_or_else(|| PlanError::MissingCapability {
                vindex: cv.vindex.name().to_string(),
                capability: "lookup".into(),
            })?;
            lookup.delete(cursor, &values, ksid).await?;
            tracing::debug!(
                vindex = cv.vindex.name(),
                values = values.len(),
                "Deleted owned lookup entries"
            );
        }
        Ok(())
    }
}
