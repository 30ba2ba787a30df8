//! The route executor: dispatches one route by opcode, resolves target
//! shards and hands the resulting shard requests to the scatter layer.

mod dml;
mod insert;
mod sequence;

pub use sequence::GeneratedIds;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::Instrument;

use shardgate_common::config::RouterConfig;
use shardgate_common::datum::Datum;
use shardgate_common::error::{GateResult, PlanError, ResultExt};
use shardgate_common::keyspace_id::KeyspaceId;
use shardgate_common::observability::record_route_metrics;
use shardgate_common::request_context::RequestId;
use shardgate_common::types::{QueryResult, TabletType};

use crate::annotation::add_keyspace_ids;
use crate::bind_vars::{BindScope, BindVars};
use crate::cursor::VCursor;
use crate::distributed_exec::ScatterConn;
use crate::executor::{ShardExecutor, ShardRequest};
use crate::route::{Opcode, Route, RouteValues};
use crate::routing::{shard_for_keyspace_id, RoutingMap};
use crate::session::{ExecuteOptions, SafeSession};
use crate::topology::{ResolvedKeyspace, SrvTopology};
use crate::vindex::{map_keys, KeyspaceSchema, VSchema};

/// Everything one client request brings along. Owned by that request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub bind_vars: BindVars,
    pub session: Option<SafeSession>,
    pub tablet_type: TabletType,
    pub not_in_transaction: bool,
    pub options: ExecuteOptions,
    /// Trailing SQL comments appended to every routed query.
    pub comments: String,
}

impl RequestContext {
    pub fn new(bind_vars: BindVars) -> Self {
        Self {
            request_id: RequestId::new(0),
            bind_vars,
            session: None,
            tablet_type: TabletType::Primary,
            not_in_transaction: false,
            options: ExecuteOptions::default(),
            comments: String::new(),
        }
    }

    pub fn with_session(mut self, session: SafeSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_tablet_type(mut self, tablet_type: TabletType) -> Self {
        self.tablet_type = tablet_type;
        self
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = comments.into();
        self
    }

    pub fn with_not_in_transaction(mut self, not_in_transaction: bool) -> Self {
        self.not_in_transaction = not_in_transaction;
        self
    }

    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }
}

pub struct Router {
    topology: Arc<dyn SrvTopology>,
    scatter: ScatterConn,
    config: RouterConfig,
    vschema: RwLock<Arc<VSchema>>,
}

impl Router {
    pub fn new(
        topology: Arc<dyn SrvTopology>,
        executor: Arc<dyn ShardExecutor>,
        config: RouterConfig,
    ) -> GateResult<Self> {
        config.validate()?;
        tracing::info!(
            timeout_ms = config.scatter.timeout_ms,
            max_parallelism = config.scatter.max_parallelism,
            "Router created"
        );
        Ok(Self {
            topology,
            scatter: ScatterConn::new(executor, &config.scatter),
            config,
            vschema: RwLock::new(Arc::new(VSchema::default())),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// A request context using the configured default tablet type.
    pub fn new_request(&self, bind_vars: BindVars) -> RequestContext {
        RequestContext::new(bind_vars).with_tablet_type(self.config.routing.default_tablet_type)
    }

    /// The vschema snapshot currently served.
    pub fn vschema(&self) -> Arc<VSchema> {
        self.vschema.read().clone()
    }

    /// Add or replace one keyspace. Readers keep the snapshot they hold.
    pub fn register_keyspace(&self, schema: KeyspaceSchema) {
        let mut guard = self.vschema.write();
        let mut next = (**guard).clone();
        next.keyspaces.insert(schema.name.clone(), schema);
        *guard = Arc::new(next);
    }

    /// Replace all keyspace schemas in one swap.
    pub fn load_vschema(&self, vschema: VSchema) {
        let keyspaces = vschema.keyspaces.len();
        *self.vschema.write() = Arc::new(vschema);
        tracing::info!(keyspaces, "VSchema snapshot loaded");
    }

    /// Is `keyspace` known and range-sharded? Unknown keyspaces are not.
    pub fn is_keyspace_range_based_sharded(&self, keyspace: &str) -> bool {
        self.vschema
            .read()
            .keyspace(keyspace)
            .map(|ks| ks.sharded)
            .unwrap_or(false)
    }

    // ── entry points ──────────────────────────────────────────────────────────

    /// Execute one route. `join_vars` extend the request's bind variables
    /// for this execution only.
    pub async fn execute_route(
        &self,
        ctx: &RequestContext,
        route: &Route,
        join_vars: &BindVars,
    ) -> GateResult<QueryResult> {
        let start = Instant::now();
        let mut scope = BindScope::with_overlay(&ctx.bind_vars, join_vars);
        let span = tracing::debug_span!(
            "execute_route",
            request_id = ctx.request_id.request_id,
            opcode = route.opcode.as_str(),
            keyspace = %route.keyspace,
        );
        let result = self.dispatch(ctx, route, &mut scope).instrument(span).await;
        finish(ctx, route.opcode, start, &result);
        result
    }

    /// Stream a select route into `callback`. Non-select routes are rejected.
    pub async fn stream_execute_route(
        &self,
        ctx: &RequestContext,
        route: &Route,
        join_vars: &BindVars,
        callback: &mut (dyn FnMut(QueryResult) -> GateResult<()> + Send),
    ) -> GateResult<()> {
        let start = Instant::now();
        let result = self
            .stream_inner(ctx, route, join_vars, callback)
            .await
            .op_context("stream_execute_route");
        finish(ctx, route.opcode, start, &result);
        result
    }

    /// Field descriptors of a route's result, from its field query on any
    /// one shard. Join variables are bound as NULL.
    pub async fn get_route_fields(
        &self,
        ctx: &RequestContext,
        route: &Route,
        join_vars: &BindVars,
    ) -> GateResult<QueryResult> {
        let nulls: BindVars = join_vars
            .keys()
            .chain(route.join_vars.iter())
            .map(|k| (k.clone(), Datum::Null))
            .collect();
        let scope = BindScope::with_overlay(&ctx.bind_vars, &nulls);
        let (keyspace, shard) = self
            .topology
            .resolve_any_shard(&route.keyspace, ctx.tablet_type)
            .await
            .op_context("get_route_fields")?;
        let req = self.shard_request(
            ctx,
            &keyspace,
            &shard,
            format!("{}{}", route.field_query, ctx.comments),
            scope.flatten(),
        );
        self.scatter
            .execute_one(req)
            .await
            .op_context("get_route_fields")
    }

    // ── dispatch ──────────────────────────────────────────────────────────────

    async fn dispatch(
        &self,
        ctx: &RequestContext,
        route: &Route,
        scope: &mut BindScope<'_>,
    ) -> GateResult<QueryResult> {
        tracing::debug!(query = %route.query, "Dispatching route");
        match route.opcode {
            Opcode::SelectUnsharded
            | Opcode::SelectEqualUnique
            | Opcode::SelectEqual
            | Opcode::SelectIN
            | Opcode::SelectScatter
            | Opcode::UpdateUnsharded
            | Opcode::DeleteUnsharded => {
                let requests = self.select_requests(ctx, route, scope).await?;
                if requests.is_empty() {
                    return Ok(QueryResult::empty());
                }
                self.scatter
                    .execute_multi(requests)
                    .await
                    .op_context("execute_route")
            }
            Opcode::UpdateEqual => self
                .exec_update_equal(ctx, route, scope)
                .await
                .op_context("exec_update_equal"),
            Opcode::DeleteEqual => self
                .exec_delete_equal(ctx, route, scope)
                .await
                .op_context("exec_delete_equal"),
            Opcode::InsertUnsharded => self
                .exec_insert_unsharded(ctx, route, scope)
                .await
                .op_context("exec_insert_unsharded"),
            Opcode::InsertSharded => self
                .exec_insert_sharded(ctx, route, scope)
                .await
                .op_context("exec_insert_sharded"),
        }
    }

    async fn stream_inner(
        &self,
        ctx: &RequestContext,
        route: &Route,
        join_vars: &BindVars,
        callback: &mut (dyn FnMut(QueryResult) -> GateResult<()> + Send),
    ) -> GateResult<()> {
        if !route.opcode.is_streamable() {
            return Err(PlanError::NotStreamable(route.query.clone()).into());
        }
        let mut scope = BindScope::with_overlay(&ctx.bind_vars, join_vars);
        let requests = self.select_requests(ctx, route, &mut scope).await?;
        if requests.is_empty() {
            return Ok(());
        }
        self.scatter.stream_execute_multi(requests, callback).await
    }

    /// Shard requests for the opcodes that need no pre-step beyond routing.
    /// Empty when the keys map to no shard.
    async fn select_requests(
        &self,
        ctx: &RequestContext,
        route: &Route,
        scope: &mut BindScope<'_>,
    ) -> GateResult<Vec<ShardRequest>> {
        match route.opcode {
            Opcode::SelectUnsharded | Opcode::UpdateUnsharded | Opcode::DeleteUnsharded => self
                .params_unsharded(ctx, route, scope)
                .await
                .op_context("params_unsharded"),
            Opcode::SelectEqual | Opcode::SelectEqualUnique => self
                .params_select_equal(ctx, route, scope)
                .await
                .op_context("params_select_equal"),
            Opcode::SelectIN => self
                .params_select_in(ctx, route, scope)
                .await
                .op_context("params_select_in"),
            Opcode::SelectScatter => self
                .params_select_scatter(ctx, route, scope)
                .await
                .op_context("params_select_scatter"),
            other => Err(PlanError::UnsupportedOpcode(other.to_string()).into()),
        }
    }

    async fn params_unsharded(
        &self,
        ctx: &RequestContext,
        route: &Route,
        scope: &BindScope<'_>,
    ) -> GateResult<Vec<ShardRequest>> {
        let ks = self.resolve_keyspace(ctx, &route.keyspace).await?;
        let shard = ks.single_shard()?;
        Ok(vec![self.shard_request(
            ctx,
            &ks.name,
            &shard.name,
            self.with_comments(ctx, &route.query),
            scope.flatten(),
        )])
    }

    async fn params_select_equal(
        &self,
        ctx: &RequestContext,
        route: &Route,
        scope: &BindScope<'_>,
    ) -> GateResult<Vec<ShardRequest>> {
        let key = single_value(route)?.resolve(scope)?;
        let ks = self.resolve_keyspace(ctx, &route.keyspace).await?;
        let cursor = RouteCursor::new(self, ctx);
        let mapped = map_keys(route.vindex()?.as_ref(), &cursor, &[key]).await?;

        let mut shards: Vec<String> = Vec::new();
        for ksid in mapped.iter().flatten() {
            let shard = shard_for_keyspace_id(&ks.name, &ks.shards, ksid)?;
            if !shards.contains(&shard.name) {
                shards.push(shard.name.clone());
            }
        }
        let query = self.with_comments(ctx, &route.query);
        let bind_vars = scope.flatten();
        Ok(shards
            .iter()
            .map(|shard| self.shard_request(ctx, &ks.name, shard, query.clone(), bind_vars.clone()))
            .collect())
    }

    async fn params_select_in(
        &self,
        ctx: &RequestContext,
        route: &Route,
        scope: &BindScope<'_>,
    ) -> GateResult<Vec<ShardRequest>> {
        let RouteValues::List(list) = &route.values else {
            return Err(PlanError::Malformed("SelectIN needs a list of values".into()).into());
        };
        let keys = list.resolve_list(scope)?;
        let ks = self.resolve_keyspace(ctx, &route.keyspace).await?;
        let cursor = RouteCursor::new(self, ctx);
        let mapped = map_keys(route.vindex()?.as_ref(), &cursor, &keys).await?;

        let mut routing = RoutingMap::new();
        for (key, ksids) in keys.into_iter().zip(mapped) {
            for ksid in &ksids {
                let shard = shard_for_keyspace_id(&ks.name, &ks.shards, ksid)?;
                routing.add(&shard.name, key.clone());
            }
        }
        tracing::debug!(shards = routing.len(), "Built IN routing map");
        let query = self.with_comments(ctx, &route.query);
        Ok(routing
            .shard_vars(&scope.flatten())
            .into_iter()
            .map(|(shard, bv)| self.shard_request(ctx, &ks.name, &shard, query.clone(), bv))
            .collect())
    }

    async fn params_select_scatter(
        &self,
        ctx: &RequestContext,
        route: &Route,
        scope: &BindScope<'_>,
    ) -> GateResult<Vec<ShardRequest>> {
        let ks = self.resolve_keyspace(ctx, &route.keyspace).await?;
        let query = self.with_comments(ctx, &route.query);
        let bind_vars = scope.flatten();
        Ok(ks
            .shards
            .iter()
            .map(|s| self.shard_request(ctx, &ks.name, &s.name, query.clone(), bind_vars.clone()))
            .collect())
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    async fn resolve_keyspace(
        &self,
        ctx: &RequestContext,
        keyspace: &str,
    ) -> GateResult<Arc<ResolvedKeyspace>> {
        self.topology.resolve_keyspace(keyspace, ctx.tablet_type).await
    }

    fn shard_request(
        &self,
        ctx: &RequestContext,
        keyspace: &str,
        shard: &str,
        query: String,
        bind_vars: BindVars,
    ) -> ShardRequest {
        ShardRequest {
            keyspace: keyspace.to_string(),
            shard: shard.to_string(),
            query,
            bind_vars,
            tablet_type: ctx.tablet_type,
            session: ctx.session.clone(),
            not_in_transaction: ctx.not_in_transaction,
            options: ctx.options.clone(),
        }
    }

    fn with_comments(&self, ctx: &RequestContext, query: &str) -> String {
        format!("{}{}", query, ctx.comments)
    }

    /// Query text for a single-shard write: keyspace-id annotation when
    /// enabled, then the trailing comments.
    fn annotate(&self, ctx: &RequestContext, query: &str, ksids: &[KeyspaceId]) -> String {
        if self.config.routing.annotate_keyspace_ids {
            add_keyspace_ids(query, ksids, &ctx.comments)
        } else {
            self.with_comments(ctx, query)
        }
    }
}

fn single_value(route: &Route) -> GateResult<&crate::bind_vars::ValueRef> {
    match &route.values {
        RouteValues::Single(v) => Ok(v),
        _ => Err(PlanError::Malformed(format!("{} needs a single key value", route.opcode)).into()),
    }
}

fn finish<T>(ctx: &RequestContext, opcode: Opcode, start: Instant, result: &GateResult<T>) {
    let duration_us = start.elapsed().as_micros() as u64;
    record_route_metrics(opcode.as_str(), duration_us, result.is_ok());
    if let Err(e) = result {
        tracing::warn!(
            request = %ctx.request_id.as_context_str(),
            opcode = opcode.as_str(),
            kind = ?e.kind(),
            error = %e,
            "Route execution failed"
        );
    }
}

/// [`VCursor`] handed to vindexes: queries run on the single shard of the
/// target keyspace within the request's session.
pub(crate) struct RouteCursor<'a> {
    router: &'a Router,
    ctx: &'a RequestContext,
}

impl<'a> RouteCursor<'a> {
    pub(crate) fn new(router: &'a Router, ctx: &'a RequestContext) -> Self {
        Self { router, ctx }
    }
}

#[async_trait]
impl<'a> VCursor for RouteCursor<'a> {
    async fn execute_keyspace(
        &self,
        keyspace: &str,
        query: &str,
        bind_vars: BindVars,
    ) -> GateResult<QueryResult> {
        let ks = self.router.resolve_keyspace(self.ctx, keyspace).await?;
        let shard = ks.single_shard()?;
        let req = self
            .router
            .shard_request(self.ctx, &ks.name, &shard.name, query.to_string(), bind_vars);
        self.router.scatter.execute_one(req).await
    }
}
