//! Shared fixtures for router integration tests: an in-memory shard
//! executor and a small topology.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use shardgate_common::config::RouterConfig;
use shardgate_common::datum::{Datum, OwnedRow};
use shardgate_common::error::{GateError, GateResult};
use shardgate_common::types::{DataType, Field, QueryResult};
use shardgate_router::session::ShardSession;
use shardgate_router::vindex::{HashVindex, LookupNonUnique, LookupParams, LookupUnique};
use shardgate_router::{
    BindVars, ColumnVindex, Router, ShardExecutor, ShardRequest, StaticTopology, Table,
    TopologySnapshot, Vindex,
};

pub const SEQUENCE_QUERY: &str = "select next :n values from user_seq";

/// `(from, to)` rows of one emulated lookup table.
struct LookupTableState {
    table: String,
    from: String,
    to: String,
    rows: Vec<(Datum, Datum)>,
}

/// Increments the counter when dropped before `complete`.
struct CancelGuard {
    counter: Arc<AtomicUsize>,
    done: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.done {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Shard executor that records every request and answers from memory.
///
/// - Lookup table queries are served from emulated tables.
/// - The sequence query hands out consecutive values starting at 100.
/// - Inserts report one affected row per value tuple.
/// - Canned results match by query prefix.
#[derive(Default)]
pub struct FakeExecutor {
    calls: Mutex<Vec<ShardRequest>>,
    lookups: Mutex<Vec<LookupTableState>>,
    canned: Mutex<Vec<(String, QueryResult)>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    sequence: AtomicI64,
    db_insert_id: AtomicU64,
    next_txn: AtomicU64,
    pub cancelled: Arc<AtomicUsize>,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        let exec = Self::default();
        exec.sequence.store(100, Ordering::SeqCst);
        exec.next_txn.store(1, Ordering::SeqCst);
        exec.with_lookup_table("name_user_idx", "name", "user_id");
        exec.with_lookup_table("email_user_idx", "email", "user_id");
        Arc::new(exec)
    }

    pub fn with_lookup_table(&self, table: &str, from: &str, to: &str) {
        self.lookups.lock().push(LookupTableState {
            table: table.into(),
            from: from.into(),
            to: to.into(),
            rows: Vec::new(),
        });
    }

    /// Seed a lookup row directly.
    pub fn put_lookup(&self, table: &str, from: Datum, to: Datum) {
        let mut tables = self.lookups.lock();
        if let Some(t) = tables.iter_mut().find(|t| t.table == table) {
            t.rows.push((from, to));
        }
    }

    pub fn lookup_rows(&self, table: &str) -> Vec<(Datum, Datum)> {
        self.lookups
            .lock()
            .iter()
            .find(|t| t.table == table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn respond(&self, prefix: &str, result: QueryResult) {
        self.canned.lock().push((prefix.to_string(), result));
    }

    pub fn fail_shard(&self, shard: &str) {
        self.failing.lock().insert(shard.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Insert id the "database" reports for every insert.
    pub fn set_db_insert_id(&self, id: u64) {
        self.db_insert_id.store(id, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ShardRequest> {
        self.calls.lock().clone()
    }

    /// Calls whose query starts with `prefix`.
    pub fn calls_for(&self, prefix: &str) -> Vec<ShardRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.query.starts_with(prefix))
            .collect()
    }

    fn serve_lookup(&self, req: &ShardRequest) -> Option<QueryResult> {
        let mut tables = self.lookups.lock();
        for t in tables.iter_mut() {
            let (table, from, to) = (&t.table, &t.from, &t.to);
            let fv = req.bind_vars.get(from.as_str()).cloned().unwrap_or(Datum::Null);
            let tv = req.bind_vars.get(to.as_str()).cloned().unwrap_or(Datum::Null);

            if req.query == format!("select {to} from {table} where {from} = :{from}") {
                let rows = t
                    .rows
                    .iter()
                    .filter(|(f, _)| *f == fv)
                    .map(|(_, k)| OwnedRow::new(vec![k.clone()]))
                    .collect();
                return Some(rows_result(to, DataType::Bytes, rows));
            }
            if req.query
                == format!("select {from} from {table} where {from} = :{from} and {to} = :{to}")
            {
                let rows = t
                    .rows
                    .iter()
                    .filter(|(f, k)| *f == fv && *k == tv)
                    .map(|(f, _)| OwnedRow::new(vec![f.clone()]))
                    .collect();
                return Some(rows_result(from, DataType::Text, rows));
            }
            if req.query == format!("insert into {table}({from}, {to}) values(:{from}, :{to})") {
                t.rows.push((fv, tv));
                return Some(QueryResult::with_rows_affected(1));
            }
            if req.query == format!("delete from {table} where {from} = :{from} and {to} = :{to}") {
                let before = t.rows.len();
                t.rows.retain(|(f, k)| !(*f == fv && *k == tv));
                return Some(QueryResult::with_rows_affected((before - t.rows.len()) as u64));
            }
        }
        None
    }

    fn answer(&self, req: &ShardRequest) -> GateResult<QueryResult> {
        if self.failing.lock().contains(&req.shard) {
            return Err(GateError::executor(&req.keyspace, &req.shard, "injected failure"));
        }
        if let Some(r) = self.serve_lookup(req) {
            return Ok(r);
        }
        if req.query == SEQUENCE_QUERY {
            let n = req.bind_vars.get("n").and_then(Datum::as_i64).unwrap_or(0);
            let first = self.sequence.fetch_add(n, Ordering::SeqCst);
            return Ok(rows_result(
                "nextval",
                DataType::Int64,
                vec![OwnedRow::new(vec![Datum::Int64(first)])],
            ));
        }
        let canned = self
            .canned
            .lock()
            .iter()
            .find(|(prefix, _)| req.query.starts_with(prefix.as_str()))
            .map(|(_, r)| r.clone());
        if let Some(r) = canned {
            return Ok(r);
        }
        if req.query.starts_with("insert") {
            let tuples = req.query.matches("), (").count() as u64 + 1;
            let mut r = QueryResult::with_rows_affected(tuples);
            r.insert_id = self.db_insert_id.load(Ordering::SeqCst);
            return Ok(r);
        }
        if req.query.starts_with("update") || req.query.starts_with("delete") {
            return Ok(QueryResult::with_rows_affected(1));
        }
        Ok(QueryResult::empty())
    }
}

#[async_trait]
impl ShardExecutor for FakeExecutor {
    async fn execute(&self, request: &ShardRequest) -> GateResult<QueryResult> {
        self.calls.lock().push(request.clone());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            let mut guard = CancelGuard {
                counter: self.cancelled.clone(),
                done: false,
            };
            tokio::time::sleep(delay).await;
            guard.done = true;
        }
        if let Some(session) = &request.session {
            if session.in_transaction()
                && session
                    .find(&request.keyspace, &request.shard, request.tablet_type)
                    .is_none()
            {
                session.append(ShardSession {
                    keyspace: request.keyspace.clone(),
                    shard: request.shard.clone(),
                    tablet_type: request.tablet_type,
                    transaction_id: self.next_txn.fetch_add(1, Ordering::SeqCst),
                });
            }
        }
        self.answer(request)
    }
}

pub fn rows_result(column: &str, data_type: DataType, rows: Vec<OwnedRow>) -> QueryResult {
    QueryResult {
        fields: vec![Field::new(column, data_type)],
        rows,
        rows_affected: 0,
        insert_id: 0,
    }
}

pub fn int_rows(column: &str, ids: &[i64]) -> QueryResult {
    rows_result(
        column,
        DataType::Int64,
        ids.iter().map(|i| OwnedRow::new(vec![Datum::Int64(*i)])).collect(),
    )
}

/// `user` on `-80`/`80-`, `wide` on three shards, unsharded `main` and
/// `lookup`, and `user` served from `user_archive` for rdonly.
pub fn topology() -> Arc<StaticTopology> {
    let snapshot = TopologySnapshot::new()
        .with_keyspace("user", "keyspace_id", &["-80", "80-"])
        .and_then(|s| s.with_keyspace("wide", "keyspace_id", &["-40", "40-80", "80-"]))
        .and_then(|s| s.with_keyspace("main", "", &["0"]))
        .and_then(|s| s.with_keyspace("lookup", "", &["0"]))
        .and_then(|s| s.with_keyspace("user_archive", "keyspace_id", &["-"]))
        .unwrap()
        .with_served_from("user", shardgate_common::types::TabletType::Rdonly, "user_archive");
    Arc::new(StaticTopology::new(snapshot))
}

pub fn router(exec: &Arc<FakeExecutor>) -> Router {
    router_with_config(exec, RouterConfig::default())
}

pub fn router_with_config(exec: &Arc<FakeExecutor>, config: RouterConfig) -> Router {
    shardgate_common::observability::init_tracing();
    Router::new(topology(), exec.clone(), config).unwrap()
}

pub fn bv(vars: &[(&str, Datum)]) -> BindVars {
    vars.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub fn hash_vindex() -> Arc<dyn Vindex> {
    Arc::new(HashVindex::new("user_index"))
}

fn lookup_params(table: &str, from: &str) -> LookupParams {
    LookupParams {
        table: table.into(),
        from: from.into(),
        to: "user_id".into(),
        keyspace: "lookup".into(),
    }
}

/// Non-unique lookup on `name`, stored in `name_user_idx`.
pub fn name_vindex() -> Arc<dyn Vindex> {
    Arc::new(LookupNonUnique::new("name_user_map", lookup_params("name_user_idx", "name")))
}

/// Unique lookup on `email`, stored in `email_user_idx`.
pub fn email_vindex() -> Arc<dyn Vindex> {
    Arc::new(LookupUnique::new("email_user_map", lookup_params("email_user_idx", "email")))
}

/// `user(id, name)`: hash primary on `id`, owned lookup on `name`.
pub fn user_table() -> Arc<Table> {
    Arc::new(
        Table::new(
            "user",
            vec![
                ColumnVindex::new("id", hash_vindex(), false).unwrap(),
                ColumnVindex::new("name", name_vindex(), true).unwrap(),
            ],
        )
        .unwrap(),
    )
}

/// Keyspace ids by user id, as the hash vindex computes them.
pub fn ksid_of(id: u64) -> Datum {
    Datum::Bytes(HashVindex::hash(id).as_bytes().to_vec())
}

/// Shard → rows-count map of insert calls against `table`.
pub fn inserts_by_shard(exec: &FakeExecutor, table: &str) -> BTreeMap<String, String> {
    exec.calls_for(&format!("insert into {}", table))
        .into_iter()
        .map(|c| (c.shard, c.query))
        .collect()
}
