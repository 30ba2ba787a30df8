//! Scatter phase: run shard requests concurrently under one timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use shardgate_common::config::ScatterConfig;
use shardgate_common::error::{GateError, GateResult};
use shardgate_common::observability::record_scatter_shards;
use shardgate_common::types::QueryResult;

use super::gather::{merge_results, StreamFields};
use super::ScatterMetrics;
use crate::executor::{ShardExecutor, ShardRequest};

type ShardOutcome<T> = (usize, String, GateResult<T>);

/// Fan-out front end over a [`ShardExecutor`].
pub struct ScatterConn {
    executor: Arc<dyn ShardExecutor>,
    timeout: Option<Duration>,
    max_parallelism: usize,
}

impl ScatterConn {
    pub fn new(executor: Arc<dyn ShardExecutor>, config: &ScatterConfig) -> Self {
        Self {
            executor,
            timeout: config.timeout(),
            max_parallelism: config.max_parallelism,
        }
    }

    /// Run one request on its shard.
    pub async fn execute_one(&self, request: ShardRequest) -> GateResult<QueryResult> {
        tracing::debug!(keyspace = %request.keyspace, shard = %request.shard, "Executing on single shard");
        self.bounded("shard call", self.executor.execute(&request)).await
    }

    /// Run every request concurrently; results come back in request order.
    pub async fn execute_each(&self, requests: Vec<ShardRequest>) -> GateResult<Vec<QueryResult>> {
        record_scatter_shards(requests.len());
        match requests.len() {
            0 => Ok(Vec::new()),
            1 => {
                let mut requests = requests;
                let request = requests.remove(0);
                Ok(vec![self.execute_one(request).await?])
            }
            _ => self.bounded("scatter", self.run_all(requests)).await,
        }
    }

    /// Run every request concurrently and merge the results.
    pub async fn execute_multi(&self, requests: Vec<ShardRequest>) -> GateResult<QueryResult> {
        Ok(merge_results(self.execute_each(requests).await?))
    }

    /// Stream every request concurrently into `callback`. Chunks are
    /// forwarded as shards produce them; field descriptors go out once.
    pub async fn stream_execute_multi(
        &self,
        requests: Vec<ShardRequest>,
        callback: &mut (dyn FnMut(QueryResult) -> GateResult<()> + Send),
    ) -> GateResult<()> {
        record_scatter_shards(requests.len());
        self.bounded("stream scatter", self.stream_all(requests, callback))
            .await
    }

    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = GateResult<T>>,
    ) -> GateResult<T> {
        let Some(timeout) = self.timeout else {
            return fut.await;
        };
        match tokio::time::timeout(timeout, fut).await {
            Ok(r) => r,
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, what, "Shard fan-out timed out");
                Err(GateError::Timeout {
                    reason: what.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    fn semaphore(&self, shards: usize) -> Option<Arc<Semaphore>> {
        (self.max_parallelism > 0 && self.max_parallelism < shards)
            .then(|| Arc::new(Semaphore::new(self.max_parallelism)))
    }

    async fn run_all(&self, requests: Vec<ShardRequest>) -> GateResult<Vec<QueryResult>> {
        let start = Instant::now();
        let semaphore = self.semaphore(requests.len());
        let mut set = JoinSet::new();
        for (idx, req) in requests.into_iter().enumerate() {
            let executor = Arc::clone(&self.executor);
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = match semaphore {
                    Some(s) => s.acquire_owned().await.ok(),
                    None => None,
                };
                let result = executor.execute(&req).await;
                (idx, req.shard, result)
            });
        }
        let results = join_all(set).await;
        tracing::debug!(
            latency_us = start.elapsed().as_micros() as u64,
            "Scatter finished"
        );
        results
    }

    async fn stream_all(
        &self,
        requests: Vec<ShardRequest>,
        callback: &mut (dyn FnMut(QueryResult) -> GateResult<()> + Send),
    ) -> GateResult<()> {
        let semaphore = self.semaphore(requests.len());
        let (tx, mut rx) = mpsc::unbounded_channel::<QueryResult>();
        let mut set = JoinSet::new();
        for (idx, req) in requests.into_iter().enumerate() {
            let executor = Arc::clone(&self.executor);
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            set.spawn(async move {
                let _permit = match semaphore {
                    Some(s) => s.acquire_owned().await.ok(),
                    None => None,
                };
                let mut forward = |chunk: QueryResult| -> GateResult<()> {
                    tx.send(chunk)
                        .map_err(|_| GateError::Cancelled("stream consumer went away".into()))
                };
                let result = executor.stream_execute(&req, &mut forward).await;
                (idx, req.shard, result)
            });
        }
        drop(tx);

        // The channel closes once every shard task has finished.
        let mut fields = StreamFields::new();
        while let Some(chunk) = rx.recv().await {
            if let Some(chunk) = fields.filter(chunk) {
                callback(chunk)?;
            }
        }
        join_all(set).await.map(|_| ())
    }
}

/// Wait for every shard task, then fail with the first error by request
/// order if any shard failed.
async fn join_all<T: Send + 'static>(mut set: JoinSet<ShardOutcome<T>>) -> GateResult<Vec<T>> {
    let total = set.len();
    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
    let mut errors: Vec<(usize, GateError)> = Vec::new();
    let mut metrics = ScatterMetrics {
        shards_participated: total,
        ..Default::default()
    };

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, _, Ok(value))) => {
                if let Some(slot) = slots.get_mut(idx) {
                    *slot = Some(value);
                }
            }
            Ok((idx, shard, Err(e))) => {
                tracing::warn!(shard = %shard, error = %e, "Shard failed during scatter");
                metrics.failed_shards.push(shard);
                errors.push((idx, e));
            }
            Err(join_err) => {
                errors.push((
                    usize::MAX,
                    GateError::Internal(format!("shard task did not complete: {}", join_err)),
                ));
            }
        }
    }
    tracing::debug!(
        shards = metrics.shards_participated,
        failed = metrics.failed_shards.len(),
        "Gathered shard outcomes"
    );

    if !errors.is_empty() {
        errors.sort_by_key(|(idx, _)| *idx);
        let failed = errors.len();
        let mut errors = errors.into_iter();
        if let Some((_, first)) = errors.next() {
            return Err(if failed == 1 {
                first
            } else {
                first.with_context(format!("{} of {} shards failed", failed, total))
            });
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.ok_or_else(|| GateError::Internal("shard produced no outcome".into())))
        .collect()
}
