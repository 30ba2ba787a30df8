//! The boundary to the physical transport that runs a query on one shard.

use async_trait::async_trait;

use shardgate_common::error::GateResult;
use shardgate_common::types::{QueryResult, TabletType};

use crate::bind_vars::BindVars;
use crate::session::{ExecuteOptions, SafeSession};

/// One query for one shard.
#[derive(Debug, Clone)]
pub struct ShardRequest {
    pub keyspace: String,
    pub shard: String,
    pub query: String,
    pub bind_vars: BindVars,
    pub tablet_type: TabletType,
    /// `None` runs the query outside any client transaction.
    pub session: Option<SafeSession>,
    pub not_in_transaction: bool,
    pub options: ExecuteOptions,
}

#[async_trait]
pub trait ShardExecutor: Send + Sync {
    async fn execute(&self, request: &ShardRequest) -> GateResult<QueryResult>;

    /// Stream results chunk by chunk. Defaults to one chunk holding the
    /// whole result.
    async fn stream_execute(
        &self,
        request: &ShardRequest,
        sink: &mut (dyn FnMut(QueryResult) -> GateResult<()> + Send),
    ) -> GateResult<()> {
        let result = self.execute(request).await?;
        sink(result)
    }
}
