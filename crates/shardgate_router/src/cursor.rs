use async_trait::async_trait;

use shardgate_common::error::GateResult;
use shardgate_common::types::QueryResult;

use crate::bind_vars::BindVars;

/// Query handle given to vindexes that keep their own tables.
///
/// Queries run against the named (unsharded) keyspace inside the caller's
/// session, so lookup writes commit or roll back with the base-table write.
#[async_trait]
pub trait VCursor: Send + Sync {
    async fn execute_keyspace(
        &self,
        keyspace: &str,
        query: &str,
        bind_vars: BindVars,
    ) -> GateResult<QueryResult>;
}
