//! Shard routing core of a distributed SQL proxy.
//!
//! Takes planned [`Route`]s, maps their key values to keyspace ids through
//! vindexes, resolves the owning shards from topology and executes the
//! resulting per-shard queries through a [`ShardExecutor`]. Sharded inserts
//! maintain owned lookup vindexes and draw auto-increment values from
//! sequences.

pub mod annotation;
pub mod bind_vars;
pub mod cursor;
pub mod distributed_exec;
pub mod executor;
pub mod route;
pub mod router;
pub mod routing;
pub mod session;
pub mod topology;
pub mod vindex;

pub use bind_vars::{BindScope, BindVars, ValueRef};
pub use cursor::VCursor;
pub use executor::{ShardExecutor, ShardRequest};
pub use route::{ColumnVindex, Generate, Opcode, Route, RouteValues, Table};
pub use router::{GeneratedIds, RequestContext, Router};
pub use session::{ExecuteOptions, SafeSession, ShardSession};
pub use topology::{ResolvedKeyspace, SrvTopology, StaticTopology, TopologySnapshot};
pub use vindex::{VSchema, Vindex};
