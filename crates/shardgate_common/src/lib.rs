//! Shared types for the shardgate routing core: error taxonomy, scalar
//! values, keyspace ids, result shapes, configuration and observability.

pub mod config;
pub mod datum;
pub mod error;
pub mod keyspace_id;
pub mod observability;
pub mod request_context;
pub mod types;

pub use config::RouterConfig;
pub use datum::{Datum, OwnedRow};
pub use error::{GateError, GateResult};
pub use keyspace_id::KeyspaceId;
pub use types::{DataType, Field, QueryResult, TabletType};
