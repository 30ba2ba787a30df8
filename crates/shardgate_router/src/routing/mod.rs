//! Shard resolution and per-request routing maps.

pub mod routing_map;
pub mod shard_map;

pub use routing_map::{InsertRouting, RoutingMap, LIST_VAR_NAME};
pub use shard_map::{shard_for_keyspace_id, KeyRange, ShardReference};
