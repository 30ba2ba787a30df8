//! Keyspace-id annotations on routed DML.
//!
//! Single-shard writes carry the keyspace ids they touch as a trailing
//! comment, `/* vtgate:: keyspace_id:<hex>[,<hex>...] */`, so downstream
//! filtered replication can tell which partition a statement belongs to.

use shardgate_common::keyspace_id::KeyspaceId;

const PREFIX: &str = "/* vtgate:: keyspace_id:";
const SUFFIX: &str = " */";

/// Append the annotation for `ksids`, then the request's trailing comments.
pub fn add_keyspace_ids(sql: &str, ksids: &[KeyspaceId], comments: &str) -> String {
    let hex: Vec<String> = ksids.iter().map(KeyspaceId::to_hex).collect();
    format!("{} {}{}{}{}", sql, PREFIX, hex.join(","), SUFFIX, comments)
}

/// Keyspace ids from an annotated statement, if it carries an annotation.
pub fn extract_keyspace_ids(sql: &str) -> Option<Vec<KeyspaceId>> {
    let start = sql.rfind(PREFIX)? + PREFIX.len();
    let len = sql[start..].find(SUFFIX)?;
    sql[start..start + len]
        .split(',')
        .map(KeyspaceId::from_hex)
        .collect()
}
