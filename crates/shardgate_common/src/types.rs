use std::fmt;

use serde::{Deserialize, Serialize};

use crate::datum::OwnedRow;

/// Column type as reported in field descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int64,
    UInt64,
    Float64,
    Text,
    Bytes,
    Tuple,
}

/// Which replica class a query is served from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabletType {
    #[default]
    Primary,
    Replica,
    Rdonly,
}

impl fmt::Display for TabletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TabletType::Primary => write!(f, "primary"),
            TabletType::Replica => write!(f, "replica"),
            TabletType::Rdonly => write!(f, "rdonly"),
        }
    }
}

/// Field descriptor of a result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Result of executing one query, on one shard or merged across many.
///
/// The shape is identical either way, so callers cannot tell a scatter
/// from a single-shard query by looking at the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub fields: Vec<Field>,
    pub rows: Vec<OwnedRow>,
    pub rows_affected: u64,
    /// Auto-increment value reported for an insert; 0 if not applicable.
    pub insert_id: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_rows_affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Default::default()
        }
    }

    /// Fold another shard's result into this one: rows appended, counts
    /// summed, fields taken from the first result that carries any.
    pub fn append(&mut self, other: QueryResult) {
        if self.fields.is_empty() {
            self.fields = other.fields;
        }
        self.rows_affected += other.rows_affected;
        if other.insert_id != 0 {
            self.insert_id = other.insert_id;
        }
        self.rows.extend(other.rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Datum;

    fn shard_result(id: i64, affected: u64) -> QueryResult {
        QueryResult {
            fields: vec![Field::new("id", DataType::Int64)],
            rows: vec![OwnedRow::new(vec![Datum::Int64(id)])],
            rows_affected: affected,
            insert_id: 0,
        }
    }

    #[test]
    fn test_append_merges_rows_and_counts() {
        let mut merged = QueryResult::empty();
        merged.append(shard_result(1, 3));
        merged.append(shard_result(2, 2));
        assert_eq!(merged.rows_affected, 5);
        assert_eq!(merged.rows.len(), 2);
        assert_eq!(merged.fields, vec![Field::new("id", DataType::Int64)]);
    }

    #[test]
    fn test_append_keeps_nonzero_insert_id() {
        let mut merged = QueryResult::empty();
        merged.append(QueryResult {
            insert_id: 9,
            ..Default::default()
        });
        merged.append(QueryResult::with_rows_affected(1));
        assert_eq!(merged.insert_id, 9);
    }

    #[test]
    fn test_tablet_type_serde_name() {
        assert_eq!(TabletType::Rdonly.to_string(), "rdonly");
        assert_eq!(TabletType::default(), TabletType::Primary);
    }
}
