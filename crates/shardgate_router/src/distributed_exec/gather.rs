//! Gather-phase merge logic: folding per-shard results into one.

use shardgate_common::types::QueryResult;

/// Merge per-shard results: rows appended in shard order, rows-affected
/// summed, fields taken from the first shard that reports any.
pub fn merge_results(results: Vec<QueryResult>) -> QueryResult {
    let mut merged = QueryResult::empty();
    for r in results {
        merged.append(r);
    }
    merged
}

/// Streaming counterpart of [`merge_results`]: lets field descriptors
/// through once, strips them from every later chunk.
#[derive(Debug, Default)]
pub struct StreamFields {
    sent: bool,
}

impl StreamFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare a chunk for the caller. `None` when nothing is left to send.
    pub fn filter(&mut self, mut chunk: QueryResult) -> Option<QueryResult> {
        if self.sent {
            chunk.fields.clear();
        } else if !chunk.fields.is_empty() {
            self.sent = true;
        }
        if chunk.fields.is_empty() && chunk.rows.is_empty() && chunk.rows_affected == 0 {
            return None;
        }
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardgate_common::datum::{Datum, OwnedRow};
    use shardgate_common::types::{DataType, Field};

    fn fields() -> Vec<Field> {
        vec![Field::new("id", DataType::Int64)]
    }

    fn rows(ids: &[i64]) -> Vec<OwnedRow> {
        ids.iter().map(|i| OwnedRow::new(vec![Datum::Int64(*i)])).collect()
    }

    #[test]
    fn test_merge_results() {
        let merged = merge_results(vec![
            QueryResult { fields: fields(), rows: rows(&[1, 2]), rows_affected: 0, insert_id: 0 },
            QueryResult { fields: fields(), rows: rows(&[3]), rows_affected: 0, insert_id: 0 },
            QueryResult::empty(),
        ]);
        assert_eq!(merged.fields, fields());
        assert_eq!(merged.rows, rows(&[1, 2, 3]));
    }

    #[test]
    fn test_merge_sums_rows_affected() {
        let merged = merge_results(vec![
            QueryResult::with_rows_affected(3),
            QueryResult::with_rows_affected(2),
        ]);
        assert_eq!(merged.rows_affected, 5);
        assert!(merged.fields.is_empty());
    }

    #[test]
    fn test_stream_fields_sent_once() {
        let mut f = StreamFields::new();
        let first = f
            .filter(QueryResult { fields: fields(), rows: vec![], rows_affected: 0, insert_id: 0 })
            .unwrap();
        assert_eq!(first.fields, fields());

        let second = f
            .filter(QueryResult { fields: fields(), rows: rows(&[7]), rows_affected: 0, insert_id: 0 })
            .unwrap();
        assert!(second.fields.is_empty());
        assert_eq!(second.rows, rows(&[7]));

        // A fields-only chunk from another shard carries nothing new.
        assert!(f
            .filter(QueryResult { fields: fields(), rows: vec![], rows_affected: 0, insert_id: 0 })
            .is_none());
    }
}
