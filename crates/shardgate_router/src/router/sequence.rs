use shardgate_common::datum::Datum;
use shardgate_common::error::{ConsistencyError, GateResult, ResultExt};
use shardgate_common::observability::record_sequence_values;
use shardgate_common::types::{QueryResult, TabletType};

use crate::bind_vars::{BindScope, BindVars};
use crate::executor::ShardRequest;
use crate::route::{Generate, SEQ_VAR_PREFIX};
use crate::session::ExecuteOptions;

use super::Router;

/// Values reserved from a sequence for one insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratedIds {
    pub first: i64,
    pub count: u64,
}

impl GeneratedIds {
    /// Fold the generated ids into an insert result. The reported insert id
    /// is the generated one only when exactly one value was generated.
    pub(crate) fn apply(&self, result: &mut QueryResult) -> GateResult<()> {
        if self.count == 0 {
            return Ok(());
        }
        if result.insert_id != 0 {
            return Err(ConsistencyError::DualInsertId.into());
        }
        if self.count == 1 {
            result.insert_id = self.first as u64;
        }
        Ok(())
    }
}

impl Router {
    /// Fill in `__seq<i>` for every insert row: the supplied value where
    /// one was given, otherwise the next value reserved from the sequence.
    pub(crate) async fn handle_generate(
        &self,
        generate: Option<&Generate>,
        scope: &mut BindScope<'_>,
    ) -> GateResult<GeneratedIds> {
        let Some(generate) = generate else {
            return Ok(GeneratedIds::default());
        };

        let mut supplied = Vec::with_capacity(generate.values.len());
        for value in &generate.values {
            let v = value.resolve(scope)?;
            supplied.push(if v.is_null() { None } else { Some(v) });
        }
        let count = supplied.iter().filter(|v| v.is_none()).count() as u64;

        let mut next = 0;
        if count > 0 {
            next = self
                .reserve_sequence(generate, count)
                .await
                .op_context("handle_generate")?;
            record_sequence_values(count);
            tracing::debug!(
                keyspace = %generate.keyspace,
                first = next,
                count,
                "Reserved sequence values"
            );
        }

        let first = next;
        for (i, value) in supplied.into_iter().enumerate() {
            let v = match value {
                Some(v) => v,
                None => {
                    let v = Datum::Int64(next);
                    next += 1;
                    v
                }
            };
            scope.set(format!("{}{}", SEQ_VAR_PREFIX, i), v);
        }
        Ok(GeneratedIds { first, count })
    }

    /// Ask the sequence for `count` values; returns the first. Runs on the
    /// primary outside the client transaction.
    async fn reserve_sequence(
        &self,
        generate: &Generate,
        count: u64,
    ) -> GateResult<i64> {
        let ks = self
            .topology
            .resolve_keyspace(&generate.keyspace, TabletType::Primary)
            .await?;
        let shard = ks.single_shard()?;

        let mut bind_vars = BindVars::new();
        bind_vars.insert(
            self.config.sequence.count_bind_var.clone(),
            Datum::Int64(count as i64),
        );
        let req = ShardRequest {
            keyspace: ks.name.clone(),
            shard: shard.name.clone(),
            query: generate.query.clone(),
            bind_vars,
            tablet_type: TabletType::Primary,
            session: None,
            not_in_transaction: true,
            options: ExecuteOptions::default(),
        };
        let result = self.scatter.execute_one(req).await?;
        result
            .rows
            .first()
            .and_then(|row| row.get(0))
            .and_then(|d| d.as_i64())
            .ok_or_else(|| ConsistencyError::SequenceEmpty(generate.query.clone()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_generated_id_becomes_insert_id() {
        let ids = GeneratedIds { first: 100, count: 1 };
        let mut r = QueryResult::with_rows_affected(1);
        ids.apply(&mut r).unwrap();
        assert_eq!(r.insert_id, 100);
    }

    #[test]
    fn test_multiple_generated_ids_leave_insert_id_unset() {
        let ids = GeneratedIds { first: 100, count: 3 };
        let mut r = QueryResult::with_rows_affected(3);
        ids.apply(&mut r).unwrap();
        assert_eq!(r.insert_id, 0);
    }

    #[test]
    fn test_db_insert_id_passes_through_without_generation() {
        let mut r = QueryResult::with_rows_affected(1);
        r.insert_id = 42;
        GeneratedIds::default().apply(&mut r).unwrap();
        assert_eq!(r.insert_id, 42);
    }

    #[test]
    fn test_dual_insert_id() {
        let ids = GeneratedIds { first: 100, count: 1 };
        let mut r = QueryResult::with_rows_affected(1);
        r.insert_id = 7;
        let err = ids.apply(&mut r).unwrap_err();
        assert!(err.is_consistency());
    }
}
