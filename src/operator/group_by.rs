use std::collections::{HashMap, HashSet};

use crate::core::{EngineError, Record, Result, Schema, Type, Value};
use crate::expr::{AggregateExpr, Accumulator, Expr};
use crate::storage::{Page, PageId, Storage};

use super::{ExecutionMode, Operator, OperatorCore};

/// One grouping-key output column: its name, the expression that computes
/// it from the child's environment, and its declared type.
pub struct GroupField {
    pub name: String,
    pub expr: Expr,
    pub ty: Type,
}

/// One aggregate output column.
pub struct AggField {
    pub name: String,
    pub agg: AggregateExpr,
    pub ty: Type,
}

/// Two-phase partitioned group-by-aggregate: tuples are first partitioned
/// into buckets by `group_hash_fn`, then each bucket is aggregated.
///
/// The aggregation phase rebuilds its group→accumulator map for every page
/// *within* a partition rather than once per partition, so a group key that
/// spans more than one page of the same bucket produces one partial output
/// row per page instead of a single combined row. This mirrors the
/// reference implementation's behavior exactly; see `DESIGN.md`.
pub struct GroupBy {
    core: OperatorCore,
    child: Box<dyn Operator>,
    group_fields: Vec<GroupField>,
    agg_fields: Vec<AggField>,
    group_hash_fn: Expr,
}

impl GroupBy {
    pub fn new(
        child: Box<dyn Operator>,
        group_fields: Vec<GroupField>,
        agg_fields: Vec<AggField>,
        group_hash_fn: Expr,
        mode: ExecutionMode,
    ) -> Result<Self> {
        if mode != ExecutionMode::Batch {
            return Err(EngineError::configuration(
                "group-by is a batch-only operator and cannot be constructed in pipelined mode",
            ));
        }
        if agg_fields.is_empty() {
            return Err(EngineError::configuration(
                "group-by needs at least one aggregate expression",
            ));
        }

        let mut fields = Vec::with_capacity(group_fields.len() + agg_fields.len());
        fields.extend(
            group_fields
                .iter()
                .map(|f| crate::core::Field::new(f.name.clone(), f.ty)),
        );
        fields.extend(
            agg_fields
                .iter()
                .map(|f| crate::core::Field::new(f.name.clone(), f.ty)),
        );
        let schema = Schema::new(fields);

        Ok(Self {
            core: OperatorCore::new("GroupBy", mode, schema),
            child,
            group_fields,
            agg_fields,
            group_hash_fn,
        })
    }

    /// Phase one: drains the child and scatters its tuples across
    /// `{relation_id}_{bucket}` partition relations, keyed by
    /// `group_hash_fn`. Returns buckets in the order their key first
    /// appeared, the guard tracking every partition relation created so far,
    /// and the scatter's own result — always returned alongside the guard
    /// (rather than via `Result<(..)>`) so a mid-scan evaluation failure
    /// still leaves the caller able to release whatever was created before
    /// it failed.
    fn partition(
        &mut self,
        storage: &mut Storage,
    ) -> (Vec<String>, crate::storage::PartitionGuard, Result<()>) {
        let base = self.core.relation_id();
        let child_schema = self.child.schema().clone();
        let mut bucket_order = Vec::new();
        let mut seen = HashSet::new();
        let mut partitions = crate::storage::PartitionGuard::new();

        let result = self.scatter_into_partitions(
            storage,
            &child_schema,
            &base,
            &mut bucket_order,
            &mut seen,
            &mut partitions,
        );
        (bucket_order, partitions, result)
    }

    fn scatter_into_partitions(
        &mut self,
        storage: &mut Storage,
        child_schema: &Schema,
        base: &str,
        bucket_order: &mut Vec<String>,
        seen: &mut HashSet<String>,
        partitions: &mut crate::storage::PartitionGuard,
    ) -> Result<()> {
        while let Some((_, page)) = self.child.next(storage)? {
            for tuple in page.iter() {
                let env = child_schema.environment(tuple)?;
                let key = self.group_hash_fn.eval(&env)?.bucket_key();
                let rel_id = format!("{base}_{key}");
                storage.create_relation(&rel_id, child_schema.clone());
                storage.insert_tuple(&rel_id, tuple.clone())?;
                if seen.insert(key.clone()) {
                    partitions.push(rel_id);
                    bucket_order.push(key);
                }
            }
        }
        Ok(())
    }

    /// Phase two: aggregates one partition, page by page, rebuilding the
    /// group map for each page (the deliberate per-page behavior above).
    fn aggregate_partition(&mut self, storage: &mut Storage, rel_id: &str) -> Result<()> {
        let child_schema = self.child.schema().clone();
        let pages: Vec<Page> = storage.get_relation(rel_id)?.pages().to_vec();

        for page in &pages {
            let mut order: Vec<Vec<Value>> = Vec::new();
            let mut groups: HashMap<Vec<Value>, Vec<Accumulator>> = HashMap::new();

            for tuple in page.iter() {
                let env = child_schema.environment(tuple)?;
                let key: Vec<Value> = self
                    .group_fields
                    .iter()
                    .map(|f| f.expr.eval(&env))
                    .collect::<Result<_>>()?;

                let accs = groups.entry(key.clone()).or_insert_with(|| {
                    order.push(key.clone());
                    self.agg_fields.iter().map(|f| f.agg.init.clone()).collect()
                });

                for (acc, field) in accs.iter_mut().zip(self.agg_fields.iter()) {
                    *acc = (field.agg.step)(&*acc, &env)?;
                }
            }

            for key in &order {
                let accs = groups.get(key).expect("key was just inserted");
                let mut values = key.clone();
                values.extend(
                    accs.iter()
                        .zip(self.agg_fields.iter())
                        .map(|(acc, field)| (field.agg.finalize)(acc)),
                );
                let packed = self.core.schema.pack(&Record::new(values))?;
                self.core.emit_output_tuple(storage, packed)?;
            }
        }
        Ok(())
    }

    fn run(&mut self, storage: &mut Storage) -> Result<()> {
        let (bucket_order, partitions, partition_result) = self.partition(storage);
        let base = self.core.relation_id();

        let mut result = partition_result;
        if result.is_ok() {
            for key in &bucket_order {
                let rel_id = format!("{base}_{key}");
                if let Err(err) = self.aggregate_partition(storage, &rel_id) {
                    result = Err(err);
                    break;
                }
            }
        }

        partitions.release(storage);
        result
    }
}

impl Operator for GroupBy {
    fn schema(&self) -> &Schema {
        &self.core.schema
    }

    fn input_schemas(&self) -> Vec<&Schema> {
        vec![self.child.schema()]
    }

    fn operator_type(&self) -> &'static str {
        "GroupBy"
    }

    fn relation_id(&self) -> String {
        self.core.relation_id()
    }

    fn ordinal(&self) -> super::OperatorId {
        self.core.id
    }

    fn mode(&self) -> ExecutionMode {
        self.core.mode
    }

    fn open(&mut self, storage: &mut Storage) -> Result<()> {
        self.child.open(storage)?;
        self.core.initialize_output(storage);
        self.run(storage)
    }

    fn next(&mut self, storage: &mut Storage) -> Result<Option<(PageId, Page)>> {
        self.core.next_output_page(storage)
    }

    fn close(&mut self, storage: &mut Storage) -> Result<()> {
        self.child.close(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Field;
    use crate::expr::BinOp;
    use crate::operator::scan::Scan;

    fn key_schema() -> Schema {
        Schema::new(vec![Field::new("k", Type::Int)])
    }

    fn storage_with_keys(keys: &[i64]) -> Storage {
        let mut storage = Storage::new(8);
        let schema = key_schema();
        storage.create_relation("t", schema.clone());
        for k in keys {
            let packed = schema.pack(&Record::new(vec![Value::Int(*k)])).unwrap();
            storage.insert_tuple("t", packed).unwrap();
        }
        storage
    }

    fn count_by_k() -> GroupBy {
        let child = Box::new(Scan::new("t", key_schema(), ExecutionMode::Pipelined));
        GroupBy::new(
            child,
            vec![GroupField {
                name: "k".to_string(),
                expr: Expr::column("k"),
                ty: Type::Int,
            }],
            vec![AggField {
                name: "cnt".to_string(),
                agg: AggregateExpr::count(),
                ty: Type::Int,
            }],
            Expr::column("k"),
            ExecutionMode::Batch,
        )
        .unwrap()
    }

    fn collect(group_by: &mut GroupBy, storage: &mut Storage) -> Vec<(i64, i64)> {
        let schema = group_by.schema().clone();
        let mut rows = Vec::new();
        while let Some((_, page)) = group_by.next(storage).unwrap() {
            for tuple in page.iter() {
                let record = schema.unpack(tuple).unwrap();
                let (Value::Int(k), Value::Int(cnt)) = (&record.values[0], &record.values[1])
                else {
                    panic!("expected two ints");
                };
                rows.push((*k, *cnt));
            }
        }
        rows
    }

    #[test]
    fn a_group_confined_to_one_page_aggregates_to_a_single_row() {
        let mut storage = storage_with_keys(&[2, 2, 2]);
        let mut group_by = count_by_k();
        group_by.open(&mut storage).unwrap();
        assert_eq!(collect(&mut group_by, &mut storage), vec![(2, 3)]);
    }

    #[test]
    fn a_group_spanning_multiple_pages_emits_one_partial_row_per_page() {
        // Six tuples of the same key overflow one page (capacity 4), so the
        // per-page aggregation map produces (1, 4) then (1, 2) rather than a
        // single combined (1, 6) row.
        let mut storage = storage_with_keys(&[1, 1, 1, 1, 1, 1]);
        let mut group_by = count_by_k();
        group_by.open(&mut storage).unwrap();
        assert_eq!(collect(&mut group_by, &mut storage), vec![(1, 4), (1, 2)]);
    }

    #[test]
    fn buckets_are_emitted_in_first_seen_order() {
        let mut storage = storage_with_keys(&[1, 1, 1, 1, 1, 1, 2, 2, 2]);
        let mut group_by = count_by_k();
        group_by.open(&mut storage).unwrap();
        assert_eq!(
            collect(&mut group_by, &mut storage),
            vec![(1, 4), (1, 2), (2, 3)]
        );
    }

    #[test]
    fn partition_relations_are_removed_once_aggregation_finishes() {
        let mut storage = storage_with_keys(&[1, 2, 3]);
        let mut group_by = count_by_k();
        let base = group_by.relation_id();
        group_by.open(&mut storage).unwrap();
        for k in [1, 2, 3] {
            assert!(!storage.relation_exists(&format!("{base}_{k}")));
        }
    }

    #[test]
    fn partition_relations_are_released_even_when_a_later_tuple_fails_to_hash() {
        crate::test_support::init_logging();
        // hash(k) = 1 / (k - 3): well-defined for k=1,2 (creating partitions
        // along the way) but divides by zero on k=3, which must still leave
        // the two already-created partitions cleaned up.
        let mut storage = storage_with_keys(&[1, 2, 3]);
        let child = Box::new(Scan::new("t", key_schema(), ExecutionMode::Pipelined));
        let failing_hash_fn = Expr::BinaryOp(
            BinOp::Div,
            Box::new(Expr::int(1)),
            Box::new(Expr::BinaryOp(
                BinOp::Sub,
                Box::new(Expr::column("k")),
                Box::new(Expr::int(3)),
            )),
        );
        let mut group_by = GroupBy::new(
            child,
            vec![GroupField {
                name: "k".to_string(),
                expr: Expr::column("k"),
                ty: Type::Int,
            }],
            vec![AggField {
                name: "cnt".to_string(),
                agg: AggregateExpr::count(),
                ty: Type::Int,
            }],
            failing_hash_fn,
            ExecutionMode::Batch,
        )
        .unwrap();
        let base = group_by.relation_id();

        assert!(group_by.open(&mut storage).is_err());
        assert!(!storage.relation_exists(&format!("{base}_0")));
        assert!(!storage.relation_exists(&format!("{base}_-1")));
    }

    #[test]
    fn group_by_rejects_pipelined_mode() {
        let child = Box::new(Scan::new("t", key_schema(), ExecutionMode::Pipelined));
        let result = GroupBy::new(
            child,
            vec![GroupField {
                name: "k".to_string(),
                expr: Expr::column("k"),
                ty: Type::Int,
            }],
            vec![AggField {
                name: "cnt".to_string(),
                agg: AggregateExpr::count(),
                ty: Type::Int,
            }],
            Expr::column("k"),
            ExecutionMode::Pipelined,
        );
        assert!(result.is_err());
    }

    #[test]
    fn group_by_requires_at_least_one_aggregate_even_with_group_fields() {
        let child = Box::new(Scan::new("t", key_schema(), ExecutionMode::Pipelined));
        let result = GroupBy::new(
            child,
            vec![GroupField {
                name: "k".to_string(),
                expr: Expr::column("k"),
                ty: Type::Int,
            }],
            vec![],
            Expr::column("k"),
            ExecutionMode::Batch,
        );
        assert!(result.is_err());
    }
}
