use crate::core::Result;
use crate::storage::Storage;

use super::{ExecutionMode, Operator};

/// Wraps a composed operator tree as the root of one query. Stands in for
/// the out-of-scope surface query-builder: something still has to drive the
/// root operator and hand back the relation its result was written to.
pub struct Plan {
    root: Box<dyn Operator>,
    finalized: bool,
}

impl Plan {
    pub fn new(root: Box<dyn Operator>) -> Self {
        Self {
            root,
            finalized: false,
        }
    }

    /// Runs the root operator to completion — draining `next()` until
    /// exhaustion for a pipelined root, or simply calling `open()` for a
    /// batch root, which already runs to completion internally — and
    /// returns the relation id its output was written to.
    pub fn finalize(&mut self, storage: &mut Storage) -> Result<String> {
        self.root.open(storage)?;
        if matches!(self.root_mode(), ExecutionMode::Pipelined) {
            while self.root.next(storage)?.is_some() {}
        }
        self.root.close(storage)?;
        self.finalized = true;
        Ok(self.root.relation_id())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn root(&self) -> &dyn Operator {
        self.root.as_ref()
    }

    /// A pipelined root's output relation is only fully populated once
    /// `next()` has been drained to `None`; a batch root's `open()` already
    /// does that internally, so draining again would just find an empty
    /// remainder. `finalize` tells these apart by relying on the operator's
    /// own knowledge of its mode rather than re-deriving it here.
    fn root_mode(&self) -> ExecutionMode {
        self.root.mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Field, Record, Type, Value};
    use crate::operator::scan::Scan;
    use crate::operator::select::Select;
    use crate::expr::{BinOp, Expr};

    fn int_schema() -> Schema {
        Schema::new(vec![Field::new("id", Type::Int)])
    }

    fn storage_with(values: &[i64]) -> Storage {
        let mut storage = Storage::new(8);
        let schema = int_schema();
        storage.create_relation("t", schema.clone());
        for v in values {
            let packed = schema.pack(&Record::new(vec![Value::Int(*v)])).unwrap();
            storage.insert_tuple("t", packed).unwrap();
        }
        storage
    }

    fn gt_one() -> Expr {
        Expr::BinaryOp(BinOp::Gt, Box::new(Expr::column("id")), Box::new(Expr::int(1)))
    }

    #[test]
    fn finalize_drains_a_pipelined_root() {
        let mut storage = storage_with(&[1, 2, 3]);
        let scan = Box::new(Scan::new("t", int_schema(), ExecutionMode::Pipelined));
        let select = Box::new(Select::new(scan, gt_one(), ExecutionMode::Pipelined));
        let mut plan = Plan::new(select);
        let relation_id = plan.finalize(&mut storage).unwrap();
        assert!(plan.is_finalized());

        let relation = storage.get_relation(&relation_id).unwrap();
        let rows: Vec<_> = relation
            .pages()
            .iter()
            .flat_map(|p| p.iter())
            .map(|t| int_schema().unpack(t).unwrap().values[0].clone())
            .collect();
        assert_eq!(rows, vec![Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn finalize_is_a_no_op_redrain_for_a_batch_root() {
        let mut storage = storage_with(&[1, 2, 3]);
        let scan = Box::new(Scan::new("t", int_schema(), ExecutionMode::Batch));
        let select = Box::new(Select::new(scan, gt_one(), ExecutionMode::Batch));
        let mut plan = Plan::new(select);
        let relation_id = plan.finalize(&mut storage).unwrap();

        // A batch root already fully populated its output during open();
        // finalize must not try to redrain it through next().
        assert_eq!(plan.root().mode(), ExecutionMode::Batch);
        let relation = storage.get_relation(&relation_id).unwrap();
        let rows: Vec<_> = relation
            .pages()
            .iter()
            .flat_map(|p| p.iter())
            .map(|t| int_schema().unpack(t).unwrap().values[0].clone())
            .collect();
        assert_eq!(rows, vec![Value::Int(2), Value::Int(3)]);
    }
}
