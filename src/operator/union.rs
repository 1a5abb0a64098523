use crate::core::{EngineError, Result, Schema};
use crate::storage::{Page, PageId, Storage};

use super::{ExecutionMode, Operator, OperatorCore};

/// Set-concatenation ("union all" — does not eliminate duplicates). Input
/// tuples are copied to the output byte-for-byte, with no repacking.
pub struct Union {
    core: OperatorCore,
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    left_done: bool,
    right_done: bool,
}

impl Union {
    pub fn new(left: Box<dyn Operator>, right: Box<dyn Operator>, mode: ExecutionMode) -> Result<Self> {
        if !left.schema().matches(right.schema()) {
            return Err(EngineError::schema(
                "union operator type error, mismatched input schemas",
            ));
        }
        let schema = left.schema().clone();
        Ok(Self {
            core: OperatorCore::new("UnionAll", mode, schema),
            left,
            right,
            left_done: false,
            right_done: false,
        })
    }

    fn process_input_page(&mut self, storage: &mut Storage, page: Page) -> Result<()> {
        for tuple in page.iter() {
            self.core.emit_output_tuple(storage, tuple.clone())?;
        }
        Ok(())
    }

    /// Pulls and processes exactly one page from the lowest-indexed
    /// unfinished input, marking it finished on exhaustion.
    fn drain_one_step(&mut self, storage: &mut Storage) -> Result<()> {
        let pulled = if !self.left_done {
            self.left.next(storage)?
        } else {
            self.right.next(storage)?
        };

        match pulled {
            Some((_, page)) => self.process_input_page(storage, page),
            None => {
                if !self.left_done {
                    self.left_done = true;
                } else {
                    self.right_done = true;
                }
                Ok(())
            }
        }
    }
}

impl Operator for Union {
    fn schema(&self) -> &Schema {
        &self.core.schema
    }

    fn input_schemas(&self) -> Vec<&Schema> {
        vec![self.left.schema(), self.right.schema()]
    }

    fn operator_type(&self) -> &'static str {
        "UnionAll"
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
        self.left.open(storage)?;
        self.right.open(storage)?;
        self.core.initialize_output(storage);

        if self.core.mode == ExecutionMode::Batch {
            while let Some((_, page)) = self.left.next(storage)? {
                self.process_input_page(storage, page)?;
            }
            while let Some((_, page)) = self.right.next(storage)? {
                self.process_input_page(storage, page)?;
            }
        }
        Ok(())
    }

    fn next(&mut self, storage: &mut Storage) -> Result<Option<(PageId, Page)>> {
        loop {
            if let Some(page) = self.core.next_output_page(storage)? {
                return Ok(Some(page));
            }
            if self.core.mode == ExecutionMode::Batch || (self.left_done && self.right_done) {
                return Ok(None);
            }
            self.drain_one_step(storage)?;
        }
    }

    fn close(&mut self, storage: &mut Storage) -> Result<()> {
        self.left.close(storage)?;
        self.right.close(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Field, Record, Type, Value};
    use crate::operator::scan::Scan;

    fn int_schema() -> Schema {
        Schema::new(vec![Field::new("id", Type::Int)])
    }

    fn storage_with(relations: &[(&str, &[i64])]) -> Storage {
        let mut storage = Storage::new(8);
        let schema = int_schema();
        for (id, values) in relations {
            storage.create_relation(id, schema.clone());
            for v in *values {
                let packed = schema.pack(&Record::new(vec![Value::Int(*v)])).unwrap();
                storage.insert_tuple(id, packed).unwrap();
            }
        }
        storage
    }

    fn collect(op: &mut dyn Operator, storage: &mut Storage) -> Vec<Value> {
        let mut seen = Vec::new();
        while let Some((_, page)) = op.next(storage).unwrap() {
            for tuple in page.iter() {
                seen.push(int_schema().unpack(tuple).unwrap().values[0].clone());
            }
        }
        seen
    }

    #[test]
    fn union_all_concatenates_without_deduplicating() {
        let mut storage = storage_with(&[("a", &[1, 2]), ("b", &[2, 3])]);
        let left = Box::new(Scan::new("a", int_schema(), ExecutionMode::Pipelined));
        let right = Box::new(Scan::new("b", int_schema(), ExecutionMode::Pipelined));
        let mut union = Union::new(left, right, ExecutionMode::Pipelined).unwrap();
        union.open(&mut storage).unwrap();
        let seen = collect(&mut union, &mut storage);
        assert_eq!(
            seen,
            vec![Value::Int(1), Value::Int(2), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn batch_union_also_concatenates() {
        let mut storage = storage_with(&[("a", &[1]), ("b", &[9])]);
        let left = Box::new(Scan::new("a", int_schema(), ExecutionMode::Batch));
        let right = Box::new(Scan::new("b", int_schema(), ExecutionMode::Batch));
        let mut union = Union::new(left, right, ExecutionMode::Batch).unwrap();
        union.open(&mut storage).unwrap();
        let seen = collect(&mut union, &mut storage);
        assert_eq!(seen, vec![Value::Int(1), Value::Int(9)]);
    }

    #[test]
    fn mismatched_input_schemas_are_rejected_at_construction() {
        let mut storage = storage_with(&[("a", &[1])]);
        let wide_schema = Schema::new(vec![
            Field::new("id", Type::Int),
            Field::new("extra", Type::Int),
        ]);
        storage.create_relation("wide", wide_schema.clone());
        let left = Box::new(Scan::new("a", int_schema(), ExecutionMode::Batch));
        let right = Box::new(Scan::new("wide", wide_schema, ExecutionMode::Batch));
        assert!(Union::new(left, right, ExecutionMode::Batch).is_err());
    }
}
