use crate::core::{Field, Record, Result, Schema, Value};
use crate::expr::Expr;
use crate::storage::{Page, PageId, Storage};

use super::{ExecutionMode, Operator, OperatorCore};

/// One output field of a projection: its name, the expression producing it,
/// and its declared type (used only to build the output schema).
pub struct Projection {
    pub name: String,
    pub expr: Expr,
    pub ty: crate::core::Type,
}

/// Evaluates a list of output-field expressions and repacks under the
/// output schema.
pub struct Project {
    core: OperatorCore,
    child: Box<dyn Operator>,
    projections: Vec<Projection>,
}

impl Project {
    pub fn new(child: Box<dyn Operator>, projections: Vec<Projection>, mode: ExecutionMode) -> Self {
        let schema = Schema::new(
            projections
                .iter()
                .map(|p| Field::new(p.name.clone(), p.ty))
                .collect(),
        );
        Self {
            core: OperatorCore::new("Project", mode, schema),
            child,
            projections,
        }
    }

    fn process_input_page(&mut self, storage: &mut Storage, page: Page) -> Result<()> {
        for tuple in page.iter() {
            let env = self.child.schema().environment(tuple)?;
            let values = self
                .projections
                .iter()
                .map(|p| p.expr.eval(&env))
                .collect::<Result<Vec<Value>>>()?;
            let record = Record::new(values);
            let packed = self.core.schema.pack(&record)?;
            self.core.emit_output_tuple(storage, packed)?;
        }
        Ok(())
    }
}

impl Operator for Project {
    fn schema(&self) -> &Schema {
        &self.core.schema
    }

    fn input_schemas(&self) -> Vec<&Schema> {
        vec![self.child.schema()]
    }

    fn operator_type(&self) -> &'static str {
        "Project"
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

        if self.core.mode == ExecutionMode::Batch {
            while let Some((_, page)) = self.child.next(storage)? {
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
            if self.core.mode == ExecutionMode::Batch {
                return Ok(None);
            }
            match self.child.next(storage)? {
                Some((_, page)) => self.process_input_page(storage, page)?,
                None => return Ok(None),
            }
        }
    }

    fn close(&mut self, storage: &mut Storage) -> Result<()> {
        self.child.close(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Type;
    use crate::expr::{BinOp, Expr};
    use crate::operator::scan::Scan;
    use crate::storage::Storage;

    fn int_schema() -> Schema {
        Schema::new(vec![Field::new("id", Type::Int)])
    }

    fn populated_storage(n: i64) -> Storage {
        let mut storage = Storage::new(8);
        let schema = int_schema();
        storage.create_relation("t", schema.clone());
        for i in 0..n {
            let packed = schema.pack(&Record::new(vec![Value::Int(i)])).unwrap();
            storage.insert_tuple("t", packed).unwrap();
        }
        storage
    }

    #[test]
    fn project_computes_a_derived_column() {
        let mut storage = populated_storage(3);
        let scan = Box::new(Scan::new("t", int_schema(), ExecutionMode::Pipelined));
        let doubled = Projection {
            name: "doubled".to_string(),
            expr: Expr::BinaryOp(BinOp::Mul, Box::new(Expr::column("id")), Box::new(Expr::int(2))),
            ty: Type::Int,
        };
        let mut project = Project::new(scan, vec![doubled], ExecutionMode::Pipelined);
        project.open(&mut storage).unwrap();

        let mut seen = Vec::new();
        while let Some((_, page)) = project.next(&mut storage).unwrap() {
            for tuple in page.iter() {
                seen.push(project.schema().unpack(tuple).unwrap().values[0].clone());
            }
        }
        assert_eq!(seen, vec![Value::Int(0), Value::Int(2), Value::Int(4)]);
    }

    #[test]
    fn projected_schema_uses_the_declared_field_names() {
        let scan = Box::new(Scan::new("t", int_schema(), ExecutionMode::Batch));
        let doubled = Projection {
            name: "doubled".to_string(),
            expr: Expr::column("id"),
            ty: Type::Int,
        };
        let project = Project::new(scan, vec![doubled], ExecutionMode::Batch);
        assert_eq!(project.schema().field_names(), vec!["doubled"]);
    }
}
