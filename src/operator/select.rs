use crate::core::{Result, Schema};
use crate::expr::Expr;
use crate::storage::{Page, PageId, Storage};

use super::{ExecutionMode, Operator, OperatorCore};

/// Evaluates a boolean predicate per tuple in its child's schema
/// environment and passes through matching tuples unchanged.
pub struct Select {
    core: OperatorCore,
    child: Box<dyn Operator>,
    predicate: Expr,
}

impl Select {
    pub fn new(child: Box<dyn Operator>, predicate: Expr, mode: ExecutionMode) -> Self {
        let schema = child.schema().clone();
        Self {
            core: OperatorCore::new("Select", mode, schema),
            child,
            predicate,
        }
    }

    fn process_input_page(&mut self, storage: &mut Storage, page: Page) -> Result<()> {
        for tuple in page.iter() {
            let env = self.child.schema().environment(tuple)?;
            if self
                .predicate
                .eval(&env)?
                .as_boolean()
                .copied()
                .unwrap_or(false)
            {
                self.core.emit_output_tuple(storage, tuple.clone())?;
            }
        }
        Ok(())
    }
}

impl Operator for Select {
    fn schema(&self) -> &Schema {
        &self.core.schema
    }

    fn input_schemas(&self) -> Vec<&Schema> {
        vec![self.child.schema()]
    }

    fn operator_type(&self) -> &'static str {
        "Select"
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

    fn explain(&self) -> String {
        format!("{}(predicate={:?})", self.core.relation_id(), self.predicate)
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
