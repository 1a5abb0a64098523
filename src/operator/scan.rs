use crate::core::{Result, Schema};
use crate::storage::{Page, PageId, RelationCursor, Storage};

use super::{ExecutionMode, Operator, OperatorId};

/// Leaf scan: iterates a base relation already present in storage. A scan
/// has no children and writes no output relation of its own — it simply
/// re-exposes the base relation's pages, so `relation_id()` is the table's
/// own id rather than a freshly minted `Scan<n>`.
pub struct Scan {
    id: OperatorId,
    base_relation_id: String,
    schema: Schema,
    mode: ExecutionMode,
    cursor: Option<RelationCursor>,
}

impl Scan {
    pub fn new(base_relation_id: impl Into<String>, schema: Schema, mode: ExecutionMode) -> Self {
        Self {
            id: OperatorId::next(),
            base_relation_id: base_relation_id.into(),
            schema,
            mode,
            cursor: None,
        }
    }
}

impl Operator for Scan {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn input_schemas(&self) -> Vec<&Schema> {
        vec![]
    }

    fn operator_type(&self) -> &'static str {
        "Scan"
    }

    fn relation_id(&self) -> String {
        self.base_relation_id.clone()
    }

    fn ordinal(&self) -> OperatorId {
        self.id
    }

    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn explain(&self) -> String {
        format!("Scan{}(relation={})", self.id, self.base_relation_id)
    }

    fn open(&mut self, storage: &mut Storage) -> Result<()> {
        // Confirms the base relation exists before iteration begins.
        storage.get_relation(&self.base_relation_id)?;
        self.cursor = Some(storage.cursor(&self.base_relation_id));
        Ok(())
    }

    fn next(&mut self, storage: &mut Storage) -> Result<Option<(PageId, Page)>> {
        let relation = storage.get_relation(&self.base_relation_id)?;
        self.cursor
            .as_mut()
            .expect("open must run before next")
            .next(relation)
    }

    fn close(&mut self, _storage: &mut Storage) -> Result<()> {
        Ok(())
    }
}
