pub mod group_by;
pub mod join;
pub mod plan;
pub mod project;
pub mod scan;
pub mod select;
pub mod union;

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{trace, warn};

use crate::core::{PackedTuple, Result, Schema};
use crate::storage::{Page, PageId, RelationCursor, Storage};

/// Process-unique operator id; `<operatorType><id>` is the operator's
/// relation identifier (see `OperatorCore::relation_id`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperatorId(u64);

impl OperatorId {
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for OperatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An operator's execution mode. Join and GroupBy only ever support `Batch`;
/// Union, Select, Project, and Scan support both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Pipelined,
    Batch,
}

/// The common iteration/output contract shared by every physical operator.
/// This is the explicit-cursor re-architecture of the reference's generator
/// protocol: `open` prepares the operator (running it to completion if it is
/// a batch operator), `next` pulls one output page at a time, and `close`
/// releases child resources. Restartability (needed by tuple-nested-loop and
/// by hash/group-by partitioning) is a property of `storage::RelationCursor`,
/// not of this trait.
pub trait Operator {
    fn schema(&self) -> &Schema;
    fn input_schemas(&self) -> Vec<&Schema>;
    fn operator_type(&self) -> &'static str;
    fn relation_id(&self) -> String;
    fn explain(&self) -> String {
        format!("{}{}", self.operator_type(), self.ordinal())
    }
    fn ordinal(&self) -> OperatorId;
    fn mode(&self) -> ExecutionMode;

    fn open(&mut self, storage: &mut Storage) -> Result<()>;
    fn next(&mut self, storage: &mut Storage) -> Result<Option<(PageId, Page)>>;
    fn close(&mut self, storage: &mut Storage) -> Result<()>;
}

/// Fields and helpers shared by every concrete operator: identity, output
/// relation bookkeeping, and the page-at-a-time emission contract.
pub struct OperatorCore {
    pub id: OperatorId,
    pub operator_type: &'static str,
    pub mode: ExecutionMode,
    pub schema: Schema,
    output_cursor: Option<RelationCursor>,
}

impl OperatorCore {
    pub fn new(operator_type: &'static str, mode: ExecutionMode, schema: Schema) -> Self {
        Self {
            id: OperatorId::next(),
            operator_type,
            mode,
            schema,
            output_cursor: None,
        }
    }

    pub fn relation_id(&self) -> String {
        format!("{}{}", self.operator_type, self.id)
    }

    /// Ensures the operator's output relation exists and its output cursor
    /// starts at the first page.
    pub fn initialize_output(&mut self, storage: &mut Storage) {
        let relation_id = self.relation_id();
        storage.create_relation(&relation_id, self.schema.clone());
        self.output_cursor = Some(storage.cursor(&relation_id));
    }

    /// Appends a tuple to the operator's output relation. Storage itself
    /// manages page boundaries (`Relation::insert_tuple`), so "flush on
    /// overflow" falls out of that rather than needing a second buffer here.
    pub fn emit_output_tuple(&self, storage: &mut Storage, bytes: PackedTuple) -> Result<()> {
        let relation_id = self.relation_id();
        match storage.insert_tuple(&relation_id, bytes) {
            Ok(()) => {
                trace!("{relation_id} emitted an output tuple");
                Ok(())
            }
            Err(err) => {
                warn!("{relation_id} failed to emit output tuple: {err}");
                Err(err)
            }
        }
    }

    /// Pulls the next page of the operator's own output relation — the
    /// thing a pipelined operator's consumer pulls one page at a time, and a
    /// batch operator's consumer scans after `process_all_pages` returns.
    pub fn next_output_page(&mut self, storage: &Storage) -> Result<Option<(PageId, Page)>> {
        let relation = storage.get_relation(&self.relation_id())?;
        self.output_cursor
            .as_mut()
            .expect("initialize_output must run before next_output_page")
            .next(relation)
    }
}
