pub mod buffer_pool;
pub mod page;
pub mod relation;

pub use buffer_pool::*;
pub use page::*;
pub use relation::*;

use std::collections::HashMap;

use log::debug;

use crate::core::{EngineError, PackedTuple, Result, Schema};

/// The storage collaborator: an in-memory stand-in for a disk-backed page
/// store plus its buffer pool. `createRelation`/`removeRelation`/
/// `insertTuple`/`pages` from the spec's storage interface.
pub struct Storage {
    relations: HashMap<String, Relation>,
    pub buffer_pool: BufferPool,
}

impl Storage {
    pub fn new(buffer_pool_capacity: usize) -> Self {
        Self {
            relations: HashMap::new(),
            buffer_pool: BufferPool::new(buffer_pool_capacity),
        }
    }

    pub fn create_relation(&mut self, id: &str, schema: Schema) {
        if !self.relations.contains_key(id) {
            debug!("creating relation '{id}'");
            self.relations.insert(id.to_string(), Relation::new(id, schema));
        }
    }

    pub fn remove_relation(&mut self, id: &str) {
        if self.relations.remove(id).is_some() {
            debug!("removed relation '{id}'");
        }
    }

    pub fn relation_exists(&self, id: &str) -> bool {
        self.relations.contains_key(id)
    }

    pub fn get_relation(&self, id: &str) -> Result<&Relation> {
        self.relations
            .get(id)
            .ok_or_else(|| EngineError::storage(format!("no such relation: {id}")))
    }

    pub fn insert_tuple(&mut self, id: &str, tuple: PackedTuple) -> Result<()> {
        let relation = self
            .relations
            .get_mut(id)
            .ok_or_else(|| EngineError::storage(format!("no such relation: {id}")))?;
        relation.insert_tuple(tuple);
        Ok(())
    }

    /// A fresh, restartable cursor over `id`'s pages.
    pub fn cursor(&self, id: &str) -> RelationCursor {
        RelationCursor::new(id)
    }
}

/// Tracks the temporary partition relation ids created during hash-join or
/// group-by, for uniform removal once probing/aggregation finishes. Not a
/// `Drop` guard: releasing needs `&mut Storage`, which the probe/aggregate
/// phase that runs between creation and release also needs — the same
/// constraint documented on `PinnedBlock`. Callers call `release` on every
/// exit path, success or error.
pub struct PartitionGuard {
    ids: Vec<String>,
}

impl PartitionGuard {
    pub fn new() -> Self {
        Self { ids: Vec::new() }
    }

    pub fn push(&mut self, id: String) {
        self.ids.push(id);
    }

    pub fn release(self, storage: &mut Storage) {
        for id in self.ids {
            storage.remove_relation(&id);
        }
    }
}

impl Default for PartitionGuard {
    fn default() -> Self {
        Self::new()
    }
}
