use std::collections::HashSet;

use log::{debug, trace};

use crate::core::{EngineError, Result};

use super::PageId;

/// Caches pages and tracks which are pinned. Pinning prevents eviction while
/// a block-nested-loop is holding an outer block; since this collaborator
/// keeps all relation pages resident in-process (see `storage::Storage`),
/// "eviction" is simulated purely as a frame-count limit that bounds how
/// many pages may be pinned simultaneously.
pub struct BufferPool {
    capacity: usize,
    pinned: HashSet<PageId>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pinned: HashSet::new(),
        }
    }

    pub fn num_free_pages(&self) -> usize {
        self.capacity.saturating_sub(self.pinned.len())
    }

    /// Pins `id` if `pinned` is true. Fails with `ErrorKind::Storage` if the
    /// pool has no free frames; callers (block-nested-loop) are expected to
    /// check `num_free_pages()` before calling this with `pinned: true`.
    pub fn get_page(&mut self, id: PageId, pinned: bool) -> Result<PageId> {
        if pinned && !self.pinned.contains(&id) {
            if self.num_free_pages() == 0 {
                return Err(EngineError::storage(format!(
                    "buffer pool exhausted pinning page {id}"
                )));
            }
            trace!("pinning page {id}");
            self.pinned.insert(id.clone());
        }
        Ok(id)
    }

    pub fn unpin_page(&mut self, id: &PageId) {
        if self.pinned.remove(id) {
            debug!("unpinned page {id}");
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The set of pages pinned for one block-nested-loop block ("outer block").
/// Pages are pinned one at a time as the block is acquired; `release` unpins
/// them all. This isn't a `Drop` guard: releasing needs `&mut BufferPool`,
/// and the block's own probe phase needs `&mut Storage` (which owns the
/// pool) for `emit_output_tuple` at the same time, so the caller calls
/// `release` explicitly on every exit path instead.
pub struct PinnedBlock {
    ids: Vec<PageId>,
}

impl PinnedBlock {
    pub fn new() -> Self {
        Self { ids: Vec::new() }
    }

    pub fn push(&mut self, id: PageId) {
        self.ids.push(id);
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn release(self, pool: &mut BufferPool) {
        for id in self.ids {
            pool.unpin_page(&id);
        }
    }
}

impl Default for PinnedBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinning_respects_capacity() {
        let mut pool = BufferPool::new(2);
        assert_eq!(pool.num_free_pages(), 2);
        pool.get_page(PageId::new("r", 0), true).unwrap();
        pool.get_page(PageId::new("r", 1), true).unwrap();
        assert_eq!(pool.num_free_pages(), 0);
        assert!(pool.get_page(PageId::new("r", 2), true).is_err());
    }

    #[test]
    fn pinning_the_same_page_twice_is_idempotent() {
        let mut pool = BufferPool::new(1);
        pool.get_page(PageId::new("r", 0), true).unwrap();
        pool.get_page(PageId::new("r", 0), true).unwrap();
        assert_eq!(pool.num_free_pages(), 0);
    }

    #[test]
    fn unpinned_gets_do_not_consume_capacity() {
        let mut pool = BufferPool::new(1);
        pool.get_page(PageId::new("r", 0), false).unwrap();
        assert_eq!(pool.num_free_pages(), 1);
    }

    #[test]
    fn pinned_block_release_frees_all_its_pages() {
        let mut pool = BufferPool::new(2);
        let mut block = PinnedBlock::new();
        for id in [PageId::new("r", 0), PageId::new("r", 1)] {
            pool.get_page(id.clone(), true).unwrap();
            block.push(id);
        }
        assert_eq!(pool.num_free_pages(), 0);
        block.release(&mut pool);
        assert_eq!(pool.num_free_pages(), 2);
    }
}
