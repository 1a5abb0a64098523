use std::collections::HashSet;

use crate::core::{EngineError, Record, Result, Schema};
use crate::expr::Expr;
use crate::storage::{Page, PageId, PartitionGuard, PinnedBlock, Storage};

use super::{ExecutionMode, Operator, OperatorCore};

/// The four physical join strategies a `Join` can be configured with.
/// `Indexed` is declared for plan-shape completeness but always fails at
/// `open()` — see `DESIGN.md`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinMethod {
    TupleNested,
    BlockNested,
    Indexed,
    Hash,
}

/// Method-specific parameters. Which fields are required depends on
/// `JoinMethod`; `Join::new` checks this before constructing anything.
#[derive(Clone, Debug, Default)]
pub struct JoinConfig {
    pub join_expr: Option<Expr>,
    pub index_id: Option<String>,
    pub lhs_key_schema: Option<Schema>,
    pub rhs_key_schema: Option<Schema>,
    pub lhs_hash_fn: Option<Expr>,
    pub rhs_hash_fn: Option<Expr>,
}

/// Pins pages pulled one at a time from `next_page` until the buffer pool's
/// free frames are exhausted or the source runs dry. Returns everything
/// pinned so far alongside the outcome, even when `next_page` or the pin
/// itself fails partway through, so the caller can always release exactly
/// what this acquired rather than losing track of it behind an early `?`.
fn acquire_block(
    storage: &mut Storage,
    mut next_page: impl FnMut(&mut Storage) -> Result<Option<(PageId, Page)>>,
) -> (PinnedBlock, Vec<Page>, Result<()>) {
    let mut block = PinnedBlock::new();
    let mut pages = Vec::new();
    let mut result = Ok(());

    while storage.buffer_pool.num_free_pages() > 0 {
        match next_page(storage) {
            Ok(Some((page_id, page))) => match storage.buffer_pool.get_page(page_id.clone(), true) {
                Ok(_) => {
                    block.push(page_id);
                    pages.push(page);
                }
                Err(err) => {
                    result = Err(err);
                    break;
                }
            },
            Ok(None) => break,
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }
    (block, pages, result)
}

/// Joins two inputs under one of four physical strategies. Batch-only: the
/// whole join runs to completion inside `open()`, and `next()` just drains
/// the result relation it wrote there.
pub struct Join {
    core: OperatorCore,
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    method: JoinMethod,
    config: JoinConfig,
}

impl Join {
    pub fn new(
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        method: JoinMethod,
        config: JoinConfig,
        mode: ExecutionMode,
    ) -> Result<Self> {
        if mode != ExecutionMode::Batch {
            return Err(EngineError::configuration(
                "join is a batch-only operator and cannot be constructed in pipelined mode",
            ));
        }
        let schema = left.schema().concat(right.schema())?;

        match method {
            JoinMethod::TupleNested | JoinMethod::BlockNested => {
                if config.join_expr.is_none() {
                    return Err(EngineError::configuration(
                        "nested-loop join requires a join_expr",
                    ));
                }
            }
            JoinMethod::Hash => {
                if config.lhs_hash_fn.is_none()
                    || config.rhs_hash_fn.is_none()
                    || config.lhs_key_schema.is_none()
                    || config.rhs_key_schema.is_none()
                {
                    return Err(EngineError::configuration(
                        "hash join requires lhs_hash_fn, rhs_hash_fn, lhs_key_schema and rhs_key_schema",
                    ));
                }
            }
            JoinMethod::Indexed => {
                if config.index_id.is_none() || config.lhs_key_schema.is_none() {
                    return Err(EngineError::configuration(
                        "indexed join requires an index_id and lhs_key_schema",
                    ));
                }
            }
        }

        let operator_type = match method {
            JoinMethod::TupleNested => "NLJoin",
            JoinMethod::BlockNested => "BNLJoin",
            JoinMethod::Indexed => "IndexJoin",
            JoinMethod::Hash => "HashJoin",
        };

        Ok(Self {
            core: OperatorCore::new(operator_type, mode, schema),
            left,
            right,
            method,
            config,
        })
    }

    /// Combines a matched left/right tuple pair into one packed output tuple
    /// under the join's concatenated schema.
    fn emit_match(
        &self,
        storage: &mut Storage,
        left_schema: &Schema,
        left_tuple: &[u8],
        right_schema: &Schema,
        right_tuple: &[u8],
    ) -> Result<()> {
        let mut values = left_schema.unpack(left_tuple)?.values;
        values.extend(right_schema.unpack(right_tuple)?.values);
        let packed = self.core.schema.pack(&Record::new(values))?;
        self.core.emit_output_tuple(storage, packed)
    }

    /// Probes one block of left pages against a full scan of `right_rel_id`,
    /// rescanned from the start for every left tuple. With `predicate: None`
    /// every pair is emitted unconditionally (hash join's bucket probe,
    /// which never re-checks key equality — see `DESIGN.md`).
    fn probe_block(
        &mut self,
        storage: &mut Storage,
        left_pages: &[Page],
        left_schema: &Schema,
        right_rel_id: &str,
        right_schema: &Schema,
        predicate: Option<&Expr>,
    ) -> Result<()> {
        for left_page in left_pages {
            for left_tuple in left_page.iter() {
                let left_env = left_schema.environment(left_tuple)?;
                let mut right_cursor = storage.cursor(right_rel_id);
                loop {
                    let relation = storage.get_relation(right_rel_id)?;
                    let pulled = right_cursor.next(relation)?;
                    let Some((_, right_page)) = pulled else {
                        break;
                    };
                    for right_tuple in right_page.iter() {
                        let is_match = match predicate {
                            None => true,
                            Some(expr) => {
                                let right_env = right_schema.environment(right_tuple)?;
                                let mut combined = left_env.clone();
                                combined.extend(right_env);
                                expr.eval(&combined)?
                                    .as_boolean()
                                    .copied()
                                    .unwrap_or(false)
                            }
                        };
                        if is_match {
                            self.emit_match(
                                storage,
                                left_schema,
                                left_tuple,
                                right_schema,
                                right_tuple,
                            )?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Fully drains `right`, forcing its output relation to be materialized
    /// regardless of its own execution mode, so it can be rescanned from the
    /// start by `probe_block` without touching the child operator again.
    fn materialize_right(&mut self, storage: &mut Storage) -> Result<()> {
        while self.right.next(storage)?.is_some() {}
        Ok(())
    }

    fn tuple_nested_loop(&mut self, storage: &mut Storage) -> Result<()> {
        let right_rel_id = self.right.relation_id();
        let right_schema = self.right.schema().clone();
        let left_schema = self.left.schema().clone();
        let predicate = self.config.join_expr.clone();

        while let Some((_, page)) = self.left.next(storage)? {
            self.probe_block(
                storage,
                std::slice::from_ref(&page),
                &left_schema,
                &right_rel_id,
                &right_schema,
                predicate.as_ref(),
            )?;
        }
        Ok(())
    }

    /// For each outer block of left pages (sized to the buffer pool's free
    /// frames, pinned for the block's lifetime), scans the right side in
    /// full once per left tuple.
    fn block_nested_loop(&mut self, storage: &mut Storage) -> Result<()> {
        if storage.buffer_pool.capacity() == 0 {
            return Err(EngineError::configuration(
                "block-nested-loop join requires a buffer pool with at least one frame",
            ));
        }

        let right_rel_id = self.right.relation_id();
        let right_schema = self.right.schema().clone();
        let left_schema = self.left.schema().clone();
        let predicate = self.config.join_expr.clone();

        loop {
            let (block, pages, acquired) =
                acquire_block(storage, |storage| self.left.next(storage));
            if let Err(err) = acquired {
                block.release(&mut storage.buffer_pool);
                return Err(err);
            }
            if pages.is_empty() {
                block.release(&mut storage.buffer_pool);
                return Ok(());
            }
            let result = self.probe_block(
                storage,
                &pages,
                &left_schema,
                &right_rel_id,
                &right_schema,
                predicate.as_ref(),
            );
            block.release(&mut storage.buffer_pool);
            result?;
        }
    }

    /// The same block-acquisition/probe loop as `block_nested_loop`, but
    /// sourced from a named relation (a hash-join partition) rather than
    /// pulled live from the left operator.
    fn block_join_relations(
        &mut self,
        storage: &mut Storage,
        left_rel_id: &str,
        left_schema: &Schema,
        right_rel_id: &str,
        right_schema: &Schema,
    ) -> Result<()> {
        let mut left_cursor = storage.cursor(left_rel_id);
        loop {
            let (block, pages, acquired) = acquire_block(storage, |storage| {
                let relation = storage.get_relation(left_rel_id)?;
                left_cursor.next(relation)
            });
            if let Err(err) = acquired {
                block.release(&mut storage.buffer_pool);
                return Err(err);
            }
            if pages.is_empty() {
                block.release(&mut storage.buffer_pool);
                return Ok(());
            }
            let result =
                self.probe_block(storage, &pages, left_schema, right_rel_id, right_schema, None);
            block.release(&mut storage.buffer_pool);
            result?;
        }
    }

    /// Partitions both inputs by their respective hash functions into
    /// `{relation_id}_{bucket}_lhs` / `_rhs` relations, then joins matching
    /// buckets pairwise. Buckets are enumerated in the order their key was
    /// first seen (left scanned before right). A bucket key present on only
    /// one side contributes no output. No secondary key-equality check is
    /// performed once two tuples land in the same bucket — see
    /// `DESIGN.md`'s open-question decisions.
    fn hash_join(&mut self, storage: &mut Storage) -> Result<()> {
        if storage.buffer_pool.capacity() == 0 {
            return Err(EngineError::configuration(
                "hash join requires a buffer pool with at least one frame",
            ));
        }

        let left_schema = self.left.schema().clone();
        let right_schema = self.right.schema().clone();
        let base = self.core.relation_id();

        let mut bucket_order: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut partitions = PartitionGuard::new();

        let scatter_result = self.partition_hash_inputs(
            storage,
            &left_schema,
            &right_schema,
            &base,
            &mut bucket_order,
            &mut seen,
            &mut partitions,
        );

        let result = scatter_result.and_then(|()| {
            self.probe_hash_buckets(storage, &bucket_order, &base, &left_schema, &right_schema)
        });
        partitions.release(storage);
        result
    }

    /// Scatters both input sides into per-key partition relations, tracking
    /// every relation created in `partitions` as it goes so the caller can
    /// release them even if hashing a later tuple fails partway through.
    fn partition_hash_inputs(
        &mut self,
        storage: &mut Storage,
        left_schema: &Schema,
        right_schema: &Schema,
        base: &str,
        bucket_order: &mut Vec<String>,
        seen: &mut HashSet<String>,
        partitions: &mut PartitionGuard,
    ) -> Result<()> {
        let lhs_hash_fn = self.config.lhs_hash_fn.clone().expect("checked in new()");
        let rhs_hash_fn = self.config.rhs_hash_fn.clone().expect("checked in new()");

        while let Some((_, page)) = self.left.next(storage)? {
            for tuple in page.iter() {
                let env = left_schema.environment(tuple)?;
                let key = lhs_hash_fn.eval(&env)?.bucket_key();
                let rel_id = format!("{base}_{key}_lhs");
                storage.create_relation(&rel_id, left_schema.clone());
                storage.insert_tuple(&rel_id, tuple.clone())?;
                if seen.insert(key.clone()) {
                    partitions.push(rel_id);
                    partitions.push(format!("{base}_{key}_rhs"));
                    bucket_order.push(key);
                }
            }
        }
        while let Some((_, page)) = self.right.next(storage)? {
            for tuple in page.iter() {
                let env = right_schema.environment(tuple)?;
                let key = rhs_hash_fn.eval(&env)?.bucket_key();
                let rel_id = format!("{base}_{key}_rhs");
                storage.create_relation(&rel_id, right_schema.clone());
                storage.insert_tuple(&rel_id, tuple.clone())?;
                if seen.insert(key.clone()) {
                    partitions.push(format!("{base}_{key}_lhs"));
                    partitions.push(rel_id);
                    bucket_order.push(key);
                }
            }
        }
        Ok(())
    }

    fn probe_hash_buckets(
        &mut self,
        storage: &mut Storage,
        bucket_order: &[String],
        base: &str,
        left_schema: &Schema,
        right_schema: &Schema,
    ) -> Result<()> {
        for key in bucket_order {
            let lhs_rel = format!("{base}_{key}_lhs");
            let rhs_rel = format!("{base}_{key}_rhs");
            if !storage.relation_exists(&lhs_rel) || !storage.relation_exists(&rhs_rel) {
                continue;
            }
            self.block_join_relations(storage, &lhs_rel, left_schema, &rhs_rel, right_schema)?;
        }
        Ok(())
    }
}

impl Operator for Join {
    fn schema(&self) -> &Schema {
        &self.core.schema
    }

    fn input_schemas(&self) -> Vec<&Schema> {
        vec![self.left.schema(), self.right.schema()]
    }

    fn operator_type(&self) -> &'static str {
        self.core.operator_type
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

        match self.method {
            JoinMethod::TupleNested => {
                self.materialize_right(storage)?;
                self.tuple_nested_loop(storage)
            }
            JoinMethod::BlockNested => {
                self.materialize_right(storage)?;
                self.block_nested_loop(storage)
            }
            JoinMethod::Hash => self.hash_join(storage),
            JoinMethod::Indexed => Err(EngineError::not_implemented(
                "indexed nested-loop join is not implemented",
            )),
        }
    }

    fn next(&mut self, storage: &mut Storage) -> Result<Option<(PageId, Page)>> {
        self.core.next_output_page(storage)
    }

    fn close(&mut self, storage: &mut Storage) -> Result<()> {
        self.left.close(storage)?;
        self.right.close(storage)
    }
}
