use crate::common::constants::{
    GHJ_LEFT_BUCKET_PREFIX, GHJ_RIGHT_BUCKET_PREFIX, GHJ_RIGHT_PREFIX,
};
use crate::common::Result;
use crate::config::Settings;
use crate::sql::execution::budget::PageBudget;
use crate::sql::execution::join::{check_buffers, materialize, JoinKeys};
use crate::sql::execution::operator::{
    first_error, not_open, open_child, BoxedOperator, Operator,
};
use crate::sql::execution::partition::{
    DiskPartitioner, KeyHasher, PartitionHasher, ProbeHasher,
};
use crate::sql::execution::source::SpillScan;
use crate::sql::planner::JoinCondition;
use crate::storage::page::Batch;
use crate::storage::spill::{PageReader, SpillArena, SpillId};
use crate::storage::tuple::Row;
use crate::types::Table;
use std::collections::HashMap;

const NAME: &str = "grace hash join";

/// In-memory table for one chunk of a left bucket: rows chained by the probe
/// hash of their join key.
type ChainedTable = HashMap<u64, Vec<Row>>;

/// Bucket files of one side, by bucket index. None for buckets that received
/// no tuples.
type Buckets = Vec<Option<SpillId>>;

/// A grace hash equality join.
///
/// `open` materializes the right input, then partitions both inputs into
/// `buffers - 1` disk buckets on the first condition's attributes. `next`
/// walks the bucket pairs in order: it loads the left bucket into a chained
/// hash table and streams the right bucket against it, checking every
/// condition on the actual values before emitting.
///
/// A left bucket larger than `buffers - 2` pages is built in chunks of that
/// size, re-streaming the right bucket once per chunk, so skewed keys never
/// push the join past its budget.
///
/// Output rows are the left row followed by the right row.
pub struct GraceHashJoin {
    left: BoxedOperator,
    right: BoxedOperator,
    conditions: Vec<JoinCondition>,
    buffers: usize,
    schema: Table,
    page_capacity: usize,
    left_capacity: usize,
    right_capacity: usize,
    partition_hasher: Box<dyn KeyHasher>,
    probe_hasher: Box<dyn KeyHasher>,
    arena: SpillArena,
    budget: PageBudget,
    chunks_built: usize,
    /// None until opened.
    state: Option<HashJoinState>,
}

struct HashJoinState {
    keys: JoinKeys,
    left_buckets: Buckets,
    right_buckets: Buckets,
    cursor: HashJoinCursor,
}

/// Where a suspended join resumes. Together with the bucket files this
/// determines the rest of the output exactly.
#[derive(Default)]
struct HashJoinCursor {
    /// The bucket pair being joined.
    bucket: usize,
    /// Read stream over the current left bucket, positioned after the chunk
    /// in `table`.
    build: Option<PageReader>,
    /// The hash table of the current chunk; None when a chunk must be built.
    table: Option<ChainedTable>,
    /// Pages the current chunk occupies.
    table_pages: usize,
    /// Read stream over the current right bucket.
    probe: Option<PageReader>,
    /// The right page being probed.
    probe_page: Option<Batch>,
    /// Next tuple of `probe_page` to probe.
    probe_idx: usize,
    /// Next candidate in that tuple's chain.
    chain_idx: usize,
    done: bool,
}

impl GraceHashJoin {
    pub fn new(
        left: BoxedOperator,
        right: BoxedOperator,
        conditions: Vec<JoinCondition>,
        buffers: usize,
        settings: &Settings,
    ) -> Result<Self> {
        check_buffers(NAME, buffers)?;
        let schema = Table::merge(left.schema(), right.schema());
        let page_size = settings.page_size_bytes;
        Ok(Self {
            page_capacity: Batch::capacity_for(&schema, page_size),
            left_capacity: Batch::capacity_for(left.schema(), page_size),
            right_capacity: Batch::capacity_for(right.schema(), page_size),
            left,
            right,
            conditions,
            buffers,
            schema,
            partition_hasher: Box::new(PartitionHasher),
            probe_hasher: Box::new(ProbeHasher),
            arena: SpillArena::new(&settings.spill_dir),
            budget: PageBudget::new(buffers),
            chunks_built: 0,
            state: None,
        })
    }

    /// Replaces the hash that assigns tuples to disk buckets.
    pub fn with_partition_hasher(mut self, hasher: Box<dyn KeyHasher>) -> Self {
        self.partition_hasher = hasher;
        self
    }

    /// Replaces the hash that keys the in-memory table of a bucket.
    pub fn with_probe_hasher(mut self, hasher: Box<dyn KeyHasher>) -> Self {
        self.probe_hasher = hasher;
        self
    }

    pub fn bucket_count(&self) -> usize {
        self.buffers - 1
    }

    /// The most pages this join has held at once.
    pub fn peak_pages(&self) -> usize {
        self.budget.peak()
    }

    /// Number of spill files currently owned.
    pub fn spill_files(&self) -> usize {
        self.arena.len()
    }

    /// Hash tables built since the last `open`. Equals the number of
    /// non-empty bucket pairs unless some left bucket needed several chunks.
    pub fn chunks_built(&self) -> usize {
        self.chunks_built
    }

    /// Materializes the right input and partitions both sides. Returns the
    /// left and right bucket files.
    fn partition(&mut self, keys: &JoinKeys) -> Result<(Buckets, Buckets)> {
        let buckets = self.bucket_count();
        let (left_key, right_key) = keys.first();

        open_child(NAME, self.right.as_mut())?;
        let materialized = materialize(
            self.right.as_mut(),
            &mut self.arena,
            &mut self.budget,
            GHJ_RIGHT_PREFIX,
        )?;
        self.right.close()?;
        open_child(NAME, self.left.as_mut())?;

        // nothing joins with an empty right side
        let Some(materialized) = materialized else {
            return Ok((vec![None; buckets], vec![None; buckets]));
        };

        let partitioner =
            DiskPartitioner::new(buckets, left_key, self.partition_hasher.clone())?;
        let left_buckets = partitioner.partition(
            self.left.as_mut(),
            self.left_capacity,
            &mut self.arena,
            &mut self.budget,
            GHJ_LEFT_BUCKET_PREFIX,
        )?;

        let path = self.arena.path(materialized)?.to_path_buf();
        let mut scan = SpillScan::new(self.right.schema().clone(), path);
        scan.open()?;
        let partitioner =
            DiskPartitioner::new(buckets, right_key, self.partition_hasher.clone())?;
        let right_buckets = partitioner.partition(
            &mut scan,
            self.right_capacity,
            &mut self.arena,
            &mut self.budget,
            GHJ_RIGHT_BUCKET_PREFIX,
        )?;
        scan.close()?;
        self.arena.remove(materialized)?;

        Ok((left_buckets, right_buckets))
    }
}

impl Operator for GraceHashJoin {
    fn schema(&self) -> &Table {
        &self.schema
    }

    fn open(&mut self) -> Result<()> {
        self.close()?;
        self.chunks_built = 0;
        let keys = JoinKeys::resolve(&self.conditions, self.left.schema(), self.right.schema())?;
        let (left_buckets, right_buckets) = self.partition(&keys)?;

        self.state = Some(HashJoinState {
            keys,
            left_buckets,
            right_buckets,
            cursor: HashJoinCursor::default(),
        });
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>> {
        let chunk_pages = self.buffers - 2;
        let Some(state) = self.state.as_mut() else {
            return not_open();
        };
        let keys = &state.keys;
        let (left_key, right_key) = keys.first();
        let cursor = &mut state.cursor;
        if cursor.done {
            return Ok(None);
        }

        self.budget.reserve(1)?;
        let mut output = Batch::new(self.page_capacity);
        loop {
            if cursor.table.is_none() {
                if cursor.bucket >= state.left_buckets.len() {
                    cursor.done = true;
                    break;
                }
                let bucket = cursor.bucket;
                let (Some(left), Some(right)) =
                    (state.left_buckets[bucket], state.right_buckets[bucket])
                else {
                    cursor.bucket += 1;
                    continue;
                };

                if cursor.build.is_none() {
                    cursor.build = Some(self.arena.open_reader(left)?);
                }
                if !build_chunk(
                    cursor,
                    &mut self.budget,
                    chunk_pages,
                    self.probe_hasher.as_ref(),
                    left_key,
                )? {
                    log::trace!("{NAME}: bucket {bucket} done");
                    cursor.build = None;
                    cursor.bucket += 1;
                    continue;
                }
                self.chunks_built += 1;
                cursor.probe = Some(self.arena.open_reader(right)?);
            }

            if cursor.probe_page.is_none() {
                let next_page = match cursor.probe.as_mut() {
                    Some(reader) => reader.read_page()?,
                    None => None,
                };
                match next_page {
                    Some(page) => {
                        self.budget.reserve(1)?;
                        cursor.probe_page = Some(page);
                        cursor.probe_idx = 0;
                        cursor.chain_idx = 0;
                    }
                    None => {
                        // the chunk has seen the whole right bucket
                        self.budget.release(cursor.table_pages);
                        cursor.table = None;
                        cursor.table_pages = 0;
                        cursor.probe = None;
                        continue;
                    }
                }
            }

            if let (Some(page), Some(table)) = (&cursor.probe_page, &cursor.table) {
                while cursor.probe_idx < page.len() {
                    let right_row = &page.rows()[cursor.probe_idx];
                    let key = right_row.get_field(right_key)?;
                    let chain = if key.is_undefined() {
                        None
                    } else {
                        table.get(&self.probe_hasher.hash(key))
                    };
                    if let Some(chain) = chain {
                        while cursor.chain_idx < chain.len() {
                            let left_row = &chain[cursor.chain_idx];
                            cursor.chain_idx += 1;
                            if keys.matches(left_row, right_row)? {
                                output.push(left_row.join(right_row))?;
                                if output.is_full() {
                                    break;
                                }
                            }
                        }
                        if output.is_full() {
                            break;
                        }
                    }
                    cursor.chain_idx = 0;
                    cursor.probe_idx += 1;
                }
            }
            if output.is_full() {
                break;
            }
            cursor.probe_page = None;
            self.budget.release(1);
        }
        self.budget.release(1);

        log::trace!("{NAME}: emitting {} rows", output.len());
        Ok(if output.is_empty() { None } else { Some(output) })
    }

    fn close(&mut self) -> Result<()> {
        self.state = None;
        self.budget.release_all();
        first_error([self.arena.clear(), self.left.close(), self.right.close()])
    }
}

/// Builds the hash table for the next chunk of up to `chunk_pages` pages of
/// the current left bucket. Returns false if the bucket had no pages left.
fn build_chunk(
    cursor: &mut HashJoinCursor,
    budget: &mut PageBudget,
    chunk_pages: usize,
    hasher: &dyn KeyHasher,
    key: usize,
) -> Result<bool> {
    let Some(reader) = cursor.build.as_mut() else {
        return Ok(false);
    };
    let mut table = ChainedTable::new();
    let mut pages = 0;
    while pages < chunk_pages {
        let Some(page) = reader.read_page()? else {
            break;
        };
        budget.reserve(1)?;
        pages += 1;
        for row in page {
            let value = row.get_field(key)?;
            if value.is_undefined() {
                continue; // NULL and NaN never join
            }
            table.entry(hasher.hash(value)).or_default().push(row);
        }
    }
    if pages == 0 {
        return Ok(false);
    }

    log::trace!("{NAME}: built chunk of {pages} pages, {} keys", table.len());
    cursor.table = Some(table);
    cursor.table_pages = pages;
    Ok(true)
}
