use crate::common::constants::BNJ_INNER_PREFIX;
use crate::common::Result;
use crate::config::Settings;
use crate::sql::execution::budget::PageBudget;
use crate::sql::execution::join::{check_buffers, materialize, JoinKeys};
use crate::sql::execution::operator::{
    first_error, not_open, open_child, BoxedOperator, Operator,
};
use crate::sql::planner::JoinCondition;
use crate::storage::page::Batch;
use crate::storage::spill::{PageReader, SpillArena, SpillId};
use crate::storage::tuple::Row;
use crate::types::Table;

const NAME: &str = "block nested-loop join";

/// A block nested-loop equality join.
///
/// `open` materializes the right (inner) input into one spill file and closes
/// it. `next` then reads the left (outer) input in blocks of `buffers - 2`
/// pages and, for each block, scans the inner file once, page by page,
/// comparing every block tuple with every tuple of the current inner page.
/// Together with one inner page and the output page under construction the
/// operator never holds more than `buffers` pages.
///
/// Within a block the inner page is the outermost loop, so output comes in a
/// different order than a tuple-at-a-time nested loop would give. The output
/// multiset is the same.
///
/// Output rows are the left row followed by the right row.
pub struct BlockNestedLoopJoin {
    left: BoxedOperator,
    right: BoxedOperator,
    conditions: Vec<JoinCondition>,
    buffers: usize,
    schema: Table,
    page_capacity: usize,
    arena: SpillArena,
    budget: PageBudget,
    /// None until opened.
    state: Option<NestedLoopState>,
}

struct NestedLoopState {
    keys: JoinKeys,
    /// The materialized inner relation; None if it was empty.
    inner: Option<SpillId>,
    cursor: NestedLoopCursor,
}

/// Where a suspended join resumes. Together with the inner spill file this
/// determines the rest of the output exactly.
#[derive(Default)]
struct NestedLoopCursor {
    /// The current outer block, flattened. Empty when a new block is needed.
    block: Vec<Row>,
    /// Pages the current block occupies.
    block_pages: usize,
    /// Read stream over the inner file, fresh for every block.
    inner_reader: Option<PageReader>,
    /// The inner page currently being compared against the block.
    inner_page: Option<Batch>,
    /// Next outer tuple of the block to compare against `inner_page`.
    outer_idx: usize,
    /// Next tuple of `inner_page` to compare against the outer tuple.
    inner_idx: usize,
    /// The outer input has returned end of stream.
    outer_done: bool,
    /// The join has returned end of stream.
    done: bool,
}

impl BlockNestedLoopJoin {
    pub fn new(
        left: BoxedOperator,
        right: BoxedOperator,
        conditions: Vec<JoinCondition>,
        buffers: usize,
        settings: &Settings,
    ) -> Result<Self> {
        check_buffers(NAME, buffers)?;
        let schema = Table::merge(left.schema(), right.schema());
        let page_capacity = Batch::capacity_for(&schema, settings.page_size_bytes);
        Ok(Self {
            left,
            right,
            conditions,
            buffers,
            schema,
            page_capacity,
            arena: SpillArena::new(&settings.spill_dir),
            budget: PageBudget::new(buffers),
            state: None,
        })
    }

    /// Outer pages per block.
    fn block_size(&self) -> usize {
        self.buffers - 2
    }

    /// The most pages this join has held at once.
    pub fn peak_pages(&self) -> usize {
        self.budget.peak()
    }

    /// Number of spill files currently owned.
    pub fn spill_files(&self) -> usize {
        self.arena.len()
    }
}

impl Operator for BlockNestedLoopJoin {
    fn schema(&self) -> &Table {
        &self.schema
    }

    fn open(&mut self) -> Result<()> {
        self.close()?;
        let keys = JoinKeys::resolve(&self.conditions, self.left.schema(), self.right.schema())?;

        open_child(NAME, self.right.as_mut())?;
        let inner = materialize(
            self.right.as_mut(),
            &mut self.arena,
            &mut self.budget,
            BNJ_INNER_PREFIX,
        )?;
        self.right.close()?;
        open_child(NAME, self.left.as_mut())?;

        self.state = Some(NestedLoopState {
            keys,
            inner,
            cursor: NestedLoopCursor::default(),
        });
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>> {
        let block_size = self.block_size();
        let Some(state) = self.state.as_mut() else {
            return not_open();
        };
        let cursor = &mut state.cursor;
        if cursor.done {
            return Ok(None);
        }
        let Some(inner) = state.inner else {
            cursor.done = true;
            return Ok(None);
        };

        self.budget.reserve(1)?;
        let mut output = Batch::new(self.page_capacity);
        loop {
            if cursor.block.is_empty() {
                if cursor.outer_done
                    || !load_block(cursor, self.left.as_mut(), &mut self.budget, block_size)?
                {
                    cursor.done = true;
                    break;
                }
                cursor.inner_reader = Some(self.arena.open_reader(inner)?);
            }

            if cursor.inner_page.is_none() {
                let next_page = match cursor.inner_reader.as_mut() {
                    Some(reader) => reader.read_page()?,
                    None => None,
                };
                match next_page {
                    Some(page) => {
                        self.budget.reserve(1)?;
                        cursor.inner_page = Some(page);
                        cursor.outer_idx = 0;
                        cursor.inner_idx = 0;
                    }
                    None => {
                        // the block has seen the whole inner relation
                        self.budget.release(cursor.block_pages);
                        cursor.block.clear();
                        cursor.block_pages = 0;
                        cursor.inner_reader = None;
                        continue;
                    }
                }
            }

            if let Some(page) = cursor.inner_page.as_ref() {
                while cursor.outer_idx < cursor.block.len() {
                    let outer = &cursor.block[cursor.outer_idx];
                    while cursor.inner_idx < page.len() {
                        let inner_row = &page.rows()[cursor.inner_idx];
                        cursor.inner_idx += 1;
                        if state.keys.matches(outer, inner_row)? {
                            output.push(outer.join(inner_row))?;
                            if output.is_full() {
                                break;
                            }
                        }
                    }
                    if output.is_full() {
                        break;
                    }
                    cursor.inner_idx = 0;
                    cursor.outer_idx += 1;
                }
            }
            if output.is_full() {
                break;
            }
            cursor.inner_page = None;
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

/// Pulls the next block of up to `block_size` outer pages into the cursor.
/// Returns false if the outer input had nothing left.
fn load_block(
    cursor: &mut NestedLoopCursor,
    outer: &mut dyn Operator,
    budget: &mut PageBudget,
    block_size: usize,
) -> Result<bool> {
    while cursor.block_pages < block_size {
        let Some(page) = outer.next()? else {
            cursor.outer_done = true;
            break;
        };
        if page.is_empty() {
            continue;
        }
        budget.reserve(1)?;
        cursor.block_pages += 1;
        cursor.block.extend(page.into_rows());
    }
    log::trace!(
        "{NAME}: loaded outer block of {} pages ({} rows)",
        cursor.block_pages,
        cursor.block.len()
    );
    Ok(!cursor.block.is_empty())
}
