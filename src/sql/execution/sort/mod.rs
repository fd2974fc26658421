//! External merge sort.
mod comparator;
mod merge;

pub use comparator::TupleComparator;

use crate::common::constants::MIN_SORT_BUFFERS;
use crate::common::Result;
use crate::config::Settings;
use crate::errinput;
use crate::sql::execution::budget::PageBudget;
use crate::sql::execution::operator::{
    first_error, not_open, open_child, BoxedOperator, Operator,
};
use crate::sql::planner::SortKey;
use crate::storage::page::Batch;
use crate::storage::spill::{PageReader, SpillArena, SpillId};
use crate::types::Table;
use merge::RunStore;

const NAME: &str = "order by";

/// What to order by.
#[derive(Clone, Debug)]
enum SortOrder {
    Keys(Vec<SortKey>),
    /// Every column, ascending, left to right.
    WholeRow,
}

/// Sorts its input with an external merge sort, using at most `buffers`
/// pages of memory.
///
/// `open` drains the input into sorted runs of `buffers` pages each, then
/// merges `buffers - 1` runs at a time (one page per run plus the output
/// page) until a single run is left. `next` streams that run. Equal tuples
/// keep their input order.
pub struct OrderBy {
    child: BoxedOperator,
    order: SortOrder,
    buffers: usize,
    page_capacity: usize,
    arena: SpillArena,
    budget: PageBudget,
    run_count: usize,
    merge_passes: usize,
    /// None until opened.
    state: Option<SortState>,
}

/// Where a suspended sort resumes: the position of the read stream over the
/// final run.
struct SortState {
    /// The fully sorted output; None if the input was empty.
    run: Option<SpillId>,
    /// Opened on the first `next`.
    reader: Option<PageReader>,
    done: bool,
}

impl OrderBy {
    pub fn new(
        child: BoxedOperator,
        keys: Vec<SortKey>,
        buffers: usize,
        settings: &Settings,
    ) -> Result<Self> {
        Self::with_order(child, SortOrder::Keys(keys), buffers, settings)
    }

    /// Sorts by every column, ascending.
    pub(crate) fn whole_row(
        child: BoxedOperator,
        buffers: usize,
        settings: &Settings,
    ) -> Result<Self> {
        Self::with_order(child, SortOrder::WholeRow, buffers, settings)
    }

    fn with_order(
        child: BoxedOperator,
        order: SortOrder,
        buffers: usize,
        settings: &Settings,
    ) -> Result<Self> {
        if buffers < MIN_SORT_BUFFERS {
            return errinput!(
                "{NAME} needs at least {MIN_SORT_BUFFERS} buffers, got {buffers}"
            );
        }
        let page_capacity = Batch::capacity_for(child.schema(), settings.page_size_bytes);
        Ok(Self {
            child,
            order,
            buffers,
            page_capacity,
            arena: SpillArena::new(&settings.spill_dir),
            budget: PageBudget::new(buffers),
            run_count: 0,
            merge_passes: 0,
            state: None,
        })
    }

    /// Sorted runs produced by run generation in the last `open`.
    pub fn run_count(&self) -> usize {
        self.run_count
    }

    /// Merge passes made in the last `open`; zero when run generation
    /// produced at most one run.
    pub fn merge_passes(&self) -> usize {
        self.merge_passes
    }

    /// The most pages this sort has held at once.
    pub fn peak_pages(&self) -> usize {
        self.budget.peak()
    }

    /// Number of spill files currently owned.
    pub fn spill_files(&self) -> usize {
        self.arena.len()
    }

    fn comparator(&self) -> Result<TupleComparator> {
        match &self.order {
            SortOrder::Keys(keys) => TupleComparator::resolve(self.child.schema(), keys),
            SortOrder::WholeRow => {
                Ok(TupleComparator::whole_row(self.child.schema().col_count()))
            }
        }
    }
}

impl Operator for OrderBy {
    fn schema(&self) -> &Table {
        self.child.schema()
    }

    fn open(&mut self) -> Result<()> {
        self.close()?;
        self.run_count = 0;
        self.merge_passes = 0;
        let comparator = self.comparator()?;
        open_child(NAME, self.child.as_mut())?;

        let mut store = RunStore {
            arena: &mut self.arena,
            budget: &mut self.budget,
            comparator: &comparator,
            page_capacity: self.page_capacity,
        };
        let runs = store.generate_runs(self.child.as_mut(), self.buffers)?;
        self.run_count = runs.len();
        let (run, passes) = store.merge_runs(runs, self.buffers - 1)?;
        self.merge_passes = passes;

        self.state = Some(SortState {
            run,
            reader: None,
            done: false,
        });
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>> {
        let Some(state) = self.state.as_mut() else {
            return not_open();
        };
        if state.done {
            return Ok(None);
        }
        let Some(run) = state.run else {
            state.done = true;
            return Ok(None);
        };
        if state.reader.is_none() {
            state.reader = Some(self.arena.open_reader(run)?);
        }

        let page = match state.reader.as_mut() {
            Some(reader) => reader.read_page()?,
            None => None,
        };
        if page.is_none() {
            state.done = true;
            state.reader = None;
        }
        Ok(page)
    }

    fn close(&mut self) -> Result<()> {
        self.state = None;
        self.budget.release_all();
        first_error([self.arena.clear(), self.child.close()])
    }
}
