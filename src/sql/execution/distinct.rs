use crate::common::Result;
use crate::config::Settings;
use crate::sql::execution::operator::{not_open, BoxedOperator, Operator};
use crate::sql::execution::sort::OrderBy;
use crate::storage::page::Batch;
use crate::storage::tuple::Row;
use crate::types::Table;

/// Emits each distinct input row once, in ascending order.
///
/// The input is sorted on all columns with an external sort, after which
/// duplicates are adjacent and only the first row of each run of equal rows
/// is kept. Two NULLs (or two NaNs) in the same column count as equal here.
pub struct Distinct {
    sort: OrderBy,
    page_capacity: usize,
    /// None until opened.
    cursor: Option<DistinctCursor>,
}

/// Where a suspended scan resumes.
#[derive(Default)]
struct DistinctCursor {
    /// The sorted page being collapsed.
    pending: Option<Batch>,
    /// Next row of `pending` to look at.
    idx: usize,
    /// The last row emitted, to compare the next candidate against.
    last: Option<Row>,
    done: bool,
}

impl Distinct {
    pub fn new(child: BoxedOperator, buffers: usize, settings: &Settings) -> Result<Self> {
        let page_capacity = Batch::capacity_for(child.schema(), settings.page_size_bytes);
        Ok(Self {
            sort: OrderBy::whole_row(child, buffers, settings)?,
            page_capacity,
            cursor: None,
        })
    }

    /// The most pages the underlying sort has held at once.
    pub fn peak_pages(&self) -> usize {
        self.sort.peak_pages()
    }
}

impl Operator for Distinct {
    fn schema(&self) -> &Table {
        self.sort.schema()
    }

    fn open(&mut self) -> Result<()> {
        self.cursor = None;
        self.sort.open()?;
        self.cursor = Some(DistinctCursor::default());
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return not_open();
        };
        if cursor.done {
            return Ok(None);
        }

        let mut output = Batch::new(self.page_capacity);
        while !output.is_full() {
            let Some(page) = cursor.pending.as_ref() else {
                match self.sort.next()? {
                    Some(page) => {
                        cursor.pending = Some(page);
                        cursor.idx = 0;
                        continue;
                    }
                    None => {
                        cursor.done = true;
                        break;
                    }
                }
            };
            match page.get(cursor.idx) {
                Some(row) => {
                    cursor.idx += 1;
                    if cursor.last.as_ref() != Some(row) {
                        cursor.last = Some(row.clone());
                        output.push(row.clone())?;
                    }
                }
                None => cursor.pending = None,
            }
        }
        Ok(if output.is_empty() { None } else { Some(output) })
    }

    fn close(&mut self) -> Result<()> {
        self.cursor = None;
        self.sort.close()
    }
}
