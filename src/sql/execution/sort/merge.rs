use crate::common::constants::{SORT_MERGE_PREFIX, SORT_RUN_PREFIX};
use crate::common::Result;
use crate::sql::execution::budget::PageBudget;
use crate::sql::execution::operator::Operator;
use crate::sql::execution::sort::TupleComparator;
use crate::storage::page::{paginate, Batch};
use crate::storage::spill::{PageReader, PageWriter, SpillArena, SpillId};
use crate::storage::tuple::Row;

/// Spill files and page budget of one sort, plus the page shape of its runs.
pub(super) struct RunStore<'a> {
    pub arena: &'a mut SpillArena,
    pub budget: &'a mut PageBudget,
    pub comparator: &'a TupleComparator,
    pub page_capacity: usize,
}

impl RunStore<'_> {
    /// Drains the opened `input` into sorted runs of up to `run_pages` input
    /// pages each. Empty input produces no runs.
    pub fn generate_runs(
        &mut self,
        input: &mut dyn Operator,
        run_pages: usize,
    ) -> Result<Vec<SpillId>> {
        let mut runs = Vec::new();
        let mut exhausted = false;
        while !exhausted {
            let mut rows = Vec::new();
            let mut pages = 0;
            while pages < run_pages {
                let Some(page) = input.next()? else {
                    exhausted = true;
                    break;
                };
                self.budget.reserve(1)?;
                pages += 1;
                rows.extend(page.into_rows());
            }
            let written = self.write_run(rows);
            self.budget.release(pages);
            if let Some(run) = written? {
                runs.push(run);
            }
        }
        log::debug!("generated {} sorted runs", runs.len());
        Ok(runs)
    }

    fn write_run(&mut self, mut rows: Vec<Row>) -> Result<Option<SpillId>> {
        if rows.is_empty() {
            return Ok(None);
        }
        // stable, so equal tuples keep their input order within a run
        rows.sort_by(|a, b| self.comparator.compare(a, b));

        let (id, mut writer) = self.arena.create(SORT_RUN_PREFIX)?;
        for page in paginate(rows, self.page_capacity) {
            writer.write_page(&page)?;
        }
        let pages = writer.finish()?;
        log::trace!("wrote sorted run of {pages} pages");
        Ok(Some(id))
    }

    /// Merges groups of up to `fan_in` consecutive runs until one run is
    /// left, deleting merged runs as it goes. Returns the final run, if any,
    /// and the number of merge passes made.
    pub fn merge_runs(
        &mut self,
        mut runs: Vec<SpillId>,
        fan_in: usize,
    ) -> Result<(Option<SpillId>, usize)> {
        let mut passes = 0;
        while runs.len() > 1 {
            passes += 1;
            let mut merged = Vec::with_capacity(runs.len().div_ceil(fan_in));
            for group in runs.chunks(fan_in) {
                if let [single] = group {
                    merged.push(*single);
                    continue;
                }
                let run = self.merge_group(group)?;
                for &old in group {
                    self.arena.remove(old)?;
                }
                merged.push(run);
            }
            log::debug!(
                "merge pass {passes}: {} runs into {}",
                runs.len(),
                merged.len()
            );
            runs = merged;
        }
        Ok((runs.pop(), passes))
    }

    /// Merges `group` into one new run, holding one page per input run plus
    /// the output page.
    fn merge_group(&mut self, group: &[SpillId]) -> Result<SpillId> {
        let pages = group.len() + 1;
        self.budget.reserve(pages)?;
        let merged = self.merge_streams(group);
        self.budget.release(pages);
        merged
    }

    fn merge_streams(&mut self, group: &[SpillId]) -> Result<SpillId> {
        let mut streams = Vec::with_capacity(group.len());
        for &run in group {
            streams.push(RunStream::open(self.arena.open_reader(run)?)?);
        }

        let (id, mut writer) = self.arena.create(SORT_MERGE_PREFIX)?;
        let mut output = Batch::new(self.page_capacity);
        while let Some(next) = self.smallest_head(&streams) {
            let Some(stream) = streams[next].as_mut() else {
                break;
            };
            let Some(row) = stream.take()? else {
                break;
            };
            if stream.is_done() {
                streams[next] = None;
            }
            if output.is_full() {
                flush(&mut writer, &mut output, self.page_capacity)?;
            }
            output.push(row)?;
        }
        if !output.is_empty() {
            writer.write_page(&output)?;
        }
        writer.finish()?;
        Ok(id)
    }

    /// Index of the stream whose head sorts first. Ties go to the lowest
    /// index, which keeps the merge stable.
    fn smallest_head(&self, streams: &[Option<RunStream>]) -> Option<usize> {
        let mut best: Option<(usize, &Row)> = None;
        for (i, stream) in streams.iter().enumerate() {
            let Some(head) = stream.as_ref().and_then(RunStream::head) else {
                continue;
            };
            match best {
                Some((_, row)) if self.comparator.compare(head, row).is_ge() => {}
                _ => best = Some((i, head)),
            }
        }
        best.map(|(i, _)| i)
    }
}

fn flush(writer: &mut PageWriter, output: &mut Batch, capacity: usize) -> Result<()> {
    let page = std::mem::replace(output, Batch::new(capacity));
    writer.write_page(&page)
}

/// One input run of a merge: its read stream and the page currently in
/// memory.
struct RunStream {
    reader: PageReader,
    page: Vec<Row>,
    idx: usize,
}

impl RunStream {
    fn open(mut reader: PageReader) -> Result<Option<Self>> {
        let Some(page) = reader.read_page()? else {
            return Ok(None);
        };
        Ok(Some(Self {
            reader,
            page: page.into_rows(),
            idx: 0,
        }))
    }

    fn head(&self) -> Option<&Row> {
        self.page.get(self.idx)
    }

    fn is_done(&self) -> bool {
        self.idx >= self.page.len()
    }

    /// Removes the head, refilling the page from disk once it runs out.
    fn take(&mut self) -> Result<Option<Row>> {
        let Some(slot) = self.page.get_mut(self.idx) else {
            return Ok(None);
        };
        let row = std::mem::take(slot);
        self.idx += 1;
        if self.idx >= self.page.len() {
            if let Some(page) = self.reader.read_page()? {
                self.page = page.into_rows();
                self.idx = 0;
            }
        }
        Ok(Some(row))
    }
}
