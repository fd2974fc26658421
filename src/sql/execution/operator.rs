use crate::common::constants::NOT_OPEN_MSG;
use crate::common::{Error, Result};
use crate::storage::page::Batch;
use crate::types::Table;

/// A boxed, dynamically dispatched operator.
pub type BoxedOperator = Box<dyn Operator>;

/// The pull-based batch iteration protocol every operator implements and
/// drives its children with.
///
/// A parent calls `open` once, then `next` until it returns `Ok(None)`, then
/// `close`. Each `next` performs a bounded unit of work and returns at most
/// one page. Every returned page is full except possibly the last one of the
/// stream, and an empty page is never returned.
pub trait Operator {
    /// The schema of the rows this operator emits.
    fn schema(&self) -> &Table;

    /// Performs all one-time setup: attribute resolution, materialization,
    /// partitioning, run generation. Re-opening a closed operator starts over
    /// from scratch.
    fn open(&mut self) -> Result<()>;

    /// Returns the next page of output, or None once the stream is exhausted.
    /// After the first None, every further call returns None again.
    fn next(&mut self) -> Result<Option<Batch>>;

    /// Releases every temp resource the operator owns and closes its
    /// children. Safe to call more than once, before exhaustion, and after a
    /// failed `open`.
    fn close(&mut self) -> Result<()>;
}

impl<O: Operator + ?Sized> Operator for Box<O> {
    fn schema(&self) -> &Table {
        (**self).schema()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn next(&mut self) -> Result<Option<Batch>> {
        (**self).next()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Keeps the first error of a sequence of best-effort cleanup steps while
/// still running all of them.
pub(crate) fn first_error(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
    let mut first = None;
    for result in results {
        if let Err(e) = result {
            log::warn!("cleanup step failed: {e}");
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

/// Opens a child operator on behalf of `parent`, reporting any failure as a
/// setup failure of the parent.
pub(crate) fn open_child(parent: &str, child: &mut dyn Operator) -> Result<()> {
    child
        .open()
        .map_err(|e| Error::SetupFailure(format!("{parent}: child failed to open: {e}")))
}

/// The error returned by `next` on an operator that is not open.
pub(crate) fn not_open<T>() -> Result<T> {
    Err(Error::InvalidInput(NOT_OPEN_MSG.to_string()))
}
